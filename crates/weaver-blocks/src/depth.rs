//! Depth utilities for hierarchical (list) content.
//!
//! Nestable tools render a per-block depth marker. Descendants of a block are
//! the contiguous run of following blocks with a strictly greater marker.

use crate::types::BlockId;

/// Read-only view of an ordered block sequence.
pub trait BlockSequence {
    fn len(&self) -> usize;

    fn id_at(&self, index: usize) -> Option<&BlockId>;

    fn index_of(&self, id: &str) -> Option<usize>;

    /// Nesting depth marker of the block at `index`; `None` for non-list blocks.
    fn depth_marker(&self, index: usize) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Depth marker of a block by id.
pub fn list_depth<S: BlockSequence + ?Sized>(seq: &S, id: &str) -> Option<usize> {
    seq.index_of(id).and_then(|index| seq.depth_marker(index))
}

/// Blocks nested under `id`: the following blocks whose marker is deeper.
///
/// Stops at the first block that is not a list item or is not deeper.
pub fn collect_descendants<S: BlockSequence + ?Sized>(seq: &S, id: &str) -> Vec<BlockId> {
    let Some(index) = seq.index_of(id) else {
        return Vec::new();
    };
    let Some(depth) = seq.depth_marker(index) else {
        return Vec::new();
    };

    let mut descendants = Vec::new();
    for next in index + 1..seq.len() {
        match (seq.depth_marker(next), seq.id_at(next)) {
            (Some(d), Some(next_id)) if d > depth => descendants.push(next_id.clone()),
            _ => break,
        }
    }
    descendants
}

/// `id` followed by its descendants, or empty if `id` is absent.
pub fn with_descendants<S: BlockSequence + ?Sized>(seq: &S, id: &str) -> Vec<BlockId> {
    let Some(index) = seq.index_of(id) else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    if let Some(own) = seq.id_at(index) {
        blocks.push(own.clone());
    }
    blocks.extend(collect_descendants(seq, id));
    blocks
}
