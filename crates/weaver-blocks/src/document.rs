//! Document layer trait and change events.
//!
//! The document layer is the collaborative, transaction-groupable log of block
//! operations. It is authoritative for undo/redo ordering; the block manager's
//! in-memory collection is authoritative for what is currently rendered.
//!
//! Two implementations exist:
//! - [`MemoryDocument`](crate::undo::MemoryDocument): snapshot-based, local only
//! - `LoroBlockDocument` in `weaver-blocks-crdt`: backed by a Loro CRDT

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::types::{BlockDescriptor, BlockId};

/// Transaction label used for grouped multi-block moves.
pub const MOVES_TRANSACTION: &str = "moves";

/// Where a document change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventOrigin {
    /// Local edit pushed by the manager.
    User,
    /// Bulk load. Never undoable.
    Load,
    Undo,
    Redo,
    /// Imported from a collaborator.
    Remote,
}

/// A block-level change reported by the document layer.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockChange {
    Added { block: BlockDescriptor, index: usize },
    Removed { id: BlockId },
    Moved { id: BlockId, index: usize },
    /// Data, tunes, tool or parent changed.
    Updated {
        block: BlockDescriptor,
        /// Tunes or tool differ, so the tool instance must be rebuilt.
        tunes_changed: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentEvent {
    pub origin: EventOrigin,
    pub change: BlockChange,
}

impl DocumentEvent {
    pub fn new(origin: EventOrigin, change: BlockChange) -> Self {
        Self { origin, change }
    }
}

/// The collaborative document layer, as consumed by the block manager.
///
/// Mutations are infallible from the manager's point of view: a layer that
/// cannot apply an operation logs it and carries on, the rendered collection
/// stays authoritative for what the user sees.
pub trait DocumentLayer {
    // === Required: block operations ===

    /// Add a block at `index` in document order.
    fn add_block(&mut self, block: &BlockDescriptor, index: usize);

    fn remove_block(&mut self, id: &str);

    fn move_block(&mut self, id: &str, index: usize);

    /// Set one key of a block's data payload.
    fn update_block_data(&mut self, id: &str, key: &str, value: &Value);

    fn update_block_tune(&mut self, id: &str, name: &str, value: &Value);

    fn set_block_parent(&mut self, id: &str, parent: Option<&str>);

    // === Required: grouping ===

    /// Open a transaction. Transactions nest; only the outermost commit
    /// produces an undo step.
    fn begin_transaction(&mut self, label: Option<&str>);

    fn commit_transaction(&mut self);

    /// Insert blocks at `index` with the [`EventOrigin::Load`] origin.
    fn load_blocks(&mut self, blocks: &[BlockDescriptor], index: usize);

    /// Close the current undo group so the next change starts a new step.
    fn stop_capturing(&mut self);

    // === Required: reads ===

    /// Authoritative ordered snapshot.
    fn to_json(&self) -> Vec<BlockDescriptor>;

    fn get_block(&self, id: &str) -> Option<BlockDescriptor>;

    // === Required: history ===

    /// Undo one step, reporting what changed.
    fn undo(&mut self) -> Vec<DocumentEvent>;

    fn redo(&mut self) -> Vec<DocumentEvent>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    fn clear_history(&mut self);

    // === Provided ===

    /// Position of a block in document order.
    fn index_of(&self, id: &str) -> Option<usize> {
        self.to_json().iter().position(|b| b.id == id)
    }

    fn len(&self) -> usize {
        self.to_json().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` inside one transaction.
    fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        self.begin_transaction(None);
        let result = f(self);
        self.commit_transaction();
        result
    }

    /// Run a group of moves inside one transaction.
    fn transact_moves<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        self.begin_transaction(Some(MOVES_TRANSACTION));
        let result = f(self);
        self.commit_transaction();
        result
    }
}

/// Compute the events that turn `before` into `after`.
///
/// Order: removals, additions (ascending final index), updates, then moves
/// for surviving blocks whose relative order changed. Applying them in that
/// order and finishing with one order resync reproduces `after`.
pub fn diff_snapshots(
    before: &[BlockDescriptor],
    after: &[BlockDescriptor],
    origin: EventOrigin,
) -> Vec<DocumentEvent> {
    let before_ids: HashMap<&str, &BlockDescriptor> =
        before.iter().map(|b| (b.id.as_str(), b)).collect();
    let after_ids: HashSet<&str> = after.iter().map(|b| b.id.as_str()).collect();

    let mut events = Vec::new();

    for block in before {
        if !after_ids.contains(block.id.as_str()) {
            events.push(DocumentEvent::new(
                origin,
                BlockChange::Removed {
                    id: block.id.clone(),
                },
            ));
        }
    }

    for (index, block) in after.iter().enumerate() {
        if !before_ids.contains_key(block.id.as_str()) {
            events.push(DocumentEvent::new(
                origin,
                BlockChange::Added {
                    block: block.clone(),
                    index,
                },
            ));
        }
    }

    for block in after {
        if let Some(old) = before_ids.get(block.id.as_str())
            && *old != block
        {
            events.push(DocumentEvent::new(
                origin,
                BlockChange::Updated {
                    block: block.clone(),
                    tunes_changed: old.tunes != block.tunes || old.tool != block.tool,
                },
            ));
        }
    }

    // Relative order of the blocks present on both sides.
    let common_before: Vec<&str> = before
        .iter()
        .map(|b| b.id.as_str())
        .filter(|id| after_ids.contains(id))
        .collect();
    let common_after: Vec<(usize, &str)> = after
        .iter()
        .enumerate()
        .map(|(i, b)| (i, b.id.as_str()))
        .filter(|(_, id)| before_ids.contains_key(id))
        .collect();
    for (position, (index, id)) in common_after.iter().enumerate() {
        if common_before.get(position) != Some(id) {
            events.push(DocumentEvent::new(
                origin,
                BlockChange::Moved {
                    id: (*id).into(),
                    index: *index,
                },
            ));
        }
    }

    events
}
