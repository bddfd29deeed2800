//! Drop target resolution and nested-depth prediction.

use crate::config::BlocksConfig;
use crate::depth::BlockSequence;
use crate::drag::state::DropTarget;
use crate::platform::DropSurface;
use crate::types::{BlockId, Edge, Point, Rect};

/// Resolves which block and edge a drag is hovering over.
#[derive(Clone, Copy, Debug)]
pub struct DropTargetDetector {
    drop_zone_width: f64,
}

impl Default for DropTargetDetector {
    fn default() -> Self {
        Self::new(&BlocksConfig::default())
    }
}

impl DropTargetDetector {
    pub fn new(config: &BlocksConfig) -> Self {
        Self {
            drop_zone_width: config.drop_zone_width_px,
        }
    }

    /// Resolve the drop target under the pointer.
    ///
    /// `element` is the host node under the pointer, if any. Returns `None`
    /// when nothing valid is under the pointer or the candidate is one of the
    /// dragged blocks.
    pub fn resolve<S, Q>(
        &self,
        surface: &S,
        blocks: &Q,
        element: Option<&S::Element>,
        pointer: Point,
        sources: &[BlockId],
    ) -> Option<DropTarget>
    where
        S: DropSurface,
        Q: BlockSequence + ?Sized,
    {
        let candidate = element
            .and_then(|element| surface.closest_block(element))
            .or_else(|| self.block_in_drop_zone(surface, blocks, pointer))?;

        if sources.contains(&candidate) {
            return None;
        }

        // A block inside another container than the dragged one redirects to
        // the container itself.
        let source_container = sources.first().and_then(|s| surface.container_of(s));
        if let Some(container) = surface.container_of(&candidate)
            && Some(&container) != source_container.as_ref()
        {
            if sources.contains(&container) {
                return None;
            }
            let rect = surface.block_rect(&container)?;
            tracing::trace!(target: "weaver::drag", block = %candidate, container = %container, "redirected to container");
            return Some(DropTarget::new(container, edge_for(rect, pointer)));
        }

        let rect = surface.block_rect(&candidate)?;
        let edge = edge_for(rect, pointer);
        if edge == Edge::Top
            && let Some(index) = blocks.index_of(&candidate)
            && index > 0
            && let Some(previous) = blocks.id_at(index - 1)
            && !sources.contains(previous)
        {
            // One indicator position per gap: top of N is bottom of N-1.
            return Some(DropTarget::new(previous.clone(), Edge::Bottom));
        }
        Some(DropTarget::new(candidate, edge))
    }

    /// Fallback for pointers left of the content column: the strip of
    /// `drop_zone_width` pixels picks the block whose vertical bounds contain
    /// the pointer.
    fn block_in_drop_zone<S, Q>(&self, surface: &S, blocks: &Q, pointer: Point) -> Option<BlockId>
    where
        S: DropSurface,
        Q: BlockSequence + ?Sized,
    {
        let content = surface.content_rect()?;
        let in_strip =
            pointer.x < content.left() && pointer.x >= content.left() - self.drop_zone_width;
        if !in_strip {
            return None;
        }
        (0..blocks.len())
            .filter_map(|index| blocks.id_at(index))
            .find(|id| {
                surface
                    .block_rect(id)
                    .is_some_and(|rect| rect.contains_y(pointer.y))
            })
            .cloned()
    }
}

fn edge_for(rect: Rect, pointer: Point) -> Edge {
    if pointer.y < rect.mid_y() {
        Edge::Top
    } else {
        Edge::Bottom
    }
}

/// Predict the list depth `dragged` would have after dropping on `target`.
///
/// Best-effort, for the drop indicator only: the depth the block actually
/// ends up with is decided after the drop and may differ.
///
/// The cap is one deeper than the preceding list item, or 0 when the
/// preceding block is not a list item. Within the cap, the following item's
/// depth wins if deeper than the current one, then the preceding item's,
/// otherwise the current depth is kept.
pub fn predict_drop_depth<Q>(blocks: &Q, target: &DropTarget, dragged: &str) -> usize
where
    Q: BlockSequence + ?Sized,
{
    let dragged_index = blocks.index_of(dragged);
    let current = dragged_index
        .and_then(|index| blocks.depth_marker(index))
        .unwrap_or(0);
    let Some(target_index) = blocks.index_of(&target.block) else {
        return current;
    };

    let (mut previous, mut next) = match target.edge {
        Edge::Top => (target_index.checked_sub(1), Some(target_index)),
        Edge::Bottom => (Some(target_index), Some(target_index + 1)),
    };
    if previous.is_some() && previous == dragged_index {
        previous = previous.and_then(|p| p.checked_sub(1));
    }
    if next.is_some() && next == dragged_index {
        next = next.map(|n| n + 1);
    }

    let previous_depth = previous.and_then(|p| blocks.depth_marker(p));
    let next_depth = next.and_then(|n| blocks.depth_marker(n));
    let max = previous_depth.map_or(0, |d| d + 1);

    match (next_depth, previous_depth) {
        (Some(next), _) if next > current && next <= max => next,
        (_, Some(previous)) if previous > current && previous <= max => previous,
        _ => current.min(max),
    }
}
