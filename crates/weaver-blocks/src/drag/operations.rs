//! Committing a drop: reorder or duplicate the dragged blocks.

use futures_util::future::join_all;

use crate::document::DocumentLayer;
use crate::drag::state::DropTarget;
use crate::error::Result;
use crate::manager::{BlockManager, InsertOptions};
use crate::types::{BlockId, Edge};

/// Index a block dropped on `target` is inserted before, counted in the
/// collection as it is now (sources still in place).
pub fn insertion_index<D: DocumentLayer>(
    manager: &BlockManager<D>,
    target: &DropTarget,
) -> Result<usize> {
    let index = manager.require_index(&target.block)?;
    Ok(match target.edge {
        Edge::Top => index,
        Edge::Bottom => index + 1,
    })
}

/// Source indices in document order, failing on the first missing block.
fn sorted_sources<D: DocumentLayer>(
    manager: &BlockManager<D>,
    sources: &[BlockId],
) -> Result<Vec<(usize, BlockId)>> {
    let mut indexed = sources
        .iter()
        .map(|id| manager.require_index(id).map(|index| (index, id.clone())))
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    indexed.dedup_by(|a, b| a.0 == b.0);
    Ok(indexed)
}

/// Move `sources` next to `target`. The moved blocks become the selection.
///
/// Several blocks move as one undo step, keeping their relative order.
pub fn move_blocks<D: DocumentLayer>(
    manager: &mut BlockManager<D>,
    sources: &[BlockId],
    target: &DropTarget,
) -> Result<()> {
    let base = insertion_index(manager, target)?;
    let sorted = sorted_sources(manager, sources)?;

    match sorted.as_slice() {
        [] => return Ok(()),
        [(from, _)] => {
            let from = *from;
            let to = if from < base { base - 1 } else { base };
            if to != from {
                manager.move_block(to, from, false)?;
            }
        }
        _ => {
            let (before, after): (Vec<_>, Vec<_>) =
                sorted.iter().partition(|(index, _)| *index < base);
            manager.transact_moves(|manager| -> Result<()> {
                // Blocks above the drop point land right before it, last one first.
                for (k, (_, id)) in before.iter().rev().enumerate() {
                    let from = manager.require_index(id)?;
                    manager.move_block(base - 1 - k, from, false)?;
                }
                for (i, (_, id)) in after.iter().enumerate() {
                    let from = manager.require_index(id)?;
                    manager.move_block(base + i, from, false)?;
                }
                Ok(())
            })?;
        }
    }

    tracing::debug!(
        target: "weaver::drag",
        count = sorted.len(),
        block = %target.block,
        edge = ?target.edge,
        "moved blocks"
    );
    manager.clear_selection();
    for (_, id) in &sorted {
        manager.select(id, true)?;
    }
    Ok(())
}

/// Insert copies of `sources` next to `target` and select them.
///
/// Sources are saved concurrently; a source whose tool fails to save is left
/// out. Returns the ids of the copies, empty when nothing could be saved.
pub async fn duplicate_blocks<D: DocumentLayer>(
    manager: &mut BlockManager<D>,
    sources: &[BlockId],
    target: &DropTarget,
) -> Result<Vec<BlockId>> {
    let base = insertion_index(manager, target)?;
    let sorted = sorted_sources(manager, sources)?;

    let saves = sorted.iter().filter_map(|(_, id)| manager.block(id)).map(|block| {
        let parent = block.parent_id().cloned();
        async move { block.save().await.map(|saved| (saved, parent)) }
    });
    let saved: Vec<_> = join_all(saves).await.into_iter().flatten().collect();
    if saved.is_empty() {
        tracing::warn!(target: "weaver::drag", count = sorted.len(), "no source could be saved, nothing duplicated");
        return Ok(Vec::new());
    }
    let skipped = sorted.len() - saved.len();
    if skipped > 0 {
        tracing::warn!(target: "weaver::drag", skipped, "some sources failed to save and were not duplicated");
    }

    let duplicates = manager.transact(|manager| {
        saved
            .into_iter()
            .enumerate()
            .map(|(i, (block, parent))| {
                let mut options = InsertOptions::new()
                    .tool(block.tool)
                    .data(block.data)
                    .tunes(block.tunes)
                    .at(base + i)
                    .without_focus();
                options.parent = parent.filter(|p| manager.block(p).is_some());
                manager.insert(options)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    manager.clear_selection();
    for id in &duplicates {
        manager.select(id, true)?;
    }
    tracing::debug!(target: "weaver::drag", count = duplicates.len(), index = base, "duplicated blocks");
    Ok(duplicates)
}

/// 1-based position of the first moved block, for announcements.
pub(crate) fn landed_position<D: DocumentLayer>(
    manager: &BlockManager<D>,
    moved: &[BlockId],
) -> Option<usize> {
    moved
        .iter()
        .filter_map(|id| manager.index_of(id))
        .min()
        .map(|index| index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockError;
    use crate::test_support::{ids, manager_with, texts};

    fn sources(ids: &[&str]) -> Vec<BlockId> {
        ids.iter().map(|id| BlockId::from(*id)).collect()
    }

    #[test]
    fn test_single_move_down() {
        let mut manager = manager_with(&["a", "b", "c", "d"]);
        move_blocks(&mut manager, &sources(&["b0"]), &DropTarget::new("b2", Edge::Bottom)).unwrap();
        assert_eq!(ids(&manager), ["b1", "b2", "b0", "b3"]);
        assert_eq!(manager.selected_ids(), ["b0"]);
    }

    #[test]
    fn test_single_move_up() {
        let mut manager = manager_with(&["a", "b", "c", "d"]);
        move_blocks(&mut manager, &sources(&["b3"]), &DropTarget::new("b1", Edge::Top)).unwrap();
        assert_eq!(ids(&manager), ["b0", "b3", "b1", "b2"]);
    }

    #[test]
    fn test_single_move_onto_own_position_is_noop() {
        let mut manager = manager_with(&["a", "b", "c"]);
        manager.document_mut().clear_ops();
        move_blocks(&mut manager, &sources(&["b1"]), &DropTarget::new("b0", Edge::Bottom)).unwrap();
        assert_eq!(ids(&manager), ["b0", "b1", "b2"]);
        assert!(manager.document().ops().is_empty());
        assert_eq!(manager.selected_ids(), ["b1"]);
    }

    #[test]
    fn test_multi_move_before_first_keeps_relative_order() {
        let mut manager = manager_with(&["a", "b", "c", "d"]);
        move_blocks(&mut manager, &sources(&["b3", "b1"]), &DropTarget::new("b0", Edge::Top)).unwrap();
        assert_eq!(ids(&manager), ["b1", "b3", "b0", "b2"]);
        assert_eq!(manager.selected_ids(), ["b1", "b3"]);
    }

    #[test]
    fn test_multi_move_down_keeps_relative_order() {
        let mut manager = manager_with(&["a", "b", "c", "d", "e"]);
        move_blocks(&mut manager, &sources(&["b0", "b1"]), &DropTarget::new("b3", Edge::Bottom)).unwrap();
        assert_eq!(ids(&manager), ["b2", "b3", "b0", "b1", "b4"]);
    }

    #[test]
    fn test_multi_move_around_target() {
        let mut manager = manager_with(&["a", "b", "c", "d", "e"]);
        move_blocks(&mut manager, &sources(&["b0", "b4"]), &DropTarget::new("b2", Edge::Top)).unwrap();
        assert_eq!(ids(&manager), ["b1", "b0", "b4", "b2", "b3"]);
    }

    #[test]
    fn test_multi_move_is_one_undo_step() {
        let mut manager = manager_with(&["a", "b", "c", "d"]);
        move_blocks(&mut manager, &sources(&["b1", "b3"]), &DropTarget::new("b0", Edge::Top)).unwrap();
        assert_eq!(manager.document().undo_depth(), 1);

        assert!(manager.undo());
        assert_eq!(ids(&manager), ["b0", "b1", "b2", "b3"]);
        assert!(!manager.can_undo());
    }

    #[test]
    fn test_move_missing_target() {
        let mut manager = manager_with(&["a", "b"]);
        let err = move_blocks(&mut manager, &sources(&["b0"]), &DropTarget::new("zz", Edge::Top));
        assert!(matches!(err, Err(BlockError::BlockNotFound(_))));
        assert_eq!(ids(&manager), ["b0", "b1"]);
    }

    #[tokio::test]
    async fn test_duplicate_after_target() {
        let mut manager = manager_with(&["a", "b", "c"]);
        let copies = duplicate_blocks(&mut manager, &sources(&["b0", "b1"]), &DropTarget::new("b2", Edge::Bottom))
            .await
            .unwrap();

        assert_eq!(copies.len(), 2);
        assert_eq!(texts(&manager), ["a", "b", "c", "a", "b"]);
        assert_eq!(manager.selected_ids(), copies);
        assert_eq!(landed_position(&manager, &copies), Some(4));
        // One step undoes both copies.
        assert!(manager.undo());
        assert_eq!(texts(&manager), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_skips_failed_saves() {
        let mut manager = manager_with(&["a", "b"]);
        manager
            .insert(InsertOptions::new().tool("broken").id("x").at(2))
            .unwrap();

        let copies = duplicate_blocks(&mut manager, &sources(&["b0", "x"]), &DropTarget::new("b0", Edge::Top))
            .await
            .unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(manager.len(), 4);
        assert_eq!(manager.block_at(0).map(|b| b.id()), Some(&copies[0]));
    }

    #[tokio::test]
    async fn test_duplicate_nothing_saved() {
        let mut manager = manager_with(&["a"]);
        manager
            .insert(InsertOptions::new().tool("broken").id("x"))
            .unwrap();
        manager.document_mut().clear_ops();

        let copies = duplicate_blocks(&mut manager, &sources(&["x"]), &DropTarget::new("b0", Edge::Top))
            .await
            .unwrap();
        assert!(copies.is_empty());
        assert_eq!(manager.len(), 2);
        assert!(manager.document().ops().is_empty());
    }
}
