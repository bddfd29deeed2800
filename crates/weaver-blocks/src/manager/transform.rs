//! Composite operations: split, merge, replace/convert, bulk delete, clear.
//!
//! Each one commits to the document layer as a single transaction so a
//! single undo reverts the whole gesture.

use smol_str::SmolStr;
use uuid::Uuid;

use super::{BlockManager, InsertOptions, changed_entries};
use crate::document::DocumentLayer;
use crate::error::{BlockError, Result};
use crate::sanitize::sanitize_data;
use crate::types::{BlockData, BlockDescriptor, BlockId, Tunes, generate_block_id};

impl<D: DocumentLayer> BlockManager<D> {
    /// Split the current block at `caret`. The content after the caret moves
    /// into a new block of the same tool, inserted right after and focused.
    pub fn split(&mut self, caret: usize) -> Result<BlockId> {
        let index = self.current.ok_or_else(|| {
            tracing::warn!(target: "weaver::blocks", "split without a current block");
            BlockError::NoCurrentBlock
        })?;
        let id = self
            .order
            .get(index)
            .cloned()
            .ok_or(BlockError::NoCurrentBlock)?;
        let stored = self
            .document
            .get_block(&id)
            .map(|d| d.data)
            .or_else(|| self.arena.get(&id).map(|b| b.preserved_data()))
            .unwrap_or_default();

        let block = self
            .arena
            .get_mut(&id)
            .ok_or_else(|| BlockError::BlockNotFound(id.clone()))?;
        let split = block.split_at(caret).inspect_err(|e| {
            tracing::warn!(target: "weaver::blocks", block = %id, error = %e, "split failed");
        })?;
        let tool = block.name().clone();
        let parent = block.parent_id().cloned();

        let new_id = generate_block_id();
        let descriptor = BlockDescriptor {
            id: new_id.clone(),
            tool: tool.clone(),
            data: split.extracted.clone(),
            tunes: Tunes::new(),
            parent: parent.clone(),
        };

        self.atomic(None, |manager| {
            for (key, value) in changed_entries(&stored, &split.retained) {
                manager.document.update_block_data(&id, &key, &value);
            }
            manager.document.add_block(&descriptor, index + 1);
            manager.insert(InsertOptions {
                tool: Some(tool),
                data: split.extracted,
                id: Some(new_id),
                index: Some(index + 1),
                skip_sync: true,
                parent,
                ..InsertOptions::default()
            })
        })
    }

    /// Merge `source` into `target` and remove `source`.
    ///
    /// Same mergeable tool: the source data is sanitized with the target's
    /// field rules and merged. Otherwise, if source exports and target imports,
    /// the source goes through a string conversion first. Returns `Ok(false)`
    /// when the blocks cannot be merged or a tool fails to produce data.
    pub async fn merge_blocks(&mut self, target: &str, source: &str) -> Result<bool> {
        self.require_index(target)?;
        self.require_index(source)?;
        let (Some(target_block), Some(source_block)) = (self.arena.get(target), self.arena.get(source))
        else {
            return Err(BlockError::BlockNotFound(target.into()));
        };
        let target_tool = target_block.tool().clone();
        let source_tool = source_block.tool().clone();

        let Some(saved) = source_block.save().await else {
            tracing::warn!(target: "weaver::blocks", block = source, "merge source yielded no data");
            return Ok(false);
        };

        let incoming = if target_tool.name() == source_tool.name() && target_tool.is_mergeable() {
            sanitize_data(&saved.data, target_tool.sanitize_rules())
        } else if source_tool.can_export() && target_tool.can_import() {
            let exported = source_tool.export_to_string(&saved.data).unwrap_or_default();
            match target_tool.import_from_string(&exported) {
                Some(data) => data,
                None => return Ok(false),
            }
        } else {
            tracing::debug!(
                target: "weaver::blocks",
                target_tool = %target_tool.name(),
                source_tool = %source_tool.name(),
                "blocks are neither mergeable nor convertible"
            );
            return Ok(false);
        };

        let before = self
            .document
            .get_block(target)
            .map(|d| d.data)
            .or_else(|| self.arena.get(target).map(|b| b.preserved_data()))
            .unwrap_or_default();
        let Some(target_block) = self.arena.get(target) else {
            return Err(BlockError::BlockNotFound(target.into()));
        };
        let current = match target_block.save().await {
            Some(saved) => saved.data,
            None => target_block.preserved_data(),
        };
        // Merge into a scratch instance; the live block only changes once the
        // merged data exists and has been pushed.
        let mut scratch = target_tool.create(&current, target_block.tunes());
        if let Err(e) = scratch.merge(&incoming) {
            tracing::warn!(target: "weaver::blocks", block = target, error = %e, "merge failed");
            return Ok(false);
        }
        let merged = match scratch.save().await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(target: "weaver::blocks", block = target, error = %e, "merged data could not be saved");
                return Ok(false);
            }
        };

        self.atomic(None, |manager| {
            for (key, value) in changed_entries(&before, &merged) {
                manager.document.update_block_data(target, &key, &value);
            }
            manager.remove(source, false, false)
        })?;
        if let Some(target_block) = self.arena.get_mut(target) {
            target_block.set_data(&merged);
        }
        self.current = self.index_of(target);
        Ok(true)
    }

    /// Replace a block with a new block of `tool` holding `data`, as one
    /// labelled transaction.
    pub fn replace(&mut self, id: &str, tool: &str, data: BlockData) -> Result<BlockId> {
        let index = self.require_index(id)?;
        self.tools.get(tool).inspect_err(|e| {
            tracing::warn!(target: "weaver::blocks", error = %e, "replace failed");
        })?;

        let label = Uuid::new_v4().to_string();
        let result = {
            let _capture = self.capture_suppressed.enter();
            self.document.begin_transaction(Some(&label));
            let result = self.insert(
                InsertOptions::new()
                    .tool(tool)
                    .data(data)
                    .at(index)
                    .replacing(),
            );
            self.document.commit_transaction();
            result
        };
        if !self.capture_suppressed.is_active() {
            self.document.stop_capturing();
        }
        result
    }

    /// Convert a block to another tool through export, sanitize and import,
    /// then apply `overrides` on top of the imported data.
    pub async fn convert(
        &mut self,
        id: &str,
        tool: &str,
        overrides: Option<BlockData>,
    ) -> Result<BlockId> {
        let target_tool = self.tools.get(tool)?;
        let block = self.arena.get(id).ok_or_else(|| {
            tracing::warn!(target: "weaver::blocks", block = id, "convert: block not found");
            BlockError::BlockNotFound(id.into())
        })?;
        let source_tool = block.tool().clone();
        if !(source_tool.can_export() && target_tool.can_import()) {
            tracing::warn!(target: "weaver::blocks", from = %source_tool.name(), to = tool, "tools are not convertible");
            return Err(BlockError::NotConvertible {
                from: source_tool.name().clone(),
                to: SmolStr::new(tool),
            });
        }

        let saved = block
            .save()
            .await
            .ok_or_else(|| BlockError::ExtractionFailed(id.into()))?;
        let exported = source_tool.export_to_string(&saved.data).unwrap_or_default();
        let mut data = target_tool.import_from_string(&exported).ok_or_else(|| {
            BlockError::NotConvertible {
                from: source_tool.name().clone(),
                to: SmolStr::new(tool),
            }
        })?;
        if let Some(overrides) = overrides {
            data.extend(overrides);
        }
        self.replace(id, tool, data)
    }

    /// Remove every selected block in one transaction. When the whole
    /// collection was selected, a default block is inserted in its place
    /// within the same transaction and its id returned.
    pub fn delete_selected_blocks_and_insert_replacement(&mut self) -> Result<Option<BlockId>> {
        let selected: Vec<(usize, BlockId)> = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, id)| self.arena.get(*id).is_some_and(|b| b.is_selected()))
            .map(|(index, id)| (index, id.clone()))
            .collect();
        let Some(&(lowest, _)) = selected.first() else {
            return Ok(None);
        };
        let all_selected = selected.len() == self.order.len();
        if all_selected {
            self.default_tool()?;
        }

        self.atomic(None, |manager| {
            for (_, id) in selected.iter().rev() {
                manager.remove(id, false, false)?;
            }
            if all_selected {
                manager.insert(InsertOptions::new().at(lowest)).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Remove every block in one transaction, optionally leaving one default block.
    pub fn clear(&mut self, add_default: bool) -> Result<Option<BlockId>> {
        if add_default {
            self.default_tool()?;
        }
        self.atomic(None, |manager| {
            while let Some(id) = manager.order.last().cloned() {
                manager.remove(&id, false, false)?;
            }
            manager.current = None;
            if add_default {
                manager.insert(InsertOptions::new()).map(Some)
            } else {
                Ok(None)
            }
        })
    }
}
