//! Bidirectional sync between the collection and the document layer.

use serde_json::Value;
use smol_str::SmolStr;

use super::{BlockManager, InsertOptions};
use crate::block::ListenerBinding;
use crate::document::{BlockChange, DocumentEvent, DocumentLayer};
use crate::error::{BlockError, Result};
use crate::types::{BlockData, BlockDescriptor};

/// Keys whose value differs between `before` and `after`. Keys missing from
/// `after` are reported as `null`.
pub(crate) fn changed_entries(before: &BlockData, after: &BlockData) -> Vec<(String, Value)> {
    let mut changes: Vec<(String, Value)> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    changes.extend(
        before
            .keys()
            .filter(|key| !after.contains_key(*key))
            .map(|key| (key.clone(), Value::Null)),
    );
    changes
}

impl<D: DocumentLayer> BlockManager<D> {
    /// Push a locally edited block's changed data keys and tunes.
    ///
    /// Skipped (returns `Ok(false)`) while document changes are being applied,
    /// while the block's listeners are still deferred, or when nothing changed.
    pub async fn sync_block_changed(&mut self, id: &str) -> Result<bool> {
        if self.sync_depth.is_active() {
            tracing::debug!(target: "weaver::blocks::sync", block = id, "sync guard active, skipping block change");
            return Ok(false);
        }
        let block = self.arena.get(id).ok_or_else(|| {
            tracing::warn!(target: "weaver::blocks::sync", block = id, "changed block not found");
            BlockError::BlockNotFound(id.into())
        })?;
        if block.listeners() == ListenerBinding::Deferred {
            return Ok(false);
        }
        let Some(stored) = self.document.get_block(id) else {
            tracing::debug!(target: "weaver::blocks::sync", block = id, "block not in document, skipping");
            return Ok(false);
        };
        let Some(saved) = block.save().await else {
            return Ok(false);
        };

        let data_changes = changed_entries(&stored.data, &saved.data);
        let tune_changes: Vec<(SmolStr, Value)> = saved
            .tunes
            .iter()
            .filter(|(name, value)| stored.tunes.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if data_changes.is_empty() && tune_changes.is_empty() {
            return Ok(false);
        }

        tracing::debug!(
            target: "weaver::blocks::sync",
            block = id,
            keys = data_changes.len(),
            tunes = tune_changes.len(),
            "pushing block change"
        );
        self.document.transact(|doc| {
            for (key, value) in &data_changes {
                doc.update_block_data(id, key, value);
            }
            for (name, value) in &tune_changes {
                doc.update_block_tune(id, name, value);
            }
        });
        Ok(true)
    }

    /// Set one tune. Tunes are bound at construction, so the tool instance is
    /// rebuilt from its current data.
    pub async fn update_tune(&mut self, id: &str, name: &str, value: Value) -> Result<()> {
        let block = self
            .arena
            .get(id)
            .ok_or_else(|| BlockError::BlockNotFound(id.into()))?;
        let data = match block.save().await {
            Some(saved) => saved.data,
            None => block.preserved_data(),
        };
        let mut tunes = block.tunes().clone();
        tunes.insert(name.into(), value.clone());
        if let Some(block) = self.arena.get_mut(id) {
            block.recompose(data, tunes);
        }
        if !self.applying_events.is_active() {
            self.document.update_block_tune(id, name, &value);
        }
        Ok(())
    }

    /// Apply document-originated changes (undo, redo, remote import) to the
    /// collection without pushing them back.
    pub fn apply_document_events(&mut self, events: Vec<DocumentEvent>) {
        let _sync = self.sync_depth.enter();
        let _applying = self.applying_events.enter();
        let mut removed_any = false;

        for event in events {
            tracing::debug!(target: "weaver::blocks::sync", origin = ?event.origin, change = ?event.change, "applying document event");
            match event.change {
                BlockChange::Updated {
                    block,
                    tunes_changed,
                } => self.apply_update(block, tunes_changed),
                BlockChange::Added { block, index } => self.apply_add(block, index),
                BlockChange::Removed { id } => {
                    if self.arena.contains_key(&id) {
                        if let Err(e) = self.remove(&id, false, true) {
                            tracing::warn!(target: "weaver::blocks::sync", block = %id, error = %e, "remote remove failed");
                        }
                        removed_any = true;
                    }
                }
                BlockChange::Moved { .. } => self.resync_pending = true,
            }
        }

        if removed_any && self.order.is_empty() {
            self.insert_placeholder();
        }
        if std::mem::take(&mut self.resync_pending) {
            self.resync_order();
        }
    }

    fn apply_update(&mut self, descriptor: BlockDescriptor, tunes_changed: bool) {
        let Some(block) = self.arena.get_mut(&descriptor.id) else {
            tracing::warn!(target: "weaver::blocks::sync", block = %descriptor.id, "update for unknown block");
            return;
        };

        if *block.name() != descriptor.tool {
            let index = self.index_of(&descriptor.id);
            let options = InsertOptions {
                tool: Some(descriptor.tool.clone()),
                data: descriptor.data.clone(),
                tunes: descriptor.tunes.clone(),
                id: Some(descriptor.id.clone()),
                index,
                need_to_focus: false,
                replace: true,
                skip_sync: true,
                parent: None,
            };
            if let Err(e) = self.insert(options) {
                tracing::warn!(target: "weaver::blocks::sync", block = %descriptor.id, error = %e, "tool switch failed");
                return;
            }
        } else if tunes_changed {
            block.recompose(descriptor.data.clone(), descriptor.tunes.clone());
        } else {
            block.set_data(&descriptor.data);
        }

        let current_parent = self
            .arena
            .get(&descriptor.id)
            .and_then(|b| b.parent_id().cloned());
        if current_parent != descriptor.parent
            && let Err(e) = self.set_block_parent(&descriptor.id, descriptor.parent.as_deref())
        {
            tracing::warn!(target: "weaver::blocks::sync", block = %descriptor.id, error = %e, "reparent from document failed");
        }
    }

    fn apply_add(&mut self, descriptor: BlockDescriptor, index: usize) {
        if self.arena.contains_key(&descriptor.id) {
            tracing::debug!(target: "weaver::blocks::sync", block = %descriptor.id, "block already present");
            return;
        }
        let position = index.min(self.order.len());
        if position != index {
            self.resync_pending = true;
        }
        let parent = descriptor
            .parent
            .clone()
            .filter(|parent| self.arena.contains_key(parent));
        let options = InsertOptions {
            tool: Some(descriptor.tool),
            data: descriptor.data,
            tunes: descriptor.tunes,
            id: Some(descriptor.id.clone()),
            index: Some(position),
            need_to_focus: false,
            replace: false,
            skip_sync: true,
            parent,
        };
        if let Err(e) = self.insert(options) {
            tracing::warn!(target: "weaver::blocks::sync", block = %descriptor.id, error = %e, "remote add failed");
        }
    }

    /// Keep the collection non-empty after a document-originated removal.
    /// The placeholder is loaded, not recorded, so redo history survives.
    fn insert_placeholder(&mut self) {
        let options = InsertOptions {
            skip_sync: true,
            ..InsertOptions::default()
        };
        match self.insert(options) {
            Ok(id) => {
                if let Some(descriptor) = self.descriptor(&id) {
                    self.document.load_blocks(&[descriptor], 0);
                }
                tracing::debug!(target: "weaver::blocks::sync", block = %id, "inserted placeholder block");
            }
            Err(e) => {
                tracing::warn!(target: "weaver::blocks::sync", error = %e, "could not insert placeholder block");
            }
        }
    }

    /// Reorder the collection to match the document, moving only blocks
    /// whose position differs.
    fn resync_order(&mut self) {
        let target: Vec<_> = self.document.to_json().into_iter().map(|b| b.id).collect();
        let current_id = self.current_block().map(|b| b.id().clone());

        let mut moved = 0;
        let mut slot = 0;
        for id in &target {
            let Some(from) = self.index_of(id) else {
                continue;
            };
            if from != slot && self.move_block(slot, from, false).is_ok() {
                moved += 1;
            }
            slot += 1;
        }

        self.current = current_id.and_then(|id| self.index_of(&id));
        tracing::debug!(target: "weaver::blocks::sync", moved, "resynced block order");
    }

    /// Undo one document step. Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        if !self.document.can_undo() {
            return false;
        }
        let events = self.document.undo();
        tracing::debug!(target: "weaver::blocks::sync", count = events.len(), "undo");
        self.apply_document_events(events);
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.document.can_redo() {
            return false;
        }
        let events = self.document.redo();
        tracing::debug!(target: "weaver::blocks::sync", count = events.len(), "redo");
        self.apply_document_events(events);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.document.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.document.can_redo()
    }
}
