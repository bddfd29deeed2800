//! Loro-backed block document.
//!
//! Layout inside the `LoroDoc`:
//!
//! ```text
//! order:  MovableList<String>            block ids in document order
//! blocks: Map<id, Map {
//!     tool:   String,
//!     parent: String | null,
//!     data:   Map<key, json string>,
//!     tunes:  Map<name, json string>,
//! }>
//! ```
//!
//! Values are stored as JSON text per key so concurrent edits to different
//! keys of one block merge, while a single key stays last-writer-wins.

use std::borrow::Cow;
use std::collections::HashSet;

use loro::{
    Container, ExportMode, LoroDoc, LoroMap, LoroMovableList, LoroValue, UndoManager,
    ValueOrContainer, VersionVector,
};
use serde_json::Value;
use smol_str::SmolStr;
use weaver_blocks::{
    BlockData, BlockDescriptor, DocumentEvent, DocumentLayer, EventOrigin, Tunes, diff_snapshots,
};

use crate::config::LoroDocumentConfig;
use crate::document::{CrdtDocument, SyncState};
use crate::error::{CrdtError, Result};

const ORDER: &str = "order";
const BLOCKS: &str = "blocks";
const TOOL: &str = "tool";
const PARENT: &str = "parent";
const DATA: &str = "data";
const TUNES: &str = "tunes";

/// Commit origin for bulk loads. Excluded from undo.
pub const LOAD_ORIGIN: &str = "load";

/// Block document replicated through Loro.
pub struct LoroBlockDocument {
    doc: LoroDoc,
    order: LoroMovableList,
    blocks: LoroMap,
    undo_mgr: UndoManager,
    config: LoroDocumentConfig,
    /// Transaction nesting depth.
    depth: usize,
    sync_state: SyncState,
}

impl std::fmt::Debug for LoroBlockDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoroBlockDocument")
            .field("blocks", &self.order.len())
            .field("depth", &self.depth)
            .field("sync_state", &self.sync_state)
            .finish_non_exhaustive()
    }
}

impl Default for LoroBlockDocument {
    fn default() -> Self {
        Self::new(LoroDocumentConfig::default())
    }
}

fn undo_manager(doc: &LoroDoc, config: &LoroDocumentConfig) -> UndoManager {
    let mut undo_mgr = UndoManager::new(doc);
    undo_mgr.set_merge_interval(config.undo_merge_interval_ms);
    undo_mgr.set_max_undo_steps(config.max_undo_steps);
    undo_mgr.add_exclude_origin_prefix(LOAD_ORIGIN);
    undo_mgr
}

impl LoroBlockDocument {
    pub fn new(config: LoroDocumentConfig) -> Self {
        Self::with_doc(LoroDoc::new(), config)
    }

    /// Open a document from a snapshot exported by a collaborator.
    pub fn from_snapshot(snapshot: &[u8], config: LoroDocumentConfig) -> Result<Self> {
        let doc = LoroDoc::new();
        doc.import(snapshot)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        Ok(Self::with_doc(doc, config))
    }

    fn with_doc(doc: LoroDoc, config: LoroDocumentConfig) -> Self {
        let order = doc.get_movable_list(ORDER);
        let blocks = doc.get_map(BLOCKS);
        let undo_mgr = undo_manager(&doc, &config);
        Self {
            doc,
            order,
            blocks,
            undo_mgr,
            config,
            depth: 0,
            sync_state: SyncState::new(),
        }
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync_state
    }

    /// Run a mutation, logging failures. Outside a transaction the change is
    /// committed right away and becomes its own undo step.
    fn apply(&mut self, operation: &'static str, f: impl FnOnce(&Self) -> Result<()>) {
        if let Err(error) = f(self) {
            tracing::warn!(target: "weaver::crdt", operation, %error, "document operation failed");
        }
        if self.depth == 0 {
            self.doc.commit();
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        (0..self.order.len()).find(|&index| {
            matches!(
                self.order.get(index),
                Some(ValueOrContainer::Value(LoroValue::String(s))) if s.as_str() == id
            )
        })
    }

    fn block_map(&self, id: &str) -> Result<LoroMap> {
        match self.blocks.get(id) {
            Some(ValueOrContainer::Container(Container::Map(map))) => Ok(map),
            _ => Err(CrdtError::MissingBlock(id.to_string())),
        }
    }

    fn write_block(&self, block: &BlockDescriptor) -> Result<()> {
        let map = self.blocks.insert_container(&block.id, LoroMap::new())?;
        map.insert(TOOL, block.tool.as_str())?;
        set_parent(&map, block.parent.as_deref())?;
        let data = map.insert_container(DATA, LoroMap::new())?;
        for (key, value) in &block.data {
            data.insert(key, serde_json::to_string(value)?.as_str())?;
        }
        let tunes = map.insert_container(TUNES, LoroMap::new())?;
        for (name, value) in &block.tunes {
            tunes.insert(name, serde_json::to_string(value)?.as_str())?;
        }
        Ok(())
    }

    fn insert_block(&self, block: &BlockDescriptor, index: usize) -> Result<()> {
        if self.position(&block.id).is_some() {
            tracing::warn!(target: "weaver::crdt", block = %block.id, "duplicate add ignored");
            return Ok(());
        }
        self.write_block(block)?;
        let index = index.min(self.order.len());
        self.order.insert(index, block.id.as_str())?;
        Ok(())
    }

    fn set_value(&self, id: &str, container: &str, key: &str, value: &Value) -> Result<()> {
        let block = self.block_map(id)?;
        let map = child_map(&block, container)?;
        map.insert(key, serde_json::to_string(value)?.as_str())?;
        Ok(())
    }

    fn read_block(&self, id: &str) -> Option<BlockDescriptor> {
        let map = self.block_map(id).ok()?;
        let tool = match map.get(TOOL) {
            Some(ValueOrContainer::Value(LoroValue::String(s))) => SmolStr::new(s.as_str()),
            _ => return None,
        };
        let parent = match map.get(PARENT) {
            Some(ValueOrContainer::Value(LoroValue::String(s))) => Some(SmolStr::new(s.as_str())),
            _ => None,
        };
        let data: BlockData = read_values(&map, DATA).into_iter().collect();
        let tunes: Tunes = read_values(&map, TUNES)
            .into_iter()
            .map(|(name, value)| (SmolStr::new(name), value))
            .collect();
        Some(BlockDescriptor {
            id: id.into(),
            tool,
            data,
            tunes,
            parent,
        })
    }

    fn ordered_ids(&self) -> Vec<String> {
        let LoroValue::List(list) = self.order.get_value() else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        list.iter()
            .filter_map(|value| value.as_string().map(|s| s.as_str().to_string()))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Close any open change and diff the document around `f`.
    fn observe(&mut self, origin: EventOrigin, f: impl FnOnce(&mut Self)) -> Vec<DocumentEvent> {
        self.doc.commit();
        let before = self.to_json();
        f(self);
        diff_snapshots(&before, &self.to_json(), origin)
    }
}

fn set_parent(map: &LoroMap, parent: Option<&str>) -> Result<()> {
    match parent {
        Some(parent) => map.insert(PARENT, parent)?,
        None => map.insert(PARENT, LoroValue::Null)?,
    }
    Ok(())
}

fn child_map(block: &LoroMap, key: &str) -> Result<LoroMap> {
    match block.get(key) {
        Some(ValueOrContainer::Container(Container::Map(map))) => Ok(map),
        _ => Ok(block.insert_container(key, LoroMap::new())?),
    }
}

/// Decode a map of JSON strings, sorted by key. Undecodable entries are
/// skipped.
fn read_values(block: &LoroMap, key: &str) -> Vec<(String, Value)> {
    let Some(ValueOrContainer::Container(Container::Map(map))) = block.get(key) else {
        return Vec::new();
    };
    let LoroValue::Map(entries) = map.get_value() else {
        return Vec::new();
    };
    let mut values: Vec<(String, Value)> = entries
        .iter()
        .filter_map(|(key, value)| {
            let raw = value.as_string()?;
            match serde_json::from_str(raw.as_str()) {
                Ok(value) => Some((key.to_string(), value)),
                Err(error) => {
                    tracing::warn!(target: "weaver::crdt", key = %key, %error, "undecodable block value");
                    None
                }
            }
        })
        .collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

impl DocumentLayer for LoroBlockDocument {
    fn add_block(&mut self, block: &BlockDescriptor, index: usize) {
        self.apply("add block", |doc| doc.insert_block(block, index));
    }

    fn remove_block(&mut self, id: &str) {
        self.apply("remove block", |doc| {
            if let Some(position) = doc.position(id) {
                doc.order.delete(position, 1)?;
            }
            doc.blocks.delete(id)?;
            Ok(())
        });
    }

    fn move_block(&mut self, id: &str, index: usize) {
        self.apply("move block", |doc| {
            let from = doc
                .position(id)
                .ok_or_else(|| CrdtError::MissingBlock(id.to_string()))?;
            let to = index.min(doc.order.len().saturating_sub(1));
            if from != to {
                doc.order.mov(from, to)?;
            }
            Ok(())
        });
    }

    fn update_block_data(&mut self, id: &str, key: &str, value: &Value) {
        self.apply("update data", |doc| doc.set_value(id, DATA, key, value));
    }

    fn update_block_tune(&mut self, id: &str, name: &str, value: &Value) {
        self.apply("update tune", |doc| doc.set_value(id, TUNES, name, value));
    }

    fn set_block_parent(&mut self, id: &str, parent: Option<&str>) {
        self.apply("set parent", |doc| set_parent(&doc.block_map(id)?, parent));
    }

    fn begin_transaction(&mut self, label: Option<&str>) {
        if self.depth == 0 {
            // Pending changes belong to the previous step.
            self.doc.commit();
            if let Some(label) = label {
                self.doc.set_next_commit_message(label);
            }
        }
        self.depth += 1;
    }

    fn commit_transaction(&mut self) {
        match self.depth {
            0 => tracing::warn!(target: "weaver::crdt", "commit without open transaction"),
            1 => {
                self.depth = 0;
                self.doc.commit();
            }
            _ => self.depth -= 1,
        }
    }

    fn load_blocks(&mut self, blocks: &[BlockDescriptor], index: usize) {
        if self.depth == 0 {
            self.doc.commit();
            self.doc.set_next_commit_origin(LOAD_ORIGIN);
        } else {
            tracing::debug!(target: "weaver::crdt", "load inside a transaction joins its undo step");
        }
        let mut at = index.min(self.order.len());
        for block in blocks {
            if self.position(&block.id).is_some() {
                tracing::debug!(target: "weaver::crdt", block = %block.id, "already loaded");
                continue;
            }
            match self.insert_block(block, at) {
                Ok(()) => at += 1,
                Err(error) => {
                    tracing::warn!(target: "weaver::crdt", block = %block.id, %error, "failed to load block")
                }
            }
        }
        if self.depth == 0 {
            self.doc.commit();
        }
        tracing::debug!(target: "weaver::crdt", count = blocks.len(), index, "loaded blocks");
    }

    fn stop_capturing(&mut self) {
        if self.depth > 0 {
            return;
        }
        self.doc.commit();
        if let Err(error) = self.undo_mgr.record_new_checkpoint() {
            tracing::warn!(target: "weaver::crdt", %error, "failed to close undo group");
        }
    }

    fn to_json(&self) -> Vec<BlockDescriptor> {
        self.ordered_ids()
            .iter()
            .filter_map(|id| self.read_block(id))
            .collect()
    }

    fn get_block(&self, id: &str) -> Option<BlockDescriptor> {
        self.read_block(id)
    }

    fn undo(&mut self) -> Vec<DocumentEvent> {
        self.observe(EventOrigin::Undo, |doc| match doc.undo_mgr.undo() {
            Ok(true) => {}
            Ok(false) => tracing::debug!(target: "weaver::crdt", "nothing to undo"),
            Err(error) => tracing::warn!(target: "weaver::crdt", %error, "undo failed"),
        })
    }

    fn redo(&mut self) -> Vec<DocumentEvent> {
        self.observe(EventOrigin::Redo, |doc| match doc.undo_mgr.redo() {
            Ok(true) => {}
            Ok(false) => tracing::debug!(target: "weaver::crdt", "nothing to redo"),
            Err(error) => tracing::warn!(target: "weaver::crdt", %error, "redo failed"),
        })
    }

    fn can_undo(&self) -> bool {
        self.undo_mgr.can_undo()
    }

    fn can_redo(&self) -> bool {
        self.undo_mgr.can_redo()
    }

    fn clear_history(&mut self) {
        self.doc.commit();
        // The undo manager has no clear; start a fresh one.
        self.undo_mgr = undo_manager(&self.doc, &self.config);
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.ordered_ids().iter().position(|known| known == id)
    }

    fn len(&self) -> usize {
        self.ordered_ids().len()
    }
}

impl CrdtDocument for LoroBlockDocument {
    fn export_snapshot(&self) -> Result<Vec<u8>> {
        self.doc.commit();
        self.doc
            .export(ExportMode::Snapshot)
            .map_err(|e| CrdtError::Export(e.to_string()))
    }

    fn export_updates_since_sync(&self) -> Option<Vec<u8>> {
        self.doc.commit();
        let current = self.doc.oplog_vv();
        let from = self.sync_state.last_synced_version.clone().unwrap_or_default();
        if from == current {
            return None;
        }
        let updates = match self.doc.export(ExportMode::Updates {
            from: Cow::Owned(from),
        }) {
            Ok(updates) => updates,
            Err(error) => {
                tracing::warn!(target: "weaver::crdt", %error, "failed to export updates");
                return None;
            }
        };
        (!updates.is_empty()).then_some(updates)
    }

    fn import(&mut self, data: &[u8]) -> Result<Vec<DocumentEvent>> {
        self.doc.commit();
        let before = self.to_json();
        self.doc
            .import(data)
            .map_err(|e| CrdtError::Import(e.to_string()))?;
        let events = diff_snapshots(&before, &self.to_json(), EventOrigin::Remote);
        tracing::debug!(target: "weaver::crdt", bytes = data.len(), events = events.len(), "imported remote changes");
        Ok(events)
    }

    fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    fn mark_synced(&mut self) {
        self.doc.commit();
        self.sync_state.last_synced_version = Some(self.doc.oplog_vv());
    }

    fn has_unsynced_changes(&self) -> bool {
        let current = self.doc.oplog_vv();
        match &self.sync_state.last_synced_version {
            Some(synced) => *synced != current,
            None => current != VersionVector::default(),
        }
    }
}
