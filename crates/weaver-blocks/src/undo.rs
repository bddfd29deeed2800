//! In-memory document layer with snapshot undo/redo.
//!
//! `MemoryDocument` is the local counterpart of the Loro layer: same contract,
//! no replication. Every outermost transaction (or bare operation) records the
//! snapshot it started from; undo swaps snapshots and reports the difference
//! as [`DocumentEvent`]s.

use serde_json::Value;

use crate::document::{DocumentEvent, DocumentLayer, EventOrigin, diff_snapshots};
use crate::types::{BlockDescriptor, BlockId};

/// Operation log entry, kept for inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentOp {
    Add { id: BlockId, index: usize },
    Remove { id: BlockId },
    Move { id: BlockId, index: usize },
    UpdateData { id: BlockId, key: String },
    UpdateTune { id: BlockId, name: String },
    SetParent { id: BlockId, parent: Option<BlockId> },
    Load { count: usize },
    Begin { label: Option<String> },
    Commit,
    StopCapturing,
}

/// Snapshot-based local document layer.
#[derive(Clone, Debug)]
pub struct MemoryDocument {
    blocks: Vec<BlockDescriptor>,
    undo_stack: Vec<Vec<BlockDescriptor>>,
    redo_stack: Vec<Vec<BlockDescriptor>>,
    max_steps: usize,
    /// Transaction nesting depth.
    depth: usize,
    /// Snapshot taken when the outermost transaction opened.
    pending: Option<Vec<BlockDescriptor>>,
    /// Merge consecutive steps until `stop_capturing`.
    group_steps: bool,
    group_open: bool,
    ops: Vec<DocumentOp>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryDocument {
    pub fn new(max_steps: usize) -> Self {
        Self {
            blocks: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_steps,
            depth: 0,
            pending: None,
            group_steps: false,
            group_open: false,
            ops: Vec::new(),
        }
    }

    /// Merge consecutive steps into one undo entry until the next
    /// `stop_capturing`, the way a capture window does.
    pub fn with_step_grouping(mut self, group: bool) -> Self {
        self.group_steps = group;
        self
    }

    /// Operations applied so far, in order.
    pub fn ops(&self) -> &[DocumentOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    fn block_mut(&mut self, id: &str) -> Option<&mut BlockDescriptor> {
        let found = self.blocks.iter_mut().find(|b| b.id == id);
        if found.is_none() {
            tracing::warn!(target: "weaver::blocks::sync", block = id, "document has no such block");
        }
        found
    }

    /// Apply a mutation, recording an undo step when outside a transaction.
    fn mutate(&mut self, op: DocumentOp, f: impl FnOnce(&mut Self)) {
        self.ops.push(op);
        if self.depth > 0 {
            f(self);
            return;
        }
        let before = self.blocks.clone();
        f(self);
        self.record_step(before);
    }

    fn record_step(&mut self, before: Vec<BlockDescriptor>) {
        if before == self.blocks {
            return;
        }
        self.redo_stack.clear();
        if !(self.group_steps && self.group_open) {
            self.undo_stack.push(before);
            if self.undo_stack.len() > self.max_steps {
                self.undo_stack.remove(0);
            }
        }
        self.group_open = true;
    }
}

impl DocumentLayer for MemoryDocument {
    fn add_block(&mut self, block: &BlockDescriptor, index: usize) {
        self.mutate(
            DocumentOp::Add {
                id: block.id.clone(),
                index,
            },
            |doc| {
                if doc.position(&block.id).is_some() {
                    tracing::warn!(target: "weaver::blocks::sync", block = %block.id, "duplicate add ignored");
                    return;
                }
                let index = index.min(doc.blocks.len());
                doc.blocks.insert(index, block.clone());
            },
        );
    }

    fn remove_block(&mut self, id: &str) {
        self.mutate(DocumentOp::Remove { id: id.into() }, |doc| {
            if let Some(pos) = doc.position(id) {
                doc.blocks.remove(pos);
            }
        });
    }

    fn move_block(&mut self, id: &str, index: usize) {
        self.mutate(
            DocumentOp::Move {
                id: id.into(),
                index,
            },
            |doc| {
                if let Some(pos) = doc.position(id) {
                    let block = doc.blocks.remove(pos);
                    let index = index.min(doc.blocks.len());
                    doc.blocks.insert(index, block);
                }
            },
        );
    }

    fn update_block_data(&mut self, id: &str, key: &str, value: &Value) {
        self.mutate(
            DocumentOp::UpdateData {
                id: id.into(),
                key: key.to_string(),
            },
            |doc| {
                if let Some(block) = doc.block_mut(id) {
                    block.data.insert(key.to_string(), value.clone());
                }
            },
        );
    }

    fn update_block_tune(&mut self, id: &str, name: &str, value: &Value) {
        self.mutate(
            DocumentOp::UpdateTune {
                id: id.into(),
                name: name.to_string(),
            },
            |doc| {
                if let Some(block) = doc.block_mut(id) {
                    block.tunes.insert(name.into(), value.clone());
                }
            },
        );
    }

    fn set_block_parent(&mut self, id: &str, parent: Option<&str>) {
        self.mutate(
            DocumentOp::SetParent {
                id: id.into(),
                parent: parent.map(Into::into),
            },
            |doc| {
                if let Some(block) = doc.block_mut(id) {
                    block.parent = parent.map(Into::into);
                }
            },
        );
    }

    fn begin_transaction(&mut self, label: Option<&str>) {
        self.ops.push(DocumentOp::Begin {
            label: label.map(str::to_string),
        });
        if self.depth == 0 {
            self.pending = Some(self.blocks.clone());
        }
        self.depth += 1;
    }

    fn commit_transaction(&mut self) {
        if self.depth == 0 {
            tracing::warn!(target: "weaver::blocks::sync", "commit without an open transaction");
            return;
        }
        self.ops.push(DocumentOp::Commit);
        self.depth -= 1;
        if self.depth == 0
            && let Some(before) = self.pending.take()
        {
            self.record_step(before);
        }
    }

    fn load_blocks(&mut self, blocks: &[BlockDescriptor], index: usize) {
        self.ops.push(DocumentOp::Load {
            count: blocks.len(),
        });
        let mut index = index.min(self.blocks.len());
        for block in blocks {
            if self.position(&block.id).is_some() {
                continue;
            }
            self.blocks.insert(index, block.clone());
            index += 1;
        }
    }

    fn stop_capturing(&mut self) {
        self.ops.push(DocumentOp::StopCapturing);
        self.group_open = false;
    }

    fn to_json(&self) -> Vec<BlockDescriptor> {
        self.blocks.clone()
    }

    fn get_block(&self, id: &str) -> Option<BlockDescriptor> {
        self.blocks.iter().find(|b| b.id == id).cloned()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.position(id)
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn undo(&mut self) -> Vec<DocumentEvent> {
        if self.depth > 0 {
            tracing::warn!(target: "weaver::blocks::sync", "undo inside a transaction ignored");
            return Vec::new();
        }
        let Some(snapshot) = self.undo_stack.pop() else {
            return Vec::new();
        };
        let current = std::mem::replace(&mut self.blocks, snapshot);
        let events = diff_snapshots(&current, &self.blocks, EventOrigin::Undo);
        self.redo_stack.push(current);
        self.group_open = false;
        events
    }

    fn redo(&mut self) -> Vec<DocumentEvent> {
        if self.depth > 0 {
            tracing::warn!(target: "weaver::blocks::sync", "redo inside a transaction ignored");
            return Vec::new();
        }
        let Some(snapshot) = self.redo_stack.pop() else {
            return Vec::new();
        };
        let current = std::mem::replace(&mut self.blocks, snapshot);
        let events = diff_snapshots(&current, &self.blocks, EventOrigin::Redo);
        self.undo_stack.push(current);
        self.group_open = false;
        events
    }

    fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.group_open = false;
    }
}
