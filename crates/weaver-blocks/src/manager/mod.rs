//! Block collection manager.
//!
//! `BlockManager` owns the ordered block collection, the current-block index
//! and the bridge to the document layer. Structural operations live here;
//! composite ones (split, merge, convert, bulk delete) are in `transform`,
//! document-to-view synchronization in `sync`.

mod sync;
mod transform;

pub(crate) use sync::changed_entries;

use std::collections::{HashMap, HashSet};

use smol_str::SmolStr;
use web_time::Instant;

use crate::block::{Block, ListenerBinding};
use crate::config::BlocksConfig;
use crate::depth::BlockSequence;
use crate::document::{DocumentLayer, MOVES_TRANSACTION};
use crate::error::{BlockError, Result};
use crate::guard::Counter;
use crate::mutation::{BlockMutation, MutationObserver};
use crate::tools::ToolRegistry;
use crate::types::{BlockData, BlockDescriptor, BlockId, Tunes, generate_block_id};

/// Options for [`BlockManager::insert`].
#[derive(Clone, Debug)]
pub struct InsertOptions {
    /// Tool name; the configured default tool when `None`.
    pub tool: Option<SmolStr>,
    pub data: BlockData,
    pub tunes: Tunes,
    /// Block id; generated when `None`.
    pub id: Option<BlockId>,
    /// Target index; after the current block when `None`.
    pub index: Option<usize>,
    pub need_to_focus: bool,
    /// Replace the block at the target index instead of inserting before it.
    pub replace: bool,
    /// Do not push the insertion to the document layer.
    pub skip_sync: bool,
    pub parent: Option<BlockId>,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self {
            tool: None,
            data: BlockData::new(),
            tunes: Tunes::new(),
            id: None,
            index: None,
            need_to_focus: true,
            replace: false,
            skip_sync: false,
            parent: None,
        }
    }
}

impl InsertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(mut self, tool: impl Into<SmolStr>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn data(mut self, data: BlockData) -> Self {
        self.data = data;
        self
    }

    pub fn tunes(mut self, tunes: Tunes) -> Self {
        self.tunes = tunes;
        self
    }

    pub fn id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn without_focus(mut self) -> Self {
        self.need_to_focus = false;
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn skip_sync(mut self) -> Self {
        self.skip_sync = true;
        self
    }

    pub fn parent(mut self, parent: impl Into<BlockId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Owner of the rendered block collection.
pub struct BlockManager<D> {
    config: BlocksConfig,
    tools: ToolRegistry,
    arena: HashMap<BlockId, Block>,
    order: Vec<BlockId>,
    current: Option<usize>,
    document: D,
    /// Non-zero while document-originated changes are applied, or while a
    /// composite operation runs. Suppresses "block changed" pushes.
    sync_depth: Counter,
    /// Non-zero only while document events are applied. Suppresses
    /// structural pushes (moves, reparenting) that would echo them back.
    applying_events: Counter,
    /// Non-zero while moves must not close the undo group.
    capture_suppressed: Counter,
    /// Set by move notifications, consumed by one order resync per batch.
    resync_pending: bool,
    observers: Vec<MutationObserver>,
    deferred: Vec<BlockId>,
    deferred_since: Option<Instant>,
}

impl<D> std::fmt::Debug for BlockManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockManager")
            .field("order", &self.order)
            .field("current", &self.current)
            .field("sync_depth", &self.sync_depth.depth())
            .finish_non_exhaustive()
    }
}

impl<D: DocumentLayer> BlockManager<D> {
    pub fn new(config: BlocksConfig, tools: ToolRegistry, document: D) -> Self {
        Self {
            config,
            tools,
            arena: HashMap::new(),
            order: Vec::new(),
            current: None,
            document,
            sync_depth: Counter::new(),
            applying_events: Counter::new(),
            capture_suppressed: Counter::new(),
            resync_pending: false,
            observers: Vec::new(),
            deferred: Vec::new(),
            deferred_since: None,
        }
    }

    pub fn config(&self) -> &BlocksConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    /// Direct access to the document layer. Changes made here are not
    /// reflected in the collection until events are applied.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// Register a mutation observer.
    pub fn subscribe(&mut self, observer: impl FnMut(&BlockMutation) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Whether document-originated changes are being applied.
    pub fn is_syncing(&self) -> bool {
        self.applying_events.is_active()
    }

    fn notify(&mut self, mutation: BlockMutation) {
        tracing::trace!(target: "weaver::blocks", ?mutation, "block mutation");
        for observer in &mut self.observers {
            observer(&mutation);
        }
    }

    // === Queries ===

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.order.iter().filter_map(|id| self.arena.get(id))
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.arena.get(id)
    }

    pub fn block_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.arena.get_mut(id)
    }

    pub fn block_at(&self, index: usize) -> Option<&Block> {
        self.order.get(index).and_then(|id| self.arena.get(id))
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|b| b == id)
    }

    pub(crate) fn require_index(&self, id: &str) -> Result<usize> {
        self.index_of(id).ok_or_else(|| {
            tracing::warn!(target: "weaver::blocks", block = id, "block not found");
            BlockError::BlockNotFound(id.into())
        })
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn set_current_index(&mut self, index: Option<usize>) -> Result<()> {
        if let Some(index) = index
            && index >= self.order.len()
        {
            tracing::warn!(target: "weaver::blocks", index, len = self.order.len(), "current index out of range");
            return Err(BlockError::IndexOutOfRange {
                index,
                len: self.order.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    pub fn current_block(&self) -> Option<&Block> {
        self.current.and_then(|index| self.block_at(index))
    }

    pub fn first_block(&self) -> Option<&Block> {
        self.block_at(0)
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.order.len().checked_sub(1).and_then(|i| self.block_at(i))
    }

    /// Block after the current one.
    pub fn next_block(&self) -> Option<&Block> {
        self.current.and_then(|index| self.block_at(index + 1))
    }

    /// Block before the current one.
    pub fn previous_block(&self) -> Option<&Block> {
        self.current
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.block_at(index))
    }

    /// First non-empty block after the current one.
    pub fn next_contentful_block(&self) -> Option<&Block> {
        let start = self.current?.checked_add(1)?;
        self.order[start.min(self.order.len())..]
            .iter()
            .filter_map(|id| self.arena.get(id))
            .find(|block| !block.is_empty())
    }

    /// Nearest non-empty block before the current one.
    pub fn previous_contentful_block(&self) -> Option<&Block> {
        let current = self.current?;
        self.order[..current]
            .iter()
            .rev()
            .filter_map(|id| self.arena.get(id))
            .find(|block| !block.is_empty())
    }

    // === Selection ===

    pub fn select(&mut self, id: &str, selected: bool) -> Result<()> {
        self.require_index(id)?;
        if let Some(block) = self.arena.get_mut(id) {
            block.set_selected(selected);
        }
        Ok(())
    }

    pub fn select_all(&mut self) {
        for block in self.arena.values_mut() {
            block.set_selected(true);
        }
    }

    pub fn clear_selection(&mut self) {
        for block in self.arena.values_mut() {
            block.set_selected(false);
        }
    }

    /// Selected blocks in document order.
    pub fn selected_blocks(&self) -> Vec<&Block> {
        self.blocks().filter(|block| block.is_selected()).collect()
    }

    pub fn selected_ids(&self) -> Vec<BlockId> {
        self.blocks()
            .filter(|block| block.is_selected())
            .map(|block| block.id().clone())
            .collect()
    }

    pub fn is_all_selected(&self) -> bool {
        !self.order.is_empty() && self.blocks().all(Block::is_selected)
    }

    // === Structural operations ===

    fn default_tool(&self) -> Result<SmolStr> {
        self.config.default_tool.clone().ok_or_else(|| {
            tracing::warn!(target: "weaver::blocks", "no default tool configured");
            BlockError::NoDefaultTool
        })
    }

    /// Insert a new block. Returns its id.
    pub fn insert(&mut self, options: InsertOptions) -> Result<BlockId> {
        let tool_name = match options.tool {
            Some(tool) => tool,
            None => self.default_tool()?,
        };
        let tool = self.tools.get(&tool_name).inspect_err(|e| {
            tracing::warn!(target: "weaver::blocks", error = %e, "insert failed");
        })?;

        let len = self.order.len();
        let current = self.current.map_or(-1, |c| c as isize);
        let offset = if options.replace { 0 } else { 1 };
        let index = options
            .index
            .unwrap_or_else(|| (current + offset).max(0) as usize)
            .min(len);
        let replaced = if options.replace {
            self.order.get(index).cloned()
        } else {
            None
        };

        if replaced.is_none()
            && let Some(parent) = &options.parent
            && !self.arena.contains_key(parent)
        {
            tracing::warn!(target: "weaver::blocks", parent = %parent, "insert under missing parent");
            return Err(BlockError::BlockNotFound(parent.clone()));
        }
        let id = options.id.unwrap_or_else(generate_block_id);
        if self.arena.contains_key(&id) && replaced.as_ref() != Some(&id) {
            tracing::warn!(target: "weaver::blocks", block = %id, "insert with duplicate id");
            return Err(BlockError::DuplicateId(id));
        }

        let block = Block::new(id.clone(), tool, options.data, options.tunes);
        let push = !options.skip_sync;

        match replaced {
            Some(old_id) => {
                self.notify(BlockMutation::AboutToBeRemoved {
                    id: old_id.clone(),
                    index,
                });
                let (parent, children) = match self.arena.remove(&old_id) {
                    Some(old) => (old.parent_id().cloned(), old.content_ids().to_vec()),
                    None => (None, Vec::new()),
                };
                self.order[index] = id.clone();
                self.arena.insert(id.clone(), block);

                // The new block takes over the replaced block's place in the hierarchy.
                if let Some(parent_block) = parent.as_ref().and_then(|p| self.arena.get_mut(p)) {
                    for child in parent_block.content_ids_mut() {
                        if *child == old_id {
                            *child = id.clone();
                        }
                    }
                }
                for child in &children {
                    if let Some(child_block) = self.arena.get_mut(child) {
                        child_block.set_parent_id(Some(id.clone()));
                    }
                }
                if let Some(new_block) = self.arena.get_mut(&id) {
                    new_block.set_parent_id(parent);
                    *new_block.content_ids_mut() = children.clone();
                }
                self.notify(BlockMutation::Removed {
                    id: old_id.clone(),
                    index,
                });

                if push {
                    let descriptor = self.descriptor(&id);
                    self.document.begin_transaction(None);
                    self.document.remove_block(&old_id);
                    if let Some(descriptor) = &descriptor {
                        self.document.add_block(descriptor, index);
                    }
                    for child in &children {
                        self.document.set_block_parent(child, Some(&id));
                    }
                    self.document.commit_transaction();
                }
            }
            None => {
                self.order.insert(index, id.clone());
                self.arena.insert(id.clone(), block);
                if options.parent.is_some() {
                    self.link_parent(&id, options.parent);
                }
                if push && let Some(descriptor) = self.descriptor(&id) {
                    self.document.add_block(&descriptor, index);
                }
            }
        }

        self.refresh_indent(&id);
        self.notify(BlockMutation::Added {
            id: id.clone(),
            index,
        });

        if options.need_to_focus {
            self.current = Some(index);
        } else if !options.replace
            && let Some(current) = self.current
            && current >= index
        {
            self.current = Some(current + 1);
        }
        Ok(id)
    }

    /// Bulk load. The document layer receives the set as one non-undoable
    /// load; listener binding for the new blocks is deferred.
    pub fn insert_many(&mut self, blocks: Vec<BlockDescriptor>, index: usize) -> Result<()> {
        let mut batch = HashSet::with_capacity(blocks.len());
        for descriptor in &blocks {
            self.tools.get(&descriptor.tool)?;
            if self.arena.contains_key(&descriptor.id) || !batch.insert(&descriptor.id) {
                tracing::warn!(target: "weaver::blocks", block = %descriptor.id, "bulk load with duplicate id");
                return Err(BlockError::DuplicateId(descriptor.id.clone()));
            }
        }

        let index = index.min(self.order.len());
        for (offset, descriptor) in blocks.iter().enumerate() {
            let tool = self.tools.get(&descriptor.tool)?;
            let mut block = Block::new(
                descriptor.id.clone(),
                tool,
                descriptor.data.clone(),
                descriptor.tunes.clone(),
            );
            block.set_listeners(ListenerBinding::Deferred);
            self.order.insert(index + offset, descriptor.id.clone());
            self.arena.insert(descriptor.id.clone(), block);
            self.deferred.push(descriptor.id.clone());
            self.notify(BlockMutation::Added {
                id: descriptor.id.clone(),
                index: index + offset,
            });
        }
        if let Some(current) = self.current
            && current >= index
        {
            self.current = Some(current + blocks.len());
        }

        self.document.load_blocks(&blocks, index);

        for descriptor in &blocks {
            let Some(parent) = &descriptor.parent else {
                continue;
            };
            if self.arena.contains_key(parent) {
                self.link_parent(&descriptor.id, Some(parent.clone()));
            } else {
                tracing::warn!(
                    target: "weaver::blocks",
                    block = %descriptor.id,
                    parent = %parent,
                    "loaded block references a missing parent, keeping it at root"
                );
            }
        }
        for descriptor in blocks.iter().filter(|d| d.parent.is_some()) {
            self.refresh_indent(&descriptor.id);
        }

        if !blocks.is_empty() && self.deferred_since.is_none() {
            self.deferred_since = Some(Instant::now());
        }
        tracing::debug!(target: "weaver::blocks", count = blocks.len(), index, "loaded blocks");
        Ok(())
    }

    /// Remove a block. Its children move up to its own parent.
    pub fn remove(&mut self, id: &str, add_last_block: bool, skip_sync: bool) -> Result<()> {
        let index = self.require_index(id)?;
        // Removing the last block and adding its replacement is one step.
        let replaces_last = add_last_block && self.order.len() == 1 && !skip_sync;
        if replaces_last {
            self.document.begin_transaction(None);
        }
        let block_id = self.order.remove(index);
        let (parent, children) = match self.arena.remove(&block_id) {
            Some(block) => (block.parent_id().cloned(), block.content_ids().to_vec()),
            None => (None, Vec::new()),
        };
        if let Some(parent_block) = parent.as_ref().and_then(|p| self.arena.get_mut(p)) {
            parent_block.content_ids_mut().retain(|c| *c != block_id);
        }
        for child in &children {
            self.link_parent(child, parent.clone());
            self.refresh_indent(child);
        }
        self.deferred.retain(|d| *d != block_id);

        if !skip_sync {
            if children.is_empty() {
                self.document.remove_block(&block_id);
            } else {
                self.document.begin_transaction(None);
                for child in &children {
                    self.document.set_block_parent(child, parent.as_deref());
                }
                self.document.remove_block(&block_id);
                self.document.commit_transaction();
            }
        }

        self.notify(BlockMutation::Removed {
            id: block_id,
            index,
        });

        let mut current = self.current.map_or(-1, |c| c as isize);
        if current >= index as isize {
            current -= 1;
        }
        if self.order.is_empty() {
            self.current = None;
            if add_last_block {
                let options = InsertOptions {
                    skip_sync,
                    ..InsertOptions::default()
                };
                let inserted = self.insert(options);
                if replaces_last {
                    self.document.commit_transaction();
                }
                inserted?;
            }
        } else if index == 0 {
            self.current = Some(0);
        } else {
            self.current = (current >= 0).then_some(current as usize);
        }
        Ok(())
    }

    /// Move the block at `from` to `to`.
    ///
    /// `skip_dom` marks that the host already repositioned the holder.
    pub fn move_block(&mut self, to: usize, from: usize, skip_dom: bool) -> Result<()> {
        let len = self.order.len();
        for index in [to, from] {
            if index >= len {
                tracing::warn!(target: "weaver::blocks", to, from, len, "move index out of range");
                return Err(BlockError::IndexOutOfRange { index, len });
            }
        }
        if to == from {
            return Ok(());
        }

        let id = self.order.remove(from);
        self.order.insert(to, id.clone());
        self.current = Some(to);
        if let Some(parent) = self.arena.get(&id).and_then(|b| b.parent_id().cloned()) {
            self.sort_children(&parent);
        }

        self.notify(BlockMutation::Moved {
            id: id.clone(),
            from,
            to,
            render: !skip_dom,
        });

        if !self.applying_events.is_active() {
            self.document.move_block(&id, to);
            if !self.capture_suppressed.is_active() {
                self.document.stop_capturing();
            }
        }
        Ok(())
    }

    // === Hierarchy ===

    /// Reparent a block. `None` moves it to the root level.
    pub fn set_block_parent(&mut self, id: &str, parent: Option<&str>) -> Result<()> {
        self.require_index(id)?;
        if let Some(parent) = parent {
            self.require_index(parent)?;
            let mut cursor = Some(BlockId::from(parent));
            while let Some(ancestor) = cursor {
                if ancestor == id {
                    tracing::warn!(target: "weaver::blocks", block = id, parent, "reparent would create a cycle");
                    return Err(BlockError::ParentCycle {
                        block: id.into(),
                        parent: parent.into(),
                    });
                }
                cursor = self.arena.get(&ancestor).and_then(|b| b.parent_id().cloned());
            }
        }

        let current_parent = self.arena.get(id).and_then(|b| b.parent_id().cloned());
        if current_parent.as_deref() == parent {
            return Ok(());
        }

        let block_id = BlockId::from(id);
        self.link_parent(&block_id, parent.map(BlockId::from));
        self.refresh_indent(&block_id);

        if !self.applying_events.is_active() {
            self.document.set_block_parent(id, parent);
        }
        Ok(())
    }

    /// Number of parent hops to the root (root = 0).
    pub fn block_depth(&self, id: &str) -> Result<usize> {
        let block = self.arena.get(id).ok_or_else(|| BlockError::BlockNotFound(id.into()))?;
        let mut depth = 0;
        let mut cursor = block.parent_id().cloned();
        while let Some(parent) = cursor {
            let Some(parent_block) = self.arena.get(&parent) else {
                break;
            };
            depth += 1;
            if depth > self.arena.len() {
                break;
            }
            cursor = parent_block.parent_id().cloned();
        }
        Ok(depth)
    }

    /// Detach from the old parent and attach to `parent`, keeping the
    /// parent's child list in document order.
    fn link_parent(&mut self, id: &BlockId, parent: Option<BlockId>) {
        let old_parent = self.arena.get(id).and_then(|b| b.parent_id().cloned());
        if let Some(old_block) = old_parent.as_ref().and_then(|p| self.arena.get_mut(p)) {
            old_block.content_ids_mut().retain(|c| c != id);
        }
        if let Some(block) = self.arena.get_mut(id) {
            block.set_parent_id(parent.clone());
        }
        if let Some(parent) = parent
            && let Some(parent_block) = self.arena.get_mut(&parent)
        {
            if !parent_block.content_ids().contains(id) {
                parent_block.content_ids_mut().push(id.clone());
            }
            self.sort_children(&parent);
        }
    }

    fn sort_children(&mut self, parent: &BlockId) {
        let Some(mut children) = self.arena.get(parent).map(|b| b.content_ids().to_vec()) else {
            return;
        };
        children.sort_by_key(|c| self.index_of(c).unwrap_or(usize::MAX));
        if let Some(parent_block) = self.arena.get_mut(parent) {
            *parent_block.content_ids_mut() = children;
        }
    }

    /// Recompute indentation for a block and its subtree.
    fn refresh_indent(&mut self, id: &BlockId) {
        let mut stack = vec![id.clone()];
        let mut visited = 0;
        while let Some(next) = stack.pop() {
            visited += 1;
            if visited > self.arena.len() {
                break;
            }
            let Ok(depth) = self.block_depth(&next) else {
                continue;
            };
            if let Some(block) = self.arena.get_mut(&next) {
                block.set_indent(depth);
                stack.extend(block.content_ids().iter().cloned());
            }
        }
    }

    pub(crate) fn descriptor(&self, id: &str) -> Option<BlockDescriptor> {
        self.arena.get(id).map(Block::descriptor)
    }

    // === Deferred listener binding ===

    /// Bind listeners deferred by `insert_many` once the host is idle or the
    /// configured timeout since the first deferral has passed. Returns how
    /// many blocks were bound.
    pub fn flush_deferred_bindings(&mut self, now: Instant, idle: bool) -> usize {
        let Some(since) = self.deferred_since else {
            return 0;
        };
        if !idle && now.saturating_duration_since(since) < self.config.idle_bind_timeout() {
            return 0;
        }
        let pending = std::mem::take(&mut self.deferred);
        for id in &pending {
            if let Some(block) = self.arena.get_mut(id) {
                block.set_listeners(ListenerBinding::Bound);
            }
        }
        self.deferred_since = None;
        tracing::debug!(target: "weaver::blocks", count = pending.len(), idle, "bound deferred listeners");
        pending.len()
    }

    pub fn has_deferred_bindings(&self) -> bool {
        !self.deferred.is_empty()
    }

    // === Grouping ===

    /// Run `f` as one undo step: sync guarded, stop-capturing suppressed,
    /// inside one document transaction.
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.atomic(None, f)
    }

    pub(crate) fn atomic<R>(&mut self, label: Option<&str>, f: impl FnOnce(&mut Self) -> R) -> R {
        let result = {
            let _sync = self.sync_depth.enter();
            let _capture = self.capture_suppressed.enter();
            self.document.begin_transaction(label);
            let result = f(self);
            self.document.commit_transaction();
            result
        };
        if !self.capture_suppressed.is_active() {
            self.document.stop_capturing();
        }
        result
    }

    /// Run a group of moves as one undo step.
    pub fn transact_moves<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let result = {
            let _capture = self.capture_suppressed.enter();
            self.document.begin_transaction(Some(MOVES_TRANSACTION));
            let result = f(self);
            self.document.commit_transaction();
            result
        };
        if !self.capture_suppressed.is_active() {
            self.document.stop_capturing();
        }
        result
    }
}

impl<D: DocumentLayer> BlockSequence for BlockManager<D> {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn id_at(&self, index: usize) -> Option<&BlockId> {
        self.order.get(index)
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|b| b == id)
    }

    fn depth_marker(&self, index: usize) -> Option<usize> {
        self.block_at(index).and_then(Block::list_depth)
    }
}

#[cfg(test)]
mod tests;
