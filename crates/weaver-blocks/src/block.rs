//! A block in the collection: identity, hierarchy links, tool instance and
//! the last known-good content.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::error::ToolError;
use crate::tools::{BlockTool, ToolDefinition};
use crate::types::{BlockData, BlockDescriptor, BlockId, SavedBlock, Tunes};

/// Whether a block's change listeners are attached yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerBinding {
    Bound,
    /// Attachment postponed to an idle window (bulk composition).
    Deferred,
}

/// Last data/tunes a tool successfully produced or accepted.
#[derive(Clone, Debug, PartialEq)]
struct Preserved {
    data: BlockData,
    tunes: Tunes,
}

pub struct Block {
    id: BlockId,
    tool: Rc<ToolDefinition>,
    instance: Box<dyn BlockTool>,
    tunes: Tunes,
    parent_id: Option<BlockId>,
    content_ids: Vec<BlockId>,
    preserved: RefCell<Preserved>,
    selected: bool,
    stretched: bool,
    indent: usize,
    listeners: ListenerBinding,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("tool", self.tool.name())
            .field("parent_id", &self.parent_id)
            .field("content_ids", &self.content_ids)
            .field("selected", &self.selected)
            .field("indent", &self.indent)
            .finish_non_exhaustive()
    }
}

impl Block {
    /// Compose a block, building its tool instance from `data` and `tunes`.
    pub fn new(id: BlockId, tool: Rc<ToolDefinition>, data: BlockData, tunes: Tunes) -> Self {
        let instance = tool.create(&data, &tunes);
        Self {
            id,
            tool,
            instance,
            tunes: tunes.clone(),
            parent_id: None,
            content_ids: Vec::new(),
            preserved: RefCell::new(Preserved { data, tunes }),
            selected: false,
            stretched: false,
            indent: 0,
            listeners: ListenerBinding::Bound,
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.id
    }

    /// Tool name.
    pub fn name(&self) -> &SmolStr {
        self.tool.name()
    }

    pub fn tool(&self) -> &Rc<ToolDefinition> {
        &self.tool
    }

    pub fn tunes(&self) -> &Tunes {
        &self.tunes
    }

    pub fn parent_id(&self) -> Option<&BlockId> {
        self.parent_id.as_ref()
    }

    pub fn content_ids(&self) -> &[BlockId] {
        &self.content_ids
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn is_stretched(&self) -> bool {
        self.stretched
    }

    pub fn set_stretched(&mut self, stretched: bool) {
        self.stretched = stretched;
    }

    /// Visual indentation level, derived from hierarchy depth.
    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn listeners(&self) -> ListenerBinding {
        self.listeners
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_empty()
    }

    /// Nesting depth marker rendered by hierarchical tools.
    pub fn list_depth(&self) -> Option<usize> {
        self.instance.list_depth()
    }

    /// Last data the tool produced or accepted.
    pub fn preserved_data(&self) -> BlockData {
        self.preserved.borrow().data.clone()
    }

    /// Tunes as of the last successful save.
    pub fn preserved_tunes(&self) -> Tunes {
        self.preserved.borrow().tunes.clone()
    }

    /// Extract the block's data through its tool.
    ///
    /// A failing tool is logged and yields `None`; the preserved data is left
    /// as it was so nothing the user wrote earlier is lost.
    pub async fn save(&self) -> Option<SavedBlock> {
        match self.instance.save().await {
            Ok(data) => {
                *self.preserved.borrow_mut() = Preserved {
                    data: data.clone(),
                    tunes: self.tunes.clone(),
                };
                Some(SavedBlock {
                    id: self.id.clone(),
                    tool: self.name().clone(),
                    data,
                    tunes: self.tunes.clone(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    target: "weaver::blocks",
                    block = %self.id,
                    tool = %self.name(),
                    error = %e,
                    "block save failed, keeping last saved data"
                );
                None
            }
        }
    }

    /// Push new data into the tool. Returns false (and logs) if the tool refused.
    pub fn set_data(&mut self, data: &BlockData) -> bool {
        match self.instance.set_data(data) {
            Ok(()) => {
                self.preserved.borrow_mut().data = data.clone();
                true
            }
            Err(e) => {
                tracing::warn!(
                    target: "weaver::blocks",
                    block = %self.id,
                    tool = %self.name(),
                    error = %e,
                    "set_data failed, keeping last saved data"
                );
                false
            }
        }
    }

    /// Split at a caret offset; the instance keeps the retained half.
    pub(crate) fn split_at(&mut self, caret: usize) -> Result<crate::tools::SplitContents, ToolError> {
        let split = self.instance.split_at(caret)?;
        self.preserved.borrow_mut().data = split.retained.clone();
        Ok(split)
    }

    /// Rebuild the tool instance. Tunes are bound at construction, so a tune
    /// change coming from the document layer needs a fresh instance.
    pub fn recompose(&mut self, data: BlockData, tunes: Tunes) {
        self.instance = self.tool.create(&data, &tunes);
        self.tunes = tunes.clone();
        *self.preserved.borrow_mut() = Preserved { data, tunes };
    }

    pub(crate) fn set_parent_id(&mut self, parent: Option<BlockId>) {
        self.parent_id = parent;
    }

    pub(crate) fn content_ids_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.content_ids
    }

    pub(crate) fn set_indent(&mut self, indent: usize) {
        self.indent = indent;
    }

    pub(crate) fn set_listeners(&mut self, binding: ListenerBinding) {
        self.listeners = binding;
    }

    /// Describe the block for the document layer, using preserved data.
    pub fn descriptor(&self) -> BlockDescriptor {
        let preserved = self.preserved.borrow();
        BlockDescriptor {
            id: self.id.clone(),
            tool: self.name().clone(),
            data: preserved.data.clone(),
            tunes: self.tunes.clone(),
            parent: self.parent_id.clone(),
        }
    }
}
