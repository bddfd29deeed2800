//! Reference tools and recording platform fakes for tests.
//!
//! Enabled for this crate's own tests and, through the `test-support`
//! feature, for dependents.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;

use crate::config::BlocksConfig;
use crate::error::ToolError;
use crate::manager::BlockManager;
use crate::platform::{
    Announcer, DropSurface, FrameHandle, FramePurpose, FrameScheduler, Politeness, ScrollHost,
};
use crate::sanitize::SanitizeRules;
use crate::tools::{BlockTool, ExportRule, ImportRule, SplitContents, ToolDefinition, ToolRegistry};
use crate::types::{BlockData, BlockDescriptor, BlockId, Rect};
use crate::undo::MemoryDocument;

/// `{"text": text}`
pub fn text_data(text: &str) -> BlockData {
    let mut data = BlockData::new();
    data.insert("text".into(), text.into());
    data
}

/// `{"text": text, "depth": depth}`
pub fn list_data(text: &str, depth: usize) -> BlockData {
    let mut data = text_data(text);
    data.insert("depth".into(), depth.into());
    data
}

/// Plain text tool. Carries a depth marker when its data has a `depth` field.
#[derive(Clone, Debug)]
pub struct TextTool {
    name: String,
    text: String,
    depth: Option<usize>,
}

impl TextTool {
    pub fn new(name: &str, data: &BlockData) -> Self {
        let mut tool = Self {
            name: name.to_string(),
            text: String::new(),
            depth: None,
        };
        tool.load(data);
        tool
    }

    fn load(&mut self, data: &BlockData) {
        self.text = data
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.depth = data
            .get("depth")
            .and_then(|v| v.as_u64())
            .map(|d| d as usize);
    }

    fn data_for(&self, text: &str) -> BlockData {
        match self.depth {
            Some(depth) => list_data(text, depth),
            None => text_data(text),
        }
    }
}

impl BlockTool for TextTool {
    fn save(&self) -> LocalBoxFuture<'_, Result<BlockData, ToolError>> {
        let data = self.data_for(&self.text);
        async move { Ok(data) }.boxed_local()
    }

    fn set_data(&mut self, data: &BlockData) -> Result<(), ToolError> {
        self.load(data);
        Ok(())
    }

    fn merge(&mut self, data: &BlockData) -> Result<(), ToolError> {
        if let Some(text) = data.get("text").and_then(|v| v.as_str()) {
            self.text.push_str(text);
        }
        Ok(())
    }

    fn split_at(&mut self, caret: usize) -> Result<SplitContents, ToolError> {
        let byte = self
            .text
            .char_indices()
            .nth(caret)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        let extracted = self.text.split_off(byte);
        Ok(SplitContents {
            retained: self.data_for(&self.text),
            extracted: self.data_for(&extracted),
        })
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn list_depth(&self) -> Option<usize> {
        self.depth
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A tool whose every operation fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingTool;

impl BlockTool for FailingTool {
    fn save(&self) -> LocalBoxFuture<'_, Result<BlockData, ToolError>> {
        async { Err(ToolError::new("broken", "render crashed")) }.boxed_local()
    }

    fn set_data(&mut self, _data: &BlockData) -> Result<(), ToolError> {
        Err(ToolError::new("broken", "render crashed"))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Mergeable, convertible paragraph keeping `b`, `i` and `a` markup.
pub fn paragraph_tool() -> ToolDefinition {
    ToolDefinition::new("paragraph", |data, _| Box::new(TextTool::new("paragraph", data)))
        .mergeable(true)
        .export(ExportRule::Field("text".into()))
        .import(ImportRule::Field("text".into()))
        .sanitize_field("text", SanitizeRules::allow(["b", "i", "a"]))
}

/// Convertible header that only takes plain text; not mergeable.
pub fn header_tool() -> ToolDefinition {
    ToolDefinition::new("header", |data, _| Box::new(TextTool::new("header", data)))
        .export(ExportRule::Field("text".into()))
        .import(ImportRule::Field("text".into()))
        .sanitize_field("text", SanitizeRules::plain_text())
}

/// Nestable list item.
pub fn list_tool() -> ToolDefinition {
    ToolDefinition::new("list", |data, _| Box::new(TextTool::new("list", data)))
        .mergeable(true)
        .export(ExportRule::Field("text".into()))
        .import(ImportRule::Field("text".into()))
}

pub fn broken_tool() -> ToolDefinition {
    ToolDefinition::new("broken", |_, _| Box::new(FailingTool))
}

/// Registry with paragraph, header, list and broken tools.
pub fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(paragraph_tool())
        .register(header_tool())
        .register(list_tool())
        .register(broken_tool());
    registry
}

/// Empty manager over a [`MemoryDocument`], default tool `paragraph`.
pub fn memory_manager() -> BlockManager<MemoryDocument> {
    BlockManager::new(
        BlocksConfig::default().with_default_tool("paragraph"),
        registry(),
        MemoryDocument::default(),
    )
}

/// Manager loaded with paragraphs `b0..bN` holding `texts`, listeners bound.
pub fn manager_with(texts: &[&str]) -> BlockManager<MemoryDocument> {
    let mut manager = memory_manager();
    let blocks: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| BlockDescriptor::new(format!("b{i}"), "paragraph", text_data(text)))
        .collect();
    manager
        .insert_many(blocks, 0)
        .expect("paragraph is registered");
    manager.flush_deferred_bindings(web_time::Instant::now(), true);
    manager
}

/// Text of every block, in order, from preserved data.
pub fn texts<D: crate::document::DocumentLayer>(manager: &BlockManager<D>) -> Vec<String> {
    manager
        .blocks()
        .map(|block| {
            block
                .preserved_data()
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Ids of every block, in order.
pub fn ids<D: crate::document::DocumentLayer>(manager: &BlockManager<D>) -> Vec<String> {
    manager.blocks().map(|block| block.id().to_string()).collect()
}

/// Announcer that records every message.
#[derive(Clone, Debug, Default)]
pub struct RecordingAnnouncer {
    pub messages: Rc<RefCell<Vec<(String, Politeness)>>>,
}

impl Announcer for RecordingAnnouncer {
    fn announce(&mut self, message: &str, politeness: Politeness) {
        self.messages
            .borrow_mut()
            .push((message.to_string(), politeness));
    }
}

/// Frame requests and cancellations seen by a [`RecordingScheduler`].
#[derive(Debug, Default)]
pub struct FrameLog {
    pub requested: Vec<(FrameHandle, FramePurpose)>,
    pub cancelled: Vec<FrameHandle>,
}

impl FrameLog {
    /// Requests not cancelled yet.
    pub fn live(&self) -> Vec<(FrameHandle, FramePurpose)> {
        self.requested
            .iter()
            .filter(|(h, _)| !self.cancelled.contains(h))
            .copied()
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingScheduler {
    pub log: Rc<RefCell<FrameLog>>,
    next: Rc<RefCell<u64>>,
}

impl FrameScheduler for RecordingScheduler {
    fn request_frame(&mut self, purpose: FramePurpose) -> FrameHandle {
        let mut next = self.next.borrow_mut();
        *next += 1;
        let handle = FrameHandle(*next);
        self.log.borrow_mut().requested.push((handle, purpose));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.log.borrow_mut().cancelled.push(handle);
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingScroller {
    pub scrolled: Vec<f64>,
}

impl ScrollHost for RecordingScroller {
    fn scroll_by(&mut self, dy: f64) {
        self.scrolled.push(dy);
    }
}

/// Geometry fake: blocks laid out as fixed rectangles.
///
/// Elements are block ids; an element that names a laid-out block resolves
/// to it, anything else resolves to nothing.
#[derive(Clone, Debug, Default)]
pub struct TestSurface {
    pub rects: HashMap<BlockId, Rect>,
    pub content: Option<Rect>,
    pub containers: HashMap<BlockId, BlockId>,
    pub viewport: Option<Rect>,
}

impl TestSurface {
    /// Stack blocks vertically: each `height` tall, content column at x = 100.
    pub fn stacked(ids: &[&str], height: f64) -> Self {
        let rects = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    BlockId::from(*id),
                    Rect::new(100.0, i as f64 * height, 600.0, height),
                )
            })
            .collect();
        Self {
            rects,
            content: Some(Rect::new(100.0, 0.0, 600.0, ids.len() as f64 * height)),
            containers: HashMap::new(),
            viewport: None,
        }
    }
}

impl DropSurface for TestSurface {
    type Element = BlockId;

    fn closest_block(&self, element: &BlockId) -> Option<BlockId> {
        self.rects.contains_key(element).then(|| element.clone())
    }

    fn block_rect(&self, id: &str) -> Option<Rect> {
        self.rects.get(id).copied()
    }

    fn content_rect(&self) -> Option<Rect> {
        self.content
    }

    fn container_of(&self, id: &str) -> Option<BlockId> {
        self.containers.get(id).cloned()
    }

    fn viewport(&self) -> Option<Rect> {
        self.viewport
    }
}
