//! weaver-blocks: block collection and drag-and-drop engine for the block editor.
//!
//! This crate provides:
//! - `BlockManager<D>` - ordered block collection with insert/remove/move/merge/split/convert
//! - `DocumentLayer` trait for the undo-authoritative document, `MemoryDocument` in-memory implementation
//! - Drag subsystem: state machine, drop target detection, move/duplicate, announcements
//! - Platform traits (`DropSurface`, `FrameScheduler`, `Announcer`, ...) implemented by the host

pub mod block;
pub mod config;
pub mod depth;
pub mod document;
pub mod drag;
pub mod error;
pub mod guard;
pub mod manager;
pub mod mutation;
pub mod platform;
pub mod sanitize;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod types;
pub mod undo;

pub use block::{Block, ListenerBinding};
pub use config::BlocksConfig;
pub use depth::{BlockSequence, collect_descendants, list_depth, with_descendants};
pub use document::{BlockChange, DocumentEvent, DocumentLayer, EventOrigin, diff_snapshots};
pub use drag::{
    DragAnnouncer, DragController, DragOrigin, DragState, DragStateMachine, DropOutcome,
    DropTarget, DropTargetDetector,
};
pub use error::{BlockError, ConfigError, DragError, Result, ToolError};
pub use manager::{BlockManager, InsertOptions};
pub use mutation::{BlockMutation, MutationObserver};
pub use platform::{
    Announcer, DropSurface, FallbackMessages, FrameHandle, FramePurpose, FrameScheduler,
    Localization, Politeness, ScrollHost,
};
pub use sanitize::{FieldRules, SanitizeRules};
pub use smol_str::SmolStr;
pub use tools::{BlockTool, ExportRule, ImportRule, SplitContents, ToolDefinition, ToolRegistry};
pub use types::{
    BlockData, BlockDescriptor, BlockId, Edge, Point, Rect, SavedBlock, Tunes, generate_block_id,
};
pub use undo::{DocumentOp, MemoryDocument};
