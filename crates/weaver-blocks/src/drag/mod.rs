//! Drag-and-drop reordering.
//!
//! [`DragController`] drives a gesture from pointer events, using the
//! [`DragStateMachine`] for lifecycle, the [`DropTargetDetector`] for
//! geometry, the [`DragAnnouncer`] for screen readers and the free functions
//! in [`operations`] to commit the drop.

pub mod announcer;
pub mod controller;
pub mod operations;
pub mod state;
pub mod target;

pub use announcer::DragAnnouncer;
pub use controller::{DragController, DropOutcome};
pub use operations::{duplicate_blocks, insertion_index, move_blocks};
pub use state::{DragOrigin, DragState, DragStateMachine, DropTarget};
pub use target::{DropTargetDetector, predict_drop_depth};
