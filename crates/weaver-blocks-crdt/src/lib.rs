//! Loro-backed document layer for the block editor.
//!
//! This crate provides:
//! - `LoroBlockDocument`: block order and payloads in a Loro document,
//!   implementing `DocumentLayer` with Loro's undo manager
//! - `CrdtDocument`: snapshot/update exchange with collaborators
//! - `SyncState`: what has been sent since the last sync

mod block_doc;
mod config;
mod document;
mod error;

pub use block_doc::{LOAD_ORIGIN, LoroBlockDocument};
pub use config::LoroDocumentConfig;
pub use document::{CrdtDocument, SyncState};
pub use error::{CrdtError, Result};

// Re-export Loro types that consumers need
pub use loro::{ExportMode, LoroDoc, VersionVector};
