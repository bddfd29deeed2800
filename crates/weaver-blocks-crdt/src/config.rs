//! Undo configuration for the Loro document layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoroDocumentConfig {
    /// Local commits closer together than this merge into one undo step.
    /// 0 keeps every commit separate.
    pub undo_merge_interval_ms: i64,
    pub max_undo_steps: usize,
}

impl Default for LoroDocumentConfig {
    fn default() -> Self {
        Self {
            undo_merge_interval_ms: 0,
            max_undo_steps: 100,
        }
    }
}
