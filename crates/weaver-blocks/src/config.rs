//! Engine configuration.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for the block manager and the drag subsystem.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocksConfig {
    /// Tool used when an insert does not name one.
    pub default_tool: Option<SmolStr>,
    /// Pointer travel (px) before a tracked press becomes a drag.
    pub drag_threshold_px: f64,
    /// Width of the strip left of the content column that still counts as a drop zone.
    pub drop_zone_width_px: f64,
    /// Minimum interval between drop-position announcements.
    pub announce_throttle_ms: u64,
    /// Distance from the viewport edge where auto-scroll kicks in.
    pub auto_scroll_zone_px: f64,
    /// Auto-scroll speed at the very edge, per frame.
    pub auto_scroll_max_speed_px: f64,
    /// Upper bound on how long deferred listener binding may wait for an idle window.
    pub idle_bind_timeout_ms: u64,
}

impl Default for BlocksConfig {
    fn default() -> Self {
        Self {
            default_tool: None,
            drag_threshold_px: 5.0,
            drop_zone_width_px: 100.0,
            announce_throttle_ms: 300,
            auto_scroll_zone_px: 50.0,
            auto_scroll_max_speed_px: 12.0,
            idle_bind_timeout_ms: 2000,
        }
    }
}

impl BlocksConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the default tool.
    pub fn with_default_tool(mut self, tool: impl Into<SmolStr>) -> Self {
        self.default_tool = Some(tool.into());
        self
    }

    pub fn announce_throttle(&self) -> Duration {
        Duration::from_millis(self.announce_throttle_ms)
    }

    pub fn idle_bind_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_bind_timeout_ms)
    }
}
