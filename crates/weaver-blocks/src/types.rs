//! Core block types: ids, payloads, descriptors, and geometry.
//!
//! These types are framework-agnostic. The document layer, the manager and the
//! drag subsystem all speak in terms of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Block identifier. Unique within a collection.
pub type BlockId = SmolStr;

/// Tool data payload of a block.
pub type BlockData = serde_json::Map<String, serde_json::Value>;

/// Named per-block setting payloads, independent of the tool's primary data.
pub type Tunes = BTreeMap<SmolStr, serde_json::Value>;

/// Length of generated block ids.
pub const BLOCK_ID_LEN: usize = 10;

/// Generate a fresh random block id.
pub fn generate_block_id() -> BlockId {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(BLOCK_ID_LEN)
        .collect::<String>()
        .into()
}

/// Serializable description of a block, as stored in the document layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub id: BlockId,
    pub tool: SmolStr,
    #[serde(default)]
    pub data: BlockData,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tunes: Tunes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<BlockId>,
}

impl BlockDescriptor {
    /// Create a root-level descriptor with no tunes.
    pub fn new(id: impl Into<BlockId>, tool: impl Into<SmolStr>, data: BlockData) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            data,
            tunes: Tunes::new(),
            parent: None,
        }
    }

    /// Set the parent block id.
    pub fn with_parent(mut self, parent: impl Into<BlockId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the tunes.
    pub fn with_tunes(mut self, tunes: Tunes) -> Self {
        self.tunes = tunes;
        self
    }
}

/// Result of a successful block save.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedBlock {
    pub id: BlockId,
    pub tool: SmolStr,
    pub data: BlockData,
    pub tunes: Tunes,
}

/// Which half of a target block a drag is hovering over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
}

/// A point in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle in viewport coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Vertical midpoint, used to pick the drop edge.
    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Check whether a y coordinate lies within the vertical bounds (bottom exclusive).
    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.top() && y < self.bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_sized() {
        let a = generate_block_id();
        let b = generate_block_id();
        assert_eq!(a.len(), BLOCK_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_rect_bounds() {
        let rect = Rect::new(10.0, 100.0, 200.0, 40.0);
        assert_eq!(rect.right(), 210.0);
        assert_eq!(rect.bottom(), 140.0);
        assert_eq!(rect.mid_y(), 120.0);
        assert!(rect.contains_y(100.0));
        assert!(rect.contains_y(139.9));
        assert!(!rect.contains_y(140.0)); // bottom is exclusive
    }

    #[test]
    fn test_descriptor_serde_skips_empty_fields() {
        let desc = BlockDescriptor::new("a", "paragraph", BlockData::new());
        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(json, r#"{"id":"a","tool":"paragraph","data":{}}"#);

        let back: BlockDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
