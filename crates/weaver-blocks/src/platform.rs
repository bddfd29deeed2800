//! Platform abstraction traits.
//!
//! These traits define the interface between the engine and the host UI
//! (browser DOM, native toolkit, test fakes). Geometry, frame scheduling,
//! scrolling and screen-reader output all live on the host side.

use crate::types::{BlockId, Rect};

/// Geometry queries used to resolve drop targets.
pub trait DropSurface {
    /// Host element handle (the node under the pointer).
    type Element;

    /// Walk up from `element` to the nearest enclosing block.
    fn closest_block(&self, element: &Self::Element) -> Option<BlockId>;

    /// Bounding rectangle of a block's rendered holder.
    fn block_rect(&self, id: &str) -> Option<Rect>;

    /// Rectangle of the content column.
    fn content_rect(&self) -> Option<Rect>;

    /// Nested container block (e.g. a table) holding `id`, if any.
    fn container_of(&self, id: &str) -> Option<BlockId>;

    /// Visible scroll area. `None` disables auto-scroll.
    fn viewport(&self) -> Option<Rect> {
        None
    }
}

/// Why a frame was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePurpose {
    PointerMove,
    AutoScroll,
}

/// Handle to a requested animation frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Animation-frame scheduling.
///
/// The host calls back into the drag controller when a requested frame fires
/// (`handle_move_frame` / `handle_scroll_frame`, by purpose).
pub trait FrameScheduler {
    fn request_frame(&mut self, purpose: FramePurpose) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Scrollable container the drag auto-scrolls.
pub trait ScrollHost {
    fn scroll_by(&mut self, dy: f64);
}

/// Screen-reader urgency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Politeness {
    Polite,
    Assertive,
}

/// Live-region output.
pub trait Announcer {
    fn announce(&mut self, message: &str, politeness: Politeness);
}

/// User-facing message lookup.
pub trait Localization {
    /// Translate `key`, substituting `{name}` placeholders from `params`.
    fn t(&self, key: &str, params: &[(&str, String)]) -> String;
}

/// English messages for the drag announcements.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackMessages;

impl FallbackMessages {
    fn template(key: &str) -> Option<&'static str> {
        Some(match key {
            "drag.position" => "Drop position {position} of {total}",
            "drag.moved" => "Block moved to position {position}",
            "drag.moved_many" => "{count} blocks moved to position {position}",
            "drag.duplicated" => "Block duplicated to position {position}",
            "drag.duplicated_many" => "{count} blocks duplicated to position {position}",
            _ => return None,
        })
    }
}

impl Localization for FallbackMessages {
    fn t(&self, key: &str, params: &[(&str, String)]) -> String {
        let Some(template) = Self::template(key) else {
            return key.to_string();
        };
        params
            .iter()
            .fold(template.to_string(), |message, (name, value)| {
                message.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_substitutes_params() {
        let message = FallbackMessages.t(
            "drag.moved_many",
            &[("count", "3".into()), ("position", "2".into())],
        );
        assert_eq!(message, "3 blocks moved to position 2");
    }

    #[test]
    fn test_unknown_key_echoes_key() {
        assert_eq!(FallbackMessages.t("drag.nope", &[]), "drag.nope");
    }
}
