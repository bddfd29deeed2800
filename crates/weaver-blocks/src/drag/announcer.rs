//! Screen-reader announcements for drag gestures.
//!
//! Position changes are coalesced: the first change opens a throttle window,
//! later changes only replace the pending position, and the latest one is
//! announced when the window elapses. Completion messages bypass the window.

use std::time::Duration;

use web_time::Instant;

use crate::config::BlocksConfig;
use crate::platform::{Announcer, Localization, Politeness};

pub struct DragAnnouncer {
    announcer: Box<dyn Announcer>,
    messages: Box<dyn Localization>,
    throttle: Duration,
    /// Latest (position, total) not announced yet.
    pending: Option<(usize, usize)>,
    window_end: Option<Instant>,
    last_announced: Option<usize>,
}

impl std::fmt::Debug for DragAnnouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragAnnouncer")
            .field("throttle", &self.throttle)
            .field("pending", &self.pending)
            .field("last_announced", &self.last_announced)
            .finish_non_exhaustive()
    }
}

impl DragAnnouncer {
    pub fn new(
        announcer: Box<dyn Announcer>,
        messages: Box<dyn Localization>,
        config: &BlocksConfig,
    ) -> Self {
        Self {
            announcer,
            messages,
            throttle: config.announce_throttle(),
            pending: None,
            window_end: None,
            last_announced: None,
        }
    }

    /// Record a new 1-based drop position out of `total` blocks.
    pub fn drop_position_changed(&mut self, position: usize, total: usize, now: Instant) {
        self.pending = Some((position, total));
        if self.window_end.is_none() {
            self.window_end = Some(now + self.throttle);
        }
    }

    /// When the next [`poll`](Self::poll) can announce something.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.window_end
    }

    /// Announce the pending position if its window has elapsed. Returns
    /// whether a message went out.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.window_end {
            Some(end) if now >= end => self.window_end = None,
            _ => return false,
        }
        let Some((position, total)) = self.pending.take() else {
            return false;
        };
        if self.last_announced == Some(position) {
            tracing::trace!(target: "weaver::drag", position, "drop position unchanged, not announcing");
            return false;
        }
        let message = self.messages.t(
            "drag.position",
            &[("position", position.to_string()), ("total", total.to_string())],
        );
        self.announcer.announce(&message, Politeness::Polite);
        self.last_announced = Some(position);
        true
    }

    /// Blocks were moved; `position` is 1-based.
    pub fn announce_drop_complete(&mut self, position: usize, count: usize) {
        let key = if count > 1 { "drag.moved_many" } else { "drag.moved" };
        self.announce_complete(key, position, count);
    }

    pub fn announce_duplicate_complete(&mut self, position: usize, count: usize) {
        let key = if count > 1 {
            "drag.duplicated_many"
        } else {
            "drag.duplicated"
        };
        self.announce_complete(key, position, count);
    }

    fn announce_complete(&mut self, key: &str, position: usize, count: usize) {
        self.cancel();
        let message = self.messages.t(
            key,
            &[("position", position.to_string()), ("count", count.to_string())],
        );
        self.announcer.announce(&message, Politeness::Assertive);
    }

    /// Drop any pending position announcement.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.window_end = None;
    }

    /// Forget everything about the previous gesture.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_announced = None;
    }
}
