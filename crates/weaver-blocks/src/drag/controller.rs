//! Pointer-driven drag lifecycle.
//!
//! The host forwards pointer events and fires the animation frames the
//! controller asks for:
//!
//! * `pointer_down` on a block's drag handle starts tracking;
//! * `pointer_move` records the latest sample and keeps one move frame pending;
//! * `handle_move_frame` does the per-frame work: threshold check, target
//!   resolution, position announcements, auto-scroll start and stop;
//! * `handle_scroll_frame` performs one auto-scroll step;
//! * `pointer_up` commits, `cancel` abandons.

use web_time::Instant;

use crate::config::BlocksConfig;
use crate::depth::with_descendants;
use crate::document::DocumentLayer;
use crate::drag::announcer::DragAnnouncer;
use crate::drag::operations::{duplicate_blocks, insertion_index, landed_position, move_blocks};
use crate::drag::state::{DragState, DragStateMachine, DropTarget};
use crate::drag::target::{DropTargetDetector, predict_drop_depth};
use crate::error::DragError;
use crate::manager::BlockManager;
use crate::platform::{
    Announcer, DropSurface, FrameHandle, FramePurpose, FrameScheduler, Localization, ScrollHost,
};
use crate::types::{BlockId, Point, Rect};

/// Result of a committed drop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropOutcome {
    Moved {
        blocks: Vec<BlockId>,
        /// 1-based position of the first moved block.
        position: usize,
    },
    Duplicated {
        blocks: Vec<BlockId>,
        position: usize,
    },
}

struct PointerSample<E> {
    element: Option<E>,
    point: Point,
}

pub struct DragController<E> {
    machine: DragStateMachine,
    detector: DropTargetDetector,
    announcer: DragAnnouncer,
    scheduler: Box<dyn FrameScheduler>,
    threshold: f64,
    scroll_zone: f64,
    max_scroll_speed: f64,
    move_frame: Option<FrameHandle>,
    scroll_frame: Option<FrameHandle>,
    latest: Option<PointerSample<E>>,
    /// Pixels per frame; negative scrolls up.
    scroll_velocity: f64,
    predicted_depth: Option<usize>,
}

impl<E> std::fmt::Debug for DragController<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragController")
            .field("state", self.machine.state())
            .field("move_frame", &self.move_frame)
            .field("scroll_frame", &self.scroll_frame)
            .field("scroll_velocity", &self.scroll_velocity)
            .finish_non_exhaustive()
    }
}

impl<E> DragController<E> {
    pub fn new(
        config: &BlocksConfig,
        scheduler: Box<dyn FrameScheduler>,
        announcer: Box<dyn Announcer>,
        messages: Box<dyn Localization>,
    ) -> Self {
        Self {
            machine: DragStateMachine::new(),
            detector: DropTargetDetector::new(config),
            announcer: DragAnnouncer::new(announcer, messages, config),
            scheduler,
            threshold: config.drag_threshold_px,
            scroll_zone: config.auto_scroll_zone_px,
            max_scroll_speed: config.auto_scroll_max_speed_px,
            move_frame: None,
            scroll_frame: None,
            latest: None,
            scroll_velocity: 0.0,
            predicted_depth: None,
        }
    }

    pub fn state(&self) -> &DragState {
        self.machine.state()
    }

    pub fn is_dragging(&self) -> bool {
        self.machine.is_dragging()
    }

    /// Depth the dragged block would take at the current target, for the
    /// drop indicator.
    pub fn predicted_depth(&self) -> Option<usize> {
        self.predicted_depth
    }

    pub fn scroll_velocity(&self) -> f64 {
        self.scroll_velocity
    }

    /// When a throttled position announcement is due.
    pub fn next_announcement_deadline(&self) -> Option<Instant> {
        self.announcer.next_deadline()
    }

    /// Press on the drag handle of block `id`.
    ///
    /// A block that is part of a multi-block selection drags the whole
    /// selection; otherwise it drags itself and its nested list items.
    pub fn pointer_down<D: DocumentLayer>(
        &mut self,
        manager: &BlockManager<D>,
        id: &str,
        point: Point,
    ) -> Result<(), DragError> {
        manager.require_index(id)?;
        let selected = manager.selected_ids();
        let sources = if selected.len() > 1 && selected.iter().any(|s| s == id) {
            selected
        } else {
            with_descendants(manager, id)
        };
        self.machine.start_tracking(id.into(), sources, point)?;
        tracing::debug!(target: "weaver::drag", block = id, "tracking drag");
        Ok(())
    }

    /// Record a pointer sample. At most one move frame stays pending: a new
    /// sample replaces the scheduled one.
    pub fn pointer_move(&mut self, element: Option<E>, point: Point) {
        if self.machine.is_idle() {
            return;
        }
        self.latest = Some(PointerSample { element, point });
        if let Some(handle) = self.move_frame.take() {
            self.scheduler.cancel_frame(handle);
        }
        self.move_frame = Some(self.scheduler.request_frame(FramePurpose::PointerMove));
    }

    /// Per-frame drag work for the latest pointer sample. Returns the
    /// resolved drop target, if any.
    pub fn handle_move_frame<S, D>(
        &mut self,
        surface: &S,
        manager: &BlockManager<D>,
        now: Instant,
    ) -> Option<DropTarget>
    where
        S: DropSurface<Element = E>,
        D: DocumentLayer,
    {
        self.move_frame = None;
        let point = self.latest.as_ref()?.point;

        if let DragState::Tracking(origin) = self.machine.state() {
            if origin.start.distance_to(point) < self.threshold {
                return None;
            }
            self.machine.start_drag().ok()?;
            tracing::debug!(target: "weaver::drag", "drag threshold passed");
        }
        let origin = self.machine.origin().filter(|_| self.machine.is_dragging())?;
        let source = origin.source.clone();
        let sources = origin.sources.clone();

        let element = self.latest.as_ref().and_then(|s| s.element.as_ref());
        let target = self
            .detector
            .resolve(surface, manager, element, point, &sources);
        tracing::trace!(target: "weaver::drag", x = point.x, y = point.y, ?target, "drag frame");

        match &target {
            Some(target) => {
                if self.machine.update_target(target.clone()).is_ok() {
                    self.predicted_depth = Some(predict_drop_depth(manager, target, &source));
                    if let Ok(base) = insertion_index(manager, target) {
                        let above = sources
                            .iter()
                            .filter_map(|id| manager.index_of(id))
                            .filter(|index| *index < base)
                            .count();
                        self.announcer
                            .drop_position_changed(base - above + 1, manager.len(), now);
                    }
                }
            }
            None => {
                self.machine.clear_target().ok();
                self.predicted_depth = None;
            }
        }

        self.update_auto_scroll(surface.viewport(), point.y);
        self.announcer.poll(now);
        target
    }

    fn update_auto_scroll(&mut self, viewport: Option<Rect>, y: f64) {
        self.scroll_velocity = self.velocity_at(viewport, y);
        if self.scroll_velocity != 0.0 {
            if self.scroll_frame.is_none() {
                tracing::debug!(target: "weaver::drag", velocity = self.scroll_velocity, "auto-scroll started");
                self.scroll_frame = Some(self.scheduler.request_frame(FramePurpose::AutoScroll));
            }
        } else if let Some(handle) = self.scroll_frame.take() {
            tracing::debug!(target: "weaver::drag", "auto-scroll stopped");
            self.scheduler.cancel_frame(handle);
        }
    }

    /// Scroll speed for a pointer at `y`: zero outside the edge zones,
    /// growing linearly to the maximum at the viewport edge.
    fn velocity_at(&self, viewport: Option<Rect>, y: f64) -> f64 {
        let Some(view) = viewport else {
            return 0.0;
        };
        if self.scroll_zone <= 0.0 {
            return 0.0;
        }
        let intensity = if y < view.top() + self.scroll_zone {
            -(view.top() + self.scroll_zone - y) / self.scroll_zone
        } else if y > view.bottom() - self.scroll_zone {
            (y - (view.bottom() - self.scroll_zone)) / self.scroll_zone
        } else {
            0.0
        };
        intensity.clamp(-1.0, 1.0) * self.max_scroll_speed
    }

    /// One auto-scroll step. Re-arms itself while the pointer stays in a
    /// scroll zone.
    pub fn handle_scroll_frame(&mut self, scroller: &mut dyn ScrollHost) {
        self.scroll_frame = None;
        if !self.machine.is_dragging() || self.scroll_velocity == 0.0 {
            return;
        }
        scroller.scroll_by(self.scroll_velocity);
        self.scroll_frame = Some(self.scheduler.request_frame(FramePurpose::AutoScroll));
    }

    /// Flush a due position announcement between move frames.
    pub fn poll_announcements(&mut self, now: Instant) -> bool {
        self.announcer.poll(now)
    }

    /// Release. Commits a move, or a duplicate when `duplicate` is set, onto
    /// the recorded target. A press that never became a drag, or a drag
    /// without a target, ends with `Ok(None)`.
    pub async fn pointer_up<D: DocumentLayer>(
        &mut self,
        manager: &mut BlockManager<D>,
        duplicate: bool,
    ) -> Result<Option<DropOutcome>, DragError> {
        self.stop_frames();
        let outcome = match self.machine.state() {
            DragState::Tracking(_) => Ok(None),
            DragState::Dragging { target: None, .. } => {
                tracing::debug!(target: "weaver::drag", "released without a drop target");
                self.machine.cancel().map(|_| None)
            }
            _ => match self.machine.commit_drop() {
                Ok(target) => self.commit(manager, target, duplicate).await,
                Err(e) => Err(e),
            },
        };
        self.finish();
        outcome
    }

    async fn commit<D: DocumentLayer>(
        &mut self,
        manager: &mut BlockManager<D>,
        target: DropTarget,
        duplicate: bool,
    ) -> Result<Option<DropOutcome>, DragError> {
        let sources = self
            .machine
            .origin()
            .map(|origin| origin.sources.clone())
            .unwrap_or_default();

        if duplicate {
            let copies = duplicate_blocks(manager, &sources, &target).await?;
            let Some(position) = landed_position(manager, &copies) else {
                return Ok(None);
            };
            self.announcer
                .announce_duplicate_complete(position, copies.len());
            return Ok(Some(DropOutcome::Duplicated {
                blocks: copies,
                position,
            }));
        }

        move_blocks(manager, &sources, &target)?;
        let position = landed_position(manager, &sources).unwrap_or(1);
        self.announcer.announce_drop_complete(position, sources.len());
        Ok(Some(DropOutcome::Moved {
            blocks: sources,
            position,
        }))
    }

    /// Abandon the gesture. Returns whether one was in progress.
    pub fn cancel(&mut self) -> bool {
        self.stop_frames();
        let cancelled = self.machine.cancel().is_ok();
        if cancelled {
            tracing::debug!(target: "weaver::drag", "drag cancelled");
        }
        self.finish();
        cancelled
    }

    fn stop_frames(&mut self) {
        for handle in [self.move_frame.take(), self.scroll_frame.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.cancel_frame(handle);
        }
        self.scroll_velocity = 0.0;
    }

    fn finish(&mut self) {
        self.machine.reset();
        self.announcer.reset();
        self.latest = None;
        self.predicted_depth = None;
    }
}
