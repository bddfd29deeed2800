//! Drag gesture state machine.
//!
//! ```text
//! Idle --start_tracking--> Tracking --start_drag--> Dragging --commit_drop--> Dropped
//!                             |                        |  ^
//!                             +--cancel--> Cancelled <-+  +-- update_target
//! any --reset--> Idle
//! ```

use crate::error::DragError;
use crate::types::{BlockId, Edge, Point};

/// What is being dragged. Fixed when tracking starts.
#[derive(Clone, Debug, PartialEq)]
pub struct DragOrigin {
    /// Block whose handle was grabbed.
    pub source: BlockId,
    /// Every block moving with the gesture, in document order.
    pub sources: Vec<BlockId>,
    pub multi: bool,
    pub start: Point,
}

/// Target block and edge a drop would land on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DropTarget {
    pub block: BlockId,
    pub edge: Edge,
}

impl DropTarget {
    pub fn new(block: impl Into<BlockId>, edge: Edge) -> Self {
        Self {
            block: block.into(),
            edge,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    /// Pointer is down on a handle, threshold not passed yet.
    Tracking(DragOrigin),
    Dragging {
        origin: DragOrigin,
        target: Option<DropTarget>,
    },
    Dropped {
        origin: DragOrigin,
        target: DropTarget,
    },
    Cancelled(DragOrigin),
}

impl DragState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Tracking(_) => "tracking",
            Self::Dragging { .. } => "dragging",
            Self::Dropped { .. } => "dropped",
            Self::Cancelled(_) => "cancelled",
        }
    }

    pub fn origin(&self) -> Option<&DragOrigin> {
        match self {
            Self::Idle => None,
            Self::Tracking(origin) | Self::Cancelled(origin) => Some(origin),
            Self::Dragging { origin, .. } | Self::Dropped { origin, .. } => Some(origin),
        }
    }

    pub fn target(&self) -> Option<&DropTarget> {
        match self {
            Self::Dragging { target, .. } => target.as_ref(),
            Self::Dropped { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// One drag gesture at a time.
#[derive(Clone, Debug, Default)]
pub struct DragStateMachine {
    state: DragState,
}

impl DragStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, DragState::Idle)
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn origin(&self) -> Option<&DragOrigin> {
        self.state.origin()
    }

    pub fn target(&self) -> Option<&DropTarget> {
        self.state.target()
    }

    fn invalid(&self, operation: &'static str) -> DragError {
        tracing::warn!(target: "weaver::drag", operation, state = self.state.name(), "invalid drag transition");
        DragError::InvalidTransition {
            operation,
            state: self.state.name(),
        }
    }

    /// Begin tracking a press on `source`. `sources` is every block that
    /// moves with it; more than one makes the gesture multi-block.
    pub fn start_tracking(
        &mut self,
        source: BlockId,
        sources: Vec<BlockId>,
        start: Point,
    ) -> Result<(), DragError> {
        if !self.is_idle() {
            return Err(self.invalid("start tracking"));
        }
        let multi = sources.len() > 1;
        self.state = DragState::Tracking(DragOrigin {
            source,
            sources,
            multi,
            start,
        });
        Ok(())
    }

    /// The pointer passed the drag threshold.
    pub fn start_drag(&mut self) -> Result<(), DragError> {
        match std::mem::take(&mut self.state) {
            DragState::Tracking(origin) => {
                self.state = DragState::Dragging {
                    origin,
                    target: None,
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("start drag"))
            }
        }
    }

    pub fn update_target(&mut self, target: DropTarget) -> Result<(), DragError> {
        match &mut self.state {
            DragState::Dragging { target: slot, .. } => {
                *slot = Some(target);
                Ok(())
            }
            _ => Err(self.invalid("update target")),
        }
    }

    /// Forget the recorded target (pointer left every valid drop position).
    pub fn clear_target(&mut self) -> Result<(), DragError> {
        match &mut self.state {
            DragState::Dragging { target, .. } => {
                *target = None;
                Ok(())
            }
            _ => Err(self.invalid("clear target")),
        }
    }

    /// Commit the drop, returning the recorded target.
    pub fn commit_drop(&mut self) -> Result<DropTarget, DragError> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging {
                origin,
                target: Some(target),
            } => {
                self.state = DragState::Dropped {
                    origin,
                    target: target.clone(),
                };
                Ok(target)
            }
            DragState::Dragging {
                origin,
                target: None,
            } => {
                self.state = DragState::Dragging {
                    origin,
                    target: None,
                };
                Err(DragError::MissingTarget)
            }
            other => {
                self.state = other;
                Err(self.invalid("commit drop"))
            }
        }
    }

    pub fn cancel(&mut self) -> Result<(), DragError> {
        match std::mem::take(&mut self.state) {
            DragState::Tracking(origin) | DragState::Dragging { origin, .. } => {
                self.state = DragState::Cancelled(origin);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("cancel"))
            }
        }
    }

    /// Back to idle from any state.
    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking(sources: &[&str]) -> DragStateMachine {
        let mut machine = DragStateMachine::new();
        machine
            .start_tracking(
                sources[0].into(),
                sources.iter().map(|s| BlockId::from(*s)).collect(),
                Point::new(0.0, 0.0),
            )
            .unwrap();
        machine
    }

    #[test]
    fn test_full_gesture() {
        let mut machine = tracking(&["a"]);
        machine.start_drag().unwrap();
        machine.update_target(DropTarget::new("b", Edge::Bottom)).unwrap();
        assert_eq!(machine.commit_drop().unwrap(), DropTarget::new("b", Edge::Bottom));
        assert_eq!(machine.state().name(), "dropped");
        assert!(!machine.origin().unwrap().multi);

        machine.reset();
        assert!(machine.is_idle());
    }

    #[test]
    fn test_commit_drop_from_idle_fails() {
        let mut machine = DragStateMachine::new();
        assert!(matches!(
            machine.commit_drop(),
            Err(DragError::InvalidTransition {
                operation: "commit drop",
                state: "idle"
            })
        ));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_start_drag_twice_fails() {
        let mut machine = tracking(&["a"]);
        machine.start_drag().unwrap();
        assert!(matches!(
            machine.start_drag(),
            Err(DragError::InvalidTransition { .. })
        ));
        assert!(machine.is_dragging());
    }

    #[test]
    fn test_cancel_from_dropped_fails() {
        let mut machine = tracking(&["a"]);
        machine.start_drag().unwrap();
        machine.update_target(DropTarget::new("b", Edge::Top)).unwrap();
        machine.commit_drop().unwrap();
        assert!(matches!(
            machine.cancel(),
            Err(DragError::InvalidTransition { .. })
        ));
        assert_eq!(machine.state().name(), "dropped");
    }

    #[test]
    fn test_commit_drop_without_target() {
        let mut machine = tracking(&["a"]);
        machine.start_drag().unwrap();
        assert!(matches!(machine.commit_drop(), Err(DragError::MissingTarget)));
        assert!(machine.is_dragging());
    }

    #[test]
    fn test_multi_flag_fixed_at_tracking() {
        let mut machine = tracking(&["a", "b"]);
        machine.start_drag().unwrap();
        assert!(machine.origin().unwrap().multi);

        machine.cancel().unwrap();
        assert_eq!(machine.state().name(), "cancelled");
        assert!(machine.origin().unwrap().multi);
        assert!(machine.cancel().is_err());
    }

    #[test]
    fn test_update_target_requires_dragging() {
        let mut machine = tracking(&["a"]);
        assert!(machine.update_target(DropTarget::new("b", Edge::Top)).is_err());
        assert!(machine.target().is_none());
    }
}
