//! Scheduler phases and the events it publishes.

use std::fmt;

/// Where the scheduler is in its step protocol.
///
/// ```text
/// Idle ──start──► Flying ──► Waiting ──► Rotating ──┐
///                   ▲                               │
///                   └────────── next POI ───────────┘
///
/// any ──stop / surface lost──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    /// Camera is heading to the POI and its popups are going up.
    Flying,
    /// Primary popup is showing; the slide delay is running.
    Waiting,
    /// Recentered rotation between POIs (also the opening rotation).
    Rotating,
    /// Torn down. No step will run again.
    Stopped,
}

impl SchedulerState {
    /// Whether a step occupies the scheduler in this state.
    pub fn is_step_phase(&self) -> bool {
        matches!(
            self,
            SchedulerState::Flying | SchedulerState::Waiting | SchedulerState::Rotating
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Flying => "flying",
            SchedulerState::Waiting => "waiting",
            SchedulerState::Rotating => "rotating",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications delivered through [`SlideshowScheduler::subscribe`].
///
/// [`SlideshowScheduler::subscribe`]: super::SlideshowScheduler::subscribe
#[derive(Debug, Clone, PartialEq)]
pub enum SlideshowEvent {
    /// A step began for the POI at `cursor`.
    StepStarted { cursor: usize, poi_id: String },
    /// The scheduler entered `phase` while working on `cursor`.
    PhaseChanged {
        cursor: usize,
        phase: SchedulerState,
    },
    /// The step for `cursor` finished and the cursor advanced to `next`.
    StepCompleted {
        cursor: usize,
        poi_id: String,
        next: usize,
    },
    /// The scheduler reached [`SchedulerState::Stopped`].
    Stopped,
}

/// Result of asking for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran to the end and the cursor advanced.
    Completed,
    /// Another step was already in flight; this trigger was dropped.
    Busy,
    /// The scheduler is stopping; the step gave up early.
    Cancelled,
    /// The map surface went away during the step.
    SurfaceLost,
}
