//! Scheduler errors.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::delay::DelayError;
use crate::surface::SurfaceError;

/// Errors surfaced by [`SlideshowScheduler`](super::SlideshowScheduler).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// `start` was given no POIs.
    #[error("Cannot start a slideshow with no points of interest")]
    EmptySequence,

    #[error("Slideshow is already running")]
    AlreadyRunning,

    /// The scheduler has been stopped and cannot be restarted.
    #[error("Slideshow has been stopped")]
    Stopped,

    #[error("Invalid slide delay {0:?}")]
    InvalidDelay(Duration),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Delay error: {0}")]
    Delay(#[from] DelayError),

    #[error("Map surface error: {0}")]
    Surface(#[from] SurfaceError),
}

impl SchedulerError {
    /// Whether this error means the map surface is gone.
    pub fn is_surface_lost(&self) -> bool {
        matches!(self, SchedulerError::Surface(e) if e.is_detached())
    }
}
