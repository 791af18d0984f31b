//! Camera control.
//!
//! [`CameraController`] is the only component allowed to move the camera.
//! Others read camera state through its accessors. It also owns the current
//! bearing so that per-frame rotation does not have to query the surface
//! before every write.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::poi::LngLat;
use crate::surface::{CameraPatch, CameraState, FlyRequest, MapSurface, SurfaceError};

/// Tuning for animated flights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightProfile {
    pub speed: f64,
    pub curve: f64,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            speed: 2.0,
            curve: 1.0,
        }
    }
}

/// Wraps the surface's camera primitives.
pub struct CameraController {
    surface: Arc<dyn MapSurface>,
    profile: FlightProfile,
    bearing: Mutex<f64>,
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("profile", &self.profile)
            .field("bearing", &*self.bearing.lock())
            .finish_non_exhaustive()
    }
}

impl CameraController {
    /// Create a controller, seeding the bearing from the surface when it is
    /// available.
    pub fn new(surface: Arc<dyn MapSurface>, profile: FlightProfile) -> Self {
        let bearing = surface.camera().map(|c| c.bearing).unwrap_or(0.0);
        Self {
            surface,
            profile,
            bearing: Mutex::new(bearing),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_attached()
    }

    /// Current camera state, with the controller's own bearing.
    pub fn state(&self) -> Result<CameraState, SurfaceError> {
        let mut state = self.surface.camera()?;
        state.bearing = *self.bearing.lock();
        Ok(state)
    }

    pub fn zoom(&self) -> Result<f64, SurfaceError> {
        Ok(self.surface.camera()?.zoom)
    }

    pub fn bearing(&self) -> f64 {
        *self.bearing.lock()
    }

    /// Apply the given fields immediately, without interpolation.
    pub fn set_instant(&self, patch: CameraPatch) -> Result<(), SurfaceError> {
        self.surface.jump_to(&patch)?;
        if let Some(bearing) = patch.bearing {
            *self.bearing.lock() = bearing;
        }
        Ok(())
    }

    /// Request a smooth flight to `center` at `zoom`.
    ///
    /// Returns as soon as the flight has been requested. Landing is not
    /// observed; callers pace themselves with their own timers.
    pub fn fly_to(&self, center: LngLat, zoom: f64) -> Result<(), SurfaceError> {
        let request = FlyRequest {
            center,
            zoom,
            speed: self.profile.speed,
            curve: self.profile.curve,
        };
        debug!(%center, zoom, speed = request.speed, "Camera flight requested");
        self.surface.fly_to(&request)
    }

    /// Cancel in-flight transitions so an instant update takes over cleanly.
    pub fn stop_animations(&self) -> Result<(), SurfaceError> {
        self.surface.stop_animations()
    }
}
