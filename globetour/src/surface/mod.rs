//! Host rendering surface abstraction.
//!
//! The scheduler never talks to a concrete map widget. Everything it needs
//! from the host (camera primitives, popup overlays, marker overlays) goes
//! through [`MapSurface`], so the same scheduling logic drives a browser map,
//! a native globe, or the in-memory [`MemorySurface`] used by the CLI and
//! tests.
//!
//! # Teardown
//!
//! A surface can be destroyed while a step is in flight. Every primitive
//! then returns [`SurfaceError::Detached`], which callers treat as a signal to
//! wind down quietly rather than as a failure.

mod memory;

pub use memory::MemorySurface;

use std::fmt;

use thiserror::Error;

use crate::poi::LngLat;

/// Errors returned by surface primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The render surface has been torn down.
    #[error("Render surface detached")]
    Detached,

    /// The surface refused the operation.
    #[error("Surface rejected operation: {0}")]
    Rejected(String),
}

impl SurfaceError {
    pub fn is_detached(&self) -> bool {
        matches!(self, SurfaceError::Detached)
    }
}

/// Opaque handle to an overlay (popup or marker) owned by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

/// Full camera state as reported by the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub center: LngLat,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            center: LngLat::new(0.0, 20.0),
            zoom: 1.5,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

/// Partial camera update applied without interpolation.
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPatch {
    pub center: Option<LngLat>,
    pub zoom: Option<f64>,
    pub bearing: Option<f64>,
    pub pitch: Option<f64>,
}

impl CameraPatch {
    pub fn bearing(bearing: f64) -> Self {
        Self {
            bearing: Some(bearing),
            ..Default::default()
        }
    }

    pub fn with_center(mut self, center: LngLat) -> Self {
        self.center = Some(center);
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    /// Apply this patch on top of `state`.
    pub fn apply_to(&self, state: &mut CameraState) {
        if let Some(center) = self.center {
            state.center = center;
        }
        if let Some(zoom) = self.zoom {
            state.zoom = zoom;
        }
        if let Some(bearing) = self.bearing {
            state.bearing = bearing;
        }
        if let Some(pitch) = self.pitch {
            state.pitch = pitch;
        }
    }
}

/// Eased, physically-modelled flight request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyRequest {
    pub center: LngLat,
    pub zoom: f64,
    pub speed: f64,
    pub curve: f64,
}

/// Role of a popup overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupKind {
    /// The POI currently under camera focus.
    Primary,
    /// A recently shown POI of the current region.
    Trailing,
    /// Shown while the pointer rests on a marker.
    Hover,
}

impl PopupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupKind::Primary => "primary",
            PopupKind::Trailing => "trailing",
            PopupKind::Hover => "hover",
        }
    }
}

impl fmt::Display for PopupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content rendered inside a popup card.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PopupContent {
    pub title: String,
    pub description: String,
    pub person_name: Option<String>,
    pub image_url: Option<String>,
}

/// Everything a surface needs to place a popup.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSpec {
    pub kind: PopupKind,
    pub poi_id: String,
    pub anchor: LngLat,
    /// Pixel offset from the anchor.
    pub offset: f64,
    pub content: PopupContent,
}

/// Everything a surface needs to place a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub poi_id: String,
    pub position: LngLat,
}

/// Primitives the host map widget must provide.
///
/// Implementations are called from the scheduler's task and from host
/// callbacks; they must not call back into the scheduler synchronously.
pub trait MapSurface: Send + Sync {
    /// Whether the surface is still alive.
    fn is_attached(&self) -> bool;

    /// Current camera state.
    fn camera(&self) -> Result<CameraState, SurfaceError>;

    /// Apply `patch` immediately, without interpolation.
    fn jump_to(&self, patch: &CameraPatch) -> Result<(), SurfaceError>;

    /// Start an animated flight. Returns without waiting for it to land.
    fn fly_to(&self, request: &FlyRequest) -> Result<(), SurfaceError>;

    /// Cancel any in-flight eased or fly transition.
    fn stop_animations(&self) -> Result<(), SurfaceError>;

    fn add_popup(&self, spec: PopupSpec) -> Result<OverlayId, SurfaceError>;

    fn remove_popup(&self, id: OverlayId) -> Result<(), SurfaceError>;

    fn add_marker(&self, spec: MarkerSpec) -> Result<OverlayId, SurfaceError>;

    fn remove_marker(&self, id: OverlayId) -> Result<(), SurfaceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut state = CameraState::default();
        CameraPatch::bearing(-42.0).apply_to(&mut state);
        assert_eq!(state.bearing, -42.0);
        assert_eq!(state.zoom, 1.5);
        assert_eq!(state.center, LngLat::new(0.0, 20.0));
    }
}
