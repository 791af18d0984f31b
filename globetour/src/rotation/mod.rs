//! Frame-driven bearing rotation.
//!
//! [`RotationAnimator`] sweeps the camera bearing linearly over a fixed
//! wall-clock duration:
//!
//! ```text
//! t       = clamp(elapsed / duration, 0, 1)
//! bearing = start - total_degrees * t
//! ```
//!
//! Each frame tick writes the bearing through [`CameraController::set_instant`].
//! Ticks come from a dedicated `tokio::time::Interval`; missed ticks are
//! skipped rather than replayed, so a stalled runtime never produces a burst
//! of catch-up writes.
//!
//! A rotation ends when `t` reaches 1, when its cancellation token fires, or
//! when the surface goes away. It never keeps ticking against a dead surface.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::camera::CameraController;
use crate::marker::MarkerLayer;
use crate::poi::LngLat;
use crate::popup::PopupLayer;
use crate::surface::{CameraPatch, CameraState, SurfaceError};

/// Default interval between animation frames (~60 fps).
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Zoom of the neutral wide view used by recentered rotations.
pub const NEUTRAL_ZOOM: f64 = 1.5;

/// Where a recentered rotation parks the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecenterTarget {
    /// Wide view over the equator band.
    Equatorial,
    /// Tilted toward the north pole.
    North,
    /// Tilted toward the south pole.
    #[default]
    South,
}

impl RecenterTarget {
    /// Center of the neutral view.
    pub fn center(&self) -> LngLat {
        match self {
            RecenterTarget::Equatorial => LngLat::new(0.0, 20.0),
            RecenterTarget::North => LngLat::new(0.0, 60.0),
            RecenterTarget::South => LngLat::new(0.0, -60.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecenterTarget::Equatorial => "equatorial",
            RecenterTarget::North => "north",
            RecenterTarget::South => "south",
        }
    }
}

impl fmt::Display for RecenterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecenterTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equatorial" | "equator" => Ok(RecenterTarget::Equatorial),
            "north" => Ok(RecenterTarget::North),
            "south" => Ok(RecenterTarget::South),
            other => Err(format!(
                "unknown recenter target '{}' (expected equatorial, north or south)",
                other
            )),
        }
    }
}

/// How the camera is positioned for a rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationMode {
    /// Rotate around the current center and zoom.
    InPlace,
    /// Hide markers and trailing popups, snap to a neutral view, rotate,
    /// then optionally put center/zoom/pitch back.
    Recentered {
        target: RecenterTarget,
        restore_camera: bool,
    },
}

/// How a rotation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    Completed,
    Cancelled,
    /// The surface was torn down mid-rotation.
    SurfaceLost,
}

/// Drives bearing sweeps.
#[derive(Debug)]
pub struct RotationAnimator {
    camera: Arc<CameraController>,
    popups: Arc<PopupLayer>,
    markers: Arc<MarkerLayer>,
    frame_interval: Duration,
}

impl RotationAnimator {
    pub fn new(
        camera: Arc<CameraController>,
        popups: Arc<PopupLayer>,
        markers: Arc<MarkerLayer>,
        frame_interval: Duration,
    ) -> Self {
        Self {
            camera,
            popups,
            markers,
            frame_interval,
        }
    }

    /// Rotate by `total_degrees` (bearing decreasing) over `duration`.
    pub async fn rotate(
        &self,
        duration: Duration,
        total_degrees: f64,
        mode: RotationMode,
        cancel: &CancellationToken,
    ) -> RotationOutcome {
        match mode {
            RotationMode::InPlace => self.sweep(duration, total_degrees, cancel).await,
            RotationMode::Recentered {
                target,
                restore_camera,
            } => {
                self.recentered(duration, total_degrees, target, restore_camera, cancel)
                    .await
            }
        }
    }

    async fn recentered(
        &self,
        duration: Duration,
        total_degrees: f64,
        target: RecenterTarget,
        restore_camera: bool,
        cancel: &CancellationToken,
    ) -> RotationOutcome {
        self.markers.clear_all();
        self.popups.clear_trailing_popups();

        let saved = match self.snap_to_neutral(target) {
            Ok(saved) => saved,
            Err(e) => return Self::surface_outcome(&e),
        };

        let outcome = self.sweep(duration, total_degrees, cancel).await;
        if outcome != RotationOutcome::Completed {
            return outcome;
        }

        if restore_camera {
            let patch = CameraPatch::default()
                .with_center(saved.center)
                .with_zoom(saved.zoom)
                .with_pitch(saved.pitch);
            if let Err(e) = self.camera.set_instant(patch) {
                return Self::surface_outcome(&e);
            }
        }

        // Markers come back only if the zoom we ended at allows them
        let restored = self
            .camera
            .zoom()
            .and_then(|zoom| self.markers.on_zoom_changed(zoom));
        match restored {
            Ok(()) => RotationOutcome::Completed,
            Err(e) => Self::surface_outcome(&e),
        }
    }

    /// Park the camera on the neutral view, returning the state it left.
    fn snap_to_neutral(&self, target: RecenterTarget) -> Result<CameraState, SurfaceError> {
        let saved = self.camera.state()?;
        self.camera.stop_animations()?;
        self.camera.set_instant(
            CameraPatch::default()
                .with_center(target.center())
                .with_zoom(NEUTRAL_ZOOM)
                .with_pitch(0.0),
        )?;
        debug!(%target, "Camera recentered for rotation");
        Ok(saved)
    }

    async fn sweep(
        &self,
        duration: Duration,
        total_degrees: f64,
        cancel: &CancellationToken,
    ) -> RotationOutcome {
        let start_bearing = self.camera.bearing();
        let start = Instant::now();
        let mut frames = tokio::time::interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame_count = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(frames = frame_count, "Rotation cancelled");
                    return RotationOutcome::Cancelled;
                }

                _ = frames.tick() => {}
            }

            if !self.camera.is_attached() {
                debug!(frames = frame_count, "Surface gone, rotation abandoned");
                return RotationOutcome::SurfaceLost;
            }

            let t = progress(start.elapsed(), duration);
            let bearing = start_bearing - total_degrees * t;
            if let Err(e) = self.camera.set_instant(CameraPatch::bearing(bearing)) {
                return Self::surface_outcome(&e);
            }
            frame_count += 1;
            trace!(t, bearing, "Rotation frame");

            if t >= 1.0 {
                debug!(frames = frame_count, bearing, "Rotation complete");
                return RotationOutcome::Completed;
            }
        }
    }

    fn surface_outcome(error: &SurfaceError) -> RotationOutcome {
        debug!(%error, "Rotation stopped by surface error");
        RotationOutcome::SurfaceLost
    }
}

/// Fraction of `duration` covered by `elapsed`, clamped to `[0, 1]`.
fn progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FlightProfile;
    use crate::marker::DEFAULT_MARKER_ZOOM_THRESHOLD;
    use crate::poi::{PlaceholderImages, Poi, RegionKey};
    use crate::popup::{PopupStyle, DEFAULT_TRAILING_CAPACITY};
    use crate::surface::{MapSurface, MemorySurface, PopupKind};

    struct Fixture {
        surface: Arc<MemorySurface>,
        camera: Arc<CameraController>,
        popups: Arc<PopupLayer>,
        markers: Arc<MarkerLayer>,
        animator: RotationAnimator,
    }

    fn fixture(initial: CameraState) -> Fixture {
        let surface = Arc::new(MemorySurface::new(initial));
        let camera = Arc::new(CameraController::new(
            surface.clone(),
            FlightProfile::default(),
        ));
        let popups = Arc::new(PopupLayer::new(
            surface.clone(),
            Arc::new(PlaceholderImages::default()),
            PopupStyle::default(),
            DEFAULT_TRAILING_CAPACITY,
        ));
        let markers = Arc::new(MarkerLayer::new(
            surface.clone(),
            popups.clone(),
            DEFAULT_MARKER_ZOOM_THRESHOLD,
        ));
        let animator = RotationAnimator::new(
            camera.clone(),
            popups.clone(),
            markers.clone(),
            DEFAULT_FRAME_INTERVAL,
        );
        Fixture {
            surface,
            camera,
            popups,
            markers,
            animator,
        }
    }

    fn zoomed_in() -> CameraState {
        CameraState {
            center: LngLat::new(2.35, 48.85),
            zoom: 6.0,
            bearing: 0.0,
            pitch: 20.0,
        }
    }

    fn sample_pois() -> Arc<[Poi]> {
        vec![
            Poi::new("a", "France", 48.85, 2.35),
            Poi::new("b", "France", 43.3, 5.37),
        ]
        .into()
    }

    #[test]
    fn test_progress_clamps() {
        assert_eq!(progress(Duration::ZERO, Duration::from_millis(100)), 0.0);
        assert_eq!(
            progress(Duration::from_millis(50), Duration::from_millis(100)),
            0.5
        );
        assert_eq!(
            progress(Duration::from_millis(150), Duration::from_millis(100)),
            1.0
        );
        assert_eq!(progress(Duration::from_millis(5), Duration::ZERO), 1.0);
    }

    #[test]
    fn test_recenter_target_parses() {
        assert_eq!("South".parse(), Ok(RecenterTarget::South));
        assert_eq!(" equator ".parse(), Ok(RecenterTarget::Equatorial));
        assert!("west".parse::<RecenterTarget>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_place_rotation_reaches_final_bearing() {
        let f = fixture(zoomed_in());
        let cancel = CancellationToken::new();
        let outcome = f
            .animator
            .rotate(
                Duration::from_millis(500),
                180.0,
                RotationMode::InPlace,
                &cancel,
            )
            .await;

        assert_eq!(outcome, RotationOutcome::Completed);
        assert_eq!(f.camera.bearing(), -180.0);
        // Center untouched in place
        assert_eq!(f.surface.camera_snapshot().center, zoomed_in().center);
        // Many intermediate frames, not a single jump
        assert!(f.surface.jump_count() > 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bearing_decreases_monotonically() {
        let f = fixture(zoomed_in());
        let camera = f.camera.clone();
        let cancel = CancellationToken::new();

        let sampler = tokio::spawn(async move {
            let mut samples = Vec::new();
            for _ in 0..20 {
                samples.push(camera.bearing());
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            samples
        });

        f.animator
            .rotate(
                Duration::from_millis(400),
                90.0,
                RotationMode::InPlace,
                &cancel,
            )
            .await;
        let samples = sampler.await.unwrap();
        assert!(samples.windows(2).all(|w| w[1] <= w[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_rotation() {
        let f = fixture(zoomed_in());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = f
            .animator
            .rotate(
                Duration::from_secs(2),
                60.0,
                RotationMode::InPlace,
                &cancel,
            )
            .await;
        assert_eq!(outcome, RotationOutcome::Cancelled);
        assert!(f.camera.bearing() > -60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_surface_ends_rotation() {
        let f = fixture(zoomed_in());
        let surface = f.surface.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            surface.detach();
        });

        let outcome = f
            .animator
            .rotate(
                Duration::from_secs(10),
                360.0,
                RotationMode::InPlace,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(outcome, RotationOutcome::SurfaceLost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recentered_hides_markers_and_trailing_popups() {
        let f = fixture(zoomed_in());
        f.markers.materialize_all(sample_pois()).unwrap();
        f.popups
            .push_trailing(&sample_pois()[0], &RegionKey::new("France"))
            .unwrap();

        let outcome = f
            .animator
            .rotate(
                Duration::from_millis(500),
                180.0,
                RotationMode::Recentered {
                    target: RecenterTarget::South,
                    restore_camera: false,
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, RotationOutcome::Completed);
        let camera = f.surface.camera_snapshot();
        assert_eq!(camera.center, RecenterTarget::South.center());
        assert_eq!(camera.zoom, NEUTRAL_ZOOM);
        // Neutral zoom is below the threshold, so markers stay hidden
        assert_eq!(f.surface.marker_count(), 0);
        assert_eq!(f.surface.popup_count_of(PopupKind::Trailing), 0);
        // History survives for the next step
        assert_eq!(f.popups.trailing_ids(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recentered_with_restore_brings_markers_back() {
        let f = fixture(zoomed_in());
        f.markers.materialize_all(sample_pois()).unwrap();

        let outcome = f
            .animator
            .rotate(
                Duration::from_millis(500),
                180.0,
                RotationMode::Recentered {
                    target: RecenterTarget::North,
                    restore_camera: true,
                },
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome, RotationOutcome::Completed);
        let camera = f.surface.camera().unwrap();
        assert_eq!(camera.center, zoomed_in().center);
        assert_eq!(camera.zoom, 6.0);
        assert_eq!(camera.pitch, 20.0);
        assert_eq!(camera.bearing, -180.0);
        assert_eq!(f.surface.marker_count(), 2);
    }
}
