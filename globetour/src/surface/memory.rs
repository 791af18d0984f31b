//! In-memory map surface.
//!
//! [`MemorySurface`] keeps camera state and overlays in plain collections and
//! logs every primitive at trace level. Flights land instantly: the camera
//! jumps to the target when `fly_to` is called, and the surface stays in an
//! "animating" state until the next instant update or `stop_animations`.
//!
//! Zoom changes are published on a `watch` channel so a host loop can forward
//! them to `SlideshowScheduler::on_zoom_changed`, the same way a real map
//! widget would fire its zoom event.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use super::{
    CameraPatch, CameraState, FlyRequest, MapSurface, MarkerSpec, OverlayId, PopupKind,
    PopupSpec, SurfaceError,
};

#[derive(Debug)]
struct MemoryState {
    attached: bool,
    camera: CameraState,
    animating: bool,
    next_id: u64,
    popups: HashMap<OverlayId, PopupSpec>,
    markers: HashMap<OverlayId, MarkerSpec>,
    flights: Vec<FlyRequest>,
    jumps: u64,
    peak_primary: usize,
    peak_trailing: usize,
}

impl MemoryState {
    fn allocate_id(&mut self) -> OverlayId {
        let id = OverlayId(self.next_id);
        self.next_id += 1;
        id
    }

    fn count_popups(&self, kind: PopupKind) -> usize {
        self.popups.values().filter(|p| p.kind == kind).count()
    }

    fn ensure_attached(&self) -> Result<(), SurfaceError> {
        if self.attached {
            Ok(())
        } else {
            Err(SurfaceError::Detached)
        }
    }
}

/// Headless [`MapSurface`] implementation.
#[derive(Debug)]
pub struct MemorySurface {
    inner: Mutex<MemoryState>,
    zoom_tx: watch::Sender<f64>,
}

impl MemorySurface {
    pub fn new(camera: CameraState) -> Self {
        let (zoom_tx, _) = watch::channel(camera.zoom);
        Self {
            inner: Mutex::new(MemoryState {
                attached: true,
                camera,
                animating: false,
                next_id: 1,
                popups: HashMap::new(),
                markers: HashMap::new(),
                flights: Vec::new(),
                jumps: 0,
                peak_primary: 0,
                peak_trailing: 0,
            }),
            zoom_tx,
        }
    }

    /// Subscribe to zoom changes.
    pub fn zoom_changes(&self) -> watch::Receiver<f64> {
        self.zoom_tx.subscribe()
    }

    /// Tear the surface down. Overlays vanish and every later call fails.
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.attached = false;
        inner.popups.clear();
        inner.markers.clear();
        trace!("Memory surface detached");
    }

    pub fn camera_snapshot(&self) -> CameraState {
        self.inner.lock().camera
    }

    pub fn is_animating(&self) -> bool {
        self.inner.lock().animating
    }

    pub fn popup_count(&self) -> usize {
        self.inner.lock().popups.len()
    }

    pub fn popup_count_of(&self, kind: PopupKind) -> usize {
        self.inner.lock().count_popups(kind)
    }

    /// Popups of `kind`, ordered by creation.
    pub fn popups_of(&self, kind: PopupKind) -> Vec<PopupSpec> {
        let inner = self.inner.lock();
        let mut popups: Vec<_> = inner
            .popups
            .iter()
            .filter(|(_, p)| p.kind == kind)
            .collect();
        popups.sort_by_key(|(id, _)| **id);
        popups.into_iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn marker_count(&self) -> usize {
        self.inner.lock().markers.len()
    }

    /// Marker overlay ids, ordered by creation.
    pub fn marker_ids(&self) -> Vec<OverlayId> {
        let mut ids: Vec<_> = self.inner.lock().markers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Every flight requested so far.
    pub fn flights(&self) -> Vec<FlyRequest> {
        self.inner.lock().flights.clone()
    }

    /// Number of instant camera updates applied.
    pub fn jump_count(&self) -> u64 {
        self.inner.lock().jumps
    }

    /// Highest number of simultaneously live primary popups observed.
    pub fn peak_primary_popups(&self) -> usize {
        self.inner.lock().peak_primary
    }

    /// Highest number of simultaneously live trailing popups observed.
    pub fn peak_trailing_popups(&self) -> usize {
        self.inner.lock().peak_trailing
    }

    fn publish_zoom(&self, before: f64, after: f64) {
        if before != after {
            self.zoom_tx.send_replace(after);
        }
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new(CameraState::default())
    }
}

impl MapSurface for MemorySurface {
    fn is_attached(&self) -> bool {
        self.inner.lock().attached
    }

    fn camera(&self) -> Result<CameraState, SurfaceError> {
        let inner = self.inner.lock();
        inner.ensure_attached()?;
        Ok(inner.camera)
    }

    fn jump_to(&self, patch: &CameraPatch) -> Result<(), SurfaceError> {
        let (before, after) = {
            let mut inner = self.inner.lock();
            inner.ensure_attached()?;
            let before = inner.camera.zoom;
            patch.apply_to(&mut inner.camera);
            inner.animating = false;
            inner.jumps += 1;
            trace!(camera = ?inner.camera, "jump_to");
            (before, inner.camera.zoom)
        };
        self.publish_zoom(before, after);
        Ok(())
    }

    fn fly_to(&self, request: &FlyRequest) -> Result<(), SurfaceError> {
        let (before, after) = {
            let mut inner = self.inner.lock();
            inner.ensure_attached()?;
            let before = inner.camera.zoom;
            inner.camera.center = request.center;
            inner.camera.zoom = request.zoom;
            inner.animating = true;
            inner.flights.push(*request);
            trace!(center = %request.center, zoom = request.zoom, "fly_to");
            (before, request.zoom)
        };
        self.publish_zoom(before, after);
        Ok(())
    }

    fn stop_animations(&self) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        inner.ensure_attached()?;
        inner.animating = false;
        Ok(())
    }

    fn add_popup(&self, spec: PopupSpec) -> Result<OverlayId, SurfaceError> {
        let mut inner = self.inner.lock();
        inner.ensure_attached()?;
        let id = inner.allocate_id();
        trace!(%id, kind = %spec.kind, poi = %spec.poi_id, "add_popup");
        inner.popups.insert(id, spec);
        inner.peak_primary = inner.peak_primary.max(inner.count_popups(PopupKind::Primary));
        inner.peak_trailing = inner.peak_trailing.max(inner.count_popups(PopupKind::Trailing));
        Ok(id)
    }

    fn remove_popup(&self, id: OverlayId) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        inner.ensure_attached()?;
        match inner.popups.remove(&id) {
            Some(_) => {
                trace!(%id, "remove_popup");
                Ok(())
            }
            None => Err(SurfaceError::Rejected(format!("unknown popup {}", id))),
        }
    }

    fn add_marker(&self, spec: MarkerSpec) -> Result<OverlayId, SurfaceError> {
        let mut inner = self.inner.lock();
        inner.ensure_attached()?;
        let id = inner.allocate_id();
        inner.markers.insert(id, spec);
        Ok(id)
    }

    fn remove_marker(&self, id: OverlayId) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        inner.ensure_attached()?;
        match inner.markers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(SurfaceError::Rejected(format!("unknown marker {}", id))),
        }
    }
}
