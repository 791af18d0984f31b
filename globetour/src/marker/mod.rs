//! Marker overlays.
//!
//! Markers follow an all-or-nothing rule: either every POI of the current
//! sequence has a marker on the surface or none does. [`MarkerLayer`] rolls
//! back a partially created batch rather than leave some markers behind.
//!
//! Visibility is driven by the host's zoom notifications, independently of
//! the slideshow loop:
//!
//! ```text
//! zoom >= threshold && no markers  ──► materialize all
//! zoom <  threshold && markers     ──► clear all
//! ```
//!
//! Pointer enter/leave on a marker shows/hides a hover popup through the
//! [`PopupLayer`] gate, so hovering does nothing while a primary popup is up.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::poi::Poi;
use crate::popup::PopupLayer;
use crate::surface::{MapSurface, MarkerSpec, OverlayId, SurfaceError};

/// Zoom level at or above which markers are shown.
pub const DEFAULT_MARKER_ZOOM_THRESHOLD: f64 = 5.0;

#[derive(Debug)]
struct MarkerState {
    pois: Arc<[Poi]>,
    /// Overlay id and index into `pois`.
    markers: Vec<(OverlayId, usize)>,
    hovered: Option<OverlayId>,
}

/// Creates and destroys the marker batch.
pub struct MarkerLayer {
    surface: Arc<dyn MapSurface>,
    popups: Arc<PopupLayer>,
    threshold: f64,
    inner: Mutex<MarkerState>,
}

impl std::fmt::Debug for MarkerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerLayer")
            .field("threshold", &self.threshold)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl MarkerLayer {
    pub fn new(surface: Arc<dyn MapSurface>, popups: Arc<PopupLayer>, threshold: f64) -> Self {
        Self {
            surface,
            popups,
            threshold,
            inner: Mutex::new(MarkerState {
                pois: Arc::from(Vec::new()),
                markers: Vec::new(),
                hovered: None,
            }),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether `zoom` is high enough for markers to be shown.
    pub fn is_visible_at(&self, zoom: f64) -> bool {
        zoom >= self.threshold
    }

    /// Replace the POI set, creating one marker per POI.
    ///
    /// Existing markers are removed first. If any marker cannot be created,
    /// the ones already created are removed again and the error returned.
    pub fn materialize_all(&self, pois: Arc<[Poi]>) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        self.remove_markers(&mut inner);
        inner.pois = pois;
        self.create_markers(&mut inner)
    }

    /// Replace the POI set without touching marker visibility.
    ///
    /// Markers that are currently shown are rebuilt for the new set.
    pub fn set_pois(&self, pois: Arc<[Poi]>) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        let shown = !inner.markers.is_empty();
        self.remove_markers(&mut inner);
        inner.pois = pois;
        if shown {
            self.create_markers(&mut inner)?;
        }
        Ok(())
    }

    /// Remove every marker. Safe to call when none exist.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        self.remove_markers(&mut inner);
    }

    /// React to a camera zoom change reported by the host.
    pub fn on_zoom_changed(&self, zoom: f64) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        let visible = self.is_visible_at(zoom);
        if visible && inner.markers.is_empty() && !inner.pois.is_empty() {
            debug!(zoom, count = inner.pois.len(), "Zoom crossed threshold, showing markers");
            self.create_markers(&mut inner)?;
        } else if !visible && !inner.markers.is_empty() {
            debug!(zoom, "Zoom below threshold, hiding markers");
            self.remove_markers(&mut inner);
        }
        Ok(())
    }

    /// Pointer entered `marker`: show its hover popup unless suppressed.
    ///
    /// Returns whether a popup was shown.
    pub fn on_pointer_enter(&self, marker: OverlayId) -> Result<bool, SurfaceError> {
        let poi = {
            let mut inner = self.inner.lock();
            let Some(index) = Self::poi_index(&inner, marker) else {
                return Ok(false);
            };
            inner.hovered = Some(marker);
            inner.pois[index].clone()
        };
        if self.popups.is_hover_suppressed() {
            return Ok(false);
        }
        self.popups.show_hover(&poi)
    }

    /// Pointer left `marker`: hide the hover popup unless suppressed.
    pub fn on_pointer_leave(&self, marker: OverlayId) {
        {
            let mut inner = self.inner.lock();
            if inner.hovered != Some(marker) {
                return;
            }
            inner.hovered = None;
        }
        if !self.popups.is_hover_suppressed() {
            self.popups.hide_hover();
        }
    }

    pub fn marker_count(&self) -> usize {
        self.inner.lock().markers.len()
    }

    pub fn poi_count(&self) -> usize {
        self.inner.lock().pois.len()
    }

    /// Overlay ids of the live markers, in POI order.
    pub fn marker_ids(&self) -> Vec<OverlayId> {
        self.inner.lock().markers.iter().map(|(id, _)| *id).collect()
    }

    fn poi_index(state: &MarkerState, marker: OverlayId) -> Option<usize> {
        state
            .markers
            .iter()
            .find(|(id, _)| *id == marker)
            .map(|(_, index)| *index)
    }

    fn create_markers(&self, state: &mut MarkerState) -> Result<(), SurfaceError> {
        let mut created = Vec::with_capacity(state.pois.len());
        for (index, poi) in state.pois.iter().enumerate() {
            let spec = MarkerSpec {
                poi_id: poi.id.clone(),
                position: poi.position(),
            };
            match self.surface.add_marker(spec) {
                Ok(id) => created.push((id, index)),
                Err(e) => {
                    warn!(
                        created = created.len(),
                        total = state.pois.len(),
                        error = %e,
                        "Marker batch failed, rolling back"
                    );
                    for (id, _) in created {
                        self.remove_marker(id);
                    }
                    return Err(e);
                }
            }
        }
        state.markers = created;
        Ok(())
    }

    fn remove_markers(&self, state: &mut MarkerState) {
        for (id, _) in state.markers.drain(..) {
            self.remove_marker(id);
        }
        state.hovered = None;
    }

    fn remove_marker(&self, id: OverlayId) {
        match self.surface.remove_marker(id) {
            Ok(()) | Err(SurfaceError::Detached) => {}
            Err(e) => warn!(%id, error = %e, "Marker removal failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::PlaceholderImages;
    use crate::popup::{PopupStyle, DEFAULT_TRAILING_CAPACITY};
    use crate::surface::{MemorySurface, PopupKind};

    struct Fixture {
        surface: Arc<MemorySurface>,
        popups: Arc<PopupLayer>,
        markers: MarkerLayer,
    }

    fn fixture() -> Fixture {
        let surface = Arc::new(MemorySurface::default());
        let popups = Arc::new(PopupLayer::new(
            surface.clone(),
            Arc::new(PlaceholderImages::default()),
            PopupStyle::default(),
            DEFAULT_TRAILING_CAPACITY,
        ));
        let markers = MarkerLayer::new(
            surface.clone(),
            popups.clone(),
            DEFAULT_MARKER_ZOOM_THRESHOLD,
        );
        Fixture {
            surface,
            popups,
            markers,
        }
    }

    fn pois(n: usize) -> Arc<[Poi]> {
        (0..n)
            .map(|i| Poi::new(format!("p{}", i), "X", i as f64, i as f64))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_zoom_transitions_markers_all_or_nothing() {
        let f = fixture();
        f.markers.set_pois(pois(10)).unwrap();

        f.markers.on_zoom_changed(4.0).unwrap();
        assert_eq!(f.markers.marker_count(), 0);

        f.markers.on_zoom_changed(6.0).unwrap();
        assert_eq!(f.markers.marker_count(), 10);
        assert_eq!(f.surface.marker_count(), 10);

        // Staying above the threshold does not duplicate the batch
        f.markers.on_zoom_changed(7.0).unwrap();
        assert_eq!(f.surface.marker_count(), 10);

        f.markers.on_zoom_changed(4.9).unwrap();
        assert_eq!(f.surface.marker_count(), 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let f = fixture();
        f.markers.set_pois(pois(3)).unwrap();
        f.markers.on_zoom_changed(5.0).unwrap();
        assert_eq!(f.markers.marker_count(), 3);
    }

    #[test]
    fn test_clear_all_is_safe_when_empty() {
        let f = fixture();
        f.markers.clear_all();
        f.markers.materialize_all(pois(2)).unwrap();
        f.markers.clear_all();
        f.markers.clear_all();
        assert_eq!(f.surface.marker_count(), 0);
    }

    #[test]
    fn test_set_pois_rebuilds_visible_batch() {
        let f = fixture();
        f.markers.materialize_all(pois(4)).unwrap();
        f.markers.set_pois(pois(6)).unwrap();
        assert_eq!(f.surface.marker_count(), 6);

        f.markers.clear_all();
        f.markers.set_pois(pois(2)).unwrap();
        assert_eq!(f.surface.marker_count(), 0);
    }

    #[test]
    fn test_failed_batch_leaves_no_markers() {
        let f = fixture();
        f.surface.detach();
        assert_eq!(
            f.markers.materialize_all(pois(5)),
            Err(SurfaceError::Detached)
        );
        assert_eq!(f.markers.marker_count(), 0);
    }

    #[test]
    fn test_hover_popup_respects_gate() {
        let f = fixture();
        f.markers.materialize_all(pois(2)).unwrap();
        let marker = f.markers.marker_ids()[1];

        assert!(f.markers.on_pointer_enter(marker).unwrap());
        assert_eq!(f.surface.popups_of(PopupKind::Hover)[0].poi_id, "p1");
        f.markers.on_pointer_leave(marker);
        assert_eq!(f.surface.popup_count(), 0);

        f.popups.set_hover_suppressed(true);
        assert!(!f.markers.on_pointer_enter(marker).unwrap());
        assert_eq!(f.surface.popup_count(), 0);
    }

    #[test]
    fn test_pointer_on_unknown_marker_is_ignored() {
        let f = fixture();
        assert!(!f.markers.on_pointer_enter(OverlayId(42)).unwrap());
        f.markers.on_pointer_leave(OverlayId(42));
        assert_eq!(f.surface.popup_count(), 0);
    }
}
