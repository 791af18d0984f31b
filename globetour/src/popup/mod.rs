//! Popup overlays.
//!
//! [`PopupLayer`] owns every popup the presentation creates:
//!
//! - a single **primary** popup for the POI under camera focus,
//! - a bounded window of **trailing** popups for POIs recently shown in the
//!   same region,
//! - a **hover** popup shown when the pointer rests on a marker.
//!
//! It also owns the hover-suppression gate. While the primary popup is up,
//! hover popups are refused and any visible one is taken down.
//!
//! Every overlay created here is released here, including entries evicted
//! from the trailing window. A detached surface has already dropped its
//! overlays, so releasing against it just forgets the handle.

mod window;

pub use window::{TrailingWindow, DEFAULT_TRAILING_CAPACITY};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::poi::{ImageResolver, LngLat, Poi, RegionKey};
use crate::surface::{
    MapSurface, OverlayId, PopupContent, PopupKind, PopupSpec, SurfaceError,
};

/// Pixel offsets applied to popups so they do not overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupStyle {
    pub primary_offset: f64,
    pub trailing_offset: f64,
}

impl Default for PopupStyle {
    fn default() -> Self {
        Self {
            primary_offset: 25.0,
            trailing_offset: 45.0,
        }
    }
}

/// A live popup overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupHandle {
    pub id: OverlayId,
    pub kind: PopupKind,
    pub anchor: LngLat,
    pub poi_id: String,
}

#[derive(Debug)]
struct TrailingEntry {
    poi: Poi,
    overlay: Option<PopupHandle>,
}

#[derive(Debug)]
struct PopupState {
    primary: Option<PopupHandle>,
    hover: Option<PopupHandle>,
    window: TrailingWindow<TrailingEntry>,
    hover_suppressed: bool,
}

/// Creates, tracks and disposes popup overlays.
pub struct PopupLayer {
    surface: Arc<dyn MapSurface>,
    images: Arc<dyn ImageResolver>,
    style: PopupStyle,
    inner: Mutex<PopupState>,
}

impl std::fmt::Debug for PopupLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupLayer")
            .field("style", &self.style)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl PopupLayer {
    pub fn new(
        surface: Arc<dyn MapSurface>,
        images: Arc<dyn ImageResolver>,
        style: PopupStyle,
        trailing_capacity: usize,
    ) -> Self {
        Self {
            surface,
            images,
            style,
            inner: Mutex::new(PopupState {
                primary: None,
                hover: None,
                window: TrailingWindow::new(trailing_capacity),
                hover_suppressed: false,
            }),
        }
    }

    // =========================================================================
    // Primary popup
    // =========================================================================

    /// Show the primary popup for `poi`, replacing any existing one.
    ///
    /// The old primary popup is removed before the new one is created, and
    /// hover popups are suppressed from here until [`hide_primary`].
    ///
    /// [`hide_primary`]: PopupLayer::hide_primary
    pub fn show_primary(&self, poi: &Poi) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.primary.take() {
            self.release(old);
        }
        if let Some(hover) = inner.hover.take() {
            self.release(hover);
        }
        inner.hover_suppressed = true;

        let handle = self.create(poi, PopupKind::Primary)?;
        debug!(poi = %poi.id, id = %handle.id, "Primary popup shown");
        inner.primary = Some(handle);
        Ok(())
    }

    /// Remove the primary popup if present and lift hover suppression.
    ///
    /// Calling this with no primary popup alive is a no-op.
    pub fn hide_primary(&self) {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.primary.take() {
            debug!(poi = %handle.poi_id, "Primary popup hidden");
            self.release(handle);
        }
        inner.hover_suppressed = false;
    }

    pub fn has_primary(&self) -> bool {
        self.inner.lock().primary.is_some()
    }

    pub fn primary(&self) -> Option<PopupHandle> {
        self.inner.lock().primary.clone()
    }

    // =========================================================================
    // Trailing popups
    // =========================================================================

    /// Record `poi` as recently shown in `region` and render its popup.
    ///
    /// A region different from the window's purges the window first. Past
    /// capacity the oldest entry is evicted and its overlay released.
    pub fn push_trailing(&self, poi: &Poi, region: &RegionKey) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();

        let purged = inner.window.enter_region(region);
        if !purged.is_empty() {
            debug!(%region, purged = purged.len(), "Region changed, trailing window purged");
        }
        for entry in purged {
            self.release_entry(entry);
        }

        let evicted = inner.window.push(TrailingEntry {
            poi: poi.clone(),
            overlay: None,
        });
        if let Some(entry) = evicted {
            trace!(poi = %entry.poi.id, "Trailing entry evicted");
            self.release_entry(entry);
        }

        let handle = self.create(poi, PopupKind::Trailing)?;
        if let Some(entry) = inner.window.iter_mut().last() {
            entry.overlay = Some(handle);
        }
        Ok(())
    }

    /// Create overlays for window entries that currently have none.
    pub fn render_trailing(&self) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock();
        for entry in inner.window.iter_mut() {
            if entry.overlay.is_none() {
                entry.overlay = Some(self.create(&entry.poi, PopupKind::Trailing)?);
            }
        }
        Ok(())
    }

    /// Remove trailing overlays but keep the window's history.
    pub fn clear_trailing_popups(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.window.iter_mut() {
            if let Some(handle) = entry.overlay.take() {
                self.release(handle);
            }
        }
    }

    /// Remove trailing overlays and forget the history.
    pub fn purge_trailing(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.window.clear() {
            self.release_entry(entry);
        }
    }

    /// POI ids in the trailing window, oldest first.
    pub fn trailing_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .window
            .iter()
            .map(|e| e.poi.id.clone())
            .collect()
    }

    pub fn trailing_region(&self) -> Option<RegionKey> {
        self.inner.lock().window.region().cloned()
    }

    /// Number of trailing overlays currently rendered.
    pub fn trailing_popup_count(&self) -> usize {
        self.inner
            .lock()
            .window
            .iter()
            .filter(|e| e.overlay.is_some())
            .count()
    }

    // =========================================================================
    // Hover gate
    // =========================================================================

    /// Set the hover gate. Activating it takes down a visible hover popup.
    pub fn set_hover_suppressed(&self, active: bool) {
        let mut inner = self.inner.lock();
        inner.hover_suppressed = active;
        if active {
            if let Some(hover) = inner.hover.take() {
                self.release(hover);
            }
        }
    }

    pub fn is_hover_suppressed(&self) -> bool {
        self.inner.lock().hover_suppressed
    }

    /// Show a hover popup for `poi` unless suppressed.
    ///
    /// Returns whether a popup was shown.
    pub fn show_hover(&self, poi: &Poi) -> Result<bool, SurfaceError> {
        let mut inner = self.inner.lock();
        if inner.hover_suppressed {
            return Ok(false);
        }
        if let Some(old) = inner.hover.take() {
            self.release(old);
        }
        inner.hover = Some(self.create(poi, PopupKind::Hover)?);
        Ok(true)
    }

    pub fn hide_hover(&self) {
        if let Some(hover) = self.inner.lock().hover.take() {
            self.release(hover);
        }
    }

    pub fn has_hover(&self) -> bool {
        self.inner.lock().hover.is_some()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Remove every popup and reset the gate.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        if let Some(primary) = inner.primary.take() {
            self.release(primary);
        }
        if let Some(hover) = inner.hover.take() {
            self.release(hover);
        }
        for entry in inner.window.clear() {
            self.release_entry(entry);
        }
        inner.hover_suppressed = false;
    }

    /// Number of popups this layer currently holds.
    pub fn live_popup_count(&self) -> usize {
        let inner = self.inner.lock();
        usize::from(inner.primary.is_some())
            + usize::from(inner.hover.is_some())
            + inner.window.iter().filter(|e| e.overlay.is_some()).count()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn create(&self, poi: &Poi, kind: PopupKind) -> Result<PopupHandle, SurfaceError> {
        let anchor = poi.position();
        let offset = match kind {
            PopupKind::Trailing => self.style.trailing_offset,
            PopupKind::Primary | PopupKind::Hover => self.style.primary_offset,
        };
        let spec = PopupSpec {
            kind,
            poi_id: poi.id.clone(),
            anchor,
            offset,
            content: self.content_for(poi, kind),
        };
        let id = self.surface.add_popup(spec)?;
        Ok(PopupHandle {
            id,
            kind,
            anchor,
            poi_id: poi.id.clone(),
        })
    }

    fn content_for(&self, poi: &Poi, kind: PopupKind) -> PopupContent {
        match kind {
            PopupKind::Trailing => PopupContent {
                title: poi.title().to_string(),
                image_url: Some(self.images.image_for(poi)),
                ..Default::default()
            },
            PopupKind::Primary | PopupKind::Hover => PopupContent {
                title: poi.title().to_string(),
                description: poi.details.description.clone(),
                person_name: poi.details.person_name.clone(),
                image_url: Some(self.images.image_for(poi)),
            },
        }
    }

    fn release_entry(&self, entry: TrailingEntry) {
        if let Some(handle) = entry.overlay {
            self.release(handle);
        }
    }

    fn release(&self, handle: PopupHandle) {
        match self.surface.remove_popup(handle.id) {
            Ok(()) | Err(SurfaceError::Detached) => {}
            Err(e) => {
                warn!(id = %handle.id, kind = %handle.kind, error = %e, "Popup removal failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::PlaceholderImages;
    use crate::surface::MemorySurface;

    fn layer_with_capacity(capacity: usize) -> (Arc<MemorySurface>, PopupLayer) {
        let surface = Arc::new(MemorySurface::default());
        let layer = PopupLayer::new(
            surface.clone(),
            Arc::new(PlaceholderImages::default()),
            PopupStyle::default(),
            capacity,
        );
        (surface, layer)
    }

    fn layer() -> (Arc<MemorySurface>, PopupLayer) {
        layer_with_capacity(DEFAULT_TRAILING_CAPACITY)
    }

    fn poi(id: &str, country: &str) -> Poi {
        Poi::new(id, country, 10.0, 20.0)
    }

    #[test]
    fn test_show_primary_replaces_existing() {
        let (surface, layer) = layer();
        layer.show_primary(&poi("a", "X")).unwrap();
        layer.show_primary(&poi("b", "X")).unwrap();

        assert_eq!(surface.popup_count_of(PopupKind::Primary), 1);
        assert_eq!(surface.peak_primary_popups(), 1);
        assert_eq!(layer.primary().unwrap().poi_id, "b");
        assert!(layer.is_hover_suppressed());
    }

    #[test]
    fn test_hide_primary_is_idempotent() {
        let (surface, layer) = layer();
        layer.hide_primary();
        layer.show_primary(&poi("a", "X")).unwrap();
        layer.hide_primary();
        layer.hide_primary();

        assert_eq!(surface.popup_count(), 0);
        assert!(!layer.is_hover_suppressed());
    }

    #[test]
    fn test_trailing_window_purges_on_region_change() {
        let (surface, layer) = layer();
        let x = RegionKey::new("X");
        let y = RegionKey::new("Y");

        layer.push_trailing(&poi("a", "X"), &x).unwrap();
        layer.push_trailing(&poi("b", "X"), &x).unwrap();
        assert_eq!(layer.trailing_ids(), vec!["a", "b"]);

        layer.push_trailing(&poi("c", "Y"), &y).unwrap();
        assert_eq!(layer.trailing_ids(), vec!["c"]);
        assert_eq!(surface.popup_count_of(PopupKind::Trailing), 1);
        assert_eq!(layer.trailing_region(), Some(y));
    }

    #[test]
    fn test_trailing_eviction_releases_overlay() {
        let (surface, layer) = layer_with_capacity(3);
        let region = RegionKey::new("X");
        for i in 0..5 {
            layer.push_trailing(&poi(&format!("p{}", i), "X"), &region).unwrap();
        }

        assert_eq!(layer.trailing_ids(), vec!["p2", "p3", "p4"]);
        assert_eq!(surface.popup_count_of(PopupKind::Trailing), 3);
        assert_eq!(surface.peak_trailing_popups(), 3);
    }

    #[test]
    fn test_clear_and_render_trailing_keeps_history() {
        let (surface, layer) = layer();
        let region = RegionKey::new("X");
        layer.push_trailing(&poi("a", "X"), &region).unwrap();
        layer.push_trailing(&poi("b", "X"), &region).unwrap();

        layer.clear_trailing_popups();
        assert_eq!(surface.popup_count(), 0);
        assert_eq!(layer.trailing_popup_count(), 0);
        assert_eq!(layer.trailing_ids(), vec!["a", "b"]);

        layer.render_trailing().unwrap();
        assert_eq!(surface.popup_count_of(PopupKind::Trailing), 2);
        assert_eq!(layer.trailing_popup_count(), 2);
        assert!(surface
            .popups_of(PopupKind::Trailing)
            .iter()
            .all(|p| p.offset == PopupStyle::default().trailing_offset));
    }

    #[test]
    fn test_hover_suppressed_while_primary_active() {
        let (surface, layer) = layer();
        assert!(layer.show_hover(&poi("h", "X")).unwrap());
        assert!(layer.has_hover());
        assert_eq!(surface.popup_count_of(PopupKind::Hover), 1);

        // Primary takes down the hover popup and blocks new ones
        layer.show_primary(&poi("a", "X")).unwrap();
        assert_eq!(surface.popup_count_of(PopupKind::Hover), 0);
        assert!(!layer.show_hover(&poi("h", "X")).unwrap());
        assert!(!layer.has_hover());

        layer.hide_primary();
        assert!(layer.show_hover(&poi("h", "X")).unwrap());
        layer.hide_hover();
        assert!(!layer.has_hover());
    }

    #[test]
    fn test_clear_all_removes_everything() {
        let (surface, layer) = layer();
        layer.push_trailing(&poi("t", "X"), &RegionKey::new("X")).unwrap();
        layer.show_primary(&poi("a", "X")).unwrap();
        layer.clear_all();

        assert_eq!(surface.popup_count(), 0);
        assert_eq!(layer.live_popup_count(), 0);
        assert!(layer.trailing_ids().is_empty());
        assert!(!layer.is_hover_suppressed());
    }

    #[test]
    fn test_release_after_detach_forgets_handles() {
        let (surface, layer) = layer();
        layer.show_primary(&poi("a", "X")).unwrap();
        surface.detach();
        layer.hide_primary();
        assert!(!layer.has_primary());
        assert_eq!(
            layer.show_primary(&poi("b", "X")),
            Err(SurfaceError::Detached)
        );
        assert!(!layer.has_primary());
    }

    #[test]
    fn test_primary_content_carries_details() {
        let (surface, layer) = layer();
        let poi = poi("a", "X").with_details(crate::poi::PoiDetails {
            name: "Westminster Abbey".to_string(),
            description: "Historic church in London".to_string(),
            person_name: Some("Bishop Richard Roe".to_string()),
            photo: None,
        });
        layer.show_primary(&poi).unwrap();

        let popups = surface.popups_of(PopupKind::Primary);
        let content = &popups[0].content;
        assert_eq!(content.title, "Westminster Abbey");
        assert_eq!(content.person_name.as_deref(), Some("Bishop Richard Roe"));
        assert_eq!(
            content.image_url.as_deref(),
            Some(crate::poi::DEFAULT_PLACEHOLDER_IMAGE)
        );
    }
}
