//! Image resolution for popup content.
//!
//! Resolving per-POI illustrative images (with caching and fallbacks) belongs
//! to an external collaborator. The scheduler only needs a non-blocking
//! lookup that always yields a URL.

use super::Poi;

/// Placeholder used when a POI carries no photo.
pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "assets/placeholder.jpg";

/// Resolves the image URL rendered in a POI's popup.
///
/// Implementations must not block: a cache miss returns a deterministic
/// placeholder rather than waiting on a fetch.
pub trait ImageResolver: Send + Sync {
    fn image_for(&self, poi: &Poi) -> String;
}

/// Resolver that uses the POI's own photo, or a fixed placeholder.
#[derive(Debug, Clone)]
pub struct PlaceholderImages {
    placeholder: String,
}

impl PlaceholderImages {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }
}

impl Default for PlaceholderImages {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER_IMAGE)
    }
}

impl ImageResolver for PlaceholderImages {
    fn image_for(&self, poi: &Poi) -> String {
        match poi.details.photo.as_deref() {
            Some(photo) if !photo.is_empty() => photo.to_string(),
            _ => self.placeholder.clone(),
        }
    }
}
