//! Points of interest and their geographic primitives.
//!
//! A [`Poi`] is immutable once handed to the scheduler. The stream of POIs is
//! owned by the ingestion collaborator (see [`PoiSource`]) and is replaced
//! wholesale, never edited in place.
//!
//! # Example
//!
//! ```
//! use globetour::poi::{Poi, RegionKey};
//!
//! let poi = Poi::new("westminster", "United Kingdom", 51.4993, -0.1273);
//! assert_eq!(poi.region(), RegionKey::new("United Kingdom"));
//! assert!(poi.has_valid_coordinates());
//! ```

mod image;
mod source;

pub use image::{ImageResolver, PlaceholderImages, DEFAULT_PLACEHOLDER_IMAGE};
pub use source::{load_pois, JsonFilePoiSource, PoiSource, SourceError, StaticPoiSource};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Geographic position as `(longitude, latitude)` in degrees.
///
/// Longitude comes first to match the ordering used by map surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Check that both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

impl fmt::Display for LngLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lng, self.lat)
    }
}

/// Grouping key used to decide when trailing popups are purged.
///
/// Derived from the POI's country.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey(String);

impl RegionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display metadata carried alongside a POI.
///
/// Only popup rendering reads these fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiDetails {
    pub name: String,
    pub description: String,
    pub person_name: Option<String>,
    pub photo: Option<String>,
}

/// A point of interest visited by the slideshow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub country: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub activity: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub details: PoiDetails,
}

impl Poi {
    /// Create a POI with empty language, activity and details.
    pub fn new(
        id: impl Into<String>,
        country: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            country: country.into(),
            language: String::new(),
            activity: String::new(),
            latitude,
            longitude,
            details: PoiDetails::default(),
        }
    }

    /// Attach display details.
    pub fn with_details(mut self, details: PoiDetails) -> Self {
        self.details = details;
        self
    }

    /// Set language and activity labels.
    pub fn with_labels(mut self, language: impl Into<String>, activity: impl Into<String>) -> Self {
        self.language = language.into();
        self.activity = activity.into();
        self
    }

    pub fn position(&self) -> LngLat {
        LngLat::new(self.longitude, self.latitude)
    }

    pub fn region(&self) -> RegionKey {
        RegionKey::new(self.country.as_str())
    }

    pub fn has_valid_coordinates(&self) -> bool {
        self.position().is_valid()
    }

    /// Title shown in popups; falls back to the id when no name is known.
    pub fn title(&self) -> &str {
        if self.details.name.is_empty() {
            &self.id
        } else {
            &self.details.name
        }
    }
}
