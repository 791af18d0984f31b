//! Globe Tour - geospatial presentation scheduler
//!
//! This library cycles a map camera through a sequence of points of interest,
//! showing a primary popup for the POI in focus, a trailing window of popups
//! for recently shown POIs in the same region, and zoom-gated markers for the
//! whole sequence.
//!
//! The host map is reached only through the [`surface::MapSurface`] trait;
//! [`surface::MemorySurface`] is an in-memory implementation for headless
//! runs and tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use globetour::{PlaceholderImages, Poi, SlideshowConfig, SlideshowScheduler};
//! use globetour::surface::MemorySurface;
//!
//! # async fn demo() -> Result<(), globetour::SchedulerError> {
//! let surface = Arc::new(MemorySurface::default());
//! let scheduler = SlideshowScheduler::new(
//!     surface,
//!     SlideshowConfig::default(),
//!     Arc::new(PlaceholderImages::default()),
//! )?;
//! scheduler.start(vec![Poi::new("tokyo", "Japan", 35.68, 139.69)])?;
//! // ...
//! scheduler.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod delay;
pub mod logging;
pub mod marker;
pub mod poi;
pub mod popup;
pub mod rotation;
pub mod scheduler;
pub mod surface;

pub use config::{ConfigError, SlideshowConfig};
pub use poi::{ImageResolver, LngLat, PlaceholderImages, Poi, PoiSource, RegionKey};
pub use scheduler::{
    SchedulerError, SchedulerState, SlideshowEvent, SlideshowScheduler, StepOutcome,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
