//! POI stream providers.
//!
//! Fetching records and assigning coordinates happens outside the scheduler.
//! Whatever the provider does, the scheduler only ever sees a (possibly
//! empty) vector: [`load_pois`] turns a failed fetch into an empty sequence
//! and drops records whose coordinates cannot be placed on the map.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use super::Poi;

/// Errors raised by POI providers.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed POI data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// A provider of POI records with resolved coordinates.
pub trait PoiSource: Send + Sync {
    /// Fetch the full POI sequence.
    fn fetch_pois(&self) -> BoxFuture<'_, Result<Vec<Poi>, SourceError>>;

    /// Short name used in log output.
    fn name(&self) -> &str;
}

/// Fetch POIs, falling back to an empty sequence on failure.
///
/// Records with invalid coordinates are dropped with a warning.
pub async fn load_pois(source: &dyn PoiSource) -> Vec<Poi> {
    let pois = match source.fetch_pois().await {
        Ok(pois) => pois,
        Err(e) => {
            warn!(source = source.name(), error = %e, "POI fetch failed, using empty sequence");
            return Vec::new();
        }
    };

    let total = pois.len();
    let valid: Vec<Poi> = pois
        .into_iter()
        .filter(|poi| {
            let ok = poi.has_valid_coordinates();
            if !ok {
                warn!(
                    poi = %poi.id,
                    lat = poi.latitude,
                    lng = poi.longitude,
                    "Dropping POI with invalid coordinates"
                );
            }
            ok
        })
        .collect();

    debug!(
        source = source.name(),
        total,
        kept = valid.len(),
        "Loaded POI sequence"
    );
    valid
}

/// In-memory provider, useful for fixtures and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticPoiSource {
    pois: Vec<Poi>,
}

impl StaticPoiSource {
    pub fn new(pois: Vec<Poi>) -> Self {
        Self { pois }
    }
}

impl PoiSource for StaticPoiSource {
    fn fetch_pois(&self) -> BoxFuture<'_, Result<Vec<Poi>, SourceError>> {
        Box::pin(async move { Ok(self.pois.clone()) })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Provider reading a JSON array of POI records from disk.
#[derive(Debug, Clone)]
pub struct JsonFilePoiSource {
    path: PathBuf,
}

impl JsonFilePoiSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoiSource for JsonFilePoiSource {
    fn fetch_pois(&self) -> BoxFuture<'_, Result<Vec<Poi>, SourceError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(&self.path)
                .await
                .map_err(|source| SourceError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            let pois: Vec<Poi> = serde_json::from_slice(&bytes)?;
            Ok(pois)
        })
    }

    fn name(&self) -> &str {
        "json-file"
    }
}
