//! Contract to the terrain elevation collaborator.

use anyhow::Result;
use async_trait::async_trait;

/// Ground elevation lookup. Backed by DEM tiles in production; a flat or
/// scripted terrain in tests.
#[async_trait]
pub trait ElevationProvider: Send + Sync {
    /// Elevation in meters at the coordinates, or `None` where no data
    /// exists (open ocean). Errors are transient and treated as "no data"
    /// by callers.
    async fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>>;
}
