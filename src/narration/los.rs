//! Sampled line-of-sight check between the aircraft and a POI.
//!
//! The sight line is sampled along the great circle; at each interior
//! sample the ray altitude is the linear interpolation of the endpoint
//! altitudes minus the Earth-curvature drop x(D−x)/2R. A sample blocks
//! when the terrain rises more than the tolerance above the ray. Failed
//! elevation lookups leave the sample transparent (fail-open): a missing
//! DEM tile must not silence a whole region.

use tracing::trace;

use crate::elevation::ElevationProvider;
use crate::geometry::{EARTH_RADIUS_M, haversine_distance, intermediate_point};

/// A point on the sight line: position plus altitude in meters
#[derive(Debug, Clone, Copy)]
pub struct SightPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

/// Whether the terrain between `from` (aircraft) and `to` (POI) leaves the
/// sight line clear.
pub async fn is_visible(
    elevation: &dyn ElevationProvider,
    from: SightPoint,
    to: SightPoint,
    step_km: f64,
    tolerance_m: f64,
) -> bool {
    let total_m = haversine_distance(from.latitude, from.longitude, to.latitude, to.longitude);
    let steps = (total_m / (step_km * 1000.0)).ceil() as usize;
    if steps <= 1 {
        return true;
    }

    for i in 1..steps {
        let f = i as f64 / steps as f64;
        let x_m = f * total_m;
        let lerp_m = from.altitude_m + (to.altitude_m - from.altitude_m) * f;
        let curvature_drop_m = x_m * (total_m - x_m) / (2.0 * EARTH_RADIUS_M);
        let ray_m = lerp_m - curvature_drop_m;

        let (lat, lon) =
            intermediate_point(from.latitude, from.longitude, to.latitude, to.longitude, f);
        let ground_m = match elevation.elevation_at(lat, lon).await {
            Ok(Some(g)) => g,
            // No data or transient failure: this sample cannot block
            Ok(None) | Err(_) => continue,
        };

        if ground_m > ray_m + tolerance_m {
            trace!(
                sample = i,
                ground_m = format!("{ground_m:.0}"),
                ray_m = format!("{ray_m:.0}"),
                "sight line blocked"
            );
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Terrain defined by a closure over (lat, lon)
    struct FnTerrain<F: Fn(f64, f64) -> Option<f64> + Send + Sync>(F);

    #[async_trait]
    impl<F: Fn(f64, f64) -> Option<f64> + Send + Sync> ElevationProvider for FnTerrain<F> {
        async fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
            Ok((self.0)(latitude, longitude))
        }
    }

    fn aircraft() -> SightPoint {
        // 3,000 ft MSL
        SightPoint {
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: 914.4,
        }
    }

    fn poi() -> SightPoint {
        // 800 ft MSL, ~11 km east
        SightPoint {
            latitude: 0.0,
            longitude: 0.1,
            altitude_m: 243.8,
        }
    }

    #[tokio::test]
    async fn flat_terrain_is_visible() {
        let terrain = FnTerrain(|_, _| Some(0.0));
        assert!(is_visible(&terrain, aircraft(), poi(), 0.5, 50.0).await);
    }

    #[tokio::test]
    async fn mountain_blocks_sight_line() {
        // A 1,800 m ridge around the midpoint of the path
        let terrain = FnTerrain(|_, lon: f64| {
            if (lon - 0.05).abs() < 0.01 {
                Some(1800.0)
            } else {
                Some(0.0)
            }
        });
        assert!(!is_visible(&terrain, aircraft(), poi(), 0.5, 50.0).await);
    }

    #[tokio::test]
    async fn missing_elevation_data_fails_open() {
        let terrain = FnTerrain(|_, _| None);
        assert!(is_visible(&terrain, aircraft(), poi(), 0.5, 50.0).await);
    }

    #[tokio::test]
    async fn tolerance_permits_grazing_terrain() {
        // Ray near the midpoint sits around 579 m; terrain at 600 m grazes
        // within the 50 m tolerance
        let terrain = FnTerrain(|_, lon: f64| {
            if (lon - 0.05).abs() < 0.003 {
                Some(600.0)
            } else {
                Some(0.0)
            }
        });
        assert!(is_visible(&terrain, aircraft(), poi(), 0.5, 50.0).await);
    }

    #[tokio::test]
    async fn adjacent_poi_skips_sampling() {
        let terrain = FnTerrain(|_, _| Some(9000.0));
        let near = SightPoint {
            latitude: 0.0,
            longitude: 0.001,
            altitude_m: 0.0,
        };
        assert!(is_visible(&terrain, aircraft(), near, 0.5, 50.0).await);
    }
}
