//! Periodic pruning of the POI working set.
//!
//! Airborne only: on the ground nothing drifts out of range, and startup
//! churn would just evict data that is about to be re-fetched.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Settings;
use crate::jobs::{Job, JobGuard, TimeGate};
use crate::poi::PoiManager;
use crate::telemetry::Telemetry;

const PERIOD_SECS: i64 = 300;
/// Margin beyond the working-set radius before anything is dropped, km
const PRUNE_MARGIN_KM: f64 = 10.0;

pub struct EvictionJob {
    pois: Arc<dyn PoiManager>,
    settings: Arc<Settings>,
    gate: TimeGate,
    guard: JobGuard,
}

impl EvictionJob {
    pub fn new(pois: Arc<dyn PoiManager>, settings: Arc<Settings>) -> Self {
        Self {
            pois,
            settings,
            gate: TimeGate::new(chrono::Duration::seconds(PERIOD_SECS)),
            guard: JobGuard::new(),
        }
    }
}

#[async_trait]
impl Job for EvictionJob {
    fn name(&self) -> &'static str {
        "eviction"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        t.stage.is_airborne() && self.gate.fire_if_due(t.timestamp)
    }

    async fn run(&self, _cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let threshold_km = self.settings.max_poi_distance_km + PRUNE_MARGIN_KM;
        let pruned = self
            .pois
            .prune_by_distance(t.latitude, t.longitude, t.heading_degrees, threshold_km)
            .await;
        if pruned > 0 {
            debug!(pruned, threshold_km, "pruned out-of-range POIs");
            counter!("eviction.pois_pruned_total").increment(pruned as u64);
        }
        Ok(())
    }
}
