//! Periodic hydration of river geometry near the aircraft. Rivers are
//! linear features the scorer cannot rank from a point index, so the POI
//! manager refreshes them separately along the flight path.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::jobs::{Job, JobGuard, TimeGate};
use crate::poi::PoiManager;
use crate::telemetry::Telemetry;

const PERIOD_SECS: i64 = 15;

pub struct RiverJob {
    pois: Arc<dyn PoiManager>,
    gate: TimeGate,
    guard: JobGuard,
}

impl RiverJob {
    pub fn new(pois: Arc<dyn PoiManager>) -> Self {
        Self {
            pois,
            gate: TimeGate::new(chrono::Duration::seconds(PERIOD_SECS)),
            guard: JobGuard::new(),
        }
    }
}

#[async_trait]
impl Job for RiverJob {
    fn name(&self) -> &'static str {
        "river"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        t.stage.is_airborne() && self.gate.fire_if_due(t.timestamp)
    }

    async fn run(&self, cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        match self
            .pois
            .update_rivers(cancel, t.latitude, t.longitude, t.heading_degrees)
            .await
        {
            Ok(Some(river)) => debug!(river = %river.name, "river hydrated"),
            Ok(None) => {}
            Err(e) => debug!("river update failed: {}", e),
        }
        Ok(())
    }
}
