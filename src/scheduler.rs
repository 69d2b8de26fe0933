//! Central scheduler: fixed-interval telemetry heartbeat, stage machine
//! updates, teleport detection and job fan-out.
//!
//! One task owns the heartbeat ticker. Each tick reads sim state and a
//! telemetry snapshot, stamps the derived flight stage, fans the snapshot
//! out to the sink, checks for a session discontinuity, and dispatches
//! every registered job whose `should_fire` says yes onto its own task.
//! The scheduler never awaits a job; the per-job reentrancy guard keeps a
//! slow run from overlapping itself.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::flight_stage::StageTracker;
use crate::geometry::haversine_distance_km;
use crate::jobs::{Job, Resettable};
use crate::telemetry::{SimConnector, SimState, TelemetrySink};

pub struct Scheduler {
    sim: Arc<dyn SimConnector>,
    sink: Arc<dyn TelemetrySink>,
    tracker: Arc<StageTracker>,
    settings: Arc<Settings>,
    jobs: Vec<Arc<dyn Job>>,
    resettables: Vec<Arc<dyn Resettable>>,
    last_position: Option<(f64, f64)>,
}

impl Scheduler {
    pub fn new(
        sim: Arc<dyn SimConnector>,
        sink: Arc<dyn TelemetrySink>,
        tracker: Arc<StageTracker>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            sim,
            sink,
            tracker,
            settings,
            jobs: Vec::new(),
            resettables: Vec::new(),
            last_position: None,
        }
    }

    /// Register a job. Builder-phase only; the job list is append-only and
    /// never locked once the loop is running.
    pub fn add_job(&mut self, job: Arc<dyn Job>) {
        info!(job = job.name(), "job registered");
        self.jobs.push(job);
    }

    /// Register a component to reset on teleport, in registration order
    pub fn add_resettable(&mut self, resettable: Arc<dyn Resettable>) {
        info!(component = resettable.name(), "resettable registered");
        self.resettables.push(resettable);
    }

    /// Run the heartbeat until the token is cancelled
    pub async fn start(mut self, cancel: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.settings.telemetry_loop_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_ms = self.settings.telemetry_loop_ms,
            jobs = self.jobs.len(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(&cancel).await;
                }
            }
        }
    }

    async fn tick(&mut self, cancel: &CancellationToken) {
        let state = self.sim.get_state();
        self.sink.on_sim_state(state);
        if state != SimState::Active {
            return;
        }

        let mut telemetry = match self.sim.get_telemetry(cancel).await {
            Ok(t) => t,
            Err(e) => {
                debug!("telemetry fetch failed, skipping tick: {}", e);
                return;
            }
        };

        // Stage derivation happens before fan-out so jobs see the stage
        // that matches the snapshot
        self.tracker.update(&telemetry);
        telemetry.stage = self.tracker.current();

        self.sink.on_telemetry(&telemetry);

        // Teleport detection
        if let Some((last_lat, last_lon)) = self.last_position {
            let moved_km =
                haversine_distance_km(last_lat, last_lon, telemetry.latitude, telemetry.longitude);
            if moved_km > self.settings.teleport_threshold_km {
                warn!(
                    moved_km = format!("{moved_km:.1}"),
                    "teleport detected, resetting session"
                );
                counter!("scheduler.teleports_total").increment(1);
                for resettable in &self.resettables {
                    resettable.reset_session(cancel).await;
                }
            }
        }
        self.last_position = Some((telemetry.latitude, telemetry.longitude));

        // Job fan-out: fire-and-forget, guarded per job
        for job in &self.jobs {
            if !job.should_fire(&telemetry) {
                continue;
            }
            let Some(permit) = job.guard().try_acquire() else {
                debug!(job = job.name(), "previous run still in flight, skipping");
                continue;
            };
            counter!("scheduler.job_firings_total", "job" => job.name()).increment(1);

            let job = Arc::clone(job);
            let telemetry = telemetry.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = job.run(&cancel, &telemetry).await {
                    warn!(job = job.name(), "job run failed: {:#}", e);
                }
            });
        }
    }
}
