//! Dirty-checked session snapshotting.
//!
//! Serializes the session every period and writes it to the store only
//! when the bytes actually changed, so an idle cruise does not hammer the
//! backend.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::flight_stage::{FlightStage, StageTracker};
use crate::jobs::{Job, JobGuard, Resettable, TimeGate};
use crate::session::{SessionSnapshot, TripLog};
use crate::store::{self, StateStore};
use crate::telemetry::Telemetry;

const PERIOD_SECS: i64 = 30;

pub struct SessionPersistenceJob {
    store: Arc<dyn StateStore>,
    trip: Arc<TripLog>,
    tracker: Arc<StageTracker>,
    gate: TimeGate,
    guard: JobGuard,
    last_written: Mutex<Option<String>>,
}

impl SessionPersistenceJob {
    pub fn new(
        store: Arc<dyn StateStore>,
        trip: Arc<TripLog>,
        tracker: Arc<StageTracker>,
    ) -> Self {
        Self {
            store,
            trip,
            tracker,
            gate: TimeGate::new(chrono::Duration::seconds(PERIOD_SECS)),
            guard: JobGuard::new(),
            last_written: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Job for SessionPersistenceJob {
    fn name(&self) -> &'static str {
        "session_persist"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        self.gate.fire_if_due(t.timestamp)
    }

    async fn run(&self, _cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let snapshot = SessionSnapshot {
            saved_at: t.timestamp,
            session_id: self.trip.session_id(),
            stage: self.tracker.current(),
            takeoff_at: self.tracker.get_last_transition(FlightStage::TakeOff),
            events: self.trip.events(),
        };
        let serialized = snapshot.to_json()?;

        // saved_at changes every period; dirty-check the payload without it
        let body = serialized
            .split_once(',')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| serialized.clone());
        {
            let last = self.last_written.lock().expect("snapshot cache poisoned");
            if last.as_deref() == Some(body.as_str()) {
                trace!("session unchanged, skipping write");
                return Ok(());
            }
        }

        if let Err(e) = self
            .store
            .set_state(store::keys::SESSION_CONTEXT, &serialized)
            .await
        {
            debug!("session write failed: {}", e);
            return Ok(());
        }
        *self.last_written.lock().expect("snapshot cache poisoned") = Some(body);
        debug!(events = snapshot.events.len(), "session persisted");
        Ok(())
    }
}

#[async_trait]
impl Resettable for SessionPersistenceJob {
    fn name(&self) -> &'static str {
        "session_persist"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        *self.last_written.lock().expect("snapshot cache poisoned") = None;
        self.gate.reset();
    }
}
