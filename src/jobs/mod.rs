//! Job framework: the uniform job contract the scheduler dispatches, the
//! per-job reentrancy guard, and the distance/time gating primitives the
//! trigger jobs build on.

pub mod border;
pub mod eviction;
pub mod regional_categories;
pub mod river;
pub mod screenshot;
pub mod session_persist;
pub mod transponder;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::geometry::haversine_distance_km;
use crate::telemetry::Telemetry;

/// A unit of periodic work driven by the scheduler. `should_fire` is
/// evaluated every tick on the scheduler task and must be cheap;
/// `run` executes on its own task and may suspend.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reentrancy guard; the scheduler acquires it before spawning `run`,
    /// so at most one instance of a job is ever in flight.
    fn guard(&self) -> &JobGuard;

    fn should_fire(&self, telemetry: &Telemetry) -> bool;

    async fn run(&self, cancel: &CancellationToken, telemetry: &Telemetry) -> Result<()>;
}

/// Component whose session-scoped state must be cleared on teleport
#[async_trait]
pub trait Resettable: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reset_session(&self, cancel: &CancellationToken);
}

/// Compare-and-swap reentrancy flag. `try_acquire` returns a permit that
/// releases the flag on drop; while a permit is live, further acquisitions
/// fail.
#[derive(Default)]
pub struct JobGuard {
    busy: Arc<AtomicBool>,
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<JobPermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(JobPermit {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct JobPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Fires when the great-circle distance since the last firing exceeds the
/// threshold. The first evaluation always fires.
pub struct DistanceGate {
    threshold_km: f64,
    last: Mutex<Option<(f64, f64)>>,
}

impl DistanceGate {
    pub fn new(threshold_km: f64) -> Self {
        Self {
            threshold_km,
            last: Mutex::new(None),
        }
    }

    /// Check whether the gate is due, and mark it fired if so. Checking
    /// and marking are one critical section so a slow run cannot double-fire.
    pub fn fire_if_due(&self, latitude: f64, longitude: f64) -> bool {
        let mut last = self.last.lock().expect("distance gate poisoned");
        let due = match *last {
            None => true,
            Some((lat, lon)) => {
                haversine_distance_km(lat, lon, latitude, longitude) > self.threshold_km
            }
        };
        if due {
            *last = Some((latitude, longitude));
        }
        due
    }

    pub fn is_due(&self, latitude: f64, longitude: f64) -> bool {
        match *self.last.lock().expect("distance gate poisoned") {
            None => true,
            Some((lat, lon)) => {
                haversine_distance_km(lat, lon, latitude, longitude) > self.threshold_km
            }
        }
    }

    pub fn mark(&self, latitude: f64, longitude: f64) {
        *self.last.lock().expect("distance gate poisoned") = Some((latitude, longitude));
    }

    pub fn reset(&self) {
        *self.last.lock().expect("distance gate poisoned") = None;
    }
}

/// Fires when the elapsed time since the last firing exceeds the period.
/// The first evaluation always fires.
pub struct TimeGate {
    period: chrono::Duration,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl TimeGate {
    pub fn new(period: chrono::Duration) -> Self {
        Self {
            period,
            last: Mutex::new(None),
        }
    }

    pub fn fire_if_due(&self, now: DateTime<Utc>) -> bool {
        let mut last = self.last.lock().expect("time gate poisoned");
        let due = match *last {
            None => true,
            Some(at) => now.signed_duration_since(at) >= self.period,
        };
        if due {
            *last = Some(now);
        }
        due
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match *self.last.lock().expect("time gate poisoned") {
            None => true,
            Some(at) => now.signed_duration_since(at) >= self.period,
        }
    }

    pub fn mark(&self, now: DateTime<Utc>) {
        *self.last.lock().expect("time gate poisoned") = Some(now);
    }

    pub fn reset(&self) {
        *self.last.lock().expect("time gate poisoned") = None;
    }
}
