//! Flight-stage state machine.
//!
//! Derives a labeled stage from raw telemetry with hysteresis: air/ground
//! transitions must survive a validation window before they commit, which
//! filters out bounced landings and touch-and-gos, and a short lock after
//! each commit suppresses immediate re-transitions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::jobs::Resettable;
use crate::session::{TripEventKind, TripLog};
use crate::telemetry::Telemetry;

/// Seconds an off-ground observation must persist before `take-off` commits
const TAKEOFF_WINDOW_SECS: i64 = 4;
/// Seconds an on-ground observation must persist before `landed` commits;
/// long enough to bridge a touch-and-go
const LANDING_WINDOW_SECS: i64 = 15;
/// Seconds the stage is locked after an air/ground commit
const TRANSITION_LOCK_SECS: i64 = 4;
/// Vertical speed threshold separating climb/descend from cruise (ft/min)
const VERTICAL_SPEED_THRESHOLD_FPM: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStage {
    OnTheGround,
    Parked,
    Taxi,
    Hold,
    TakeOff,
    Airborne,
    Climb,
    Cruise,
    Descend,
    Landed,
}

impl FlightStage {
    pub fn is_ground(&self) -> bool {
        matches!(
            self,
            FlightStage::OnTheGround
                | FlightStage::Parked
                | FlightStage::Taxi
                | FlightStage::Hold
                | FlightStage::Landed
        )
    }

    pub fn is_airborne(&self) -> bool {
        !self.is_ground()
    }
}

impl std::fmt::Display for FlightStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FlightStage::OnTheGround => "on the ground",
            FlightStage::Parked => "parked",
            FlightStage::Taxi => "taxi",
            FlightStage::Hold => "hold",
            FlightStage::TakeOff => "take-off",
            FlightStage::Airborne => "airborne",
            FlightStage::Climb => "climb",
            FlightStage::Cruise => "cruise",
            FlightStage::Descend => "descend",
            FlightStage::Landed => "landed",
        };
        write!(f, "{label}")
    }
}

/// A committed stage change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTransition {
    pub from: FlightStage,
    pub to: FlightStage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct PendingTransition {
    target: FlightStage,
    since: DateTime<Utc>,
}

#[derive(Debug)]
struct StageState {
    initialized: bool,
    stage: FlightStage,
    last_ground_speed: f64,
    accelerating: bool,
    decelerating: bool,
    locked_until: Option<DateTime<Utc>>,
    pending: Option<PendingTransition>,
    transitions: HashMap<FlightStage, DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

impl StageState {
    fn fresh() -> Self {
        Self {
            initialized: false,
            stage: FlightStage::OnTheGround,
            last_ground_speed: 0.0,
            accelerating: false,
            decelerating: false,
            locked_until: None,
            pending: None,
            transitions: HashMap::new(),
            last_seen: None,
        }
    }
}

/// Stage machine with single-writer semantics: the scheduler calls
/// [`StageTracker::update`] once per tick; jobs read the snapshotted
/// queries concurrently.
pub struct StageTracker {
    state: RwLock<StageState>,
    trip: Arc<TripLog>,
}

impl StageTracker {
    pub fn new(trip: Arc<TripLog>) -> Self {
        Self {
            state: RwLock::new(StageState::fresh()),
            trip,
        }
    }

    /// Seed the take-off timestamp from a restored session so one-shot
    /// gating (letsgo suppression, briefing suppression) survives restarts.
    pub fn seed_takeoff(&self, at: DateTime<Utc>) {
        let mut state = self.state.write().expect("stage state poisoned");
        state.transitions.insert(FlightStage::TakeOff, at);
    }

    pub fn current(&self) -> FlightStage {
        self.state.read().expect("stage state poisoned").stage
    }

    pub fn is_accelerating(&self) -> bool {
        self.state.read().expect("stage state poisoned").accelerating
    }

    pub fn is_decelerating(&self) -> bool {
        self.state.read().expect("stage state poisoned").decelerating
    }

    /// Timestamp of the most recent transition into `stage`, if any
    pub fn get_last_transition(&self, stage: FlightStage) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .expect("stage state poisoned")
            .transitions
            .get(&stage)
            .copied()
    }

    /// Seconds since take-off, measured against the last telemetry
    /// timestamp. Zero before any take-off this session.
    pub fn flight_duration_secs(&self) -> i64 {
        let state = self.state.read().expect("stage state poisoned");
        match (state.transitions.get(&FlightStage::TakeOff), state.last_seen) {
            (Some(takeoff), Some(seen)) => seen.signed_duration_since(*takeoff).num_seconds().max(0),
            _ => 0,
        }
    }

    /// Feed one telemetry sample; returns the committed transition, if the
    /// sample caused one. At most one transition timestamp is written per
    /// update.
    pub fn update(&self, t: &Telemetry) -> Option<StageTransition> {
        let mut state = self.state.write().expect("stage state poisoned");
        let now = t.timestamp;
        state.last_seen = Some(now);

        if !state.initialized {
            state.initialized = true;
            state.last_ground_speed = t.ground_speed_knots;
            if t.on_ground {
                state.stage = FlightStage::OnTheGround;
            } else {
                // Mid-air start: stamp a synthetic take-off so duration
                // queries have an origin
                state.stage = FlightStage::TakeOff;
                state.transitions.insert(FlightStage::TakeOff, now);
                debug!("mid-air start, synthetic take-off stamped");
            }
            return None;
        }

        state.accelerating = t.ground_speed_knots > state.last_ground_speed + 1.0;
        state.decelerating = t.ground_speed_knots < state.last_ground_speed - 1.0;
        state.last_ground_speed = t.ground_speed_knots;

        if let Some(locked_until) = state.locked_until {
            if now < locked_until {
                return None;
            }
            state.locked_until = None;
        }

        let was_ground = state.stage.is_ground();

        // Air/ground candidate validation
        if was_ground && !t.on_ground {
            match state.pending {
                Some(pending) if pending.target == FlightStage::TakeOff => {
                    if now.signed_duration_since(pending.since).num_seconds() >= TAKEOFF_WINDOW_SECS
                    {
                        return Some(Self::commit(&mut state, &self.trip, FlightStage::TakeOff, now));
                    }
                    return None;
                }
                _ => {
                    state.pending = Some(PendingTransition {
                        target: FlightStage::TakeOff,
                        since: now,
                    });
                    debug!("potential take-off, validation window opened");
                    return None;
                }
            }
        }

        if !was_ground && t.on_ground {
            match state.pending {
                Some(pending) if pending.target == FlightStage::Landed => {
                    if now.signed_duration_since(pending.since).num_seconds() >= LANDING_WINDOW_SECS
                    {
                        return Some(Self::commit(&mut state, &self.trip, FlightStage::Landed, now));
                    }
                    return None;
                }
                _ => {
                    state.pending = Some(PendingTransition {
                        target: FlightStage::Landed,
                        since: now,
                    });
                    debug!("potential landing, validation window opened");
                    return None;
                }
            }
        }

        // Observation agrees with the current side again: any pending
        // candidate was a bounce (or a touched-back-down take-off attempt)
        if let Some(pending) = state.pending.take() {
            debug!(candidate = %pending.target, "candidate transition discarded");
        }

        // Normal sub-state update
        let next = if t.on_ground {
            let speed = t.ground_speed_knots;
            if !t.engine_on && speed < 1.0 {
                Some(FlightStage::Parked)
            } else if t.engine_on && speed >= 5.0 {
                Some(FlightStage::Taxi)
            } else if t.engine_on && speed < 1.0 {
                Some(FlightStage::Hold)
            } else {
                // Between thresholds: preserve whatever ground sub-state
                // we are already in
                None
            }
        } else {
            let vs = t.vertical_speed_fpm;
            if vs > VERTICAL_SPEED_THRESHOLD_FPM {
                Some(FlightStage::Climb)
            } else if vs < -VERTICAL_SPEED_THRESHOLD_FPM {
                Some(FlightStage::Descend)
            } else {
                Some(FlightStage::Cruise)
            }
        };

        match next {
            Some(next) if next != state.stage => {
                Some(Self::commit(&mut state, &self.trip, next, now))
            }
            _ => None,
        }
    }

    fn commit(
        state: &mut StageState,
        trip: &TripLog,
        to: FlightStage,
        now: DateTime<Utc>,
    ) -> StageTransition {
        let from = state.stage;
        state.stage = to;
        state.pending = None;
        state.transitions.insert(to, now);

        let air_ground = matches!(to, FlightStage::TakeOff | FlightStage::Landed);
        if air_ground {
            state.locked_until = Some(now + chrono::Duration::seconds(TRANSITION_LOCK_SECS));
            let title = match to {
                FlightStage::TakeOff => "Take-off",
                _ => "Landed",
            };
            trip.record(now, TripEventKind::System, title, "");
            info!(%from, %to, "flight stage committed");
        } else {
            debug!(%from, %to, "flight stage changed");
        }
        counter!("scheduler.stage_transitions_total").increment(1);

        StageTransition { from, to, at: now }
    }
}

#[async_trait]
impl Resettable for StageTracker {
    fn name(&self) -> &'static str {
        "stage_tracker"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        let mut state = self.state.write().expect("stage state poisoned");
        *state = StageState::fresh();
        info!("stage machine reset");
    }
}
