//! Trip log and session snapshot/restore.
//!
//! The trip log is the ordered record of everything that happened during the
//! session (narrations, activities, system events like take-off). It feeds
//! prompt assembly for briefings and debriefs, and is part of the persisted
//! session snapshot.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uuid::Uuid;

use crate::flight_stage::FlightStage;
use crate::jobs::Resettable;
use crate::store::{self, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEventKind {
    Narration,
    Activity,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: TripEventKind,
    pub title: String,
    pub summary: String,
}

/// Ordered, append-only log of trip events for the current session.
pub struct TripLog {
    session_id: Mutex<Uuid>,
    events: Mutex<Vec<TripEvent>>,
}

impl Default for TripLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TripLog {
    pub fn new() -> Self {
        Self {
            session_id: Mutex::new(Uuid::new_v4()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        *self.session_id.lock().expect("trip log poisoned")
    }

    pub fn record(&self, at: DateTime<Utc>, kind: TripEventKind, title: &str, summary: &str) {
        let event = TripEvent {
            timestamp: at,
            kind,
            title: title.to_string(),
            summary: summary.to_string(),
        };
        debug!(title = %event.title, ?kind, "trip event recorded");
        self.events.lock().expect("trip log poisoned").push(event);
    }

    pub fn events(&self) -> Vec<TripEvent> {
        self.events.lock().expect("trip log poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("trip log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat text rendering used as prompt context and for the debrief
    /// "non-trivial summary" gate.
    pub fn summary(&self) -> String {
        let events = self.events.lock().expect("trip log poisoned");
        events
            .iter()
            .map(|e| {
                if e.summary.is_empty() {
                    e.title.clone()
                } else {
                    format!("{}: {}", e.title, e.summary)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Start a fresh session: new id, empty log
    pub fn clear(&self) {
        *self.session_id.lock().expect("trip log poisoned") = Uuid::new_v4();
        self.events.lock().expect("trip log poisoned").clear();
    }

    fn replace(&self, session_id: Uuid, events: Vec<TripEvent>) {
        *self.session_id.lock().expect("trip log poisoned") = session_id;
        *self.events.lock().expect("trip log poisoned") = events;
    }
}

#[async_trait]
impl Resettable for TripLog {
    fn name(&self) -> &'static str {
        "trip_log"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        self.clear();
    }
}

/// Serialized form of the session, written to the store under
/// [`store::keys::SESSION_CONTEXT`]. The snapshot is opaque to the store;
/// only this module reads and writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub saved_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub stage: FlightStage,
    pub takeoff_at: Option<DateTime<Utc>>,
    pub events: Vec<TripEvent>,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Outcome of a startup restoration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing persisted; fresh session
    Empty,
    /// Snapshot found and applied
    Restored,
    /// Snapshot found but discarded (too old, or the flight had already
    /// ended); fresh session
    Stale,
}

/// Restore the trip log from a persisted snapshot, applying the staleness
/// policy: snapshots older than `max_age` or whose session had already
/// reached `landed` are discarded. Returns the restored take-off timestamp
/// so the stage machine can suppress the one-shot letsgo for old sessions.
pub async fn restore_session(
    store: &dyn StateStore,
    trip: &TripLog,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
) -> Result<(RestoreOutcome, Option<SessionSnapshot>)> {
    let raw = match store.get_state(store::keys::SESSION_CONTEXT).await? {
        Some(raw) => raw,
        None => {
            info!("no persisted session, starting fresh");
            return Ok((RestoreOutcome::Empty, None));
        }
    };

    let snapshot = match SessionSnapshot::from_json(&raw) {
        Ok(s) => s,
        Err(e) => {
            warn!("discarding unreadable session snapshot: {}", e);
            return Ok((RestoreOutcome::Stale, None));
        }
    };

    let age = now.signed_duration_since(snapshot.saved_at);
    if age > max_age {
        info!(
            "discarding stale session snapshot ({} hours old)",
            age.num_hours()
        );
        return Ok((RestoreOutcome::Stale, None));
    }
    if snapshot.stage == FlightStage::Landed {
        info!("discarding session snapshot: previous flight already landed");
        return Ok((RestoreOutcome::Stale, None));
    }

    trip.replace(snapshot.session_id, snapshot.events.clone());
    info!(
        session = %snapshot.session_id,
        events = snapshot.events.len(),
        stage = %snapshot.stage,
        "restored session from store"
    );
    Ok((RestoreOutcome::Restored, Some(snapshot)))
}
