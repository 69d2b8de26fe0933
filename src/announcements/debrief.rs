//! Post-flight debrief: narrated after landing, while rolling out, once
//! the trip has enough substance to talk about.

use std::sync::Arc;

use async_trait::async_trait;

use crate::flight_stage::{FlightStage, StageTracker};
use crate::narrator::NarrativeKind;
use crate::session::TripLog;
use crate::telemetry::Telemetry;

use super::Announcement;

/// Flights shorter than this get no debrief, seconds
const MIN_AIRBORNE_SECS: i64 = 300;
/// The trip summary must have at least this much substance, characters
const MIN_SUMMARY_CHARS: usize = 50;

pub struct DebriefAnnouncement {
    tracker: Arc<StageTracker>,
    trip: Arc<TripLog>,
}

impl DebriefAnnouncement {
    pub fn new(tracker: Arc<StageTracker>, trip: Arc<TripLog>) -> Self {
        Self { tracker, trip }
    }

    fn airborne_secs(&self) -> Option<i64> {
        let takeoff = self.tracker.get_last_transition(FlightStage::TakeOff)?;
        let landed = self.tracker.get_last_transition(FlightStage::Landed)?;
        Some(landed.signed_duration_since(takeoff).num_seconds())
    }
}

#[async_trait]
impl Announcement for DebriefAnnouncement {
    fn id(&self) -> &'static str {
        "debrief"
    }

    fn kind(&self) -> NarrativeKind {
        NarrativeKind::Debrief
    }

    async fn should_generate(&self, t: &Telemetry) -> bool {
        if !t.on_ground {
            return false;
        }
        if !matches!(
            t.stage,
            FlightStage::Taxi | FlightStage::Hold | FlightStage::Landed
        ) {
            return false;
        }
        match self.airborne_secs() {
            Some(secs) if secs >= MIN_AIRBORNE_SECS => {}
            _ => return false,
        }
        self.trip.summary().len() >= MIN_SUMMARY_CHARS
    }

    async fn should_play(&self, t: &Telemetry) -> bool {
        matches!(t.stage, FlightStage::Taxi | FlightStage::Hold)
    }
}
