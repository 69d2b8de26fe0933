//! The "letsgo" call: a one-shot narration right after departure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::flight_stage::{FlightStage, StageTracker};
use crate::narrator::NarrativeKind;
use crate::telemetry::Telemetry;

use super::Announcement;

/// Ground speed below which a take-off roll is not credible, knots
const MIN_DEPARTURE_SPEED_KT: f64 = 40.0;
/// Take-off stamps older than this belong to a restored session; a
/// belated letsgo would be jarring
const MAX_TAKEOFF_AGE_SECS: i64 = 300;
/// Altitude the call waits for, feet AGL
const PLAY_MIN_AGL_FT: f64 = 500.0;

pub struct LetsgoAnnouncement {
    tracker: Arc<StageTracker>,
}

impl LetsgoAnnouncement {
    pub fn new(tracker: Arc<StageTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl Announcement for LetsgoAnnouncement {
    fn id(&self) -> &'static str {
        "letsgo"
    }

    fn kind(&self) -> NarrativeKind {
        NarrativeKind::Letsgo
    }

    async fn should_generate(&self, t: &Telemetry) -> bool {
        if !matches!(t.stage, FlightStage::TakeOff | FlightStage::Climb) {
            return false;
        }
        if t.ground_speed_knots <= MIN_DEPARTURE_SPEED_KT {
            return false;
        }
        match self.tracker.get_last_transition(FlightStage::TakeOff) {
            Some(at) => {
                t.timestamp.signed_duration_since(at).num_seconds() <= MAX_TAKEOFF_AGE_SECS
            }
            None => false,
        }
    }

    async fn should_play(&self, t: &Telemetry) -> bool {
        t.stage == FlightStage::Climb && t.altitude_agl_feet >= PLAY_MIN_AGL_FT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TripLog;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn telemetry(stage: FlightStage, speed: f64, agl: f64) -> Telemetry {
        Telemetry {
            timestamp: t0(),
            latitude: 47.0,
            longitude: 8.0,
            altitude_msl_feet: 2000.0 + agl,
            altitude_agl_feet: agl,
            heading_degrees: 0.0,
            ground_speed_knots: speed,
            vertical_speed_fpm: 800.0,
            predicted_latitude: 47.0,
            predicted_longitude: 8.0,
            on_ground: false,
            engine_on: true,
            stage,
            autopilot: String::new(),
            squawk: 2000,
            ident: false,
        }
    }

    fn tracker_with_takeoff(age_secs: i64) -> Arc<StageTracker> {
        let tracker = Arc::new(StageTracker::new(Arc::new(TripLog::new())));
        tracker.seed_takeoff(t0() - chrono::Duration::seconds(age_secs));
        tracker
    }

    #[tokio::test]
    async fn generates_on_fresh_departure() {
        let a = LetsgoAnnouncement::new(tracker_with_takeoff(30));
        assert!(
            a.should_generate(&telemetry(FlightStage::Climb, 90.0, 300.0))
                .await
        );
    }

    #[tokio::test]
    async fn suppressed_for_restored_sessions() {
        let a = LetsgoAnnouncement::new(tracker_with_takeoff(600));
        assert!(
            !a.should_generate(&telemetry(FlightStage::Climb, 90.0, 300.0))
                .await
        );
    }

    #[tokio::test]
    async fn needs_departure_speed() {
        let a = LetsgoAnnouncement::new(tracker_with_takeoff(30));
        assert!(
            !a.should_generate(&telemetry(FlightStage::TakeOff, 35.0, 50.0))
                .await
        );
    }

    #[tokio::test]
    async fn plays_in_climb_above_500_agl() {
        let a = LetsgoAnnouncement::new(tracker_with_takeoff(30));
        assert!(!a.should_play(&telemetry(FlightStage::Climb, 90.0, 400.0)).await);
        assert!(a.should_play(&telemetry(FlightStage::Climb, 90.0, 600.0)).await);
        assert!(!a.should_play(&telemetry(FlightStage::Cruise, 120.0, 3000.0)).await);
    }
}
