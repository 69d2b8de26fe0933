//! Pre-flight briefing: narrated while the aircraft is still at the
//! departure airport, before any take-off this session.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Settings;
use crate::flight_stage::{FlightStage, StageTracker};
use crate::location::AirportLocator;
use crate::narrator::NarrativeKind;
use crate::telemetry::Telemetry;

use super::Announcement;

pub struct BriefingAnnouncement {
    tracker: Arc<StageTracker>,
    airports: Arc<dyn AirportLocator>,
    settings: Arc<Settings>,
}

impl BriefingAnnouncement {
    pub fn new(
        tracker: Arc<StageTracker>,
        airports: Arc<dyn AirportLocator>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            tracker,
            airports,
            settings,
        }
    }
}

#[async_trait]
impl Announcement for BriefingAnnouncement {
    fn id(&self) -> &'static str {
        "briefing"
    }

    fn kind(&self) -> NarrativeKind {
        NarrativeKind::Briefing
    }

    async fn should_generate(&self, t: &Telemetry) -> bool {
        if !matches!(
            t.stage,
            FlightStage::Parked | FlightStage::Taxi | FlightStage::Hold
        ) {
            return false;
        }
        // Once airborne this session, the briefing window is gone for good
        if self
            .tracker
            .get_last_transition(FlightStage::TakeOff)
            .is_some()
        {
            return false;
        }

        match self
            .airports
            .distance_to_nearest_airport_km(t.latitude, t.longitude)
            .await
        {
            Ok(Some(distance_km)) => distance_km <= self.settings.airport_radius_km,
            Ok(None) => false,
            Err(e) => {
                debug!("airport lookup failed: {}", e);
                false
            }
        }
    }

    async fn should_play(&self, t: &Telemetry) -> bool {
        matches!(t.stage, FlightStage::Taxi | FlightStage::Hold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TripLog;
    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    struct NearbyAirport(Option<f64>);

    #[async_trait]
    impl AirportLocator for NearbyAirport {
        async fn distance_to_nearest_airport_km(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Option<f64>> {
            Ok(self.0)
        }
    }

    fn telemetry(stage: FlightStage) -> Telemetry {
        Telemetry {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            latitude: 47.0,
            longitude: 8.0,
            altitude_msl_feet: 1500.0,
            altitude_agl_feet: 0.0,
            heading_degrees: 0.0,
            ground_speed_knots: 5.0,
            vertical_speed_fpm: 0.0,
            predicted_latitude: 47.0,
            predicted_longitude: 8.0,
            on_ground: true,
            engine_on: true,
            stage,
            autopilot: String::new(),
            squawk: 2000,
            ident: false,
        }
    }

    fn briefing(airport_km: Option<f64>) -> BriefingAnnouncement {
        BriefingAnnouncement::new(
            Arc::new(StageTracker::new(Arc::new(TripLog::new()))),
            Arc::new(NearbyAirport(airport_km)),
            Arc::new(Settings::default()),
        )
    }

    #[tokio::test]
    async fn generates_at_the_gate() {
        let b = briefing(Some(1.2));
        assert!(b.should_generate(&telemetry(FlightStage::Parked)).await);
        assert!(b.should_generate(&telemetry(FlightStage::Taxi)).await);
    }

    #[tokio::test]
    async fn needs_an_airport_nearby() {
        let b = briefing(Some(12.0));
        assert!(!b.should_generate(&telemetry(FlightStage::Parked)).await);
        let b = briefing(None);
        assert!(!b.should_generate(&telemetry(FlightStage::Parked)).await);
    }

    #[tokio::test]
    async fn suppressed_after_takeoff() {
        let tracker = Arc::new(StageTracker::new(Arc::new(TripLog::new())));
        tracker.seed_takeoff(Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap());
        let b = BriefingAnnouncement::new(
            tracker,
            Arc::new(NearbyAirport(Some(1.0))),
            Arc::new(Settings::default()),
        );
        assert!(!b.should_generate(&telemetry(FlightStage::Taxi)).await);
    }

    #[tokio::test]
    async fn plays_while_taxiing_or_holding() {
        let b = briefing(Some(1.0));
        assert!(b.should_play(&telemetry(FlightStage::Taxi)).await);
        assert!(b.should_play(&telemetry(FlightStage::Hold)).await);
        assert!(!b.should_play(&telemetry(FlightStage::Parked)).await);
    }
}
