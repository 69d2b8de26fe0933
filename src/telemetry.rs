//! Telemetry snapshot produced once per scheduler tick, plus the narrow
//! contract to the simulator connector that produces it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::flight_stage::FlightStage;

/// Connection state of the simulator as seen by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    /// No connection to the simulator process
    Disconnected,
    /// Connected but not in an active flight (menus, loading screens)
    Inactive,
    /// In an active flight; telemetry is meaningful
    Active,
}

/// Immutable telemetry snapshot for one tick.
///
/// Units follow the simulator convention: altitudes in feet, speeds in
/// knots, vertical speed in feet per minute, heading in degrees true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_msl_feet: f64,
    pub altitude_agl_feet: f64,
    /// Degrees true
    pub heading_degrees: f64,
    pub ground_speed_knots: f64,
    pub vertical_speed_fpm: f64,
    /// Predicted position one minute ahead, extrapolated by the connector
    pub predicted_latitude: f64,
    pub predicted_longitude: f64,
    pub on_ground: bool,
    pub engine_on: bool,
    /// Flight stage as derived by the stage machine; stamped by the
    /// scheduler before the snapshot is fanned out to jobs
    pub stage: FlightStage,
    pub autopilot: String,
    /// Transponder code as displayed (e.g. 7235)
    pub squawk: u16,
    pub ident: bool,
}

impl Telemetry {
    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Contract to the simulator connector. The connector owns the wire
/// protocol and the position prediction; the core only pulls snapshots.
#[async_trait]
pub trait SimConnector: Send + Sync {
    /// Fetch a fresh telemetry snapshot. Errors are transient (sim busy,
    /// connection hiccup) and handled by skipping the tick.
    async fn get_telemetry(&self, cancel: &CancellationToken) -> Result<Telemetry>;

    fn get_state(&self) -> SimState;

    /// Adjust how far ahead the connector extrapolates the predicted position
    fn set_prediction_window(&self, _window: std::time::Duration) {}

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Thin observer for per-tick fan-out. Implementations must not block;
/// anything slow belongs behind a channel.
pub trait TelemetrySink: Send + Sync {
    fn on_sim_state(&self, _state: SimState) {}
    fn on_telemetry(&self, _telemetry: &Telemetry) {}
}

/// Sink that discards everything. Useful for tests and headless embedding.
pub struct NullSink;

impl TelemetrySink for NullSink {}

/// Sink that re-broadcasts snapshots on tokio broadcast channels so UI
/// surfaces can subscribe without touching the scheduler.
pub struct BroadcastSink {
    state_tx: tokio::sync::broadcast::Sender<SimState>,
    telemetry_tx: tokio::sync::broadcast::Sender<Telemetry>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (state_tx, _) = tokio::sync::broadcast::channel(capacity);
        let (telemetry_tx, _) = tokio::sync::broadcast::channel(capacity);
        Self {
            state_tx,
            telemetry_tx,
        }
    }

    pub fn subscribe_state(&self) -> tokio::sync::broadcast::Receiver<SimState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_telemetry(&self) -> tokio::sync::broadcast::Receiver<Telemetry> {
        self.telemetry_tx.subscribe()
    }
}

impl TelemetrySink for BroadcastSink {
    fn on_sim_state(&self, state: SimState) {
        // Send fails when there are no subscribers, which is fine
        let _ = self.state_tx.send(state);
    }

    fn on_telemetry(&self, telemetry: &Telemetry) {
        let _ = self.telemetry_tx.send(telemetry.clone());
    }
}
