//! skylark - flight-simulator companion core.
//!
//! Turns a stream of aircraft telemetry into a time-ordered series of
//! spoken narrations: points of interest, border crossings, briefings,
//! essays and debriefs. The heart is a fixed-interval scheduler that
//! derives a flight-stage state machine from raw sensor samples, detects
//! session discontinuities, and dispatches gating jobs; on top sits the
//! narration arbitration engine that picks at most one thing to say at a
//! time.
//!
//! Text generation, speech synthesis, POI scoring, geocoding, elevation
//! data and the key-value store are external collaborators behind narrow
//! async traits; this crate ships the contracts plus in-memory
//! implementations sufficient for tests and embedding.

pub mod announcements;
pub mod config;
pub mod elevation;
pub mod flight_stage;
pub mod geometry;
pub mod jobs;
pub mod latency_report;
pub mod location;
pub mod narration;
pub mod narrator;
pub mod poi;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod telemetry;

pub use config::Settings;
pub use flight_stage::{FlightStage, StageTracker};
pub use scheduler::Scheduler;
pub use telemetry::{SimState, Telemetry};
