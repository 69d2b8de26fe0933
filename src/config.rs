//! Configuration: static settings from a TOML file, dynamic settings
//! through the store.
//!
//! Static settings are loaded once at startup and shared as an
//! `Arc<Settings>`. The handful of knobs the transponder can flip at
//! runtime (frequency, filter mode, score threshold, visibility boost,
//! text length) are read through [`DynamicConfig`], which falls back to
//! the static defaults when the store has no value.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{self, StateStore};

/// Narration frequency presets. Higher is chattier; 3 and 4 allow
/// pipelining against in-progress playback.
pub const FREQ_RARELY: u8 = 1;
pub const FREQ_NORMAL: u8 = 2;
pub const FREQ_ACTIVE: u8 = 3;
pub const FREQ_BUSY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Candidates must clear the configured minimum score
    Fixed,
    /// The scorer adapts the threshold; no minimum is applied here
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentAction {
    Pause,
    Stop,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Heartbeat interval in milliseconds
    pub telemetry_loop_ms: u64,
    /// Between-tick position delta that counts as a session change (km)
    pub teleport_threshold_km: f64,

    pub auto_narrate: bool,
    pub narration_frequency: u8,
    pub filter_mode: FilterMode,
    pub min_poi_score: f64,
    /// Per-POI repeat cooldown in minutes
    pub repeat_ttl_minutes: i64,
    /// Nominal gap the narrator leaves between narrations, seconds
    pub pause_duration_secs: i64,
    /// Auto-POI suppression after take-off, seconds
    pub takeoff_delay_secs: i64,

    pub essay_enabled: bool,
    pub essay_delay_before_secs: i64,
    pub essay_delay_between_secs: i64,

    pub line_of_sight: bool,
    /// Terrain sampling step along the sight line, km
    pub los_step_km: f64,
    /// Terrain clearance tolerance, meters (DEM noise and grazing shots)
    pub los_tolerance_m: f64,

    /// Lead-time multiplier at frequency 3
    pub lead_multiplier_active: f64,
    /// Lead-time multiplier at frequency 4
    pub lead_multiplier_busy: f64,

    pub border_cooldown_any_secs: i64,
    pub border_cooldown_repeat_secs: i64,

    pub ident_action: IdentAction,

    /// Outer radius of the POI working set (wikidata area), km
    pub max_poi_distance_km: f64,
    /// Directories watched for new screenshots
    pub screenshot_dirs: Vec<PathBuf>,
    /// Briefing eligibility radius around an airport, km
    pub airport_radius_km: f64,
    /// Persisted sessions older than this are discarded on restore
    pub stale_session_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telemetry_loop_ms: 100,
            teleport_threshold_km: 80.0,
            auto_narrate: true,
            narration_frequency: FREQ_NORMAL,
            filter_mode: FilterMode::Fixed,
            min_poi_score: 4.0,
            repeat_ttl_minutes: 60,
            pause_duration_secs: 30,
            takeoff_delay_secs: 60,
            essay_enabled: true,
            essay_delay_before_secs: 300,
            essay_delay_between_secs: 900,
            line_of_sight: true,
            los_step_km: 0.5,
            los_tolerance_m: 50.0,
            lead_multiplier_active: 1.0,
            lead_multiplier_busy: 2.0,
            border_cooldown_any_secs: 60,
            border_cooldown_repeat_secs: 300,
            ident_action: IdentAction::Pause,
            max_poi_distance_km: 80.0,
            screenshot_dirs: Vec::new(),
            airport_radius_km: 5.0,
            stale_session_hours: 6,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Load from a file if present; defaults otherwise
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                debug!("using default settings: {:#}", e);
                Settings::default()
            }
        }
    }

    pub fn repeat_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.repeat_ttl_minutes)
    }
}

/// Store-backed view of the runtime-adjustable settings
pub struct DynamicConfig {
    store: Arc<dyn StateStore>,
    defaults: Arc<Settings>,
}

impl DynamicConfig {
    pub fn new(store: Arc<dyn StateStore>, defaults: Arc<Settings>) -> Self {
        Self { store, defaults }
    }

    async fn get(&self, key: &str) -> Option<String> {
        match self.store.get_state(key).await {
            Ok(v) => v,
            Err(e) => {
                debug!(key, "store read failed: {}", e);
                None
            }
        }
    }

    pub async fn narration_frequency(&self) -> u8 {
        self.get(store::keys::NARRATION_FREQUENCY)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.defaults.narration_frequency)
            .clamp(FREQ_RARELY, FREQ_BUSY)
    }

    pub async fn filter_mode(&self) -> FilterMode {
        match self.get(store::keys::FILTER_MODE).await.as_deref() {
            Some("adaptive") => FilterMode::Adaptive,
            Some("fixed") => FilterMode::Fixed,
            _ => self.defaults.filter_mode,
        }
    }

    pub async fn min_poi_score(&self) -> f64 {
        self.get(store::keys::MIN_POI_SCORE)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.defaults.min_poi_score)
    }

    /// Current visibility boost, bounded to [1.0, 1.5]
    pub async fn visibility_boost(&self) -> f64 {
        self.get(store::keys::VISIBILITY_BOOST)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0_f64)
            .clamp(1.0, 1.5)
    }

    pub async fn set_visibility_boost(&self, boost: f64) -> Result<()> {
        let bounded = boost.clamp(1.0, 1.5);
        self.store
            .set_state(store::keys::VISIBILITY_BOOST, &format!("{bounded:.3}"))
            .await
    }

    pub async fn set_narration_frequency(&self, frequency: u8) -> Result<()> {
        self.store
            .set_state(
                store::keys::NARRATION_FREQUENCY,
                &frequency.clamp(FREQ_RARELY, FREQ_BUSY).to_string(),
            )
            .await
    }

    pub async fn set_text_length(&self, length: u8) -> Result<()> {
        self.store
            .set_state(store::keys::TEXT_LENGTH, &length.to_string())
            .await
    }

    /// Text-length preset 1-5; consumed by the narrator's prompt assembly
    pub async fn text_length(&self) -> u8 {
        self.get(store::keys::TEXT_LENGTH)
            .await
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
            .clamp(1, 5)
    }

    /// Lead-time multiplier for the pipelining policy at this frequency;
    /// `None` means playback blocks firing entirely
    pub fn lead_multiplier(&self, frequency: u8) -> Option<f64> {
        match frequency {
            FREQ_ACTIVE => Some(self.defaults.lead_multiplier_active),
            FREQ_BUSY => Some(self.defaults.lead_multiplier_busy),
            _ => None,
        }
    }
}
