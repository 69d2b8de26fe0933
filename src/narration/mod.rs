//! Narration arbitration: pick one POI per firing (or fall back to an
//! essay), honoring cooldowns, stale-score and stage gates, line-of-sight
//! occlusion, the frequency/pipelining policy and the visibility boost.

pub mod los;
mod strategy;

pub use strategy::{SkewStrategy, determine_strategy};

use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::{DynamicConfig, FREQ_RARELY, FilterMode, Settings};
use crate::elevation::ElevationProvider;
use crate::flight_stage::FlightStage;
use crate::geometry::{feet_to_meters, haversine_distance_km};
use crate::jobs::{Job, JobGuard, Resettable};
use crate::narrator::Narrator;
use crate::poi::{Poi, PoiManager};
use crate::telemetry::Telemetry;

use los::SightPoint;

/// Scored rankings are only trusted this close to where the scorer ran
const STALE_SCORE_KM: f64 = 10.0;
/// How many ranked candidates to pull per selection
const CANDIDATE_LIMIT: usize = 1000;
/// Stop LOS-checking once this many candidates are visible
const VISIBLE_LIMIT: usize = 3;
/// Urgency swap: a contender must rank within this fraction of the top
const URGENCY_RANKING_FRACTION: f64 = 0.7;
/// Urgency swap: only POIs about to slip behind within this window
const URGENCY_WINDOW_SECS: f64 = 300.0;
/// Visibility boost step per empty selection attempt
const BOOST_STEP: f64 = 0.1;
/// Minimum AGL for boost bumps and essay fall-through, feet
const BOOST_MIN_AGL_FT: f64 = 500.0;
const ESSAY_MIN_AGL_FT: f64 = 2000.0;

/// Per-tick selection cache key. Any field change invalidates the cached
/// choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SelectionKey {
    lat_bits: u64,
    lon_bits: u64,
    alt_bits: u64,
    playing: bool,
    generating: bool,
    min_score_bits: Option<u64>,
}

impl SelectionKey {
    fn new(t: &Telemetry, playing: bool, generating: bool, min_score: Option<f64>) -> Self {
        Self {
            lat_bits: t.latitude.to_bits(),
            lon_bits: t.longitude.to_bits(),
            alt_bits: t.altitude_msl_feet.to_bits(),
            playing,
            generating,
            min_score_bits: min_score.map(f64::to_bits),
        }
    }
}

pub struct NarrationJob {
    pois: Arc<dyn PoiManager>,
    narrator: Arc<dyn Narrator>,
    elevation: Option<Arc<dyn ElevationProvider>>,
    tracker: Arc<crate::flight_stage::StageTracker>,
    settings: Arc<Settings>,
    dynamic: Arc<DynamicConfig>,
    guard: JobGuard,
    last_narration: Mutex<Option<DateTime<Utc>>>,
    last_essay: Mutex<Option<DateTime<Utc>>>,
    selection_cache: Mutex<Option<(SelectionKey, Option<Poi>)>>,
}

impl NarrationJob {
    pub fn new(
        pois: Arc<dyn PoiManager>,
        narrator: Arc<dyn Narrator>,
        elevation: Option<Arc<dyn ElevationProvider>>,
        tracker: Arc<crate::flight_stage::StageTracker>,
        settings: Arc<Settings>,
        dynamic: Arc<DynamicConfig>,
    ) -> Self {
        Self {
            pois,
            narrator,
            elevation,
            tracker,
            settings,
            dynamic,
            guard: JobGuard::new(),
            last_narration: Mutex::new(None),
            last_essay: Mutex::new(None),
            selection_cache: Mutex::new(None),
        }
    }

    /// Whether the narrator is ready to take another auto narration,
    /// applying the frequency-dependent lead-time policy when playback is
    /// in progress.
    async fn narrator_ready(&self, frequency: u8) -> bool {
        if self.narrator.is_paused() {
            return false;
        }
        if self.narrator.is_generating() {
            return false;
        }
        if !self.narrator.is_playing() {
            return true;
        }
        if self.narrator.has_staged_auto() {
            // The pipeline already holds the next narrative
            return false;
        }

        // Playing: only the chattier frequencies may pipeline, and only
        // close enough to the end that generation finishes just in time
        let Some(multiplier) = self.dynamic.lead_multiplier(frequency) else {
            return false;
        };
        let remaining = self.narrator.remaining().as_secs_f64();
        let avg_latency = self.narrator.average_latency().as_secs_f64();
        let ready = remaining <= multiplier * avg_latency;
        if !ready {
            trace!(
                remaining = format!("{remaining:.1}"),
                avg_latency = format!("{avg_latency:.1}"),
                "too early to pipeline"
            );
        }
        ready
    }

    fn playable(&self, poi: &Poi, now: DateTime<Utc>) -> bool {
        !self.narrator.is_poi_busy(&poi.id)
            && poi.repeat_ttl_expired(now, self.settings.repeat_ttl())
    }

    /// Select the best visible candidate, or `None` when nothing is
    /// eligible. Results are cached per (position, narrator state,
    /// threshold) so repeated evaluation within one tick is free.
    async fn visible_candidate(
        &self,
        t: &Telemetry,
        min_score: Option<f64>,
        frequency: u8,
    ) -> Result<Option<Poi>> {
        let key = SelectionKey::new(
            t,
            self.narrator.is_playing(),
            self.narrator.is_generating(),
            min_score,
        );
        if let Some((cached_key, cached)) = &*self.selection_cache.lock().expect("cache poisoned")
            && *cached_key == key
        {
            return Ok(cached.clone());
        }

        let candidates = self
            .pois
            .narration_candidates(CANDIDATE_LIMIT, min_score, t.on_ground)
            .await?;
        let now = t.timestamp;

        let los_elevation = self
            .elevation
            .as_ref()
            .filter(|_| self.settings.line_of_sight);
        let choice = if let Some(elevation) = los_elevation {
            let mut visible: Vec<Poi> = Vec::new();

            for poi in candidates {
                if visible.len() >= VISIBLE_LIMIT {
                    break;
                }
                if poi.is_deferred || !self.playable(&poi, now) {
                    continue;
                }
                // "Rarely" admits only isolated high scorers
                if frequency == FREQ_RARELY
                    && determine_strategy(self.pois.as_ref(), &poi, t.on_ground).await
                        != SkewStrategy::MaxSkew
                {
                    continue;
                }

                let poi_ground_m = match elevation.elevation_at(poi.latitude, poi.longitude).await {
                    Ok(Some(g)) => g,
                    Ok(None) | Err(_) => 0.0,
                };
                let aircraft = SightPoint {
                    latitude: t.latitude,
                    longitude: t.longitude,
                    altitude_m: feet_to_meters(t.altitude_msl_feet),
                };
                let target = SightPoint {
                    latitude: poi.latitude,
                    longitude: poi.longitude,
                    altitude_m: poi_ground_m,
                };
                if los::is_visible(
                    elevation.as_ref(),
                    aircraft,
                    target,
                    self.settings.los_step_km,
                    self.settings.los_tolerance_m,
                )
                .await
                {
                    visible.push(poi);
                } else {
                    trace!(poi = %poi.name, "candidate occluded by terrain");
                }
            }

            Self::pick_with_urgency(visible)
        } else {
            candidates
                .into_iter()
                .find(|poi| !poi.is_deferred && self.playable(poi, now))
        };

        *self.selection_cache.lock().expect("cache poisoned") = Some((key, choice.clone()));
        Ok(choice)
    }

    /// Top candidate by ranking, swapped for a near-equal contender that
    /// is about to slip behind the aircraft.
    fn pick_with_urgency(visible: Vec<Poi>) -> Option<Poi> {
        let top_ranking = visible.first()?.ranking();
        let urgent = |poi: &Poi| {
            matches!(poi.time_to_behind, Some(s) if s > 0.0 && s < URGENCY_WINDOW_SECS)
        };

        if !urgent(&visible[0]) {
            if let Some(contender) = visible
                .iter()
                .skip(1)
                .find(|poi| poi.ranking() >= URGENCY_RANKING_FRACTION * top_ranking && urgent(poi))
            {
                debug!(poi = %contender.name, "urgency swap");
                return Some(contender.clone());
            }
        }
        visible.into_iter().next()
    }

    /// Essay fall-through: only fills genuine quiet gaps at altitude.
    async fn try_essay(&self, cancel: &CancellationToken, t: &Telemetry, frequency: u8) -> bool {
        if !self.settings.essay_enabled || frequency == FREQ_RARELY {
            return false;
        }
        if t.altitude_agl_feet < ESSAY_MIN_AGL_FT {
            return false;
        }
        let now = t.timestamp;

        if let Some(last_essay) = *self.last_essay.lock().expect("essay clock poisoned")
            && now.signed_duration_since(last_essay).num_seconds()
                < self.settings.essay_delay_between_secs
        {
            return false;
        }

        let quiet_secs = match *self.last_narration.lock().expect("narration clock poisoned") {
            Some(last) => now.signed_duration_since(last).num_seconds(),
            None => i64::MAX,
        };
        if quiet_secs < self.settings.essay_delay_before_secs {
            return false;
        }
        if quiet_secs < 2 * self.settings.pause_duration_secs {
            return false;
        }

        let flight_secs = self.tracker.flight_duration_secs();
        if flight_secs < self.settings.essay_delay_before_secs {
            return false;
        }

        if self.narrator.play_essay(cancel, t).await {
            info!("essay narration fired");
            counter!("narration.essays_total").increment(1);
            *self.last_essay.lock().expect("essay clock poisoned") = Some(now);
            *self.last_narration.lock().expect("narration clock poisoned") = Some(now);
            true
        } else {
            false
        }
    }

    async fn bump_visibility_boost(&self, t: &Telemetry) {
        if t.altitude_agl_feet < BOOST_MIN_AGL_FT {
            return;
        }
        let boost = self.dynamic.visibility_boost().await;
        if boost < 1.5 {
            let bumped = (boost + BOOST_STEP).min(1.5);
            if let Err(e) = self.dynamic.set_visibility_boost(bumped).await {
                debug!("visibility boost write failed: {}", e);
            } else {
                debug!(boost = format!("{bumped:.1}"), "visibility boost raised");
            }
        }
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        t: &Telemetry,
        poi: &Poi,
    ) -> Result<()> {
        let strategy = determine_strategy(self.pois.as_ref(), poi, t.on_ground).await;

        if self.narrator.is_playing() {
            self.narrator
                .prepare_next_narrative(cancel, &poi.id, strategy, t)
                .await?;
            debug!(poi = %poi.name, ?strategy, "next narrative pipelined");
        } else {
            self.narrator
                .play_poi(cancel, &poi.id, false, false, t, strategy)
                .await?;
            info!(poi = %poi.name, ?strategy, "poi narration fired");
        }
        counter!("narration.poi_firings_total").increment(1);

        *self.last_narration.lock().expect("narration clock poisoned") = Some(t.timestamp);
        // A successful firing means the threshold was loose enough
        if let Err(e) = self.dynamic.set_visibility_boost(1.0).await {
            debug!("visibility boost reset failed: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl Job for NarrationJob {
    fn name(&self) -> &'static str {
        "narration"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        if !self.settings.auto_narrate {
            return false;
        }
        if !matches!(
            t.stage,
            FlightStage::TakeOff
                | FlightStage::Airborne
                | FlightStage::Climb
                | FlightStage::Cruise
                | FlightStage::Descend
        ) {
            return false;
        }
        // Post-take-off grace: let the climb-out breathe
        self.tracker.flight_duration_secs() >= self.settings.takeoff_delay_secs
    }

    async fn run(&self, cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        // Stale-score guard: rankings computed far away are meaningless
        match self.pois.last_scored_position() {
            Some((lat, lon)) => {
                let drift_km = haversine_distance_km(lat, lon, t.latitude, t.longitude);
                if drift_km > STALE_SCORE_KM {
                    trace!(
                        drift_km = format!("{drift_km:.1}"),
                        "scorer position stale, skipping"
                    );
                    return Ok(());
                }
            }
            None => return Ok(()),
        }

        let frequency = self.dynamic.narration_frequency().await;
        if !self.narrator_ready(frequency).await {
            return Ok(());
        }

        let min_score = match self.dynamic.filter_mode().await {
            FilterMode::Adaptive => None,
            FilterMode::Fixed => {
                let boost = self.dynamic.visibility_boost().await;
                Some(self.dynamic.min_poi_score().await / boost)
            }
        };

        match self.visible_candidate(t, min_score, frequency).await? {
            Some(poi) => self.dispatch(cancel, t, &poi).await,
            None => {
                self.bump_visibility_boost(t).await;
                self.try_essay(cancel, t, frequency).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Resettable for NarrationJob {
    fn name(&self) -> &'static str {
        "narration"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        *self.last_narration.lock().expect("narration clock poisoned") = None;
        *self.last_essay.lock().expect("essay clock poisoned") = None;
        *self.selection_cache.lock().expect("cache poisoned") = None;
        if let Err(e) = self.dynamic.set_visibility_boost(1.0).await {
            debug!("visibility boost reset failed: {}", e);
        }
    }
}
