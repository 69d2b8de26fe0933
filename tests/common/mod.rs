//! Shared in-memory collaborator fakes for the scenario tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use skylark::elevation::ElevationProvider;
use skylark::flight_stage::FlightStage;
use skylark::location::{LocationInfo, LocationProvider};
use skylark::narration::SkewStrategy;
use skylark::narrator::{Narrative, Narrator};
use skylark::poi::{LosStatus, Poi, PoiManager};
use skylark::telemetry::Telemetry;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn cruise_at(lat: f64, lon: f64, at_secs: i64) -> Telemetry {
    Telemetry {
        timestamp: t0() + chrono::Duration::seconds(at_secs),
        latitude: lat,
        longitude: lon,
        altitude_msl_feet: 6000.0,
        altitude_agl_feet: 4000.0,
        heading_degrees: 90.0,
        ground_speed_knots: 140.0,
        vertical_speed_fpm: 0.0,
        predicted_latitude: lat,
        predicted_longitude: lon + 0.05,
        on_ground: false,
        engine_on: true,
        stage: FlightStage::Cruise,
        autopilot: String::new(),
        squawk: 2000,
        ident: false,
    }
}

pub fn poi(id: &str, name: &str, lat: f64, lon: f64, score: f64, visibility: f64) -> Poi {
    Poi {
        id: id.to_string(),
        name: name.to_string(),
        latitude: lat,
        longitude: lon,
        category: "mountain".to_string(),
        score,
        visibility,
        last_played: None,
        is_deferred: false,
        los_status: LosStatus::Unknown,
        time_to_behind: None,
    }
}

/// Location provider scripted by quantized position
pub struct ScriptedLocations {
    by_position: Mutex<HashMap<(i64, i64), LocationInfo>>,
}

impl ScriptedLocations {
    pub fn new() -> Self {
        Self {
            by_position: Mutex::new(HashMap::new()),
        }
    }

    fn key(lat: f64, lon: f64) -> (i64, i64) {
        ((lat * 1000.0).round() as i64, (lon * 1000.0).round() as i64)
    }

    pub fn set(&self, lat: f64, lon: f64, info: LocationInfo) {
        self.by_position
            .lock()
            .unwrap()
            .insert(Self::key(lat, lon), info);
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocations {
    async fn get_location(&self, latitude: f64, longitude: f64) -> Result<LocationInfo> {
        self.by_position
            .lock()
            .unwrap()
            .get(&Self::key(latitude, longitude))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted location at ({latitude}, {longitude})"))
    }
}

/// Narrator fake: predicates are test-controlled, commands are recorded
pub struct RecordingNarrator {
    pub paused: AtomicBool,
    pub playing: AtomicBool,
    pub generating: AtomicBool,
    pub staged_auto: AtomicBool,
    pub remaining_ms: AtomicU64,
    pub avg_latency_ms: AtomicU64,
    pub events: Mutex<Vec<String>>,
}

impl RecordingNarrator {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            generating: AtomicBool::new(false),
            staged_auto: AtomicBool::new(false),
            remaining_ms: AtomicU64::new(0),
            avg_latency_ms: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Narrator for RecordingNarrator {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
    fn is_active(&self) -> bool {
        true
    }
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
    fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }
    fn has_staged_auto(&self) -> bool {
        self.staged_auto.load(Ordering::SeqCst)
    }
    fn is_poi_busy(&self, _poi_id: &str) -> bool {
        false
    }
    fn remaining(&self) -> Duration {
        Duration::from_millis(self.remaining_ms.load(Ordering::SeqCst))
    }
    fn average_latency(&self) -> Duration {
        Duration::from_millis(self.avg_latency_ms.load(Ordering::SeqCst))
    }

    async fn play_poi(
        &self,
        _cancel: &CancellationToken,
        poi_id: &str,
        _manual: bool,
        _enqueue: bool,
        _telemetry: &Telemetry,
        _strategy: SkewStrategy,
    ) -> Result<()> {
        self.record(format!("play_poi:{poi_id}"));
        Ok(())
    }

    async fn prepare_next_narrative(
        &self,
        _cancel: &CancellationToken,
        poi_id: &str,
        _strategy: SkewStrategy,
        _telemetry: &Telemetry,
    ) -> Result<()> {
        self.record(format!("prepare:{poi_id}"));
        Ok(())
    }

    async fn play_essay(&self, _cancel: &CancellationToken, _telemetry: &Telemetry) -> bool {
        self.record("essay".to_string());
        true
    }

    async fn play_image(
        &self,
        _cancel: &CancellationToken,
        path: &Path,
        _telemetry: &Telemetry,
    ) -> Result<()> {
        self.record(format!("image:{}", path.display()));
        Ok(())
    }

    async fn play_border(
        &self,
        _cancel: &CancellationToken,
        from: &str,
        to: &str,
        _telemetry: &Telemetry,
    ) -> bool {
        self.record(format!("border:{from}->{to}"));
        true
    }

    async fn play_narrative(
        &self,
        _cancel: &CancellationToken,
        narrative: Narrative,
        _telemetry: &Telemetry,
    ) -> bool {
        self.record(format!("narrative:{}", narrative.id));
        true
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }
    fn skip(&self) {
        self.record("skip".to_string());
    }
    fn stop(&self) {
        self.record("stop".to_string());
    }
}

/// POI manager fake over a fixed candidate list
pub struct FixedPois {
    pub candidates: Mutex<Vec<Poi>>,
    pub scored_position: Mutex<Option<(f64, f64)>>,
}

impl FixedPois {
    pub fn new(candidates: Vec<Poi>, scored_position: (f64, f64)) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            scored_position: Mutex::new(Some(scored_position)),
        }
    }

    pub fn mark_played(&self, id: &str, at: DateTime<Utc>) {
        let mut candidates = self.candidates.lock().unwrap();
        if let Some(poi) = candidates.iter_mut().find(|p| p.id == id) {
            poi.last_played = Some(at);
        }
    }
}

#[async_trait]
impl PoiManager for FixedPois {
    async fn narration_candidates(
        &self,
        limit: usize,
        min_score: Option<f64>,
        _on_ground: bool,
    ) -> Result<Vec<Poi>> {
        let mut candidates: Vec<Poi> = self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|p| min_score.is_none_or(|min| p.score >= min))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.ranking().total_cmp(&a.ranking()));
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn last_scored_position(&self) -> Option<(f64, f64)> {
        *self.scored_position.lock().unwrap()
    }

    async fn count_scored_above(&self, threshold: f64, limit: usize) -> usize {
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.score >= threshold)
            .take(limit)
            .count()
    }

    async fn prune_by_distance(
        &self,
        _latitude: f64,
        _longitude: f64,
        _heading: f64,
        _threshold_km: f64,
    ) -> usize {
        0
    }

    async fn update_rivers(
        &self,
        _cancel: &CancellationToken,
        _latitude: f64,
        _longitude: f64,
        _heading: f64,
    ) -> Result<Option<Poi>> {
        Ok(None)
    }
}

/// Terrain defined by a closure over (lat, lon)
pub struct FnTerrain<F>(pub F)
where
    F: Fn(f64, f64) -> Option<f64> + Send + Sync;

#[async_trait]
impl<F> ElevationProvider for FnTerrain<F>
where
    F: Fn(f64, f64) -> Option<f64> + Send + Sync,
{
    async fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<Option<f64>> {
        Ok((self.0)(latitude, longitude))
    }
}
