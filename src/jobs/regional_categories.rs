//! Locale-appropriate Wikidata category discovery.
//!
//! Far from home, the static ontology misses locally interesting things
//! (onsen in Japan, ghost towns in Nevada). On a coarse distance/time
//! cadence the job asks the category suggester (an LLM collaborator) for
//! ontological and topographical Wikidata classes fitting the current
//! region, validates the QIDs, prunes anything the static ontology
//! already covers, and caches the result per degree cell. Cache hits skip
//! the suggester and only re-hydrate human-readable labels.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use moka::sync::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::geometry::nm_to_km;
use crate::jobs::{DistanceGate, Job, JobGuard, TimeGate};
use crate::location::{LocationInfo, LocationProvider};
use crate::telemetry::Telemetry;

/// Travel distance between refreshes
const PERIOD_NM: f64 = 50.0;
/// Minimum time between refreshes
const PERIOD_MINS: i64 = 30;
/// Degree cells kept in the spatial cache
const CACHE_CELLS: u64 = 512;

/// Wikidata classes the static ontology already scores everywhere;
/// suggesting them again is redundant
const STATIC_ONTOLOGY_QIDS: &[&str] = &[
    "Q8502",   // mountain
    "Q23397",  // lake
    "Q4022",   // river
    "Q33837",  // archipelago
    "Q39594",  // waterfall
    "Q8514",   // desert
    "Q1437459", // national park
    "Q23413",  // castle
    "Q16560",  // palace
    "Q570116", // tourist attraction
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// Classes of man-made or cultural entities
    Ontological,
    /// Classes of terrain features
    Topographical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalCategory {
    pub qid: String,
    pub label: String,
    pub kind: CategoryKind,
}

/// LLM collaborator: suggest Wikidata classes for a region
#[async_trait]
pub trait CategorySuggester: Send + Sync {
    async fn suggest_categories(
        &self,
        cancel: &CancellationToken,
        location: &LocationInfo,
    ) -> Result<Vec<RegionalCategory>>;
}

/// Wikidata label hydration for cached QIDs
#[async_trait]
pub trait WikidataClient: Send + Sync {
    async fn labels(
        &self,
        cancel: &CancellationToken,
        qids: &[String],
    ) -> Result<Vec<RegionalCategory>>;
}

type DegreeCell = (i32, i32);

fn cell_of(latitude: f64, longitude: f64) -> DegreeCell {
    (latitude.floor() as i32, longitude.floor() as i32)
}

pub struct RegionalCategoriesJob {
    locations: Arc<dyn LocationProvider>,
    suggester: Arc<dyn CategorySuggester>,
    wikidata: Arc<dyn WikidataClient>,
    distance_gate: DistanceGate,
    time_gate: TimeGate,
    guard: JobGuard,
    qid_pattern: Regex,
    /// Per-degree cache of validated QIDs
    cells: Cache<DegreeCell, Arc<Vec<RegionalCategory>>>,
}

impl RegionalCategoriesJob {
    pub fn new(
        locations: Arc<dyn LocationProvider>,
        suggester: Arc<dyn CategorySuggester>,
        wikidata: Arc<dyn WikidataClient>,
    ) -> Self {
        Self {
            locations,
            suggester,
            wikidata,
            distance_gate: DistanceGate::new(nm_to_km(PERIOD_NM)),
            time_gate: TimeGate::new(chrono::Duration::minutes(PERIOD_MINS)),
            guard: JobGuard::new(),
            qid_pattern: Regex::new(r"^Q\d+$").expect("static pattern"),
            cells: Cache::builder().max_capacity(CACHE_CELLS).build(),
        }
    }

    /// Current categories for a position, if the cell has been filled
    pub fn categories_for(&self, latitude: f64, longitude: f64) -> Option<Arc<Vec<RegionalCategory>>> {
        self.cells.get(&cell_of(latitude, longitude))
    }

    /// Drop malformed QIDs and classes the static ontology already covers
    fn sanitize(&self, suggestions: Vec<RegionalCategory>) -> Vec<RegionalCategory> {
        suggestions
            .into_iter()
            .filter(|c| {
                if !self.qid_pattern.is_match(&c.qid) {
                    debug!(qid = %c.qid, "discarding malformed QID");
                    return false;
                }
                if STATIC_ONTOLOGY_QIDS.contains(&c.qid.as_str()) {
                    debug!(qid = %c.qid, "redundant against static ontology");
                    return false;
                }
                true
            })
            .collect()
    }
}

#[async_trait]
impl Job for RegionalCategoriesJob {
    fn name(&self) -> &'static str {
        "regional_categories"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        // Both cadences must be due: distance keeps a fast jet from
        // refreshing too often, time keeps a holding pattern from doing so
        if !self.distance_gate.is_due(t.latitude, t.longitude) {
            return false;
        }
        if !self.time_gate.is_due(t.timestamp) {
            return false;
        }
        self.distance_gate.mark(t.latitude, t.longitude);
        self.time_gate.mark(t.timestamp);
        true
    }

    async fn run(&self, cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let cell = cell_of(t.latitude, t.longitude);

        if let Some(cached) = self.cells.get(&cell) {
            // Cache hit: no LLM round-trip, just refresh the labels
            let qids: Vec<String> = cached.iter().map(|c| c.qid.clone()).collect();
            match self.wikidata.labels(cancel, &qids).await {
                Ok(hydrated) if !hydrated.is_empty() => {
                    debug!(?cell, count = hydrated.len(), "labels re-hydrated");
                    self.cells.insert(cell, Arc::new(hydrated));
                }
                Ok(_) => {}
                Err(e) => debug!("label hydration failed: {}", e),
            }
            return Ok(());
        }

        let location = match self.locations.get_location(t.latitude, t.longitude).await {
            Ok(l) => l,
            Err(e) => {
                debug!("reverse geocode failed, skipping category refresh: {}", e);
                return Ok(());
            }
        };

        let suggestions = match self.suggester.suggest_categories(cancel, &location).await {
            Ok(s) => s,
            Err(e) => {
                debug!("category suggestion failed: {}", e);
                return Ok(());
            }
        };

        let categories = self.sanitize(suggestions);
        info!(
            ?cell,
            country = %location.country_code,
            count = categories.len(),
            "regional categories cached"
        );
        counter!("regional_categories.refreshes_total").increment(1);
        self.cells.insert(cell, Arc::new(categories));
        Ok(())
    }
}
