//! Point-of-interest model and the contract to the POI manager.
//!
//! The POI manager owns scoring and spatial indexing; the core only reads
//! ranked candidates and issues maintenance calls (pruning, river
//! hydration). Candidates arrive sorted by combined ranking descending.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Line-of-sight verdict cached on a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LosStatus {
    #[default]
    Unknown,
    Visible,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    /// Stable identifier (Wikidata QID or synthetic)
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: String,
    pub score: f64,
    pub visibility: f64,
    /// When this POI was last narrated; `None` = never
    pub last_played: Option<DateTime<Utc>>,
    /// Deferred POIs are parked for later (e.g. queued for enrichment)
    pub is_deferred: bool,
    pub los_status: LosStatus,
    /// Seconds until the POI slips behind the aircraft; `None` = not urgent
    pub time_to_behind: Option<f64>,
}

impl Poi {
    /// Combined ranking used for candidate ordering
    pub fn ranking(&self) -> f64 {
        self.score * self.visibility
    }

    /// Whether the per-POI repeat cooldown has expired
    pub fn repeat_ttl_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        match self.last_played {
            None => true,
            Some(at) => now.signed_duration_since(at) >= ttl,
        }
    }
}

#[async_trait]
pub trait PoiManager: Send + Sync {
    /// Ranked narration candidates above `min_score` (all scores when
    /// `None`), sorted by combined ranking descending
    async fn narration_candidates(
        &self,
        limit: usize,
        min_score: Option<f64>,
        on_ground: bool,
    ) -> Result<Vec<Poi>>;

    /// Position the scorer last ran at; used to reject stale rankings
    fn last_scored_position(&self) -> Option<(f64, f64)>;

    /// Number of scored POIs above `threshold`, capped at `limit`; feeds
    /// the skew-strategy decision
    async fn count_scored_above(&self, threshold: f64, limit: usize) -> usize;

    /// Drop POIs and cache tiles beyond `threshold_km` from the position,
    /// POIs only when behind the heading. Returns how many were pruned.
    async fn prune_by_distance(
        &self,
        latitude: f64,
        longitude: f64,
        heading: f64,
        threshold_km: f64,
    ) -> usize;

    /// Hydrate river geometry near the position
    async fn update_rivers(
        &self,
        cancel: &CancellationToken,
        latitude: f64,
        longitude: f64,
        heading: f64,
    ) -> Result<Option<Poi>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ranking_is_score_times_visibility() {
        let poi = Poi {
            id: "Q1".to_string(),
            name: "Test".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            category: "mountain".to_string(),
            score: 8.0,
            visibility: 0.5,
            last_played: None,
            is_deferred: false,
            los_status: LosStatus::Unknown,
            time_to_behind: None,
        };
        assert_eq!(poi.ranking(), 4.0);
    }

    #[test]
    fn repeat_ttl() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut poi = Poi {
            id: "Q1".to_string(),
            name: "Test".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            category: "mountain".to_string(),
            score: 8.0,
            visibility: 0.5,
            last_played: None,
            is_deferred: false,
            los_status: LosStatus::Unknown,
            time_to_behind: None,
        };
        let ttl = chrono::Duration::minutes(30);

        assert!(poi.repeat_ttl_expired(now, ttl), "never played");

        poi.last_played = Some(now - chrono::Duration::minutes(10));
        assert!(!poi.repeat_ttl_expired(now, ttl));

        poi.last_played = Some(now - chrono::Duration::minutes(31));
        assert!(poi.repeat_ttl_expired(now, ttl));
    }
}
