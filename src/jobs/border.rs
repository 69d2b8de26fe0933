//! Border-crossing detection and narration.
//!
//! Reverse-geocodes the current position on a short period and compares
//! against the last known location. Country changes always count;
//! admin-1 changes only over land and only when both sides are properly
//! named, which keeps wilderness and coastline noise out. Every detected
//! crossing lands in the trip log, even when playback is suppressed.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::jobs::{Job, JobGuard, Resettable, TimeGate};
use crate::location::{LocationInfo, LocationProvider};
use crate::narrator::Narrator;
use crate::session::{TripEventKind, TripLog};
use crate::telemetry::Telemetry;

/// Geocoding period, seconds
const CHECK_PERIOD_SECS: i64 = 10;

/// A detected crossing, ready for narration
#[derive(Debug, Clone, PartialEq)]
struct Crossing {
    from: String,
    to: String,
}

pub struct BorderJob {
    locations: Arc<dyn LocationProvider>,
    narrator: Arc<dyn Narrator>,
    trip: Arc<TripLog>,
    settings: Arc<Settings>,
    gate: TimeGate,
    guard: JobGuard,
    last_location: Mutex<Option<LocationInfo>>,
    /// Last emission of any crossing (global cooldown)
    last_any: Mutex<Option<DateTime<Utc>>>,
    /// Last emission per "from->to" pair (repeat cooldown)
    pair_history: DashMap<String, DateTime<Utc>>,
}

impl BorderJob {
    pub fn new(
        locations: Arc<dyn LocationProvider>,
        narrator: Arc<dyn Narrator>,
        trip: Arc<TripLog>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            locations,
            narrator,
            trip,
            settings,
            gate: TimeGate::new(chrono::Duration::seconds(CHECK_PERIOD_SECS)),
            guard: JobGuard::new(),
            last_location: Mutex::new(None),
            last_any: Mutex::new(None),
            pair_history: DashMap::new(),
        }
    }

    /// Classify a location change. Country changes always qualify;
    /// admin-1 changes are suppressed over water and when either side
    /// lacks a city or admin-1 name.
    fn detect_crossing(last: &LocationInfo, current: &LocationInfo) -> Option<Crossing> {
        if last.country_code != current.country_code {
            return Some(Crossing {
                from: last.display_country().to_string(),
                to: current.display_country().to_string(),
            });
        }

        if last.admin1 != current.admin1 {
            if last.zone.is_water() || current.zone.is_water() {
                return None;
            }
            if last.city.is_empty()
                || current.city.is_empty()
                || last.admin1.is_empty()
                || current.admin1.is_empty()
            {
                return None;
            }
            return Some(Crossing {
                from: last.admin1.clone(),
                to: current.admin1.clone(),
            });
        }

        None
    }

    /// Global and per-pair cooldowns. Both are checked against the
    /// narration emission history, not the detection history.
    fn cooldown_passed(&self, crossing: &Crossing, now: DateTime<Utc>) -> bool {
        if let Some(last) = *self.last_any.lock().expect("border cooldown poisoned")
            && now.signed_duration_since(last).num_seconds() < self.settings.border_cooldown_any_secs
        {
            debug!(
                from = %crossing.from,
                to = %crossing.to,
                "crossing suppressed by global cooldown"
            );
            return false;
        }

        let pair_key = format!("{}->{}", crossing.from, crossing.to);
        if let Some(last) = self.pair_history.get(&pair_key)
            && now.signed_duration_since(*last).num_seconds()
                < self.settings.border_cooldown_repeat_secs
        {
            debug!(pair = %pair_key, "crossing suppressed by repeat cooldown");
            return false;
        }

        true
    }

    fn mark_emitted(&self, crossing: &Crossing, now: DateTime<Utc>) {
        *self.last_any.lock().expect("border cooldown poisoned") = Some(now);
        self.pair_history
            .insert(format!("{}->{}", crossing.from, crossing.to), now);
    }
}

#[async_trait]
impl Job for BorderJob {
    fn name(&self) -> &'static str {
        "border"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        self.gate.fire_if_due(t.timestamp)
    }

    async fn run(&self, cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let current = match self.locations.get_location(t.latitude, t.longitude).await {
            Ok(info) => info,
            Err(e) => {
                debug!("reverse geocode failed, skipping: {}", e);
                return Ok(());
            }
        };

        let last = {
            let mut slot = self.last_location.lock().expect("border location poisoned");
            match slot.as_ref() {
                None => {
                    *slot = Some(current);
                    return Ok(());
                }
                Some(last) => last.clone(),
            }
        };

        let Some(crossing) = Self::detect_crossing(&last, &current) else {
            *self.last_location.lock().expect("border location poisoned") = Some(current);
            return Ok(());
        };

        // A detected crossing always advances the location, emission or
        // not; otherwise the same border replays on every period
        *self.last_location.lock().expect("border location poisoned") = Some(current);

        let now = t.timestamp;
        if !self.cooldown_passed(&crossing, now) {
            return Ok(());
        }

        counter!("border.crossings_total").increment(1);
        self.trip.record(
            now,
            TripEventKind::Activity,
            "Border Crossing",
            &format!("{} to {}", crossing.from, crossing.to),
        );
        self.mark_emitted(&crossing, now);

        if self.narrator.is_paused() {
            debug!(
                from = %crossing.from,
                to = %crossing.to,
                "narrator paused, crossing logged without playback"
            );
            return Ok(());
        }

        info!(from = %crossing.from, to = %crossing.to, "border crossing narration");
        if !self
            .narrator
            .play_border(cancel, &crossing.from, &crossing.to, t)
            .await
        {
            debug!("narrator declined border narration");
        }
        Ok(())
    }
}

#[async_trait]
impl Resettable for BorderJob {
    fn name(&self) -> &'static str {
        "border"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        *self.last_location.lock().expect("border location poisoned") = None;
        *self.last_any.lock().expect("border cooldown poisoned") = None;
        self.pair_history.clear();
        self.gate.reset();
    }
}
