//! Companion assembly: wires collaborators, jobs and announcements into a
//! ready-to-start scheduler.
//!
//! Hosts construct the collaborators (sim connector, POI manager,
//! narrator, composer, store, geocoder, elevation), hand them to the
//! builder, and get back a scheduler with everything registered in the
//! canonical order. Startup restoration runs inside `build` so the stage
//! machine and trip log are seeded before the first tick.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::announcements::{
    AnnouncementManager, BriefingAnnouncement, DebriefAnnouncement, LetsgoAnnouncement,
};
use crate::config::{DynamicConfig, Settings};
use crate::elevation::ElevationProvider;
use crate::flight_stage::StageTracker;
use crate::jobs::border::BorderJob;
use crate::jobs::eviction::EvictionJob;
use crate::jobs::regional_categories::{
    CategorySuggester, RegionalCategoriesJob, WikidataClient,
};
use crate::jobs::river::RiverJob;
use crate::jobs::screenshot::{ScreenshotJob, ScreenshotWatcher};
use crate::jobs::session_persist::SessionPersistenceJob;
use crate::jobs::transponder::TransponderJob;
use crate::location::{AirportLocator, LocationProvider};
use crate::narration::NarrationJob;
use crate::narrator::{NarrativeComposer, Narrator};
use crate::poi::PoiManager;
use crate::scheduler::Scheduler;
use crate::session::{RestoreOutcome, TripLog, restore_session};
use crate::store::StateStore;
use crate::telemetry::{SimConnector, TelemetrySink};

pub struct Collaborators {
    pub sim: Arc<dyn SimConnector>,
    pub sink: Arc<dyn TelemetrySink>,
    pub narrator: Arc<dyn Narrator>,
    pub composer: Arc<dyn NarrativeComposer>,
    pub pois: Arc<dyn PoiManager>,
    pub locations: Arc<dyn LocationProvider>,
    pub airports: Arc<dyn AirportLocator>,
    pub elevation: Option<Arc<dyn ElevationProvider>>,
    pub store: Arc<dyn StateStore>,
    pub suggester: Arc<dyn CategorySuggester>,
    pub wikidata: Arc<dyn WikidataClient>,
}

/// Assemble the companion core. Returns the scheduler plus the shared
/// trip log and stage tracker for host surfaces that want to render them.
pub async fn build(
    settings: Arc<Settings>,
    collaborators: Collaborators,
) -> Result<(Scheduler, Arc<TripLog>, Arc<StageTracker>)> {
    let trip = Arc::new(TripLog::new());
    let tracker = Arc::new(StageTracker::new(Arc::clone(&trip)));
    // Jobs reason about the position one minute out
    collaborators
        .sim
        .set_prediction_window(std::time::Duration::from_secs(60));
    let dynamic = Arc::new(DynamicConfig::new(
        Arc::clone(&collaborators.store),
        Arc::clone(&settings),
    ));

    // Startup restoration: seed the trip log and the take-off stamp from
    // the persisted session unless it is stale
    let (outcome, snapshot) = restore_session(
        collaborators.store.as_ref(),
        &trip,
        Utc::now(),
        chrono::Duration::hours(settings.stale_session_hours),
    )
    .await?;
    if outcome == RestoreOutcome::Restored
        && let Some(takeoff_at) = snapshot.and_then(|s| s.takeoff_at)
    {
        tracker.seed_takeoff(takeoff_at);
    }

    let announcements = AnnouncementManager::new(
        Arc::clone(&collaborators.composer),
        Arc::clone(&collaborators.narrator),
        Arc::clone(&trip),
    );
    announcements
        .register(Arc::new(LetsgoAnnouncement::new(Arc::clone(&tracker))))
        .await;
    announcements
        .register(Arc::new(BriefingAnnouncement::new(
            Arc::clone(&tracker),
            Arc::clone(&collaborators.airports),
            Arc::clone(&settings),
        )))
        .await;
    announcements
        .register(Arc::new(DebriefAnnouncement::new(
            Arc::clone(&tracker),
            Arc::clone(&trip),
        )))
        .await;

    let narration = Arc::new(NarrationJob::new(
        Arc::clone(&collaborators.pois),
        Arc::clone(&collaborators.narrator),
        collaborators.elevation.clone(),
        Arc::clone(&tracker),
        Arc::clone(&settings),
        Arc::clone(&dynamic),
    ));
    let border = Arc::new(BorderJob::new(
        Arc::clone(&collaborators.locations),
        Arc::clone(&collaborators.narrator),
        Arc::clone(&trip),
        Arc::clone(&settings),
    ));
    let persistence = Arc::new(SessionPersistenceJob::new(
        Arc::clone(&collaborators.store),
        Arc::clone(&trip),
        Arc::clone(&tracker),
    ));

    let mut scheduler = Scheduler::new(
        collaborators.sim,
        collaborators.sink,
        Arc::clone(&tracker),
        Arc::clone(&settings),
    );

    // Jobs fire in registration order within a tick
    scheduler.add_job(Arc::new(TransponderJob::new(
        Arc::clone(&collaborators.narrator),
        Arc::clone(&dynamic),
        Arc::clone(&settings),
    )));
    scheduler.add_job(Arc::new(announcements.clone()));
    scheduler.add_job(Arc::clone(&narration) as Arc<dyn crate::jobs::Job>);
    scheduler.add_job(Arc::clone(&border) as Arc<dyn crate::jobs::Job>);
    match ScreenshotWatcher::new(&settings.screenshot_dirs) {
        Ok(watcher) => {
            scheduler.add_job(Arc::new(ScreenshotJob::new(
                Arc::new(watcher),
                Arc::clone(&collaborators.narrator),
            )));
        }
        Err(e) => warn!("screenshot watcher unavailable: {}", e),
    }
    scheduler.add_job(Arc::new(EvictionJob::new(
        Arc::clone(&collaborators.pois),
        Arc::clone(&settings),
    )));
    scheduler.add_job(Arc::new(RiverJob::new(Arc::clone(&collaborators.pois))));
    scheduler.add_job(Arc::new(RegionalCategoriesJob::new(
        Arc::clone(&collaborators.locations),
        Arc::clone(&collaborators.suggester),
        Arc::clone(&collaborators.wikidata),
    )));
    scheduler.add_job(Arc::clone(&persistence) as Arc<dyn crate::jobs::Job>);

    // Teleport resets, in registration order
    scheduler.add_resettable(Arc::clone(&tracker) as Arc<dyn crate::jobs::Resettable>);
    scheduler.add_resettable(Arc::clone(&trip) as Arc<dyn crate::jobs::Resettable>);
    scheduler.add_resettable(Arc::new(announcements));
    scheduler.add_resettable(narration);
    scheduler.add_resettable(border);
    scheduler.add_resettable(persistence);

    info!("companion core assembled");
    Ok((scheduler, trip, tracker))
}
