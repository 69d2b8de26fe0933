//! Border-crossing scenarios: maritime transit, cooldown suppression and
//! the paused-narrator path.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use skylark::narrator::Narrator;

use common::{RecordingNarrator, ScriptedLocations, cruise_at};
use skylark::config::Settings;
use skylark::jobs::Job;
use skylark::jobs::border::BorderJob;
use skylark::location::{LocationInfo, Zone};
use skylark::session::TripLog;

fn location(country: &str, name: &str, admin1: &str, city: &str, zone: Zone) -> LocationInfo {
    LocationInfo {
        country_code: country.to_string(),
        country_name: name.to_string(),
        admin1: admin1.to_string(),
        city: city.to_string(),
        zone,
    }
}

struct Fixture {
    job: BorderJob,
    narrator: Arc<RecordingNarrator>,
    locations: Arc<ScriptedLocations>,
    trip: Arc<TripLog>,
}

fn fixture(settings: Settings) -> Fixture {
    let narrator = Arc::new(RecordingNarrator::new());
    let locations = Arc::new(ScriptedLocations::new());
    let trip = Arc::new(TripLog::new());
    let job = BorderJob::new(
        locations.clone(),
        narrator.clone(),
        trip.clone(),
        Arc::new(settings),
    );
    Fixture {
        job,
        narrator,
        locations,
        trip,
    }
}

#[tokio::test]
async fn maritime_transit() {
    let f = fixture(Settings::default());
    let cancel = CancellationToken::new();

    f.locations.set(
        49.5,
        -1.0,
        location("FR", "France", "Normandie", "Cherbourg", Zone::Land),
    );
    f.locations.set(
        49.9,
        -1.5,
        location("FR", "France", "Normandie", "Cherbourg", Zone::Territorial),
    );
    f.locations
        .set(50.5, -3.0, location("XZ", "", "", "", Zone::International));
    f.locations.set(
        50.9,
        -4.5,
        location("UK", "United Kingdom", "", "", Zone::Eez),
    );

    // Departure over land
    f.job.run(&cancel, &cruise_at(49.5, -1.0, 0)).await.unwrap();
    assert!(f.narrator.events().is_empty());

    // Still France, just territorial waters: no trigger
    f.job.run(&cancel, &cruise_at(49.9, -1.5, 120)).await.unwrap();
    assert!(f.narrator.events().is_empty());

    // Into international waters
    f.job.run(&cancel, &cruise_at(50.5, -3.0, 240)).await.unwrap();
    assert_eq!(
        f.narrator.events(),
        vec!["border:France->International Waters"]
    );

    // Into the UK EEZ
    f.job.run(&cancel, &cruise_at(50.9, -4.5, 360)).await.unwrap();
    assert_eq!(
        f.narrator.events(),
        vec![
            "border:France->International Waters",
            "border:International Waters->United Kingdom",
        ]
    );

    // One trip event per emitted crossing
    let titles: Vec<String> = f.trip.events().iter().map(|e| e.title.clone()).collect();
    assert_eq!(titles, vec!["Border Crossing", "Border Crossing"]);
}

#[tokio::test]
async fn cooldowns_suppress_and_recover() {
    let settings = Settings {
        border_cooldown_any_secs: 60,
        border_cooldown_repeat_secs: 300,
        ..Settings::default()
    };
    let f = fixture(settings);
    let cancel = CancellationToken::new();

    f.locations.set(
        47.0,
        8.0,
        location("FR", "France", "Alsace", "Colmar", Zone::Land),
    );
    f.locations.set(
        47.0,
        9.0,
        location("DE", "Germany", "Saarland", "Saarbrücken", Zone::Land),
    );
    f.locations.set(
        47.0,
        10.0,
        location("IT", "Italy", "Piemonte", "Torino", Zone::Land),
    );

    // Baseline, then France -> Germany fires at t=0
    f.job.run(&cancel, &cruise_at(47.0, 8.0, -20)).await.unwrap();
    f.job.run(&cancel, &cruise_at(47.0, 9.0, 0)).await.unwrap();
    assert_eq!(f.narrator.events(), vec!["border:France->Germany"]);

    // Germany -> Italy at t=30: inside the global cooldown
    f.job.run(&cancel, &cruise_at(47.0, 10.0, 30)).await.unwrap();
    assert_eq!(f.narrator.events().len(), 1);

    // Italy -> Germany at t=120: global expired, pair fresh
    f.job.run(&cancel, &cruise_at(47.0, 9.0, 120)).await.unwrap();
    assert_eq!(f.narrator.events().len(), 2);

    // Germany -> Italy at t=200: the t=30 suppression left no pair mark,
    // so only the global cooldown applies, and it has expired
    f.job.run(&cancel, &cruise_at(47.0, 10.0, 200)).await.unwrap();
    assert_eq!(f.narrator.events().len(), 3);

    // Italy -> Germany at t=290: emitted at t=120, 170 s ago; the repeat
    // cooldown (300 s) suppresses it even though the global one passed
    f.job.run(&cancel, &cruise_at(47.0, 9.0, 290)).await.unwrap();
    assert_eq!(f.narrator.events().len(), 3);

    // Germany -> Italy at t=530: pair emitted at t=200, 330 s ago; fires
    f.job.run(&cancel, &cruise_at(47.0, 10.0, 530)).await.unwrap();
    assert_eq!(f.narrator.events().len(), 4);
}

#[tokio::test]
async fn paused_narrator_still_logs_and_advances() {
    let f = fixture(Settings::default());
    let cancel = CancellationToken::new();

    f.locations.set(
        47.0,
        8.0,
        location("FR", "France", "Alsace", "Colmar", Zone::Land),
    );
    f.locations.set(
        47.0,
        9.0,
        location("DE", "Germany", "Saarland", "Saarbrücken", Zone::Land),
    );

    f.job.run(&cancel, &cruise_at(47.0, 8.0, 0)).await.unwrap();

    f.narrator.pause();
    f.job.run(&cancel, &cruise_at(47.0, 9.0, 60)).await.unwrap();

    // Logged, but not played
    assert_eq!(f.trip.events().len(), 1);
    assert!(f.narrator.events().is_empty());

    // Unpausing must not replay the same crossing: the location already
    // advanced while paused
    f.narrator.resume();
    f.job.run(&cancel, &cruise_at(47.0, 9.0, 120)).await.unwrap();
    assert!(f.narrator.events().is_empty());
    assert_eq!(f.trip.events().len(), 1);
}

#[tokio::test]
async fn period_gate_limits_geocoding() {
    let f = fixture(Settings::default());

    assert!(f.job.should_fire(&cruise_at(47.0, 8.0, 0)));
    assert!(!f.job.should_fire(&cruise_at(47.0, 8.0, 5)));
    assert!(f.job.should_fire(&cruise_at(47.0, 8.0, 11)));
}
