//! End-to-end scheduler behavior: heartbeat, teleport reset ordering and
//! cooperative shutdown.

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use common::cruise_at;
use skylark::config::Settings;
use skylark::flight_stage::StageTracker;
use skylark::jobs::Resettable;
use skylark::scheduler::Scheduler;
use skylark::session::TripLog;
use skylark::telemetry::{NullSink, SimConnector, SimState, Telemetry};

/// Sim connector that replays a fixed route, then repeats the last fix
struct RouteSim {
    route: Mutex<Vec<Telemetry>>,
}

impl RouteSim {
    fn new(route: Vec<Telemetry>) -> Self {
        Self {
            route: Mutex::new(route),
        }
    }
}

#[async_trait]
impl SimConnector for RouteSim {
    async fn get_telemetry(&self, _cancel: &CancellationToken) -> Result<Telemetry> {
        let mut route = self.route.lock().unwrap();
        if route.len() > 1 {
            Ok(route.remove(0))
        } else {
            route
                .first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("route exhausted"))
        }
    }

    fn get_state(&self) -> SimState {
        SimState::Active
    }
}

struct OrderedResettable {
    name: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Resettable for OrderedResettable {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        self.order.lock().unwrap().push(self.name);
    }
}

#[tokio::test]
async fn teleport_resets_all_resettables_in_registration_order() {
    // London -> Heathrow -> New York, 100 km threshold: only the hop to
    // New York is a teleport
    let sim = Arc::new(RouteSim::new(vec![
        cruise_at(51.5074, -0.1278, 0),
        cruise_at(51.47, -0.4543, 1),
        cruise_at(40.7128, -74.006, 2),
    ]));
    let tracker = Arc::new(StageTracker::new(Arc::new(TripLog::new())));
    let settings = Settings {
        telemetry_loop_ms: 10,
        teleport_threshold_km: 100.0,
        ..Settings::default()
    };

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(sim, Arc::new(NullSink), tracker, Arc::new(settings));
    scheduler.add_resettable(Arc::new(OrderedResettable {
        name: "first",
        order: order.clone(),
    }));
    scheduler.add_resettable(Arc::new(OrderedResettable {
        name: "second",
        order: order.clone(),
    }));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.start(cancel.clone()));

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    cancel.cancel();
    handle.await.unwrap();

    // Exactly one teleport, resettables in registration order
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn cancellation_stops_the_heartbeat() {
    let sim = Arc::new(RouteSim::new(vec![cruise_at(47.0, 8.0, 0)]));
    let tracker = Arc::new(StageTracker::new(Arc::new(TripLog::new())));
    let settings = Settings {
        telemetry_loop_ms: 10,
        ..Settings::default()
    };
    let scheduler = Scheduler::new(sim, Arc::new(NullSink), tracker, Arc::new(settings));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.start(cancel.clone()));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancel.cancel();

    // The loop must exit promptly once cancelled
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}

#[tokio::test]
async fn stage_is_stamped_onto_fanned_out_telemetry() {
    use skylark::flight_stage::FlightStage;
    use skylark::telemetry::BroadcastSink;

    let sim = Arc::new(RouteSim::new(vec![cruise_at(47.0, 8.0, 0)]));
    let tracker = Arc::new(StageTracker::new(Arc::new(TripLog::new())));
    let settings = Settings {
        telemetry_loop_ms: 10,
        ..Settings::default()
    };
    let sink = Arc::new(BroadcastSink::new(16));
    let mut telemetry_rx = sink.subscribe_telemetry();

    let scheduler = Scheduler::new(sim, sink, tracker, Arc::new(settings));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.start(cancel.clone()));

    // First broadcast snapshot carries the machine-derived stage: the
    // first airborne sample is the synthetic mid-air take-off
    let first = tokio::time::timeout(std::time::Duration::from_secs(1), telemetry_rx.recv())
        .await
        .expect("no telemetry broadcast")
        .unwrap();
    assert_eq!(first.stage, FlightStage::TakeOff);

    cancel.cancel();
    handle.await.unwrap();
}
