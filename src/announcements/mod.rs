//! Announcement lifecycle: idle → generating → held → triggered →
//! done/missed.
//!
//! Announcements decouple generation latency from playback timing. The
//! manager asks each announcement's `should_generate` every tick and
//! kicks off composition early; the finished narrative is parked in the
//! held slot until `should_play` opens the window, at which point
//! playback fires at the exact moment.

mod briefing;
mod debrief;
mod letsgo;

pub use briefing::BriefingAnnouncement;
pub use debrief::DebriefAnnouncement;
pub use letsgo::LetsgoAnnouncement;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jobs::{Job, JobGuard, Resettable};
use crate::narrator::{ComposeRequest, Narrative, NarrativeComposer, NarrativeKind, Narrator};
use crate::session::TripLog;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementStatus {
    Idle,
    Generating,
    Held,
    Triggered,
    Done,
    Missed,
}

/// One announcement: gating predicates over telemetry plus identity.
/// Status and the held narrative live in the manager's slot, not here.
#[async_trait]
pub trait Announcement: Send + Sync {
    fn id(&self) -> &'static str;
    fn kind(&self) -> NarrativeKind;

    /// Repeatable announcements return to idle via external reset instead
    /// of completing
    fn repeatable(&self) -> bool {
        false
    }

    async fn should_generate(&self, telemetry: &Telemetry) -> bool;
    async fn should_play(&self, telemetry: &Telemetry) -> bool;

    /// Clear announcement-local state on session reset
    async fn reset(&self) {}
}

struct Slot {
    announcement: Arc<dyn Announcement>,
    status: Mutex<AnnouncementStatus>,
    held: Mutex<Option<Narrative>>,
}

impl Slot {
    fn status(&self) -> AnnouncementStatus {
        *self.status.lock().expect("announcement status poisoned")
    }

    fn set_status(&self, status: AnnouncementStatus) {
        *self.status.lock().expect("announcement status poisoned") = status;
    }
}

struct Inner {
    /// Registry: read during tick, exclusive only for register/reset
    slots: RwLock<Vec<Slot>>,
    composer: Arc<dyn NarrativeComposer>,
    narrator: Arc<dyn Narrator>,
    trip: Arc<TripLog>,
    last_telemetry: Mutex<Option<Telemetry>>,
}

impl Inner {
    /// Deposit a composition result. Covers the window-opened-while-
    /// generating case by triggering immediately when `should_play`
    /// already holds.
    async fn on_result(&self, cancel: &CancellationToken, id: &str, result: Result<Narrative>) {
        let slots = self.slots.read().await;
        let Some(slot) = slots.iter().find(|s| s.announcement.id() == id) else {
            warn!(id, "composition result for unknown announcement");
            return;
        };

        let narrative = match result {
            Ok(n) => n,
            Err(e) => {
                debug!(id, "composition failed, returning to idle: {:#}", e);
                slot.set_status(AnnouncementStatus::Idle);
                return;
            }
        };

        *slot.held.lock().expect("held slot poisoned") = Some(narrative);
        slot.set_status(AnnouncementStatus::Held);
        debug!(id, "narrative held");

        let telemetry = self
            .last_telemetry
            .lock()
            .expect("telemetry snapshot poisoned")
            .clone();
        if let Some(t) = telemetry
            && slot.announcement.should_play(&t).await
        {
            self.trigger(cancel, slot, &t).await;
        }
    }

    async fn trigger(&self, cancel: &CancellationToken, slot: &Slot, t: &Telemetry) {
        let narrative = slot.held.lock().expect("held slot poisoned").take();
        let Some(narrative) = narrative else {
            return;
        };
        let id = slot.announcement.id();
        if !self.narrator.play_narrative(cancel, narrative, t).await {
            debug!(id, "narrator declined announcement playback");
        } else {
            info!(id, "announcement played");
            counter!("announcements.played_total").increment(1);
        }
        slot.set_status(AnnouncementStatus::Triggered);
    }
}

/// Drives the lifecycle of all registered announcements; runs as a
/// scheduler job.
#[derive(Clone)]
pub struct AnnouncementManager {
    inner: Arc<Inner>,
    guard: Arc<JobGuard>,
}

impl AnnouncementManager {
    pub fn new(
        composer: Arc<dyn NarrativeComposer>,
        narrator: Arc<dyn Narrator>,
        trip: Arc<TripLog>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: RwLock::new(Vec::new()),
                composer,
                narrator,
                trip,
                last_telemetry: Mutex::new(None),
            }),
            guard: Arc::new(JobGuard::new()),
        }
    }

    pub async fn register(&self, announcement: Arc<dyn Announcement>) {
        info!(id = announcement.id(), "announcement registered");
        self.inner.slots.write().await.push(Slot {
            announcement,
            status: Mutex::new(AnnouncementStatus::Idle),
            held: Mutex::new(None),
        });
    }

    pub async fn status_of(&self, id: &str) -> Option<AnnouncementStatus> {
        let slots = self.inner.slots.read().await;
        slots
            .iter()
            .find(|s| s.announcement.id() == id)
            .map(|s| s.status())
    }

    /// Callback target for composition tasks; public for embedding hosts
    /// that run their own composer queue.
    pub async fn on_result(&self, cancel: &CancellationToken, id: &str, result: Result<Narrative>) {
        self.inner.on_result(cancel, id, result).await;
    }

    pub async fn tick(&self, cancel: &CancellationToken, t: &Telemetry) {
        *self
            .inner
            .last_telemetry
            .lock()
            .expect("telemetry snapshot poisoned") = Some(t.clone());

        let slots = self.inner.slots.read().await;
        for slot in slots.iter() {
            let announcement = &slot.announcement;
            match slot.status() {
                AnnouncementStatus::Idle => {
                    if announcement.should_generate(t).await {
                        slot.set_status(AnnouncementStatus::Generating);
                        debug!(id = announcement.id(), "generation requested");
                        counter!("announcements.generations_total").increment(1);

                        let inner = Arc::clone(&self.inner);
                        let cancel = cancel.clone();
                        let request = ComposeRequest {
                            announcement_id: announcement.id().to_string(),
                            kind: announcement.kind(),
                            telemetry: t.clone(),
                            context: self.inner.trip.summary(),
                        };
                        tokio::spawn(async move {
                            let id = request.announcement_id.clone();
                            let result = inner.composer.compose(&cancel, request).await;
                            inner.on_result(&cancel, &id, result).await;
                        });
                    } else if announcement.should_play(t).await {
                        // Play window opened before anything was generated
                        if !announcement.repeatable() {
                            debug!(id = announcement.id(), "window missed");
                            slot.set_status(AnnouncementStatus::Missed);
                        }
                    }
                }
                AnnouncementStatus::Generating => {}
                AnnouncementStatus::Held => {
                    if announcement.should_play(t).await {
                        self.inner.trigger(cancel, slot, t).await;
                    }
                }
                AnnouncementStatus::Triggered => {
                    if !announcement.repeatable() {
                        slot.set_status(AnnouncementStatus::Done);
                    }
                }
                AnnouncementStatus::Done | AnnouncementStatus::Missed => {}
            }
        }
    }
}

#[async_trait]
impl Job for AnnouncementManager {
    fn name(&self) -> &'static str {
        "announcements"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, _telemetry: &Telemetry) -> bool {
        true
    }

    async fn run(&self, cancel: &CancellationToken, telemetry: &Telemetry) -> Result<()> {
        self.tick(cancel, telemetry).await;
        Ok(())
    }
}

#[async_trait]
impl Resettable for AnnouncementManager {
    fn name(&self) -> &'static str {
        "announcements"
    }

    async fn reset_session(&self, _cancel: &CancellationToken) {
        let slots = self.inner.slots.write().await;
        for slot in slots.iter() {
            slot.set_status(AnnouncementStatus::Idle);
            *slot.held.lock().expect("held slot poisoned") = None;
            slot.announcement.reset().await;
        }
        info!("announcements reset");
    }
}
