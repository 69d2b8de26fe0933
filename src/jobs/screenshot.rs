//! Screenshot watcher: narrate freshly captured images.
//!
//! A filesystem watcher pushes newly created image paths into a bounded
//! channel; the job drains one per tick and hands it to the narrator,
//! preempting normal arbitration flow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::jobs::{Job, JobGuard};
use crate::narrator::Narrator;
use crate::telemetry::Telemetry;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];
const QUEUE_CAPACITY: usize = 16;

/// Source of newly captured screenshots. The notify-backed watcher is the
/// production implementation; tests push paths directly.
pub trait ScreenshotSource: Send + Sync {
    /// Next new image, if one appeared since the last poll
    fn poll_new_image(&self) -> Option<PathBuf>;
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Watches a set of directories for created image files
pub struct ScreenshotWatcher {
    // Kept alive for the life of the watcher; dropping it stops events.
    // Behind a mutex because the job shares the watcher across tasks.
    _watcher: std::sync::Mutex<RecommendedWatcher>,
    rx: std::sync::Mutex<mpsc::Receiver<PathBuf>>,
}

impl ScreenshotWatcher {
    pub fn new(directories: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<Event>| match event {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if is_image(&path) {
                            // Queue full means the job is behind; dropping
                            // the oldest screenshots is acceptable
                            let _ = tx.try_send(path);
                        }
                    }
                }
                Err(e) => debug!("screenshot watch error: {}", e),
            })?;

        for dir in directories {
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                warn!(dir = %dir.display(), "cannot watch screenshot directory: {}", e);
            } else {
                info!(dir = %dir.display(), "watching for screenshots");
            }
        }

        Ok(Self {
            _watcher: std::sync::Mutex::new(watcher),
            rx: std::sync::Mutex::new(rx),
        })
    }
}

impl ScreenshotSource for ScreenshotWatcher {
    fn poll_new_image(&self) -> Option<PathBuf> {
        self.rx
            .lock()
            .expect("screenshot queue poisoned")
            .try_recv()
            .ok()
    }
}

pub struct ScreenshotJob {
    source: Arc<dyn ScreenshotSource>,
    narrator: Arc<dyn Narrator>,
    guard: JobGuard,
}

impl ScreenshotJob {
    pub fn new(source: Arc<dyn ScreenshotSource>, narrator: Arc<dyn Narrator>) -> Self {
        Self {
            source,
            narrator,
            guard: JobGuard::new(),
        }
    }
}

#[async_trait]
impl Job for ScreenshotJob {
    fn name(&self) -> &'static str {
        "screenshot"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, _t: &Telemetry) -> bool {
        true
    }

    async fn run(&self, cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let Some(path) = self.source.poll_new_image() else {
            return Ok(());
        };
        info!(path = %path.display(), "narrating new screenshot");
        self.narrator.play_image(cancel, &path, t).await
    }
}
