//! Narrative model and the contracts to the narrator and the narrative
//! composer.
//!
//! The narrator owns text generation, TTS and audio playback; it is
//! internally synchronized (single writer for playback). The core treats
//! its predicates as observables and its commands as atomic. The composer
//! is the generation half used by the announcement lifecycle: it produces
//! a narrative without playing it, so an announcement can be prepared long
//! before its play window opens.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::narration::SkewStrategy;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKind {
    Poi,
    Letsgo,
    Briefing,
    Debrief,
    Border,
    Screenshot,
    Essay,
}

/// A generated narration: text plus its rendered audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narrative {
    pub id: String,
    pub text: String,
    /// Opaque handle to the rendered audio (file path or cache key)
    pub audio: String,
    pub duration: Duration,
    pub poi_id: Option<String>,
    pub kind: NarrativeKind,
}

#[async_trait]
pub trait Narrator: Send + Sync {
    // Observable predicates
    fn is_paused(&self) -> bool;
    fn is_active(&self) -> bool;
    fn is_playing(&self) -> bool;
    fn is_generating(&self) -> bool;
    /// Whether a pipelined auto narrative is already staged
    fn has_staged_auto(&self) -> bool;
    /// Whether the pipeline is already working on this POI
    fn is_poi_busy(&self, poi_id: &str) -> bool;

    // Temporal queries
    /// Time left in the current playback; zero when idle
    fn remaining(&self) -> Duration;
    /// EWMA of recent generation latencies
    fn average_latency(&self) -> Duration;

    // Commands
    async fn play_poi(
        &self,
        cancel: &CancellationToken,
        poi_id: &str,
        manual: bool,
        enqueue: bool,
        telemetry: &Telemetry,
        strategy: SkewStrategy,
    ) -> Result<()>;

    /// Pipelining path: start generating the next narrative so it is ready
    /// when the current playback ends
    async fn prepare_next_narrative(
        &self,
        cancel: &CancellationToken,
        poi_id: &str,
        strategy: SkewStrategy,
        telemetry: &Telemetry,
    ) -> Result<()>;

    async fn play_essay(&self, cancel: &CancellationToken, telemetry: &Telemetry) -> bool;

    async fn play_image(
        &self,
        cancel: &CancellationToken,
        path: &Path,
        telemetry: &Telemetry,
    ) -> Result<()>;

    async fn play_border(
        &self,
        cancel: &CancellationToken,
        from: &str,
        to: &str,
        telemetry: &Telemetry,
    ) -> bool;

    /// Play a narrative prepared by the composer (announcement playback)
    async fn play_narrative(
        &self,
        cancel: &CancellationToken,
        narrative: Narrative,
        telemetry: &Telemetry,
    ) -> bool;

    fn pause(&self);
    fn resume(&self);
    fn skip(&self);
    fn stop(&self);
}

/// Generation request for the composer
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub announcement_id: String,
    pub kind: NarrativeKind,
    pub telemetry: Telemetry,
    /// Prompt context (trip summary and similar), assembled by the caller
    pub context: String,
}

#[async_trait]
pub trait NarrativeComposer: Send + Sync {
    async fn compose(
        &self,
        cancel: &CancellationToken,
        request: ComposeRequest,
    ) -> Result<Narrative>;
}
