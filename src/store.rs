//! Key-value store contract and the in-memory implementation.
//!
//! Dynamic configuration (`narration_frequency`, `filter_mode`,
//! `min_poi_score`, `visibility_boost`, `text_length`) lives in the store
//! so that the transponder job and the arbitration engine observe each
//! other's writes without direct wiring. Concurrent writes to the same key
//! are last-writer-wins.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// Store keys used by the core
pub mod keys {
    pub const NARRATION_FREQUENCY: &str = "narration_frequency";
    pub const FILTER_MODE: &str = "filter_mode";
    pub const MIN_POI_SCORE: &str = "min_poi_score";
    pub const VISIBILITY_BOOST: &str = "visibility_boost";
    pub const TEXT_LENGTH: &str = "text_length";
    pub const SESSION_CONTEXT: &str = "session_context";
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, key: &str) -> Result<Option<String>>;
    async fn set_state(&self, key: &str, value: &str) -> Result<()>;
}

/// DashMap-backed store for tests and headless embedding
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
