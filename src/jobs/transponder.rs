//! Transponder watcher: the squawk code doubles as a control surface.
//!
//! Codes of the form `7dfv` adjust narration settings from inside the
//! cockpit (d = frequency, f = text length, v = visibility boost), and a
//! rising edge on the ident button drives the configured playback action.
//! Writes go through the store so the arbitration engine observes them on
//! its next read without any direct wiring.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{DynamicConfig, IdentAction, Settings};
use crate::jobs::{Job, JobGuard};
use crate::narrator::Narrator;
use crate::telemetry::Telemetry;

/// Decoded `7dfv` control code
#[derive(Debug, Clone, Copy, PartialEq)]
struct ControlCode {
    /// 0 disables auto narration; 1-4 select the frequency preset
    frequency: u8,
    /// Text length preset 1-5
    text_length: u8,
    /// Visibility boost preset 1-5, mapped onto 1.0-1.5
    visibility: u8,
}

impl ControlCode {
    fn parse(squawk: u16) -> Option<Self> {
        let digits = format!("{squawk:04}");
        let bytes = digits.as_bytes();
        if bytes.len() != 4 || bytes[0] != b'7' {
            return None;
        }
        let d = (bytes[1] - b'0') as u8;
        let f = (bytes[2] - b'0') as u8;
        let v = (bytes[3] - b'0') as u8;
        if d > 4 || !(1..=5).contains(&f) || !(1..=5).contains(&v) {
            return None;
        }
        Some(Self {
            frequency: d,
            text_length: f,
            visibility: v,
        })
    }

    fn visibility_boost(&self) -> f64 {
        1.0 + (self.visibility - 1) as f64 * 0.125
    }
}

pub struct TransponderJob {
    narrator: Arc<dyn Narrator>,
    dynamic: Arc<DynamicConfig>,
    settings: Arc<Settings>,
    guard: JobGuard,
    last_squawk: Mutex<Option<u16>>,
    last_ident: AtomicBool,
}

impl TransponderJob {
    pub fn new(
        narrator: Arc<dyn Narrator>,
        dynamic: Arc<DynamicConfig>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            narrator,
            dynamic,
            settings,
            guard: JobGuard::new(),
            last_squawk: Mutex::new(None),
            last_ident: AtomicBool::new(false),
        }
    }

    async fn apply_code(&self, code: ControlCode) -> Result<()> {
        if code.frequency == 0 {
            // Frequency digit 0 parks auto narration at the quietest preset
            info!("transponder: narration muted");
            self.dynamic.set_narration_frequency(1).await?;
        } else {
            self.dynamic.set_narration_frequency(code.frequency).await?;
        }
        self.dynamic.set_text_length(code.text_length).await?;
        self.dynamic
            .set_visibility_boost(code.visibility_boost())
            .await?;
        info!(
            frequency = code.frequency,
            text_length = code.text_length,
            boost = format!("{:.3}", code.visibility_boost()),
            "transponder control code applied"
        );
        Ok(())
    }

    fn apply_ident(&self) {
        match self.settings.ident_action {
            IdentAction::Pause => {
                if self.narrator.is_paused() {
                    self.narrator.resume();
                } else {
                    self.narrator.pause();
                }
            }
            IdentAction::Stop => self.narrator.stop(),
            IdentAction::Skip => self.narrator.skip(),
        }
        info!(action = ?self.settings.ident_action, "ident pressed");
    }
}

#[async_trait]
impl Job for TransponderJob {
    fn name(&self) -> &'static str {
        "transponder"
    }

    fn guard(&self) -> &JobGuard {
        &self.guard
    }

    fn should_fire(&self, t: &Telemetry) -> bool {
        let squawk_changed = {
            let last = self.last_squawk.lock().expect("squawk state poisoned");
            *last != Some(t.squawk)
        };
        let ident_rising = t.ident && !self.last_ident.load(Ordering::Acquire);
        squawk_changed || ident_rising
    }

    async fn run(&self, _cancel: &CancellationToken, t: &Telemetry) -> Result<()> {
        let squawk_changed = {
            let mut last = self.last_squawk.lock().expect("squawk state poisoned");
            let changed = *last != Some(t.squawk);
            *last = Some(t.squawk);
            changed
        };
        let ident_rising = t.ident && !self.last_ident.swap(t.ident, Ordering::AcqRel);

        if squawk_changed {
            match ControlCode::parse(t.squawk) {
                Some(code) => self.apply_code(code).await?,
                None => debug!(squawk = t.squawk, "squawk changed, not a control code"),
            }
        }

        if ident_rising {
            self.apply_ident();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_codes() {
        let code = ControlCode::parse(7235).unwrap();
        assert_eq!(code.frequency, 2);
        assert_eq!(code.text_length, 3);
        assert_eq!(code.visibility, 5);
        assert!((code.visibility_boost() - 1.5).abs() < 1e-9);

        let code = ControlCode::parse(7011).unwrap();
        assert_eq!(code.frequency, 0);
        assert!((code.visibility_boost() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_control_codes() {
        assert_eq!(ControlCode::parse(1200), None, "VFR squawk");
        assert_eq!(ControlCode::parse(7500), None, "d out of range");
        assert_eq!(ControlCode::parse(7061), None, "f out of range");
        assert_eq!(ControlCode::parse(7016), None, "v out of range");
        assert_eq!(ControlCode::parse(7230), None, "v zero");
    }

    #[test]
    fn boost_mapping_spans_the_range() {
        for (v, expected) in [(1, 1.0), (2, 1.125), (3, 1.25), (4, 1.375), (5, 1.5)] {
            let code = ControlCode {
                frequency: 1,
                text_length: 1,
                visibility: v,
            };
            assert!((code.visibility_boost() - expected).abs() < 1e-9);
        }
    }
}
