//! Offline log analysis: how good are the narration duration predictions?
//!
//! Reads playback-completion lines from the server log and prints, per
//! narration, the logged prediction against the actual duration, plus a
//! recomputed prediction from the observed words-per-second rate across
//! the whole log. Not part of the live runtime; the averages at the
//! bottom are what you compare when tuning the duration model.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, PartialEq)]
struct PlaybackRecord {
    time: String,
    name: String,
    words: u32,
    predicted_s: f64,
    actual_s: f64,
}

impl PlaybackRecord {
    fn rate(&self) -> f64 {
        if self.actual_s > 0.0 {
            self.words as f64 / self.actual_s
        } else {
            0.0
        }
    }
}

fn parse_log(raw: &str) -> Vec<PlaybackRecord> {
    let pattern = Regex::new(
        r#"(?P<time>\d{2}:\d{2}:\d{2})\S*\s.*playback finished.*name="(?P<name>[^"]*)".*words=(?P<words>\d+).*predicted_s=(?P<pred>[0-9.]+).*actual_s=(?P<actual>[0-9.]+)"#,
    )
    .expect("static pattern");

    raw.lines()
        .filter_map(|line| {
            let caps = pattern.captures(line)?;
            Some(PlaybackRecord {
                time: caps["time"].to_string(),
                name: caps["name"].to_string(),
                words: caps["words"].parse().ok()?,
                predicted_s: caps["pred"].parse().ok()?,
                actual_s: caps["actual"].parse().ok()?,
            })
        })
        .collect()
}

fn render(records: &[PlaybackRecord]) -> String {
    if records.is_empty() {
        return "no playback records found".to_string();
    }

    // Fit a single words-per-second rate over the whole log; that is the
    // candidate replacement for the logged per-narration model
    let mean_rate = {
        let rates: Vec<f64> = records.iter().map(PlaybackRecord::rate).collect();
        rates.iter().sum::<f64>() / rates.len() as f64
    };

    let mut out = String::new();
    out.push_str(&format!(
        "{:<10} {:<28} {:>6} {:>6} {:>8} {:>9} {:>9} {:>9} {:>9}\n",
        "time", "name", "words", "rate", "actual", "old-pred", "old-diff", "new-pred", "new-diff"
    ));

    let mut old_err_sum = 0.0;
    let mut new_err_sum = 0.0;
    for r in records {
        let new_pred = r.words as f64 / mean_rate;
        let old_diff = r.predicted_s - r.actual_s;
        let new_diff = new_pred - r.actual_s;
        old_err_sum += old_diff.abs();
        new_err_sum += new_diff.abs();

        let mut name = r.name.clone();
        if name.len() > 28 {
            name.truncate(27);
            name.push('…');
        }
        out.push_str(&format!(
            "{:<10} {:<28} {:>6} {:>6.2} {:>8.1} {:>9.1} {:>+9.1} {:>9.1} {:>+9.1}\n",
            r.time, name, r.words, r.rate(), r.actual_s, r.predicted_s, old_diff, new_pred, new_diff
        ));
    }

    let n = records.len() as f64;
    out.push_str(&format!(
        "\n{} narrations, mean rate {:.2} words/s\n",
        records.len(),
        mean_rate
    ));
    out.push_str(&format!(
        "avg abs error: old {:.1} s, new {:.1} s\n",
        old_err_sum / n,
        new_err_sum / n
    ));
    out
}

pub fn run(log_path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(log_path)
        .with_context(|| format!("reading {}", log_path.display()))?;
    Ok(render(&parse_log(&raw)))
}
