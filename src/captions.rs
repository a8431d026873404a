/*!
 * Caption cue model and SRT ingestion.
 *
 * A caption track is an ordered `Vec<CaptionCue>`. The order is the display
 * order and is preserved by everything downstream, including cache keys.
 */

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::CaptionError;

static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timestamp pattern is valid")
});

/// One timed text span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Displayed text, may contain line breaks
    pub text: String,
}

impl CaptionCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Check `0 <= start < end` with finite bounds
    pub fn validate(&self, index: usize) -> Result<(), CaptionError> {
        let valid = self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.end > self.start;
        if valid {
            Ok(())
        } else {
            Err(CaptionError::InvalidTiming {
                index,
                start: self.start,
                end: self.end,
            })
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Parse an `HH:MM:SS,mmm` timestamp into seconds
    pub fn parse_timestamp(timestamp: &str) -> Result<f64, CaptionError> {
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();
        if parts.len() != 4 {
            return Err(CaptionError::InvalidTimestamp(timestamp.to_string()));
        }

        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| CaptionError::InvalidTimestamp(timestamp.to_string()))
        };
        let hours = parse(parts[0])?;
        let minutes = parse(parts[1])?;
        let seconds = parse(parts[2])?;
        let millis = parse(parts[3])?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(CaptionError::InvalidTimestamp(timestamp.to_string()));
        }

        let total_ms = hours
            .checked_mul(3_600_000)
            .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
            .ok_or_else(|| CaptionError::InvalidTimestamp(timestamp.to_string()))?;
        Ok(total_ms as f64 / 1000.0)
    }

    /// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
    pub fn format_timestamp(seconds: f64) -> String {
        let ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let secs = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }
}

impl fmt::Display for CaptionCue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} --> {} {}",
            Self::format_timestamp(self.start),
            Self::format_timestamp(self.end),
            self.text
        )
    }
}

/// Validate every cue of a track, reporting the first offender
pub fn validate_cues(cues: &[CaptionCue]) -> Result<(), CaptionError> {
    cues.iter()
        .enumerate()
        .try_for_each(|(index, cue)| cue.validate(index))
}

/// Parse SRT content into cues in display order
///
/// Malformed blocks are skipped with a warning; an input without a single
/// usable cue is an error.
pub fn parse_srt(content: &str) -> Result<Vec<CaptionCue>, CaptionError> {
    let mut cues = Vec::new();
    let mut timing: Option<(f64, f64)> = None;
    let mut text = String::new();

    let mut flush = |timing: &mut Option<(f64, f64)>, text: &mut String| {
        if let Some((start, end)) = timing.take() {
            let cue = CaptionCue::new(start, end, text.trim());
            if cue.text.is_empty() {
                warn!("Skipping empty caption cue at {}", CaptionCue::format_timestamp(start));
            } else if let Err(e) = cue.validate(cues.len()) {
                warn!("Skipping caption cue: {}", e);
            } else {
                cues.push(cue);
            }
        }
        text.clear();
    };

    for (line_number, line) in content.lines().enumerate() {
        let trimmed = line.trim().trim_start_matches('\u{feff}');

        if trimmed.is_empty() {
            flush(&mut timing, &mut text);
            continue;
        }

        if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
            flush(&mut timing, &mut text);
            timing = Some((captured_seconds(&caps, 1), captured_seconds(&caps, 5)));
            continue;
        }

        if timing.is_none() {
            // Sequence numbers and stray lines before a timing line
            if trimmed.parse::<usize>().is_err() {
                debug!("Ignoring line {} outside a cue: {}", line_number + 1, trimmed);
            }
            continue;
        }

        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(trimmed);
    }
    flush(&mut timing, &mut text);

    if cues.is_empty() {
        return Err(CaptionError::Empty("no timed text blocks".to_string()));
    }

    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(cues)
}

/// Read and parse an SRT file
pub fn load_srt(path: &Path) -> Result<Vec<CaptionCue>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read captions from {}", path.display()))?;
    let cues = parse_srt(&content)
        .with_context(|| format!("Failed to parse captions from {}", path.display()))?;
    debug!("Loaded {} caption cues from {}", cues.len(), path.display());
    Ok(cues)
}

fn captured_seconds(caps: &regex::Captures, start_idx: usize) -> f64 {
    let field = |offset: usize| -> u64 {
        caps.get(start_idx + offset)
            .map_or(0, |m| m.as_str().parse().unwrap_or(0))
    };
    let ms = (field(0) * 3600 + field(1) * 60 + field(2)) * 1000 + field(3);
    ms as f64 / 1000.0
}
