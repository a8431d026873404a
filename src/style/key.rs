/*!
 * Content keys for rendered previews.
 *
 * A key covers exactly what changes the rendered artifact: the cues in display
 * order and the whitelisted style projection. The canonical JSON pre-image is
 * injective over that projection; SHA-256 keeps the key fixed-width without a
 * realistic chance of two different styles sharing an entry.
 */

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::captions::CaptionCue;

use super::{NativeStyle, StyleDescriptor};

/// Opaque, deterministic preview cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the key, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct CanonicalCue<'a>(f64, f64, &'a str);

#[derive(Serialize)]
struct CanonicalInput<'a> {
    cues: Vec<CanonicalCue<'a>>,
    style: NativeStyle,
}

/// Canonical string the key is derived from
pub fn canonical_form(cues: &[CaptionCue], style: &StyleDescriptor) -> String {
    let input = CanonicalInput {
        cues: cues
            .iter()
            .map(|cue| CanonicalCue(zero_sign(cue.start), zero_sign(cue.end), &cue.text))
            .collect(),
        style: style.to_native(),
    };
    // Plain structs of strings, numbers and JSON values always serialize
    serde_json::to_string(&input).unwrap_or_default()
}

/// Derive the cache key for a caption track rendered in a style
pub fn compute_key(cues: &[CaptionCue], style: &StyleDescriptor) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(cues, style).as_bytes());
    CacheKey(format!("{:x}", hasher.finalize()))
}

fn zero_sign(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}
