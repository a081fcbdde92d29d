//! Stream keys and per-stream lifecycle records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Minimum accepted length of an externally supplied stream key.
pub const MIN_STREAM_KEY_LEN: usize = 3;
/// Maximum accepted length of an externally supplied stream key.
pub const MAX_STREAM_KEY_LEN: usize = 64;

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// A sanitized stream key.
///
/// Every character outside `[A-Za-z0-9_-]` of the raw key is replaced with
/// `_`. This is the only identity used for lookups, output directory names
/// and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    /// Sanitize a raw key. Pure and deterministic.
    pub fn sanitize(raw: &str) -> Self {
        Self(
            raw.chars()
                .map(|c| if is_safe_char(c) { c } else { '_' })
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an externally supplied stream key.
///
/// Accepts only `[A-Za-z0-9_-]` with a length between
/// [`MIN_STREAM_KEY_LEN`] and [`MAX_STREAM_KEY_LEN`].
pub fn validate_stream_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("stream key is required".into()));
    }
    if !key.chars().all(is_safe_char) {
        return Err(Error::Validation(
            "stream key may only contain letters, digits, '_' and '-'".into(),
        ));
    }
    let len = key.chars().count();
    if !(MIN_STREAM_KEY_LEN..=MAX_STREAM_KEY_LEN).contains(&len) {
        return Err(Error::Validation(format!(
            "stream key must be between {MIN_STREAM_KEY_LEN} and {MAX_STREAM_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// Extract the stream key from an ingest path such as `/live/alpha`.
///
/// The key is the last non-empty path segment.
pub fn extract_stream_key(stream_path: &str) -> Result<String> {
    stream_path
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("Invalid stream path".into()))
}

/// Lifecycle status of a stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Stopped,
    Error,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Active => "active",
            StreamStatus::Stopped => "stopped",
            StreamStatus::Error => "error",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory record of one stream, keyed by its sanitized key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub stream_key: StreamKey,
    /// The raw key the current record was started with.
    pub raw_key: String,
    pub status: StreamStatus,
    pub profile: String,
    pub start_time: DateTime<Utc>,
}

impl StreamRecord {
    /// A fresh `active` record starting now.
    pub fn active(stream_key: StreamKey, raw_key: &str, profile: &str) -> Self {
        Self {
            stream_key,
            raw_key: raw_key.to_string(),
            status: StreamStatus::Active,
            profile: profile.to_string(),
            start_time: Utc::now(),
        }
    }

    /// Seconds elapsed since the stream started.
    pub fn duration_secs(&self) -> f64 {
        let elapsed = Utc::now() - self.start_time;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}
