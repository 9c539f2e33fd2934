//! Monotonic wall-clock source and RFC3339/RFC3339Nano timestamp handling.
//!
//! All timestamps in the system are UTC. The parser accepts both RFC3339
//! and RFC3339Nano forms; the builder always emits the most precise form
//! the source value actually carries (no spurious trailing zero digits).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A UTC instant, serialized on the wire as RFC3339 (with nanosecond
/// precision when present).
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

/// Error returned when a timestamp string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timestamp: {0}")]
pub struct ParseTimestampError(pub String);

impl Timestamp {
    /// Wrap a `chrono` UTC instant.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse an RFC3339 or RFC3339Nano timestamp string.
    pub fn parse(s: &str) -> Result<Self, ParseTimestampError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|_| ParseTimestampError(s.to_owned()))
    }

    /// Render in the most precise RFC3339 form this instant actually carries
    /// (no trailing zero subsecond digits), matching the builder contract.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// The underlying `chrono` instant.
    #[must_use]
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_rfc3339())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Source of the current wall-clock time, injectable so tests can control
/// "now" without sleeping.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(Utc::now())
    }
}
