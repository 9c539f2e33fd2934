//! Cursor codec: `"<ts>:<seq>"` wire format and total order over `(ts, seq)`.
//!
//! The empty string is a valid cursor meaning "beginning of stream" and
//! decodes to `("", 0)`. A cursor with an empty timestamp half (`":<seq>"`)
//! is used for streams that carry no timestamp semantics of their own.

use gasoline_core::clock::Timestamp;
use gasoline_core::errors::GasolineError;
use std::cmp::Ordering;

/// A parsed `(timestamp, sequence)` cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// The timestamp half, absent for sequence-only cursors.
    pub timestamp: Option<Timestamp>,
    /// The sequence half.
    pub sequence: i64,
}

impl Cursor {
    /// The cursor denoting "beginning of stream".
    #[must_use]
    pub fn beginning() -> Self {
        Self {
            timestamp: None,
            sequence: 0,
        }
    }

    /// Build the wire-format string for this cursor.
    #[must_use]
    pub fn build(timestamp: Option<Timestamp>, sequence: i64) -> String {
        match timestamp {
            Some(ts) => format!("{}:{sequence}", ts.to_rfc3339()),
            None => format!(":{sequence}"),
        }
    }

    /// The wire-format string for this cursor value.
    #[must_use]
    pub fn to_wire(self) -> String {
        Self::build(self.timestamp, self.sequence)
    }

    /// Parse a wire-format cursor string.
    ///
    /// Splits on the **last** `:` so an RFC3339 timestamp (which itself may
    /// contain no `:` in its date portion but always does in its time
    /// portion) is not confused with the sequence separator. The empty
    /// string parses to `("", 0)` without error.
    pub fn parse(s: &str) -> Result<Self, GasolineError> {
        if s.is_empty() {
            return Ok(Self::beginning());
        }
        let idx = s
            .rfind(':')
            .ok_or_else(|| GasolineError::invalid_cursor(s))?;
        let (ts_part, seq_part) = (&s[..idx], &s[idx + 1..]);
        let sequence: i64 = seq_part
            .parse()
            .map_err(|_| GasolineError::invalid_cursor(s))?;
        let timestamp = if ts_part.is_empty() {
            None
        } else {
            Some(Timestamp::parse(ts_part).map_err(|_| GasolineError::invalid_cursor(s))?)
        };
        Ok(Self { timestamp, sequence })
    }

    /// Total order: timestamp first (cursors with no timestamp sort before
    /// those with one), sequence breaks ties.
    #[must_use]
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        match (&self.timestamp, &other.timestamp) {
            (Some(a), Some(b)) => a.cmp(b).then(self.sequence.cmp(&other.sequence)),
            (None, None) => self.sequence.cmp(&other.sequence),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }

    /// Trichotomy helper: is `self` strictly older than `other`?
    #[must_use]
    pub fn is_older(&self, other: &Self) -> bool {
        self.cmp_order(other) == Ordering::Less
    }

    /// Trichotomy helper: is `self` strictly newer than `other`?
    #[must_use]
    pub fn is_newer(&self, other: &Self) -> bool {
        self.cmp_order(other) == Ordering::Greater
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_order(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_order(other)
    }
}
