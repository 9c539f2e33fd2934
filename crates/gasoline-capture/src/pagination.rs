//! Generic `after`/`before`/`since` + `limit` pagination engine.
//!
//! Implemented once, generically, over anything with a `Cursor` capability,
//! keeping per-stream code to the serialization boundary only.

use crate::cursor::Cursor;
use gasoline_core::errors::GasolineError;
use serde::{Deserialize, Serialize};

/// Anything that can report its own position in the sequenced order.
pub trait Sequenced {
    /// This entry's cursor.
    fn cursor(&self) -> Cursor;
}

/// Which side of a cursor to filter on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Keep entries strictly older than the cursor (backward paging).
    After(Cursor),
    /// Keep entries strictly newer than the cursor.
    Before(Cursor),
    /// Keep entries at-or-newer than the cursor (inclusive streaming tail).
    Since(Cursor),
    /// No cursor: return the most recent `limit` entries.
    None,
}

/// Pagination request parameters, as accepted by every `observe` view.
#[derive(Clone, Debug, Default)]
pub struct PageRequest {
    /// Wire-format `after_cursor`, if given.
    pub after_cursor: Option<String>,
    /// Wire-format `before_cursor`, if given.
    pub before_cursor: Option<String>,
    /// Wire-format `since_cursor`, if given.
    pub since_cursor: Option<String>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// If true, a cursor pointing below the live window restarts from the
    /// oldest live entry instead of failing.
    pub restart_on_eviction: bool,
}

impl PageRequest {
    /// Parse the cursor fields into a single [`Filter`].
    ///
    /// At most one of `after_cursor`/`before_cursor`/`since_cursor` may be
    /// set; if more than one is present the first in that priority order
    /// wins (callers are expected to send at most one).
    pub fn filter(&self) -> Result<Filter, GasolineError> {
        if let Some(s) = &self.after_cursor {
            return Ok(Filter::After(Cursor::parse(s)?));
        }
        if let Some(s) = &self.before_cursor {
            return Ok(Filter::Before(Cursor::parse(s)?));
        }
        if let Some(s) = &self.since_cursor {
            return Ok(Filter::Since(Cursor::parse(s)?));
        }
        Ok(Filter::None)
    }
}

/// Metadata returned alongside every paginated read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageMeta {
    /// Number of entries returned.
    pub count: usize,
    /// Total entries currently live in the stream.
    pub total: usize,
    /// Whether more entries exist beyond what was returned.
    pub has_more: bool,
    /// Wire-format cursor pointing at the last entry returned, if any.
    pub cursor: Option<String>,
    /// RFC3339 timestamp of the oldest live entry, if the stream has any.
    pub oldest_timestamp: Option<String>,
    /// RFC3339 timestamp of the newest live entry, if the stream has any.
    pub newest_timestamp: Option<String>,
    /// Set when an expired cursor was transparently restarted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_restarted: Option<bool>,
    /// The original (now-expired) cursor, echoed back when restarted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_cursor: Option<String>,
    /// Human-readable note, set alongside a restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A page of results plus its metadata.
#[derive(Clone, Debug)]
pub struct Page<T> {
    /// The entries in this page, oldest first.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// Paginate `entries` (already the live snapshot, oldest first) applying
/// the filter/limit/expiry rules below.
///
/// `entries` must be sorted ascending by cursor order; this holds for any
/// ring snapshot since sequences are assigned monotonically at append time.
pub fn paginate<T: Clone + Sequenced>(
    entries: &[T],
    request: &PageRequest,
) -> Result<Page<T>, GasolineError> {
    let filter = request.filter()?;

    // Only `after` can be expired by eviction: it names a point the caller
    // has already consumed up to and asks to resume past it, so a cursor
    // below the live window means entries were evicted out from under it.
    // `before`/`since` name a floor to page down toward or up from — the
    // beginning sentinel (sequence 0) legitimately sits below a ring that
    // has never evicted anything, and that is not expiry.
    if let Filter::After(c) = filter {
        if let Some(first) = entries.first() {
            let oldest = first.cursor();
            if c.sequence < oldest.sequence {
                if request.restart_on_eviction {
                    return Ok(restart_from_oldest(entries, c));
                }
                return Err(GasolineError::CursorExpired {
                    requested: c.sequence,
                    oldest: oldest.sequence,
                });
            }
        }
    }

    let filtered: Vec<&T> = match filter {
        Filter::None => entries.iter().collect(),
        Filter::After(c) => entries.iter().filter(|e| e.cursor().is_older(&c)).collect(),
        Filter::Before(c) => entries.iter().filter(|e| e.cursor().is_newer(&c)).collect(),
        Filter::Since(c) => entries
            .iter()
            .filter(|e| !e.cursor().is_older(&c))
            .collect(),
    };

    let before_limit = filtered.len();
    let limit = request.limit.unwrap_or(before_limit);

    // No cursor and `after` both take the *last* `limit` of the filtered
    // set; `before`/`since`/restart take the *first*.
    let take_from_end = matches!(filter, Filter::None | Filter::After(_));
    let selected: Vec<T> = if take_from_end {
        filtered
            .iter()
            .rev()
            .take(limit)
            .rev()
            .map(|e| (*e).clone())
            .collect()
    } else {
        filtered.iter().take(limit).map(|e| (*e).clone()).collect()
    };

    let has_more = before_limit > selected.len();
    let cursor = selected.last().map(|e| e.cursor().to_wire());
    let oldest_timestamp = entries.first().and_then(|e| e.cursor().timestamp).map(|t| t.to_rfc3339());
    let newest_timestamp = entries.last().and_then(|e| e.cursor().timestamp).map(|t| t.to_rfc3339());

    Ok(Page {
        meta: PageMeta {
            count: selected.len(),
            total: entries.len(),
            has_more,
            cursor,
            oldest_timestamp,
            newest_timestamp,
            cursor_restarted: None,
            original_cursor: None,
            warning: None,
        },
        items: selected,
    })
}

fn restart_from_oldest<T: Clone + Sequenced>(entries: &[T], original: Cursor) -> Page<T> {
    let items: Vec<T> = entries.to_vec();
    let lost_to = entries.first().map(|e| e.cursor().sequence).unwrap_or(0);
    let cursor = items.last().map(|e| e.cursor().to_wire());
    let oldest_timestamp = entries.first().and_then(|e| e.cursor().timestamp).map(|t| t.to_rfc3339());
    let newest_timestamp = entries.last().and_then(|e| e.cursor().timestamp).map(|t| t.to_rfc3339());
    let total = entries.len();
    Page {
        meta: PageMeta {
            count: items.len(),
            total,
            has_more: false,
            cursor,
            oldest_timestamp,
            newest_timestamp,
            cursor_restarted: Some(true),
            original_cursor: Some(original.to_wire()),
            warning: Some(format!(
                "Cursor expired; restarted from oldest. Lost entries {}..{}",
                original.sequence, lost_to
            )),
        },
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasoline_core::clock::Timestamp;

    #[derive(Clone, Debug, PartialEq)]
    struct Entry {
        seq: i64,
        ts: Timestamp,
    }

    impl Sequenced for Entry {
        fn cursor(&self) -> Cursor {
            Cursor {
                timestamp: Some(self.ts),
                sequence: self.seq,
            }
        }
    }

    fn seeded(n: i64) -> Vec<Entry> {
        (1..=n)
            .map(|i| Entry {
                seq: i,
                ts: Timestamp::from_datetime(
                    chrono::DateTime::from_timestamp(1_700_000_000 + i, 0).unwrap(),
                ),
            })
            .collect()
    }

    #[test]
    fn no_cursor_returns_last_limit_newest() {
        let entries = seeded(100);
        let req = PageRequest {
            limit: Some(50),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        assert_eq!(page.meta.count, 50);
        assert_eq!(page.meta.total, 100);
        assert_eq!(page.items.first().unwrap().seq, 51);
        assert_eq!(page.items.last().unwrap().seq, 100);
    }

    #[test]
    fn after_cursor_returns_last_limit_of_older_set() {
        let entries = seeded(100);
        let req = PageRequest {
            after_cursor: Some(":50".to_owned()),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        let seqs: Vec<i64> = page.items.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=49).collect::<Vec<_>>());
    }

    #[test]
    fn after_cursor_with_limit_takes_closest_to_cursor() {
        let entries = seeded(100);
        let req = PageRequest {
            after_cursor: Some(":50".to_owned()),
            limit: Some(10),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        let seqs: Vec<i64> = page.items.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (40..=49).collect::<Vec<_>>());
    }

    #[test]
    fn before_cursor_returns_first_limit_oldest_first() {
        let entries = seeded(100);
        let req = PageRequest {
            before_cursor: Some(":50".to_owned()),
            limit: Some(10),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        let seqs: Vec<i64> = page.items.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (51..=60).collect::<Vec<_>>());
    }

    #[test]
    fn since_cursor_is_inclusive() {
        let entries = seeded(10);
        let req = PageRequest {
            since_cursor: Some(":5".to_owned()),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        let seqs: Vec<i64> = page.items.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (5..=10).collect::<Vec<_>>());
    }

    #[test]
    fn expired_cursor_without_restart_fails() {
        // Simulate a capacity-100 ring after 200 appends: live sequences 101..200.
        let entries: Vec<Entry> = (101..=200)
            .map(|i| Entry {
                seq: i,
                ts: Timestamp::from_datetime(
                    chrono::DateTime::from_timestamp(1_700_000_000 + i, 0).unwrap(),
                ),
            })
            .collect();
        let req = PageRequest {
            after_cursor: Some(":50".to_owned()),
            ..Default::default()
        };
        let err = paginate(&entries, &req).unwrap_err();
        assert!(err.to_string().contains("Requested sequence 50"));
        assert!(err.to_string().contains("oldest available 101"));
    }

    #[test]
    fn expired_cursor_with_restart_returns_oldest_window() {
        let entries: Vec<Entry> = (101..=200)
            .map(|i| Entry {
                seq: i,
                ts: Timestamp::from_datetime(
                    chrono::DateTime::from_timestamp(1_700_000_000 + i, 0).unwrap(),
                ),
            })
            .collect();
        let req = PageRequest {
            after_cursor: Some(":50".to_owned()),
            restart_on_eviction: true,
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        assert_eq!(page.meta.cursor_restarted, Some(true));
        assert_eq!(page.meta.original_cursor, Some(":50".to_owned()));
        assert_eq!(page.items.first().unwrap().seq, 101);
        assert_eq!(page.items.len(), 100);
    }

    #[test]
    fn has_more_reflects_truncation() {
        let entries = seeded(100);
        let req = PageRequest {
            before_cursor: Some(":0".to_owned()),
            limit: Some(10),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        assert!(page.meta.has_more);
    }

    #[test]
    fn since_cursor_below_live_window_is_not_expiry() {
        // No eviction has happened (ring starts at sequence 1) but the
        // caller's `since` floor is still below it; this must not be
        // treated as an expired cursor.
        let entries = seeded(100);
        let req = PageRequest {
            since_cursor: Some(":0".to_owned()),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        assert_eq!(page.items.len(), 100);
    }

    #[test]
    fn before_cursor_below_live_window_is_not_expiry() {
        let entries = seeded(100);
        let req = PageRequest {
            before_cursor: Some(":0".to_owned()),
            ..Default::default()
        };
        let page = paginate(&entries, &req).unwrap();
        assert_eq!(page.items.len(), 100);
        assert_eq!(page.items.first().unwrap().seq, 1);
    }
}
