//! Error-cluster derivation over the log ring.
//!
//! Clusters are recomputed synchronously on read: tokenize each `error`-level
//! message, strip volatile tokens (digits, hex runs, UUIDs, URLs, quoted
//! strings), and group by the residual template. The exposed ordering
//! (newest `last_seen` first) is stable across recomputation.

use crate::streams::LogEntry;
use gasoline_core::clock::Timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{2,}").unwrap());
static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b[0-9a-f]{4,}\b").unwrap());
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new("(['\"]).*?\\1").unwrap());

/// Default number of recent raw samples retained per cluster.
pub const DEFAULT_SAMPLE_COUNT: usize = 3;

/// A group of `error`-level log messages that normalize to the same
/// template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorCluster {
    /// The normalized message template.
    pub pattern: String,
    /// Number of raw messages that matched this template.
    pub count: usize,
    /// Timestamp of the earliest matching message.
    pub first_seen: Timestamp,
    /// Timestamp of the most recent matching message.
    pub last_seen: Timestamp,
    /// Up to [`DEFAULT_SAMPLE_COUNT`] of the most recent raw messages.
    pub samples: Vec<String>,
}

/// Strip volatile tokens from a message, leaving the stable residual
/// template that two occurrences of "the same error" share.
fn normalize(message: &str) -> String {
    let s = URL.replace_all(message, "<url>");
    let s = UUID.replace_all(&s, "<uuid>");
    let s = QUOTED.replace_all(&s, "<str>");
    let s = HEX_RUN.replace_all(&s, "<hex>");
    let s = DIGITS.replace_all(&s, "<n>");
    s.trim().to_owned()
}

/// Recompute error clusters over the given log snapshot. `logs` need not be
/// sorted; the caller typically passes a ring snapshot (already ascending).
#[must_use]
pub fn derive_clusters(logs: &[LogEntry]) -> Vec<ErrorCluster> {
    let mut by_pattern: HashMap<String, ErrorCluster> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for log in logs.iter().filter(|l| l.level == "error") {
        let pattern = normalize(&log.message);
        match by_pattern.get_mut(&pattern) {
            Some(cluster) => {
                cluster.count += 1;
                if log.ts > cluster.last_seen {
                    cluster.last_seen = log.ts;
                }
                if log.ts < cluster.first_seen {
                    cluster.first_seen = log.ts;
                }
                cluster.samples.push(log.message.clone());
                if cluster.samples.len() > DEFAULT_SAMPLE_COUNT {
                    cluster.samples.remove(0);
                }
            }
            None => {
                order.push(pattern.clone());
                by_pattern.insert(
                    pattern.clone(),
                    ErrorCluster {
                        pattern,
                        count: 1,
                        first_seen: log.ts,
                        last_seen: log.ts,
                        samples: vec![log.message.clone()],
                    },
                );
            }
        }
    }

    let mut clusters: Vec<ErrorCluster> = order
        .into_iter()
        .filter_map(|p| by_pattern.remove(&p))
        .collect();
    clusters.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(level: &str, message: &str, epoch: i64) -> LogEntry {
        LogEntry {
            level: level.to_owned(),
            message: message.to_owned(),
            source: "console".to_owned(),
            ts: Timestamp::from_datetime(chrono::DateTime::from_timestamp(epoch, 0).unwrap()),
            tab_id: None,
        }
    }

    #[test]
    fn groups_messages_with_same_residual_template() {
        let logs = vec![
            log("error", "failed to fetch user 1234", 1),
            log("error", "failed to fetch user 5678", 2),
            log("error", "unrelated crash", 3),
        ];
        let clusters = derive_clusters(&logs);
        assert_eq!(clusters.len(), 2);
        let fetch_cluster = clusters.iter().find(|c| c.count == 2).unwrap();
        assert_eq!(fetch_cluster.samples.len(), 2);
    }

    #[test]
    fn strips_urls_uuids_and_quoted_strings() {
        let logs = vec![
            log(
                "error",
                "request to https://api.example.com/v1/x failed with id 550e8400-e29b-41d4-a716-446655440000",
                1,
            ),
            log(
                "error",
                "request to https://api.example.com/v2/y failed with id 11111111-2222-3333-4444-555555555555",
                2,
            ),
        ];
        let clusters = derive_clusters(&logs);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
    }

    #[test]
    fn non_error_logs_are_ignored() {
        let logs = vec![log("info", "just fyi", 1), log("warn", "careful", 2)];
        assert!(derive_clusters(&logs).is_empty());
    }

    #[test]
    fn samples_capped_at_default_count() {
        let logs: Vec<LogEntry> = (0..10).map(|i| log("error", "boom 42", i)).collect();
        let clusters = derive_clusters(&logs);
        assert_eq!(clusters[0].count, 10);
        assert_eq!(clusters[0].samples.len(), DEFAULT_SAMPLE_COUNT);
    }

    #[test]
    fn ordering_is_newest_last_seen_first() {
        let logs = vec![
            log("error", "alpha failure", 1),
            log("error", "beta failure", 5),
        ];
        let clusters = derive_clusters(&logs);
        assert_eq!(clusters[0].pattern, normalize("beta failure"));
    }
}
