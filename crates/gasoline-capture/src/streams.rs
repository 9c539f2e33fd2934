//! Stream entry shapes: the concrete record types held by each ring in
//! the [`crate::store::CaptureStore`].

use crate::cursor::Cursor;
use crate::pagination::Sequenced as PageSequenced;
use crate::ring::Sequenced;
use gasoline_core::clock::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Blanket impl: anything wrapped in a ring's [`Sequenced`] envelope and
/// carrying a `ts` field satisfies the pagination engine's capability.
macro_rules! impl_paginated {
    ($ty:ty) => {
        impl PageSequenced for Sequenced<$ty> {
            fn cursor(&self) -> Cursor {
                Cursor {
                    timestamp: Some(self.item.ts),
                    sequence: self.sequence,
                }
            }
        }
    };
}

/// A console log line or uncaught error captured from the page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level (`log`, `info`, `warn`, `error`, …).
    pub level: String,
    /// The rendered message.
    pub message: String,
    /// Origin of the log (`console`, `uncaught`, `unhandledrejection`, …).
    pub source: String,
    /// When the log was captured.
    pub ts: Timestamp,
    /// Browser tab the log originated from, stamped by ingest if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
}
impl_paginated!(LogEntry);

/// A single user-interaction action recorded by the extension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Action discriminant: `click`, `input`, `change`, `focus`, `navigate`,
    /// `scroll`, `keydown`, …
    #[serde(rename = "type")]
    pub kind: String,
    /// Candidate CSS/XPath selectors identifying the target element.
    pub selectors: HashMap<String, String>,
    /// New value, for `input`/`change`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// HTML input type, for `input`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    /// Key name, for `keydown`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Prior URL, for `navigate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_url: Option<String>,
    /// Target URL, for `navigate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_url: Option<String>,
    /// Selected option value, for `change` on a `<select>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_value: Option<String>,
    /// Selected option text, for `change` on a `<select>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    /// Resulting scroll offset, for `scroll`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_y: Option<f64>,
    /// Browser tab the action occurred in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    /// Capture time.
    pub ts: Timestamp,
}
impl_paginated!(ActionEntry);

/// One observed WebSocket lifecycle event (open/message/close).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketEventEntry {
    /// `open`, `message`, or `close`.
    pub event: String,
    /// Socket identifier, stable across its lifetime.
    pub id: String,
    /// The socket's URL.
    pub url: String,
    /// Frame payload kind, for `message`.
    #[serde(skip_serializing_if = "Option::is_none", rename = "type")]
    pub frame_type: Option<String>,
    /// `incoming` or `outgoing`, for `message`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Frame payload, truncated by the extension if oversized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Frame size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Close code, for `close`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_code: Option<u16>,
    /// Close reason, for `close`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    /// Capture time.
    pub ts: Timestamp,
}
impl_paginated!(WebSocketEventEntry);

/// One resource-timing entry for the network waterfall view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkWaterfallEntry {
    /// Resource URL.
    pub url: String,
    /// `PerformanceResourceTiming.initiatorType`.
    pub initiator_type: String,
    /// Total duration in milliseconds.
    pub duration_ms: f64,
    /// Start time, relative to navigation start.
    pub start_time: f64,
    /// Transfer size over the wire.
    pub transfer_size: u64,
    /// Decoded body size.
    pub decoded_body_size: u64,
    /// `fetchStart`, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_start: Option<f64>,
    /// `responseEnd`, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_end: Option<f64>,
    /// URL of the page the resource was fetched on behalf of.
    pub page_url: String,
    /// Capture time, stamped at ingest (resource timing itself has no wall
    /// clock time, only relative offsets).
    pub ts: Timestamp,
}
impl_paginated!(NetworkWaterfallEntry);

/// A captured request/response pair with headers and (optionally) bodies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkBodyEntry {
    /// Request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Response status code.
    pub status: u16,
    /// Request headers, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<HashMap<String, String>>,
    /// Response headers, if captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,
    /// Request body, if captured and within size limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    /// Response body, if captured and within size limits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Whether an `Authorization` header was present (without capturing it).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_auth_header: Option<bool>,
    /// Capture time.
    pub ts: Timestamp,
}
impl_paginated!(NetworkBodyEntry);

/// A point-in-time performance snapshot (navigation timing, memory, etc).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceSnapshotEntry {
    /// Page the snapshot was taken on.
    pub page_url: String,
    /// Arbitrary performance metrics, passed through opaquely.
    pub metrics: Value,
    /// Capture time.
    pub ts: Timestamp,
}
impl_paginated!(PerformanceSnapshotEntry);

/// An extension-internal diagnostic log line (distinct from page console
/// output), used to debug the extension itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtensionLogEntry {
    /// Log level.
    pub level: String,
    /// The rendered message.
    pub message: String,
    /// Capture time.
    pub ts: Timestamp,
}
impl_paginated!(ExtensionLogEntry);
