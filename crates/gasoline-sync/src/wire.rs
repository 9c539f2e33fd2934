//! The `/sync` wire contract, shared verbatim by the daemon's HTTP
//! handler and the extension-side [`crate::client::SyncClient`].

use gasoline_capture::streams::{
    ActionEntry, ExtensionLogEntry, LogEntry, NetworkBodyEntry, NetworkWaterfallEntry,
    PerformanceSnapshotEntry, WebSocketEventEntry,
};
use gasoline_commands::types::{Command, CommandResult};
use serde::{Deserialize, Serialize};

/// Extension-reported settings, passed through opaquely except for the
/// fields the daemon acts on directly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Whether telemetry capture is enabled in the extension's UI.
    #[serde(default)]
    pub pilot_enabled: bool,
    /// Whether the extension is actively tracking a tab.
    #[serde(default)]
    pub tracking_enabled: bool,
    /// The tab id the extension believes it's tracking, if any.
    #[serde(default)]
    pub tracked_tab_id: Option<String>,
    /// The URL of the tracked tab, if any.
    #[serde(default)]
    pub tracked_tab_url: Option<String>,
}

/// One tick's worth of buffered telemetry, grouped by stream. Every
/// field is optional: a tick with nothing new to report may omit it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TelemetryBatch {
    /// Buffered console logs and uncaught errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
    /// Buffered user-interaction actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActionEntry>>,
    /// Buffered WebSocket lifecycle events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_events: Option<Vec<WebSocketEventEntry>>,
    /// Buffered resource-timing entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_waterfall: Option<Vec<NetworkWaterfallEntry>>,
    /// Buffered request/response body captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_bodies: Option<Vec<NetworkBodyEntry>>,
    /// Buffered performance snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_snapshots: Option<Vec<PerformanceSnapshotEntry>>,
    /// Buffered extension-internal diagnostic log lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_logs: Option<Vec<ExtensionLogEntry>>,
}

impl TelemetryBatch {
    /// Whether this batch has nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.as_ref().is_none_or(Vec::is_empty)
            && self.actions.as_ref().is_none_or(Vec::is_empty)
            && self.websocket_events.as_ref().is_none_or(Vec::is_empty)
            && self.network_waterfall.as_ref().is_none_or(Vec::is_empty)
            && self.network_bodies.as_ref().is_none_or(Vec::is_empty)
            && self.performance_snapshots.as_ref().is_none_or(Vec::is_empty)
            && self.extension_logs.as_ref().is_none_or(Vec::is_empty)
    }
}

/// The body of `POST /sync`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Opaque session identifier, stable for the life of the extension.
    pub session_id: String,
    /// The extension build's version string.
    pub client_version: String,
    /// Current extension-side settings snapshot.
    pub settings: SyncSettings,
    /// Telemetry gathered since the last successful tick.
    pub telemetry: TelemetryBatch,
    /// Results for commands the extension finished handling since the last
    /// tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_results: Option<Vec<CommandResult>>,
}

/// The response to `POST /sync`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Always `true`; a structurally valid response was produced.
    pub ack: bool,
    /// Commands freshly claimed from this session's pending queue.
    pub commands: Vec<Command>,
    /// Adaptive poll interval for the next tick, in milliseconds.
    pub next_poll_ms: u64,
    /// The daemon's clock at response time, RFC3339Nano.
    pub server_time: String,
}
