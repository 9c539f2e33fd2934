//! `CaptureStore`: owns one ring per stream type, accepts non-blocking
//! writes from extension ingest, and serves paginated reads to the tool
//! layer.

use crate::clusters::{derive_clusters, ErrorCluster};
use crate::pagination::{paginate, Page, PageRequest};
use crate::ring::RingBuffer;
use crate::streams::{
    ActionEntry, ExtensionLogEntry, LogEntry, NetworkBodyEntry, NetworkWaterfallEntry,
    PerformanceSnapshotEntry, WebSocketEventEntry,
};
use gasoline_core::clock::{Clock, SystemClock};
use gasoline_core::errors::GasolineError;
use std::sync::Arc;
use tracing::instrument;

/// Default per-ring capacity. Each stream is independently sized; all use
/// this value unless [`CaptureStore::with_capacities`] overrides it.
pub const DEFAULT_RING_CAPACITY: usize = 1_000;

/// Per-stream ring capacities, for callers that want to size streams
/// individually (e.g. a smaller cap on `network_bodies`, which holds the
/// largest entries).
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Capacities {
    /// Capacity of the `logs` ring.
    pub logs: usize,
    /// Capacity of the `actions` ring.
    pub actions: usize,
    /// Capacity of the `websocket_events` ring.
    pub websocket_events: usize,
    /// Capacity of the `network_waterfall` ring.
    pub network_waterfall: usize,
    /// Capacity of the `network_bodies` ring.
    pub network_bodies: usize,
    /// Capacity of the `performance_snapshots` ring.
    pub performance_snapshots: usize,
    /// Capacity of the `extension_logs` ring.
    pub extension_logs: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            logs: DEFAULT_RING_CAPACITY,
            actions: DEFAULT_RING_CAPACITY,
            websocket_events: DEFAULT_RING_CAPACITY,
            network_waterfall: DEFAULT_RING_CAPACITY,
            network_bodies: 200,
            performance_snapshots: 200,
            extension_logs: DEFAULT_RING_CAPACITY,
        }
    }
}

/// Which buffer a `/clear` request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferName {
    /// The `logs` ring.
    Logs,
    /// The `actions` ring.
    Actions,
    /// The `websocket_events` ring.
    WebSocketEvents,
    /// The `network_waterfall` ring.
    NetworkWaterfall,
    /// The `network_bodies` ring.
    NetworkBodies,
    /// The `performance_snapshots` ring.
    PerformanceSnapshots,
    /// The `extension_logs` ring.
    ExtensionLogs,
    /// Every ring.
    All,
}

impl BufferName {
    /// Parse a buffer name as accepted by `configure(clear)`/`POST /clear`.
    pub fn parse(name: &str) -> Result<Self, GasolineError> {
        match name {
            "logs" => Ok(Self::Logs),
            "actions" => Ok(Self::Actions),
            "websocket_events" => Ok(Self::WebSocketEvents),
            "network_waterfall" => Ok(Self::NetworkWaterfall),
            "network_bodies" => Ok(Self::NetworkBodies),
            "performance_snapshots" => Ok(Self::PerformanceSnapshots),
            "extension_logs" => Ok(Self::ExtensionLogs),
            "all" => Ok(Self::All),
            other => Err(GasolineError::InvalidParams {
                message: format!("unknown buffer name: {other}"),
            }),
        }
    }
}

/// Owns every per-stream ring and derives `error_clusters` on read.
pub struct CaptureStore {
    clock: Arc<dyn Clock>,
    logs: RingBuffer<LogEntry>,
    actions: RingBuffer<ActionEntry>,
    websocket_events: RingBuffer<WebSocketEventEntry>,
    network_waterfall: RingBuffer<NetworkWaterfallEntry>,
    network_bodies: RingBuffer<NetworkBodyEntry>,
    performance_snapshots: RingBuffer<PerformanceSnapshotEntry>,
    extension_logs: RingBuffer<ExtensionLogEntry>,
}

impl CaptureStore {
    /// Create a store with the default per-stream capacities and the real
    /// system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacities(Capacities::default(), Arc::new(SystemClock))
    }

    /// Create a store with explicit capacities and a clock (injectable for
    /// tests).
    #[must_use]
    pub fn with_capacities(capacities: Capacities, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            logs: RingBuffer::new(capacities.logs),
            actions: RingBuffer::new(capacities.actions),
            websocket_events: RingBuffer::new(capacities.websocket_events),
            network_waterfall: RingBuffer::new(capacities.network_waterfall),
            network_bodies: RingBuffer::new(capacities.network_bodies),
            performance_snapshots: RingBuffer::new(capacities.performance_snapshots),
            extension_logs: RingBuffer::new(capacities.extension_logs),
        }
    }

    /// Append a log entry. Ingest is best-effort and never rejects input.
    #[instrument(skip(self, entry), fields(stream = "logs"))]
    pub fn add_log(&self, entry: LogEntry) {
        self.logs.append(entry);
    }

    /// Append an action entry.
    #[instrument(skip(self, entry), fields(stream = "actions"))]
    pub fn add_action(&self, entry: ActionEntry) {
        self.actions.append(entry);
    }

    /// Append a WebSocket lifecycle event.
    #[instrument(skip(self, entry), fields(stream = "websocket_events"))]
    pub fn add_websocket_event(&self, entry: WebSocketEventEntry) {
        self.websocket_events.append(entry);
    }

    /// Append a batch of network waterfall entries.
    #[instrument(skip(self, entries), fields(stream = "network_waterfall", batch_len = entries.len()))]
    pub fn add_network_waterfall_batch(&self, entries: Vec<NetworkWaterfallEntry>) {
        for entry in entries {
            self.network_waterfall.append(entry);
        }
    }

    /// Append a captured request/response body pair.
    #[instrument(skip(self, entry), fields(stream = "network_bodies"))]
    pub fn add_network_body(&self, entry: NetworkBodyEntry) {
        self.network_bodies.append(entry);
    }

    /// Append a performance snapshot.
    #[instrument(skip(self, entry), fields(stream = "performance_snapshots"))]
    pub fn add_performance_snapshot(&self, entry: PerformanceSnapshotEntry) {
        self.performance_snapshots.append(entry);
    }

    /// Append an extension-internal diagnostic log line.
    #[instrument(skip(self, entry), fields(stream = "extension_logs"))]
    pub fn add_extension_log(&self, entry: ExtensionLogEntry) {
        self.extension_logs.append(entry);
    }

    /// Current wall-clock time, per the store's injected clock.
    #[must_use]
    pub fn now(&self) -> gasoline_core::clock::Timestamp {
        self.clock.now()
    }

    /// Clear one named buffer, or every buffer with [`BufferName::All`].
    #[instrument(skip(self), fields(buffer = ?which))]
    pub fn clear(&self, which: BufferName) {
        match which {
            BufferName::Logs => self.logs.clear(),
            BufferName::Actions => self.actions.clear(),
            BufferName::WebSocketEvents => self.websocket_events.clear(),
            BufferName::NetworkWaterfall => self.network_waterfall.clear(),
            BufferName::NetworkBodies => self.network_bodies.clear(),
            BufferName::PerformanceSnapshots => self.performance_snapshots.clear(),
            BufferName::ExtensionLogs => self.extension_logs.clear(),
            BufferName::All => {
                self.logs.clear();
                self.actions.clear();
                self.websocket_events.clear();
                self.network_waterfall.clear();
                self.network_bodies.clear();
                self.performance_snapshots.clear();
                self.extension_logs.clear();
            }
        }
    }

    /// Paginated read over `logs`.
    #[instrument(skip(self, request), fields(stream = "logs"))]
    pub fn logs(&self, request: &PageRequest) -> Result<Page<LogEntry>, GasolineError> {
        read(&self.logs, request)
    }

    /// Paginated read over `logs`, filtered to `level == "error"`.
    #[instrument(skip(self, request), fields(stream = "logs", filter = "error"))]
    pub fn errors(&self, request: &PageRequest) -> Result<Page<LogEntry>, GasolineError> {
        let snapshot = self.logs.snapshot();
        let filtered: Vec<_> = snapshot
            .items
            .into_iter()
            .filter(|entry| entry.item.level == "error")
            .collect();
        let page = paginate(&filtered, request)?;
        Ok(Page {
            meta: page.meta,
            items: page.items.into_iter().map(|s| s.item).collect(),
        })
    }

    /// Paginated read over `actions`.
    #[instrument(skip(self, request), fields(stream = "actions"))]
    pub fn actions(&self, request: &PageRequest) -> Result<Page<ActionEntry>, GasolineError> {
        read(&self.actions, request)
    }

    /// Paginated read over `websocket_events`.
    #[instrument(skip(self, request), fields(stream = "websocket_events"))]
    pub fn websocket_events(
        &self,
        request: &PageRequest,
    ) -> Result<Page<WebSocketEventEntry>, GasolineError> {
        read(&self.websocket_events, request)
    }

    /// Paginated read over `network_waterfall`.
    #[instrument(skip(self, request), fields(stream = "network_waterfall"))]
    pub fn network_waterfall(
        &self,
        request: &PageRequest,
    ) -> Result<Page<NetworkWaterfallEntry>, GasolineError> {
        read(&self.network_waterfall, request)
    }

    /// Paginated read over `network_bodies`.
    #[instrument(skip(self, request), fields(stream = "network_bodies"))]
    pub fn network_bodies(
        &self,
        request: &PageRequest,
    ) -> Result<Page<NetworkBodyEntry>, GasolineError> {
        read(&self.network_bodies, request)
    }

    /// Paginated read over `performance_snapshots`.
    #[instrument(skip(self, request), fields(stream = "performance_snapshots"))]
    pub fn performance_snapshots(
        &self,
        request: &PageRequest,
    ) -> Result<Page<PerformanceSnapshotEntry>, GasolineError> {
        read(&self.performance_snapshots, request)
    }

    /// Paginated read over the extension's own diagnostic log.
    #[instrument(skip(self, request), fields(stream = "extension_logs"))]
    pub fn extension_logs(
        &self,
        request: &PageRequest,
    ) -> Result<Page<ExtensionLogEntry>, GasolineError> {
        read(&self.extension_logs, request)
    }

    /// Derive error clusters over the full live `logs` window.
    #[must_use]
    #[instrument(skip(self))]
    pub fn error_clusters(&self) -> Vec<ErrorCluster> {
        let snapshot = self.logs.snapshot();
        let entries: Vec<LogEntry> = snapshot.items.into_iter().map(|s| s.item).collect();
        derive_clusters(&entries)
    }

    /// `true` once any telemetry has been ingested; used by `/health`'s
    /// `capture.available` flag.
    #[must_use]
    pub fn has_ingested_any(&self) -> bool {
        !self.logs.is_empty()
            || !self.actions.is_empty()
            || !self.websocket_events.is_empty()
            || !self.network_waterfall.is_empty()
            || !self.network_bodies.is_empty()
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(
    ring: &RingBuffer<T>,
    request: &PageRequest,
) -> Result<Page<T>, GasolineError>
where
    T: Clone,
    crate::ring::Sequenced<T>: crate::pagination::Sequenced,
{
    let snapshot = ring.snapshot();
    let page = paginate(&snapshot.items, request)?;
    Ok(Page {
        meta: page.meta,
        items: page.items.into_iter().map(|s| s.item).collect(),
    })
}
