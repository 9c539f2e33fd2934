//! `SyncClient`: the extension-side poll loop.
//!
//! Single-threaded cooperative by contract — there is no mutex here, only
//! plain state mutated between `await` points, because no two ticks ever
//! overlap (the loop only ever schedules the *next* tick after the current
//! one fully resolves).
//!
//! Every dependency (transport, command handler, settings/telemetry source,
//! connection-change callback) is accepted as a constructor parameter, so
//! the loop can be driven in tests against fakes without a real browser or
//! HTTP server.

use crate::wire::{SyncRequest, SyncResponse};
use async_trait::async_trait;
use gasoline_commands::types::{Command, CommandResult, ResultStatus};
use gasoline_core::ids::{CommandId, CorrelationId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded dedupe window: commands seen in the last `M` responses are
/// skipped rather than re-invoked.
pub const DEDUPE_LRU_CAP: usize = 256;

/// Consecutive `/sync` failures before the client reports `disconnected`.
pub const DISCONNECT_THRESHOLD: u32 = 3;

/// Minimum gap between ticks, regardless of `next_poll_ms`.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(5);

/// Maximum gap between ticks, regardless of `next_poll_ms`.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Reconnect backoff bounds.
pub const BACKOFF_BASE_MS: u64 = 250;
/// Reconnect backoff cap.
pub const BACKOFF_MAX_MS: u64 = 5_000;

/// Per-command-type handler timeout.
#[must_use]
pub fn handler_timeout(kind: &str) -> Duration {
    match kind {
        "execute" | "execute_js" => Duration::from_secs(15),
        "upload" => Duration::from_secs(60),
        _ => Duration::from_secs(10),
    }
}

/// Transport abstraction over `POST /sync`, so tests never open a real
/// socket.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send one `/sync` request and await its response.
    async fn post_sync(&self, request: SyncRequest) -> Result<SyncResponse, String>;
}

/// Production [`SyncTransport`]: POSTs to `{base_url}/sync` on the daemon,
/// attaching the extension token header if one is configured.
pub struct HttpSyncTransport {
    client: reqwest::Client,
    sync_url: String,
    extension_token: Option<String>,
}

impl HttpSyncTransport {
    /// Build a transport pointed at a daemon listening on `base_url`
    /// (e.g. `http://127.0.0.1:4173`).
    #[must_use]
    pub fn new(base_url: impl Into<String>, extension_token: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            sync_url: format!("{}/sync", base_url.trim_end_matches('/')),
            extension_token,
        }
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn post_sync(&self, request: SyncRequest) -> Result<SyncResponse, String> {
        let mut builder = self.client.post(&self.sync_url).json(&request);
        if let Some(token) = &self.extension_token {
            builder = builder.header("X-Gasoline-Extension-Token", token);
        }
        let response = builder.send().await.map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("sync request failed with status {}", response.status()));
        }
        response
            .json::<SyncResponse>()
            .await
            .map_err(|err| err.to_string())
    }
}

/// A handler-reported failure. Distinct from a bare `String` so gate
/// failures (restricted page, no trackable tab) can carry the structured
/// `result` payload the agent expects alongside the error message.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    /// Error message, e.g. `"csp_blocked_page"` or `"no_trackable_tab"`.
    pub message: String,
    /// Structured detail, e.g. `{csp_blocked: true, failure_cause: "csp"}`.
    pub details: Option<serde_json::Value>,
}

impl HandlerFailure {
    /// A failure with no structured detail — the common case (handler
    /// threw a plain error).
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

impl From<String> for HandlerFailure {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

/// Invokes a claimed command and returns its outcome. Implemented by the
/// pending-query handler in production; mocked in tests.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run `command`, returning the success payload or a [`HandlerFailure`].
    /// Must never panic; any handler-internal failure should surface as
    /// `Err` — there is no silent drop.
    async fn handle(&self, command: &Command) -> Result<serde_json::Value, HandlerFailure>;
}

/// Supplies the extension-side state the tick loop needs each cycle:
/// session identity, current settings, and buffered telemetry.
pub trait ExtensionEnvironment: Send + Sync {
    /// The session id this extension instance reports as.
    fn session_id(&self) -> String;
    /// The extension build version.
    fn client_version(&self) -> String;
    /// Current settings snapshot.
    fn settings(&self) -> crate::wire::SyncSettings;
    /// Drain and return all telemetry buffered since the last successful
    /// tick (logs, actions, network entries, extension's own diagnostics).
    fn drain_telemetry(&self) -> crate::wire::TelemetryBatch;
}

/// Observer for connection-state transitions.
pub trait ConnectionObserver: Send + Sync {
    /// Called whenever the client's connection state flips between
    /// connected and disconnected.
    fn on_connection_change(&self, connected: bool);
}

/// The client's connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet started, or disconnected after repeated failures.
    Disconnected,
    /// A `/sync` attempt is outstanding without a prior success.
    Connecting,
    /// At least one `/sync` call has succeeded and the failure streak is
    /// below the disconnect threshold.
    Connected,
}

struct DedupeLru {
    seen: VecDeque<(CommandId, Option<CorrelationId>)>,
    cap: usize,
}

impl DedupeLru {
    fn new(cap: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Returns `true` if this key was already seen (caller should skip it).
    fn check_and_record(&mut self, key: (CommandId, Option<CorrelationId>)) -> bool {
        if self.seen.contains(&key) {
            return true;
        }
        self.seen.push_back(key);
        if self.seen.len() > self.cap {
            self.seen.pop_front();
        }
        false
    }
}

/// The extension-side sync tick loop.
pub struct SyncClient {
    transport: Arc<dyn SyncTransport>,
    handler: Arc<dyn CommandHandler>,
    environment: Arc<dyn ExtensionEnvironment>,
    observer: Arc<dyn ConnectionObserver>,
    state: ConnectionState,
    consecutive_failures: u32,
    dedupe: DedupeLru,
    backoff_attempt: u32,
}

/// Outcome of a single tick, returned to the caller driving the loop (the
/// loop itself does not own a scheduler; a caller wraps `tick` in its own
/// `setTimeout`/`tokio::time::sleep` equivalent).
#[derive(Debug)]
pub struct TickOutcome {
    /// Whether this tick's `/sync` call succeeded.
    pub connected: bool,
    /// How long the caller should wait before the next tick.
    pub next_delay: Duration,
    /// Results queued by commands handled (or timed out) this tick, ready
    /// to be reported on the *next* `/sync` call.
    pub queued_results: Vec<CommandResult>,
}

impl SyncClient {
    /// Construct a client from its dependencies. This constructor — and
    /// [`SyncClient::tick`] — never call a connection-reset path;
    /// `disconnected → connecting` only happens via the backoff computed
    /// after a failed tick.
    #[must_use]
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        handler: Arc<dyn CommandHandler>,
        environment: Arc<dyn ExtensionEnvironment>,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Self {
        Self {
            transport,
            handler,
            environment,
            observer,
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            dedupe: DedupeLru::new(DEDUPE_LRU_CAP),
            backoff_attempt: 0,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transition into `connecting` and run the first tick. Subsequent
    /// ticks are the caller's responsibility to schedule using the
    /// returned [`TickOutcome::next_delay`].
    pub async fn start(&mut self, pending_results: Vec<CommandResult>) -> TickOutcome {
        self.state = ConnectionState::Connecting;
        self.tick(pending_results).await
    }

    /// Run one `doSync` cycle: gather telemetry and results, POST
    /// `/sync`, dispatch returned commands with per-type timeouts, and
    /// compute the next tick's delay.
    pub async fn tick(&mut self, pending_results: Vec<CommandResult>) -> TickOutcome {
        let telemetry = self.environment.drain_telemetry();
        let request = SyncRequest {
            session_id: self.environment.session_id(),
            client_version: self.environment.client_version(),
            settings: self.environment.settings(),
            telemetry,
            command_results: if pending_results.is_empty() {
                None
            } else {
                Some(pending_results)
            },
        };

        match self.transport.post_sync(request).await {
            Ok(response) => self.on_success(response).await,
            Err(err) => self.on_failure(&err),
        }
    }

    async fn on_success(&mut self, response: SyncResponse) -> TickOutcome {
        self.consecutive_failures = 0;
        self.backoff_attempt = 0;
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Connected;
        if !was_connected {
            self.observer.on_connection_change(true);
        }

        let mut queued_results = Vec::new();
        for command in response.commands {
            let key = (command.id.clone(), command.correlation_id.clone());
            if self.dedupe.check_and_record(key) {
                debug!(command_id = %command.id, "skipping duplicate command delivery");
                continue;
            }
            queued_results.push(self.dispatch_with_timeout(command).await);
        }

        let next_delay = compute_next_delay(response.next_poll_ms);
        TickOutcome {
            connected: true,
            next_delay,
            queued_results,
        }
    }

    fn on_failure(&mut self, err: &str) -> TickOutcome {
        self.consecutive_failures += 1;
        warn!(error = %err, streak = self.consecutive_failures, "sync tick failed");
        if self.consecutive_failures >= DISCONNECT_THRESHOLD
            && self.state != ConnectionState::Disconnected
        {
            self.state = ConnectionState::Disconnected;
            self.observer.on_connection_change(false);
        }
        let delay_ms = gasoline_core::backoff::calculate_backoff_delay(
            self.backoff_attempt,
            BACKOFF_BASE_MS,
            BACKOFF_MAX_MS,
            0.2,
            deterministic_jitter_seed(self.backoff_attempt),
        );
        self.backoff_attempt += 1;
        TickOutcome {
            connected: false,
            next_delay: Duration::from_millis(delay_ms),
            queued_results: Vec::new(),
        }
    }

    /// Invoke a command's handler, racing it against the per-type timeout.
    /// Every exit path here produces a [`CommandResult`] — a thrown error
    /// is never swallowed.
    async fn dispatch_with_timeout(&self, command: Command) -> CommandResult {
        let timeout = handler_timeout(&command.kind);
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(timeout, self.handler.handle(&command)).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(value)) => CommandResult {
                id: command.id,
                correlation_id: command.correlation_id,
                status: ResultStatus::Complete,
                result: Some(value),
                error: None,
                duration_ms,
            },
            Ok(Err(failure)) => CommandResult {
                id: command.id,
                correlation_id: command.correlation_id,
                status: ResultStatus::Error,
                result: failure.details,
                error: Some(failure.message),
                duration_ms,
            },
            Err(_elapsed) => CommandResult {
                id: command.id,
                correlation_id: command.correlation_id,
                status: ResultStatus::Timeout,
                result: None,
                error: Some(format!(
                    "{} command timed out after {}ms",
                    command.kind,
                    timeout.as_millis()
                )),
                duration_ms,
            },
        }
    }
}

/// `next tick = server_time + next_poll_ms - now()`, clamped to
/// `[MIN_TICK_INTERVAL, MAX_TICK_INTERVAL]`. Since the client schedules
/// relative to *now* rather than the server's clock, this collapses to
/// clamping `next_poll_ms` itself.
fn compute_next_delay(next_poll_ms: u64) -> Duration {
    Duration::from_millis(next_poll_ms).clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL)
}

/// A cheap, deterministic stand-in for a PRNG draw used only to vary
/// successive backoff attempts without pulling in a `rand` dependency this
/// crate otherwise has no use for.
fn deterministic_jitter_seed(attempt: u32) -> f64 {
    let tick = u64::from(attempt).wrapping_mul(2_654_435_761) & 0xFFFF;
    (tick as f64) / (0xFFFF as f64)
}
