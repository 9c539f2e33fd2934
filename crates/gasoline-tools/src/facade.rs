//! `observe`/`interact`/`configure`/`generate`: the four umbrella
//! tools, dispatched by discriminated `what`/`action`/`format` fields, over
//! a shared [`CaptureStore`]/[`CommandQueue`] pair.
//!
//! The actual agent-facing transport (stdio/HTTP JSON-RPC framing) is an
//! external collaborator; this crate exposes plain `async fn`s for that
//! transport to wire up.

use gasoline_capture::pagination::{Page, PageRequest};
use gasoline_capture::store::{BufferName, CaptureStore};
use gasoline_commands::queue::{CommandLookup, CommandQueue};
use gasoline_commands::types::{Command, CommandState};
use gasoline_core::errors::GasolineError;
use gasoline_core::ids::{CommandId, CorrelationId, SessionId};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Which view `observe` reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObserveWhat {
    /// Console logs and uncaught errors.
    Logs,
    /// User-interaction actions.
    Actions,
    /// `logs` filtered to `level=error`.
    Errors,
    /// Derived error-cluster view.
    ErrorClusters,
    /// Resource-timing entries.
    NetworkWaterfall,
    /// Captured request/response bodies.
    NetworkBodies,
    /// WebSocket lifecycle events.
    WebSocketEvents,
    /// Derived summary of currently open sockets.
    WebSocketStatus,
    /// Current tracked-page summary.
    Page,
    /// A single command's result by id.
    CommandResult,
    /// Commands still awaiting claim.
    PendingCommands,
    /// Commands that ended in error or timeout.
    FailedCommands,
}

impl ObserveWhat {
    /// Parse the `what` discriminant as accepted by `observe`.
    pub fn parse(what: &str) -> Result<Self, GasolineError> {
        match what {
            "logs" => Ok(Self::Logs),
            "actions" => Ok(Self::Actions),
            "errors" => Ok(Self::Errors),
            "error_clusters" => Ok(Self::ErrorClusters),
            "network_waterfall" => Ok(Self::NetworkWaterfall),
            "network_bodies" => Ok(Self::NetworkBodies),
            "websocket_events" => Ok(Self::WebSocketEvents),
            "websocket_status" => Ok(Self::WebSocketStatus),
            "page" => Ok(Self::Page),
            "command_result" => Ok(Self::CommandResult),
            "pending_commands" => Ok(Self::PendingCommands),
            "failed_commands" => Ok(Self::FailedCommands),
            other => Err(GasolineError::InvalidParams {
                message: format!("unknown observe target: {other}"),
            }),
        }
    }
}

/// Parameters for `observe`, already parsed out of the transport's request
/// envelope.
#[derive(Clone, Debug, Default)]
pub struct ObserveRequest {
    /// Pagination parameters, applied to every ring-backed view.
    pub page: PageRequest,
    /// For `command_result`: the command id to look up.
    pub command_id: Option<CommandId>,
    /// For `command_result`: the expected correlation id, if the caller
    /// wants to guard against a stale/reused command id.
    pub correlation_id: Option<CorrelationId>,
}

/// Parameters for `interact`, i.e. a new command to enqueue.
#[derive(Clone, Debug)]
pub struct InteractRequest {
    /// Command discriminant (`execute`, `click`, `browser_action`, …).
    pub action: String,
    /// Action-specific parameters, passed through opaquely.
    pub params: Value,
    /// Caller-chosen correlation id, echoed back on every result.
    pub correlation_id: Option<CorrelationId>,
    /// Pin a specific tab rather than letting the pending-query handler
    /// resolve one.
    pub tab_id: Option<String>,
}

/// Parameters for `configure`.
#[derive(Clone, Debug)]
pub enum ConfigureRequest {
    /// Clear one named buffer, or `all`.
    Clear {
        /// Buffer name, as accepted by [`BufferName::parse`].
        buffer: String,
    },
    /// Daemon health/capture-availability snapshot.
    GetHealth,
    /// Flip the extension's capture-enabled setting. Delivered to the
    /// extension as a command, the same way any other `interact` action is,
    /// since the daemon holds no settings state of its own — settings live
    /// with the extension, not the daemon.
    TogglePilot {
        /// Desired `pilot_enabled` value.
        enabled: bool,
    },
    /// Query the DOM directly, bypassing `interact`'s correlation envelope.
    /// Equivalent to `interact(query_dom)` under the hood.
    QueryDom {
        /// Selector/query parameters, passed through opaquely.
        params: Value,
    },
}

/// The façade: owns shared handles to the capture store and command queue
/// and exposes the four umbrella tools.
pub struct GasolineTools {
    capture: Arc<CaptureStore>,
    commands: Arc<CommandQueue>,
}

impl GasolineTools {
    /// Construct a façade over shared store/queue handles (owned by the
    /// daemon's `AppState` aggregate; there is no module-level singleton).
    #[must_use]
    pub fn new(capture: Arc<CaptureStore>, commands: Arc<CommandQueue>) -> Self {
        Self { capture, commands }
    }

    /// `observe(what)`: read a stream or derived view.
    ///
    /// Wraps the dispatch in a `metrics::counter!`/`histogram!` pair,
    /// recording a method-name label, call count, and duration around
    /// every call, the same way an RPC dispatcher would.
    pub async fn observe(
        &self,
        session_id: &SessionId,
        what: ObserveWhat,
        request: &ObserveRequest,
    ) -> Result<Value, GasolineError> {
        let method = observe_what_name(what);
        let start = Instant::now();
        let result = self.observe_inner(session_id, what, request).await;
        record_call("observe", method, start, &result);
        result
    }

    async fn observe_inner(
        &self,
        session_id: &SessionId,
        what: ObserveWhat,
        request: &ObserveRequest,
    ) -> Result<Value, GasolineError> {
        match what {
            ObserveWhat::Logs => page_json(self.capture.logs(&request.page)?),
            ObserveWhat::Errors => page_json(self.capture.errors(&request.page)?),
            ObserveWhat::Actions => page_json(self.capture.actions(&request.page)?),
            ObserveWhat::ErrorClusters => {
                let clusters = self.capture.error_clusters();
                Ok(json!({ "clusters": clusters, "count": clusters.len() }))
            }
            ObserveWhat::NetworkWaterfall => {
                page_json(self.capture.network_waterfall(&request.page)?)
            }
            ObserveWhat::NetworkBodies => page_json(self.capture.network_bodies(&request.page)?),
            ObserveWhat::WebSocketEvents => {
                page_json(self.capture.websocket_events(&request.page)?)
            }
            ObserveWhat::WebSocketStatus => Ok(websocket_status(&self.capture)),
            ObserveWhat::Page => Ok(page_summary(&self.capture)),
            ObserveWhat::CommandResult => self.observe_command_result(session_id, request),
            ObserveWhat::PendingCommands => {
                let pending = self.commands.list_pending(session_id);
                Ok(json!({ "commands": pending, "count": pending.len() }))
            }
            ObserveWhat::FailedCommands => {
                let failed = self.commands.list_failed(session_id);
                Ok(json!({ "commands": failed, "count": failed.len() }))
            }
        }
    }

    fn observe_command_result(
        &self,
        session_id: &SessionId,
        request: &ObserveRequest,
    ) -> Result<Value, GasolineError> {
        let id = request.command_id.as_ref().ok_or_else(|| GasolineError::InvalidParams {
            message: "command_result requires a command id".to_owned(),
        })?;
        match self
            .commands
            .get(session_id, id, request.correlation_id.as_ref())
        {
            CommandLookup::Terminal(result) => Ok(serde_json::to_value(result).unwrap_or(Value::Null)),
            other => Ok(json!({ "status": state_name(CommandState::from_lookup(&other)) })),
        }
    }

    /// `interact(action)`: enqueue a command and return immediately.
    /// The extension resolves the target tab and runs the handler
    /// asynchronously; the caller polls `observe(command_result)`.
    pub async fn interact(
        &self,
        session_id: &SessionId,
        request: InteractRequest,
    ) -> Result<Value, GasolineError> {
        let method = request.action.clone();
        let start = Instant::now();
        let command = self.build_command(session_id, &request.action, request.params, request.correlation_id, request.tab_id);
        let id = self.commands.enqueue(command.clone());
        let result = Ok(json!({
            "correlation_id": command.correlation_id,
            "id": id,
            "status": "queued",
        }));
        record_call("interact", &method, start, &result);
        result
    }

    /// `configure(action)`.
    pub async fn configure(
        &self,
        session_id: &SessionId,
        request: ConfigureRequest,
    ) -> Result<Value, GasolineError> {
        let method = configure_request_name(&request);
        let start = Instant::now();
        let result = self.configure_inner(session_id, request).await;
        record_call("configure", method, start, &result);
        result
    }

    async fn configure_inner(
        &self,
        session_id: &SessionId,
        request: ConfigureRequest,
    ) -> Result<Value, GasolineError> {
        match request {
            ConfigureRequest::Clear { buffer } => {
                self.capture.clear(BufferName::parse(&buffer)?);
                Ok(json!({ "cleared": buffer }))
            }
            ConfigureRequest::GetHealth => Ok(json!({
                "status": "ok",
                "service": gasoline_core::constants::NAME,
                "version": gasoline_core::constants::VERSION,
                "capture": { "available": self.capture.has_ingested_any() },
            })),
            ConfigureRequest::TogglePilot { enabled } => {
                let command = self.build_command(
                    session_id,
                    "toggle_pilot",
                    json!({ "enabled": enabled }),
                    None,
                    None,
                );
                let id = self.commands.enqueue(command.clone());
                Ok(json!({
                    "correlation_id": command.correlation_id,
                    "id": id,
                    "status": "queued",
                }))
            }
            ConfigureRequest::QueryDom { params } => {
                let command = self.build_command(session_id, "query_dom", params, None, None);
                let id = self.commands.enqueue(command.clone());
                Ok(json!({
                    "correlation_id": command.correlation_id,
                    "id": id,
                    "status": "queued",
                }))
            }
        }
    }

    /// `generate(format)`: not implemented; always unavailable.
    pub async fn generate(&self, _format: &str) -> Result<Value, GasolineError> {
        let start = Instant::now();
        let result = Err(GasolineError::NotAvailable {
            message: "generate is not implemented".to_owned(),
        });
        record_call("generate", _format, start, &result);
        result
    }

    fn build_command(
        &self,
        session_id: &SessionId,
        kind: &str,
        params: Value,
        correlation_id: Option<CorrelationId>,
        tab_id: Option<String>,
    ) -> Command {
        let now = self.capture.now();
        let deadline_ms = if kind == "upload" {
            self.commands.default_upload_timeout_ms()
        } else {
            self.commands.default_deadline_ms()
        };
        let deadline = gasoline_core::clock::Timestamp::from_datetime(
            now.as_datetime() + chrono::Duration::milliseconds(i64::try_from(deadline_ms).unwrap_or(i64::MAX)),
        );
        Command {
            id: CommandId::new(),
            kind: kind.to_owned(),
            params,
            correlation_id,
            created_at: now,
            deadline,
            tab_id,
            session_id: session_id.clone(),
        }
    }
}

fn observe_what_name(what: ObserveWhat) -> &'static str {
    match what {
        ObserveWhat::Logs => "logs",
        ObserveWhat::Actions => "actions",
        ObserveWhat::Errors => "errors",
        ObserveWhat::ErrorClusters => "error_clusters",
        ObserveWhat::NetworkWaterfall => "network_waterfall",
        ObserveWhat::NetworkBodies => "network_bodies",
        ObserveWhat::WebSocketEvents => "websocket_events",
        ObserveWhat::WebSocketStatus => "websocket_status",
        ObserveWhat::Page => "page",
        ObserveWhat::CommandResult => "command_result",
        ObserveWhat::PendingCommands => "pending_commands",
        ObserveWhat::FailedCommands => "failed_commands",
    }
}

fn configure_request_name(request: &ConfigureRequest) -> &'static str {
    match request {
        ConfigureRequest::Clear { .. } => "clear",
        ConfigureRequest::GetHealth => "get_health",
        ConfigureRequest::TogglePilot { .. } => "toggle_pilot",
        ConfigureRequest::QueryDom { .. } => "query_dom",
    }
}

/// Record a tool call: a call counter, an error counter on failure, and a
/// duration histogram, all labeled by tool and operation name.
fn record_call(tool: &str, operation: &str, start: Instant, result: &Result<Value, GasolineError>) {
    counter!("gasoline_tool_calls_total", "tool" => tool.to_owned(), "operation" => operation.to_owned())
        .increment(1);
    if let Err(err) = result {
        counter!(
            "gasoline_tool_errors_total",
            "tool" => tool.to_owned(),
            "operation" => operation.to_owned(),
            "error_type" => err.code().to_owned(),
        )
        .increment(1);
    }
    let duration = start.elapsed();
    histogram!(
        "gasoline_tool_duration_seconds",
        "tool" => tool.to_owned(),
        "operation" => operation.to_owned(),
    )
    .record(duration.as_secs_f64());

    if duration.as_secs() >= 5 {
        warn!(tool, operation, duration_secs = duration.as_secs_f64(), "slow tool call");
    }
}

fn state_name(state: CommandState) -> &'static str {
    match state {
        CommandState::Pending => "pending",
        CommandState::InFlight => "in_flight",
        CommandState::Complete => "complete",
        CommandState::Failed => "failed",
        CommandState::Expired => "expired",
    }
}

/// Flatten a [`Page`]'s metadata alongside its `items` into one JSON object,
/// matching the shape S2/S3 describe (`{items, count, total, cursor, ...}`).
fn page_json<T: Serialize>(page: Page<T>) -> Result<Value, GasolineError> {
    let mut map = Map::new();
    map.insert("items".to_owned(), serde_json::to_value(page.items).unwrap_or(Value::Null));
    if let Value::Object(meta) = serde_json::to_value(page.meta).unwrap_or(Value::Null) {
        map.extend(meta);
    }
    Ok(Value::Object(map))
}

fn websocket_status(capture: &CaptureStore) -> Value {
    let page = capture
        .websocket_events(&PageRequest::default())
        .unwrap_or_else(|_| Page {
            items: Vec::new(),
            meta: gasoline_capture::pagination::PageMeta {
                count: 0,
                total: 0,
                has_more: false,
                cursor: None,
                oldest_timestamp: None,
                newest_timestamp: None,
                cursor_restarted: None,
                original_cursor: None,
                warning: None,
            },
        });

    let mut latest_by_socket: std::collections::HashMap<String, &gasoline_capture::streams::WebSocketEventEntry> =
        std::collections::HashMap::new();
    for entry in &page.items {
        latest_by_socket.insert(entry.id.clone(), entry);
    }

    let open_count = latest_by_socket
        .values()
        .filter(|entry| entry.event != "close")
        .count();
    let sockets: Vec<Value> = latest_by_socket
        .values()
        .map(|entry| {
            json!({
                "id": entry.id,
                "url": entry.url,
                "open": entry.event != "close",
            })
        })
        .collect();

    json!({ "sockets": sockets, "open_count": open_count })
}

fn page_summary(capture: &CaptureStore) -> Value {
    let request = PageRequest {
        limit: Some(1),
        ..Default::default()
    };
    let page_url = capture
        .network_waterfall(&request)
        .ok()
        .and_then(|p| p.items.last().map(|e| e.page_url.clone()));
    json!({ "page_url": page_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasoline_capture::streams::LogEntry;
    use gasoline_core::clock::{SystemClock, Timestamp};

    fn tools() -> GasolineTools {
        GasolineTools::new(
            Arc::new(CaptureStore::new()),
            Arc::new(CommandQueue::new(Arc::new(SystemClock))),
        )
    }

    fn log(level: &str, message: &str) -> LogEntry {
        LogEntry {
            level: level.to_owned(),
            message: message.to_owned(),
            source: "console".to_owned(),
            ts: Timestamp::from_datetime(chrono::Utc::now()),
            tab_id: None,
        }
    }

    #[tokio::test]
    async fn observe_logs_returns_flattened_page() {
        let gt = tools();
        gt.capture.add_log(log("info", "hello"));
        let session = SessionId::from("s1");
        let result = gt
            .observe(&session, ObserveWhat::Logs, &ObserveRequest::default())
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["total"], 1);
        assert!(result["items"].is_array());
    }

    #[tokio::test]
    async fn observe_errors_filters_to_error_level() {
        let gt = tools();
        gt.capture.add_log(log("info", "hello"));
        gt.capture.add_log(log("error", "boom"));
        gt.capture.add_log(log("warn", "careful"));
        let session = SessionId::from("s1");
        let result = gt
            .observe(&session, ObserveWhat::Errors, &ObserveRequest::default())
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["total"], 1);
        assert_eq!(result["items"][0]["message"], "boom");
    }

    #[tokio::test]
    async fn interact_enqueues_and_observe_reports_queued_then_terminal() {
        let gt = tools();
        let session = SessionId::from("s1");
        let correlation_id = CorrelationId::from("c-1");
        let enqueued = gt
            .interact(
                &session,
                InteractRequest {
                    action: "execute_js".to_owned(),
                    params: json!({ "script": "1+1" }),
                    correlation_id: Some(correlation_id.clone()),
                    tab_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(enqueued["status"], "queued");
        let id: CommandId = serde_json::from_value(enqueued["id"].clone()).unwrap();

        gt.commands.claim_pending(&session, None);
        gt.commands.resolve(
            &session,
            gasoline_commands::types::CommandResult {
                id: id.clone(),
                correlation_id: Some(correlation_id.clone()),
                status: gasoline_commands::types::ResultStatus::Complete,
                result: Some(json!(2)),
                error: None,
                duration_ms: 5,
            },
        );

        let request = ObserveRequest {
            command_id: Some(id),
            correlation_id: Some(correlation_id),
            ..Default::default()
        };
        let observed = gt
            .observe(&session, ObserveWhat::CommandResult, &request)
            .await
            .unwrap();
        assert_eq!(observed["status"], "complete");
        assert_eq!(observed["result"], 2);
    }

    #[tokio::test]
    async fn configure_clear_empties_named_buffer() {
        let gt = tools();
        gt.capture.add_log(log("info", "a"));
        let session = SessionId::from("s1");
        gt.configure(
            &session,
            ConfigureRequest::Clear {
                buffer: "logs".to_owned(),
            },
        )
        .await
        .unwrap();
        let page = gt.capture.logs(&PageRequest::default()).unwrap();
        assert_eq!(page.meta.total, 0);
    }

    #[tokio::test]
    async fn configure_get_health_reports_capture_availability() {
        let gt = tools();
        let session = SessionId::from("s1");
        let before = gt
            .configure(&session, ConfigureRequest::GetHealth)
            .await
            .unwrap();
        assert_eq!(before["capture"]["available"], false);
        gt.capture.add_log(log("info", "a"));
        let after = gt
            .configure(&session, ConfigureRequest::GetHealth)
            .await
            .unwrap();
        assert_eq!(after["capture"]["available"], true);
    }

    #[tokio::test]
    async fn generate_is_always_not_available() {
        let gt = tools();
        let err = gt.generate("markdown").await.unwrap_err();
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn pending_commands_view_does_not_claim() {
        let gt = tools();
        let session = SessionId::from("s1");
        gt.interact(
            &session,
            InteractRequest {
                action: "click".to_owned(),
                params: json!({}),
                correlation_id: None,
                tab_id: None,
            },
        )
        .await
        .unwrap();
        let observed = gt
            .observe(
                &session,
                ObserveWhat::PendingCommands,
                &ObserveRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(observed["count"], 1);
        assert_eq!(gt.commands.pending_count(&session), 1);
    }

    #[test]
    fn observe_what_rejects_unknown_target() {
        assert!(ObserveWhat::parse("nonsense").is_err());
        assert_eq!(ObserveWhat::parse("logs").unwrap(), ObserveWhat::Logs);
    }
}
