//! `GasolineServer` — Axum HTTP server for the daemon's extension-facing
//! surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;

use tracing::{info, instrument, warn};

use gasoline_capture::store::{BufferName, CaptureStore};
use gasoline_commands::queue::CommandQueue;
use gasoline_commands::ticker::run_deadline_ticker;
use gasoline_core::errors::GasolineError;
use gasoline_core::ids::SessionId;
use gasoline_sync::wire::{SyncRequest, SyncResponse};
use gasoline_tools::GasolineTools;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::extension_auth;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;

/// Generates UUIDv7 request IDs.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id)
            .ok()
            .map(RequestId::new)
    }
}

/// A [`GasolineError`] rendered as an Axum response.
struct ErrorResponse(GasolineError);

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_error_body())).into_response()
    }
}

impl From<GasolineError> for ErrorResponse {
    fn from(err: GasolineError) -> Self {
        Self(err)
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Telemetry rings.
    pub capture: Arc<CaptureStore>,
    /// Command queue.
    pub commands: Arc<CommandQueue>,
    /// `observe`/`interact`/`configure`/`generate` façade, sharing `capture`
    /// and `commands` (not used by the HTTP handlers directly, but owned
    /// here so an out-of-process tool transport can be wired to the same
    /// state the `/sync` path mutates).
    pub tools: Arc<GasolineTools>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
    /// Prometheus metrics handle for rendering.
    pub metrics_handle: Arc<PrometheusHandle>,
}

/// The gasoline daemon's HTTP server.
pub struct GasolineServer {
    config: ServerConfig,
    capture: Arc<CaptureStore>,
    commands: Arc<CommandQueue>,
    tools: Arc<GasolineTools>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: Arc<PrometheusHandle>,
    start_time: Instant,
}

impl GasolineServer {
    /// Create a new server over shared capture/command/tools handles. The
    /// caller owns construction of these — there is no module-level singleton.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        capture: Arc<CaptureStore>,
        commands: Arc<CommandQueue>,
        tools: Arc<GasolineTools>,
        shutdown: Arc<ShutdownCoordinator>,
        start_time: Instant,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            capture,
            commands,
            tools,
            shutdown,
            metrics_handle: Arc::new(metrics_handle),
            start_time,
        }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            capture: self.capture.clone(),
            commands: self.commands.clone(),
            tools: self.tools.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };

        let extension_gated = Router::new()
            .route("/sync", post(sync_handler))
            .route("/clear", post(clear_handler))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                extension_auth,
            ));

        Router::new()
            .merge(extension_gated)
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            // Outermost layers execute first on request, last on response.
            .layer(CatchPanicLayer::new())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(self.config.max_body_bytes))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(self.config.request_timeout_secs),
            ))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Bind to a TCP port, start serving, and spawn the deadline ticker.
    /// Returns the bound address and a join handle for the server task.
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "server started");

        let ticker_handle = tokio::spawn(run_deadline_ticker(
            self.commands.clone(),
            self.shutdown.token(),
        ));
        self.shutdown.register_task(ticker_handle);

        let router = self.router();
        let shutdown_token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the command queue.
    #[must_use]
    pub fn commands(&self) -> &Arc<CommandQueue> {
        &self.commands
    }

    /// Get the capture store.
    #[must_use]
    pub fn capture(&self) -> &Arc<CaptureStore> {
        &self.capture
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(state.start_time, state.capture.has_ingested_any());
    Json(resp)
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// The pending-remaining burst interval: 5 ms if pending.
const BURST_POLL_MS: u64 = 5;
/// Floor of the idle poll interval (250-5000 ms).
const IDLE_POLL_FLOOR_MS: u64 = 250;
/// Ceiling of the idle poll interval.
const IDLE_POLL_CEIL_MS: u64 = 5_000;

/// POST /sync: ingest telemetry, resolve command results, claim
/// pending commands, pick the next poll interval.
async fn sync_handler(
    State(state): State<AppState>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ErrorResponse> {
    let session_id = SessionId::from(body.session_id.as_str());

    ingest_telemetry(&state.capture, body.telemetry);

    for result in body.command_results.into_iter().flatten() {
        state.commands.resolve(&session_id, result);
    }

    let claimed = state.commands.claim_pending(&session_id, None);
    let next_poll_ms = if !claimed.is_empty() || state.commands.pending_count(&session_id) > 0 {
        BURST_POLL_MS
    } else {
        idle_poll_jitter(state.capture.now())
    };

    Ok(Json(SyncResponse {
        ack: true,
        commands: claimed,
        next_poll_ms,
        server_time: state.capture.now().to_rfc3339(),
    }))
}

/// Best-effort ingest: every stream is independent, so one empty/omitted
/// field never blocks the others; malformed entries are dropped.
fn ingest_telemetry(capture: &CaptureStore, telemetry: gasoline_sync::wire::TelemetryBatch) {
    for entry in telemetry.logs.into_iter().flatten() {
        capture.add_log(entry);
    }
    for entry in telemetry.actions.into_iter().flatten() {
        capture.add_action(entry);
    }
    for entry in telemetry.websocket_events.into_iter().flatten() {
        capture.add_websocket_event(entry);
    }
    if let Some(batch) = telemetry.network_waterfall {
        capture.add_network_waterfall_batch(batch);
    }
    for entry in telemetry.network_bodies.into_iter().flatten() {
        capture.add_network_body(entry);
    }
    for entry in telemetry.performance_snapshots.into_iter().flatten() {
        capture.add_performance_snapshot(entry);
    }
    for entry in telemetry.extension_logs.into_iter().flatten() {
        capture.add_extension_log(entry);
    }
}

/// Spread the idle poll interval across `[IDLE_POLL_FLOOR_MS,
/// IDLE_POLL_CEIL_MS]` using the clock's own sub-second jitter, avoiding a
/// dependency on a random-number crate purely for poll-interval spread.
fn idle_poll_jitter(now: gasoline_core::clock::Timestamp) -> u64 {
    let nanos = u64::from(now.as_datetime().timestamp_subsec_nanos());
    let span = IDLE_POLL_CEIL_MS - IDLE_POLL_FLOOR_MS;
    IDLE_POLL_FLOOR_MS + (nanos % span)
}

/// Body of `POST /clear`.
#[derive(Clone, Debug, Deserialize)]
struct ClearRequest {
    /// Buffer name, as accepted by [`BufferName::parse`].
    buffer: String,
}

/// POST /clear: clear one named buffer or `all`.
async fn clear_handler(
    State(state): State<AppState>,
    Json(body): Json<ClearRequest>,
) -> Result<Json<Value>, ErrorResponse> {
    let which = BufferName::parse(&body.buffer)?;
    state.capture.clear(which);
    Ok(Json(json!({ "cleared": body.buffer })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gasoline_core::clock::SystemClock;
    use tower::ServiceExt;

    fn make_server() -> GasolineServer {
        let capture = Arc::new(CaptureStore::new());
        let commands = Arc::new(CommandQueue::new(Arc::new(SystemClock)));
        let tools = Arc::new(GasolineTools::new(capture.clone(), commands.clone()));
        GasolineServer::new(
            ServerConfig::default(),
            capture,
            commands,
            tools,
            Arc::new(ShutdownCoordinator::new()),
            Instant::now(),
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        )
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["service"], "gasoline");
        assert_eq!(parsed["capture"]["available"], false);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sync_round_trip_ingests_and_reports_ack() {
        let server = make_server();
        let app = server.router();

        let payload = json!({
            "session_id": "s1",
            "client_version": "1.0.0",
            "settings": {},
            "telemetry": {
                "logs": [
                    {"level": "info", "message": "hello", "source": "console", "ts": "2024-01-01T00:00:00Z"}
                ]
            }
        });

        let req = Request::builder()
            .method("POST")
            .uri("/sync")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: SyncResponse = serde_json::from_slice(&body).unwrap();
        assert!(parsed.ack);
        assert!(parsed.commands.is_empty());

        assert!(server.capture.has_ingested_any());
    }

    #[tokio::test]
    async fn sync_claims_pending_commands_for_the_session() {
        let server = make_server();
        let session = SessionId::from("s1");
        let now = server.capture.now();
        server.commands.enqueue(gasoline_commands::types::Command {
            id: gasoline_core::ids::CommandId::new(),
            kind: "click".to_owned(),
            params: json!({}),
            correlation_id: None,
            created_at: now,
            deadline: gasoline_core::clock::Timestamp::from_datetime(
                now.as_datetime() + chrono::Duration::seconds(30),
            ),
            tab_id: None,
            session_id: session.clone(),
        });

        let app = server.router();
        let payload = json!({
            "session_id": "s1",
            "client_version": "1.0.0",
            "settings": {},
            "telemetry": {}
        });
        let req = Request::builder()
            .method("POST")
            .uri("/sync")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: SyncResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.next_poll_ms, BURST_POLL_MS);
    }

    #[tokio::test]
    async fn clear_empties_the_named_buffer() {
        let server = make_server();
        server.capture.add_log(gasoline_capture::streams::LogEntry {
            level: "info".to_owned(),
            message: "a".to_owned(),
            source: "console".to_owned(),
            ts: server.capture.now(),
            tab_id: None,
        });
        let app = server.router();

        let req = Request::builder()
            .method("POST")
            .uri("/clear")
            .header("content-type", "application/json")
            .body(Body::from(json!({"buffer": "logs"}).to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!server.capture.has_ingested_any());
    }

    #[tokio::test]
    async fn clear_with_unknown_buffer_returns_400() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .method("POST")
            .uri("/clear")
            .header("content-type", "application/json")
            .body(Body::from(json!({"buffer": "nonsense"}).to_string()))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn server_listen_binds_port_and_spawns_ticker() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();

        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn server_graceful_shutdown_completes() {
        let server = make_server();
        let (_, handle) = server.listen().await.unwrap();

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }

    #[tokio::test]
    async fn server_health_while_running() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();

        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert!(resp.status().is_success());

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        server.shutdown().shutdown();
        let _ = handle.await;
    }
}
