//! Extension-only auth gate: a shared-secret header check in front of
//! `/sync` and `/clear`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json};
use gasoline_core::errors::{GasolineError, INVALID_PARAMS};
use tracing::warn;

use crate::server::AppState;

/// Header carrying the extension's shared secret.
pub const EXTENSION_TOKEN_HEADER: &str = "x-gasoline-extension-token";

/// Reject requests that don't carry the configured extension token.
///
/// A no-op when [`crate::config::ServerConfig::extension_token`] is `None`,
/// so local development and the integration tests don't need to thread a
/// token through every request.
pub async fn extension_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let Some(expected) = state.config.extension_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(EXTENSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented == Some(expected) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "rejected request missing or mismatched extension token");
    let body = GasolineError::InvalidParams {
        message: "missing or invalid extension token".to_owned(),
    }
    .to_error_body();
    debug_assert_eq!(body.code, INVALID_PARAMS);
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::GasolineServer;
    use crate::shutdown::ShutdownCoordinator;
    use axum::body::Body;
    use axum::http::Request;
    use gasoline_capture::store::CaptureStore;
    use gasoline_commands::queue::CommandQueue;
    use gasoline_core::clock::SystemClock;
    use gasoline_tools::GasolineTools;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    fn server(extension_token: Option<&str>) -> GasolineServer {
        let capture = Arc::new(CaptureStore::new());
        let commands = Arc::new(CommandQueue::new(Arc::new(SystemClock)));
        let tools = Arc::new(GasolineTools::new(capture.clone(), commands.clone()));
        GasolineServer::new(
            ServerConfig {
                extension_token: extension_token.map(str::to_owned),
                ..ServerConfig::default()
            },
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
    async fn no_token_configured_allows_request() {
        let app = server(None).router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_rejected_on_sync() {
        let app = server(Some("secret")).router();
        let req = Request::builder()
            .method("POST")
            .uri("/sync")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let app = server(Some("secret")).router();
        let req = Request::builder()
            .method("POST")
            .uri("/clear")
            .header(EXTENSION_TOKEN_HEADER, "wrong")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"buffer":"all"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_is_exempt_from_the_token_gate() {
        let app = server(Some("secret")).router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn correct_token_is_accepted_on_clear() {
        let app = server(Some("secret")).router();
        let req = Request::builder()
            .method("POST")
            .uri("/clear")
            .header(EXTENSION_TOKEN_HEADER, "secret")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"buffer":"all"}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
