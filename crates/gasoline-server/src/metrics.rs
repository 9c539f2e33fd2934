//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across call sites.

/// `/sync` requests total (counter).
pub const SYNC_REQUESTS_TOTAL: &str = "sync_requests_total";
/// `/sync` requests rejected by the extension-auth gate (counter).
pub const SYNC_AUTH_REJECTED_TOTAL: &str = "sync_auth_rejected_total";
/// `/sync` request duration seconds (histogram).
pub const SYNC_REQUEST_DURATION_SECONDS: &str = "sync_request_duration_seconds";
/// Commands enqueued total (counter, labels: kind).
pub const COMMANDS_ENQUEUED_TOTAL: &str = "commands_enqueued_total";
/// Commands expired by the deadline ticker total (counter).
pub const COMMANDS_EXPIRED_TOTAL: &str = "commands_expired_total";
/// Telemetry entries ingested total (counter, labels: stream).
pub const TELEMETRY_INGESTED_TOTAL: &str = "telemetry_ingested_total";
/// `/clear` requests total (counter, labels: buffer).
pub const CLEAR_REQUESTS_TOTAL: &str = "clear_requests_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();

        // Should produce valid (possibly empty) Prometheus text.
        let output = handle.render();
        // Empty or contains valid text — no panic.
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SYNC_REQUESTS_TOTAL,
            SYNC_AUTH_REJECTED_TOTAL,
            SYNC_REQUEST_DURATION_SECONDS,
            COMMANDS_ENQUEUED_TOTAL,
            COMMANDS_EXPIRED_TOTAL,
            TELEMETRY_INGESTED_TOTAL,
            CLEAR_REQUESTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
