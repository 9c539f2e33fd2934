//! `/health` endpoint: `{status:"ok", version, service:"gasoline",
//! capture:{available:bool}}`.

use gasoline_core::constants;
use serde::Serialize;
use std::time::Instant;

/// Capture-availability sub-object.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureHealth {
    /// `true` once any telemetry has been ingested this run.
    pub available: bool,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Daemon version, from `CARGO_PKG_VERSION`.
    pub version: &'static str,
    /// Always `"gasoline"`.
    pub service: &'static str,
    /// Capture-store availability snapshot.
    pub capture: CaptureHealth,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, capture_available: bool) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        version: constants::VERSION,
        service: constants::NAME,
        capture: CaptureHealth {
            available: capture_available,
        },
    }
}
