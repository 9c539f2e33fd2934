//! Minimal process entry point for the gasoline daemon: load config, start
//! the HTTP server, and wait for a shutdown signal.
//!
//! Process supervision (pidfiles, respawn, daemonization) is left to
//! whatever launches this binary; this is just enough to run the server
//! standalone for local development and smoke testing.

use std::sync::Arc;
use std::time::Instant;

use gasoline_capture::store::CaptureStore;
use gasoline_commands::queue::CommandQueue;
use gasoline_core::clock::SystemClock;
use gasoline_server::config;
use gasoline_server::metrics as gasoline_metrics;
use gasoline_server::server::GasolineServer;
use gasoline_server::shutdown::ShutdownCoordinator;
use gasoline_tools::GasolineTools;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("starting gasoline daemon");

    let cfg = config::load();

    let clock: Arc<dyn gasoline_core::clock::Clock> = Arc::new(SystemClock);
    let capture = Arc::new(CaptureStore::with_capacities(cfg.capture, clock.clone()));
    let commands = Arc::new(CommandQueue::with_config(clock, cfg.commands));
    let tools = Arc::new(GasolineTools::new(capture.clone(), commands.clone()));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    let metrics_handle = gasoline_metrics::install_recorder();

    let server = GasolineServer::new(
        cfg.server,
        capture,
        commands,
        tools,
        shutdown.clone(),
        Instant::now(),
        metrics_handle,
    );

    let (addr, handle) = server.listen().await.expect("failed to bind server");
    tracing::info!(%addr, "gasoline daemon ready");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");

    tracing::info!("shutting down");
    shutdown.shutdown();
    let _ = handle.await;
}
