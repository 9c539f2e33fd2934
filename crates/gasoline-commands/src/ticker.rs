//! Background deadline ticker: scans every session every 250 ms and
//! flips past-deadline commands to `expired`.
//!
//! Spawned once by the daemon and registered with its shutdown coordinator,
//! tracking the long-lived task by `JoinHandle` and cancelling it through a
//! shared [`CancellationToken`].

use crate::queue::CommandQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// The ticker's scan interval.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Run the deadline ticker until `shutdown` is cancelled.
///
/// Intended to be spawned as its own task:
/// ```ignore
/// let handle = tokio::spawn(run_deadline_ticker(queue, shutdown_token));
/// shutdown_coordinator.register(handle);
/// ```
pub async fn run_deadline_ticker(queue: Arc<CommandQueue>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("deadline ticker shutting down");
                break;
            }
            _ = interval.tick() => {
                let expired = queue.drain_expired();
                if !expired.is_empty() {
                    trace!(count = expired.len(), "deadline ticker expired commands");
                }
            }
        }
    }
}
