//! Background expiry monitor.
//!
//! Periodically asks the coordinator to block active clients whose
//! subscription expiry has passed. The sweep is idempotent, so the interval
//! only bounds how long an expired client can keep VPN access.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::lifecycle::Coordinator;

/// Spawn the expiry sweep task. The task runs until the shutdown channel
/// fires.
pub fn spawn_expiry_monitor(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match coordinator.deactivate_expired().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "Expiry sweep blocked expired clients"),
                        Err(e) => warn!(error = %e, "Expiry sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Expiry monitor shutting down");
                    return;
                }
            }
        }
    })
}
