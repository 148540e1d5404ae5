//! Reconnecting degraded hubs.

use std::sync::Arc;
use std::time::Duration;

use modbus_light_engine::Link;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Try `Link::reconnect` every `interval` while the link is degraded.
///
/// Healthy links are left alone. Returns when `shutdown` flips to `true`.
pub async fn run_recovery(
    link: Arc<Link>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(hub = %link.name(), "Stopping recovery task");
                    return;
                }
            }
            _ = ticker.tick() => {
                if link.is_degraded() {
                    info!(hub = %link.name(), "Hub degraded, attempting reconnect");
                    // Failures are logged by the link.
                    let _ = link.reconnect().await;
                }
            }
        }
    }
}
