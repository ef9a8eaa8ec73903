//! Periodic TTL eviction of idle devices.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::registry::DeviceRegistry;
use crate::signal::StopSignal;

/// Sweep `registry` every `interval`, evicting devices idle longer than `ttl`.
/// Returns the total number of devices evicted.
pub fn spawn_sweeper(
    registry: Arc<DeviceRegistry>,
    ttl: Duration,
    interval: Duration,
    stop: StopSignal,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;
        let mut evicted = 0usize;

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {
                    let removed = registry.sweep(ttl);
                    for device in &removed {
                        info!(mac = %device.mac, brand = %device.brand, "device expired");
                    }
                    evicted += removed.len();
                }
            }
        }

        debug!(evicted, "device sweeper exiting");
        evicted
    })
}
