//! Tick driver for hosts without their own frame loop.
//!
//! Calls `process_tick` on a fixed interval. The registry sits behind a mutex,
//! which is the external serialization the registry expects: the driver and
//! any other caller take turns, never overlap.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::LifecycleRegistry;

/// Spawn the tick loop. The handle resolves to the number of ticks run once
/// `shutdown` is cancelled.
pub fn spawn_tick_driver(
    registry: Arc<Mutex<LifecycleRegistry>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<u64> {
    tokio::spawn(async move { tick_loop(&registry, interval, shutdown).await })
}

async fn tick_loop(
    registry: &Mutex<LifecycleRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!(ticks, "tick driver: shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                let report = registry.lock().process_tick();
                ticks += 1;
                if report.has_changes() {
                    tracing::debug!(
                        ticks,
                        reclaimed = report.reclaimed.len(),
                        orphaned = report.orphaned.len(),
                        "tick driver progress"
                    );
                }
            }
        }
    }
    ticks
}
