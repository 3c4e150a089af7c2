//! Periodic cleanup of expired limiter buckets and revocation entries.
//!
//! Runs on a low-priority interval and takes the same locks as request
//! handling; nothing else coordinates with it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::bootstrap::SecurityCore;
use crate::lifecycle::Shutdown;

pub fn spawn_maintenance(core: Arc<SecurityCore>, interval: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = core.run_maintenance();
                    if report.buckets_purged + report.revocations_purged > 0 {
                        tracing::debug!(
                            buckets_purged = report.buckets_purged,
                            revocations_purged = report.revocations_purged,
                            "Maintenance pass"
                        );
                    }
                }
                _ = stop.recv() => {
                    tracing::info!("Maintenance task stopped");
                    break;
                }
            }
        }
    })
}
