//! Background cleanup: prune expired rate-limit records.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use vaultlink_core::RateLimiter;

/// Prune the limiter once per window. Abort the returned handle to stop.
pub fn spawn_cleanup_task(limiter: RateLimiter) -> JoinHandle<()> {
    let period = limiter.window().max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut interval = time::interval(period);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let pruned = limiter.prune_expired();
            tracing::debug!(pruned, tracked = limiter.tracked(), "Cleanup completed");
        }
    })
}
