//! Idle Sweep Task
//!
//! Background task that periodically drops entries left unaccessed for the
//! cache's idle timeout. Staleness is never checked here; that stays lazy.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ExpiringCache;

/// Spawns a background task that periodically purges idle cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps.
///
/// # Arguments
/// * `cache` - Shared reference to the cache
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(ExpiringCache::new(refresher));
/// let sweep_handle = spawn_idle_sweep_task(cache.clone(), 60);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_idle_sweep_task<V>(
    cache: Arc<ExpiringCache<V>>,
    sweep_interval_secs: u64,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting idle sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_idle();

            if removed > 0 {
                info!("Idle sweep: removed {} idle entries", removed);
            } else {
                debug!("Idle sweep: no idle entries found");
            }
        }
    })
}
