//! Poller Task
//!
//! Reads a fixed set of keys on an interval, letting stale entries refresh
//! through the normal read path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::ExpiringCache;
use crate::error::Result;

/// Reads every key once, in order.
///
/// Reads may run the refresher, so callers on an async runtime should run
/// this on a blocking thread.
pub fn read_round<V: Clone>(
    cache: &ExpiringCache<V>,
    keys: &[String],
) -> Vec<(String, Result<V>)> {
    keys.iter()
        .map(|key| (key.clone(), cache.get(key)))
        .collect()
}

/// Spawns a task that reads `keys` every `interval_secs` seconds for
/// `iterations` rounds and prints each value as `GET key=value`, formatted
/// by `render`.
///
/// Read errors are logged and the poll continues with the next key.
pub fn spawn_poll_task<V>(
    cache: Arc<ExpiringCache<V>>,
    keys: Vec<String>,
    interval_secs: u64,
    iterations: u32,
    render: fn(&V) -> String,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = Duration::from_secs(interval_secs);
    let keys = Arc::new(keys);

    tokio::spawn(async move {
        info!(
            "Polling {} keys every {} seconds for {} rounds",
            keys.len(),
            interval_secs,
            iterations
        );

        for round in 1..=iterations {
            let round_cache = cache.clone();
            let round_keys = keys.clone();
            let read = tokio::task::spawn_blocking(move || {
                read_round(&*round_cache, round_keys.as_slice())
            });
            let results = match read.await {
                Ok(results) => results,
                Err(err) => {
                    warn!("Poll round {} aborted: {}", round, err);
                    break;
                }
            };

            for (key, result) in results {
                match result {
                    Ok(value) => println!("GET {}={}", key, render(&value)),
                    Err(err) => warn!("GET {} failed: {}", key, err),
                }
            }

            if round < iterations {
                tokio::time::sleep(interval).await;
            }
        }

        info!("Polling finished");
    })
}
