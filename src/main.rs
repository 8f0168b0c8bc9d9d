//! Lazy Cache - demo driver
//!
//! Seeds three keys with different expiration policies and polls them,
//! printing every read.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lazy_cache::demo::{render_value, seed, DemoRefresher, DEMO_KEYS};
use lazy_cache::tasks::read_round;
use lazy_cache::{spawn_idle_sweep_task, spawn_poll_task, Config, ExpiringCache};

/// Main entry point for the demo driver.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and seed the demo keys
/// 4. Read every key once
/// 5. Start the idle sweep and poller tasks
/// 6. Run until polling finishes or SIGINT/SIGTERM arrives
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lazy_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lazy Cache demo");

    let config = Config::from_env();
    info!(
        "Configuration loaded: stale_policy={:?}, refresh_wait={}ms, idle_timeout={}s, poll_interval={}s",
        config.stale_policy, config.refresh_wait_ms, config.idle_timeout, config.poll_interval
    );

    let cache = Arc::new(ExpiringCache::from_config(&config, DemoRefresher::new()));
    seed(&cache).context("failed to seed demo keys")?;
    info!("Cache seeded with {} keys", cache.len());

    let keys: Vec<String> = DEMO_KEYS.iter().map(|k| k.to_string()).collect();
    let init_cache = cache.clone();
    let init_keys = keys.clone();
    let init = tokio::task::spawn_blocking(move || read_round(&*init_cache, &init_keys))
        .await
        .context("initial read failed")?;
    for (key, result) in init {
        match result {
            Ok(value) => println!("INIT {}={}", key, render_value(&value)),
            Err(err) => warn!("INIT {} failed: {}", key, err),
        }
    }

    let sweep_handle = spawn_idle_sweep_task(cache.clone(), config.sweep_interval);
    let poll_handle = spawn_poll_task(
        cache.clone(),
        keys,
        config.poll_interval,
        config.poll_iterations,
        render_value,
    );

    wait_for_exit(poll_handle).await;

    sweep_handle.abort();
    info!(
        "Final stats: {}",
        serde_json::to_string(&cache.stats()).context("failed to encode stats")?
    );
    info!("Demo shutdown complete");
    Ok(())
}

/// Waits for the poller to finish or for a shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_exit(poll_handle: JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let abort_handle = poll_handle.abort_handle();

    tokio::select! {
        result = poll_handle => {
            if let Err(err) = result {
                warn!("Poller task failed: {}", err);
            }
        }
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
            abort_handle.abort();
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
            abort_handle.abort();
        }
    }
}
