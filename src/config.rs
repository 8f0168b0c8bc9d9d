//! Configuration Module
//!
//! Handles loading cache and demo driver configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::StalePolicy;

/// Cache and driver configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time in milliseconds a reader waits for another thread's refresh
    pub refresh_wait_ms: u64,
    /// Seconds an entry may go unaccessed before the idle sweep drops it; 0 disables
    pub idle_timeout: u64,
    /// Background idle sweep interval in seconds
    pub sweep_interval: u64,
    /// What resets an entry's clock after a refresh
    pub stale_policy: StalePolicy,
    /// Demo poller interval in seconds
    pub poll_interval: u64,
    /// Number of demo polling rounds
    pub poll_iterations: u32,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REFRESH_WAIT_MS` - Wait budget for an in-flight refresh (default: 5000)
    /// - `IDLE_TIMEOUT` - Idle eviction threshold in seconds, 0 disables (default: 86400)
    /// - `SWEEP_INTERVAL` - Idle sweep frequency in seconds (default: 60)
    /// - `STALE_POLICY` - `attempt` or `set` (default: attempt)
    /// - `POLL_INTERVAL` - Demo polling frequency in seconds (default: 1)
    /// - `POLL_ITERATIONS` - Demo polling rounds (default: 99)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            refresh_wait_ms: parse_var("REFRESH_WAIT_MS").unwrap_or(defaults.refresh_wait_ms),
            idle_timeout: parse_var("IDLE_TIMEOUT").unwrap_or(defaults.idle_timeout),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
            stale_policy: parse_var("STALE_POLICY").unwrap_or(defaults.stale_policy),
            poll_interval: parse_var("POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            poll_iterations: parse_var("POLL_ITERATIONS").unwrap_or(defaults.poll_iterations),
        }
    }

    /// Wait budget for an in-flight refresh.
    pub fn refresh_wait(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_ms)
    }

    /// Idle eviction threshold, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_wait_ms: 5000,
            idle_timeout: 24 * 60 * 60,
            sweep_interval: 60,
            stale_policy: StalePolicy::ResetOnAttempt,
            poll_interval: 1,
            poll_iterations: 99,
        }
    }
}
