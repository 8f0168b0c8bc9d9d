//! Cache Statistics Module
//!
//! Tracks read outcomes, refreshes and idle evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served without a refresh
    pub hits: u64,
    /// Refresh callback runs that completed successfully
    pub refreshes: u64,
    /// Refresh callback runs that returned an error or panicked
    pub refresh_failures: u64,
    /// Reads of keys that were never added or already removed
    pub misses: u64,
    /// Entries dropped by the idle sweep
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Refresh Rate ==
    /// Share of successful reads that needed a refresh.
    ///
    /// Returns refreshes / (hits + refreshes), or 0.0 if nothing was read.
    pub fn refresh_rate(&self) -> f64 {
        let total = self.hits + self.refreshes;
        if total == 0 {
            0.0
        } else {
            self.refreshes as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    pub fn record_refresh_failure(&mut self) {
        self.refresh_failures += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Adds `count` idle evictions.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
