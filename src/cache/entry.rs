//! Cache Entry Module
//!
//! Defines the per-key record: value, freshness timestamp and TTL kept together.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

// == Cache Entry ==
/// Represents a single cache entry with value and freshness metadata.
///
/// `created_at + ttl` is the expiry instant. The entry is stale once the
/// current time reaches it.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Instant the entry was last considered fresh
    pub created_at: DateTime<Utc>,
    /// How long after `created_at` the entry stays fresh
    pub ttl: chrono::Duration,
    /// Last read or write, used for idle eviction
    pub last_access: DateTime<Utc>,
    /// Bumped on every write of `value`
    pub generation: u64,
    /// Bumped every time a refresh completes
    pub refresh_epoch: u64,
    /// Bumped every time a refresh fails
    pub failure_epoch: u64,
    /// Reason of the most recent failed refresh, cleared by a successful one
    pub last_failure: Option<String>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry.
    ///
    /// When `initialized` is false the entry is backdated by exactly `ttl`,
    /// so the first read finds it stale.
    ///
    /// # Errors
    /// `InvalidTtl` when `ttl` cannot be applied to `now` in either direction.
    pub fn new(value: V, ttl: Duration, now: DateTime<Utc>, initialized: bool) -> Result<Self> {
        let ttl = checked_ttl(ttl, now)?;
        let created_at = if initialized {
            now
        } else {
            now.checked_sub_signed(ttl)
                .ok_or_else(|| CacheError::InvalidTtl(format!("{}s", ttl.num_seconds())))?
        };

        Ok(Self {
            value,
            created_at,
            ttl,
            last_access: now,
            generation: 0,
            refresh_epoch: 0,
            failure_epoch: 0,
            last_failure: None,
        })
    }

    // == Expiry ==
    /// Returns the instant the entry becomes stale.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    // == Is Stale ==
    /// Checks if the entry needs a refresh.
    ///
    /// Boundary condition: stale when `now >= expires_at`, so a zero TTL is
    /// always stale.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    // == Time To Live ==
    /// Returns the time left before the entry goes stale, zero if already stale.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).to_std().unwrap_or(Duration::ZERO)
    }

    // == Overwrite ==
    /// Replaces the value and marks the entry fresh as of `now`. TTL is kept.
    pub fn overwrite(&mut self, value: V, now: DateTime<Utc>) {
        self.value = value;
        self.created_at = now;
        self.last_access = now;
        self.generation += 1;
    }

    // == Touch ==
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_access {
            self.last_access = now;
        }
    }

    // == Is Idle ==
    /// Checks if the entry went unaccessed for at least `idle_timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        match chrono::Duration::from_std(idle_timeout) {
            Ok(idle) => now - self.last_access >= idle,
            Err(_) => false,
        }
    }
}

// == Utility Functions ==
/// Converts a TTL into a signed duration that can be added to and
/// subtracted from `now` without overflowing.
pub fn checked_ttl(ttl: Duration, now: DateTime<Utc>) -> Result<chrono::Duration> {
    let invalid = || CacheError::InvalidTtl(format!("{}s is out of range", ttl.as_secs()));
    let signed = chrono::Duration::from_std(ttl).map_err(|_| invalid())?;

    if now.checked_add_signed(signed).is_none() || now.checked_sub_signed(signed).is_none() {
        return Err(invalid());
    }
    Ok(signed)
}
