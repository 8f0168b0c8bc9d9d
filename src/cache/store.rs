//! Cache Store Module
//!
//! Main cache engine: one record per key, lazy staleness checks on read, and
//! a single-flight refresh through the registered [`Refresher`].

use std::any::Any;
use std::cell::Cell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{
    CacheEntry, CacheStats, Clock, Refresher, SystemClock, MAX_KEY_LENGTH, NEVER_TTL,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Stale Policy ==
/// Decides what resets an entry's clock once a refresh completes.
///
/// If the refresher called `set`, the timestamp written by `set` is kept
/// under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Any completed refresh marks the entry fresh as of the staleness check,
    /// so a refresher that declines to `set` is retried at most once per TTL.
    #[default]
    ResetOnAttempt,
    /// Only `set` marks the entry fresh. A refresher that declines to `set`
    /// is retried on the next read.
    ResetOnSet,
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attempt" | "reset_on_attempt" => Ok(StalePolicy::ResetOnAttempt),
            "set" | "reset_on_set" => Ok(StalePolicy::ResetOnSet),
            other => Err(format!("unknown stale policy '{}'", other)),
        }
    }
}

// == Slot ==
/// Everything held for one key.
struct Slot<V> {
    entry: Mutex<CacheEntry<V>>,
    /// Held for the whole refresh. The flag is set while the owning thread is
    /// inside the refresher.
    refresh: ReentrantMutex<Cell<bool>>,
}

impl<V> Slot<V> {
    fn new(entry: CacheEntry<V>) -> Self {
        Self {
            entry: Mutex::new(entry),
            refresh: ReentrantMutex::new(Cell::new(false)),
        }
    }
}

// == Expiring Cache ==
/// Key/value cache with per-entry TTL and lazy refresh.
///
/// Staleness is only checked by [`get`](Self::get). A stale read calls the
/// refresher on the reading thread, then returns the (possibly new) value.
/// At most one refresh per key runs at a time; other readers of that key
/// wait up to the configured refresh wait and then reuse its result.
///
/// Share it across threads and tasks with `Arc`.
pub struct ExpiringCache<V> {
    slots: RwLock<HashMap<String, Arc<Slot<V>>>>,
    refresher: Box<dyn Refresher<V>>,
    clock: Arc<dyn Clock>,
    stats: Mutex<CacheStats>,
    stale_policy: StalePolicy,
    refresh_wait: Duration,
    idle_timeout: Option<Duration>,
}

impl<V: Clone> ExpiringCache<V> {
    // == Constructor ==
    /// Creates a cache with default configuration.
    pub fn new(refresher: impl Refresher<V> + 'static) -> Self {
        Self::from_config(&Config::default(), refresher)
    }

    /// Creates a cache from configuration.
    pub fn from_config(config: &Config, refresher: impl Refresher<V> + 'static) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            refresher: Box::new(refresher),
            clock: Arc::new(SystemClock),
            stats: Mutex::new(CacheStats::new()),
            stale_policy: config.stale_policy,
            refresh_wait: config.refresh_wait(),
            idle_timeout: config.idle_timeout(),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn stale_policy(&self) -> StalePolicy {
        self.stale_policy
    }

    // == Add ==
    /// Inserts or replaces an entry that goes stale `ttl` after it was last
    /// considered fresh.
    ///
    /// With `initialized = false` the entry starts out stale, so the first
    /// `get` refreshes it.
    ///
    /// # Errors
    /// `InvalidKey` for an empty or oversized key, `InvalidTtl` for a TTL
    /// that cannot be applied to the current time.
    pub fn add(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        initialized: bool,
    ) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        let entry = CacheEntry::new(value, ttl, self.clock.now(), initialized)?;
        self.insert(key, entry);
        Ok(())
    }

    /// Same as [`add`](Self::add) with a TTL in whole seconds.
    ///
    /// # Errors
    /// `InvalidTtl` for a negative TTL.
    pub fn add_secs(
        &self,
        key: impl Into<String>,
        value: V,
        ttl_secs: i64,
        initialized: bool,
    ) -> Result<()> {
        let ttl = u64::try_from(ttl_secs)
            .map_err(|_| CacheError::InvalidTtl(format!("{}s is negative", ttl_secs)))?;
        self.add(key, value, Duration::from_secs(ttl), initialized)
    }

    /// Inserts an entry with a zero TTL: every `get` refreshes it.
    pub fn add_immediate(&self, key: impl Into<String>, value: V) -> Result<()> {
        self.add(key, value, Duration::ZERO, true)
    }

    /// Inserts an entry with [`NEVER_TTL`].
    ///
    /// With `initialized = false` the first `get` still refreshes it once.
    pub fn add_once(&self, key: impl Into<String>, value: V, initialized: bool) -> Result<()> {
        self.add(key, value, NEVER_TTL, initialized)
    }

    fn insert(&self, key: String, mut entry: CacheEntry<V>) {
        let mut slots = self.slots.write();
        match slots.entry(key) {
            Entry::Occupied(occupied) => {
                let mut current = occupied.get().entry.lock();
                entry.generation = current.generation + 1;
                entry.refresh_epoch = current.refresh_epoch;
                entry.failure_epoch = current.failure_epoch;
                *current = entry;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Slot::new(entry)));
            }
        }
        self.stats.lock().set_total_entries(slots.len());
    }

    fn slot(&self, key: &str) -> Result<Arc<Slot<V>>> {
        self.slots
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Get ==
    /// Returns the value for `key`, refreshing it first if it is stale.
    ///
    /// # Errors
    /// - `NotFound` if the key was never added or was removed
    /// - `Refresh` if the refresher failed; the previous value is still
    ///   available through [`peek`](Self::peek)
    /// - `Refresh` is also returned to readers that were waiting on a refresh
    ///   that failed; the next read after that retries
    /// - `RefreshTimeout` if another thread's refresh of the key outlasted
    ///   the refresh wait
    /// - `NotFound` if the key was removed while this read was refreshing it
    ///
    /// The wait bound only applies to readers queued behind a refresh. The
    /// thread that runs the refresher blocks for as long as the refresher
    /// does; a refresher that can hang must bound its own I/O.
    pub fn get(&self, key: &str) -> Result<V> {
        let slot = match self.slot(key) {
            Ok(slot) => slot,
            Err(err) => {
                self.stats.lock().record_miss();
                return Err(err);
            }
        };

        let now = self.clock.now();
        let (observed_epoch, observed_failures) = {
            let mut entry = slot.entry.lock();
            entry.touch(now);
            if !entry.is_stale(now) {
                self.stats.lock().record_hit();
                return Ok(entry.value.clone());
            }
            (entry.refresh_epoch, entry.failure_epoch)
        };

        let Some(guard) = slot.refresh.try_lock_for(self.refresh_wait) else {
            warn!(
                key,
                wait_ms = self.refresh_wait.as_millis() as u64,
                "Gave up waiting for in-flight refresh"
            );
            return Err(CacheError::RefreshTimeout(key.to_string()));
        };

        // Re-entered from this key's own refresher.
        if guard.get() {
            return Ok(slot.entry.lock().value.clone());
        }

        let (checked_at, generation) = {
            let entry = slot.entry.lock();
            let checked_at = self.clock.now();
            if entry.failure_epoch != observed_failures {
                debug!(key, "Refresh failed while waiting");
                return Err(CacheError::Refresh {
                    key: key.to_string(),
                    reason: entry.last_failure.clone().unwrap_or_default(),
                });
            }
            if entry.refresh_epoch != observed_epoch || !entry.is_stale(checked_at) {
                debug!(key, "Entry refreshed while waiting");
                self.stats.lock().record_hit();
                return Ok(entry.value.clone());
            }
            (checked_at, entry.generation)
        };

        debug!(key, "Entry stale, refreshing");
        guard.set(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.refresher.refresh(self, key)));
        guard.set(false);

        self.complete_refresh(key, &slot, outcome, checked_at, generation)
    }

    fn complete_refresh(
        &self,
        key: &str,
        slot: &Arc<Slot<V>>,
        outcome: std::thread::Result<anyhow::Result<()>>,
        checked_at: DateTime<Utc>,
        generation: u64,
    ) -> Result<V> {
        let reason = match outcome {
            Ok(Ok(())) => {
                let value = {
                    let mut entry = slot.entry.lock();
                    let was_set = entry.generation != generation;
                    if !was_set && self.stale_policy == StalePolicy::ResetOnAttempt {
                        entry.created_at = checked_at;
                    }
                    entry.refresh_epoch += 1;
                    entry.last_failure = None;
                    debug!(key, was_set, "Refresh completed");
                    entry.value.clone()
                };
                self.stats.lock().record_refresh();
                return self.live_value(key, slot, value);
            }
            Ok(Err(err)) => format!("{:#}", err),
            Err(payload) => panic_message(payload.as_ref()),
        };

        {
            let mut entry = slot.entry.lock();
            entry.failure_epoch += 1;
            entry.last_failure = Some(reason.clone());
        }
        self.stats.lock().record_refresh_failure();
        warn!(key, %reason, "Refresh failed");
        Err(CacheError::Refresh {
            key: key.to_string(),
            reason,
        })
    }

    /// Returns `value` if `slot` is still the one stored under `key`,
    /// otherwise whatever replaced it.
    fn live_value(&self, key: &str, slot: &Arc<Slot<V>>, value: V) -> Result<V> {
        let live = self.slots.read().get(key).cloned();
        match live {
            Some(live) if Arc::ptr_eq(&live, slot) => Ok(value),
            Some(live) => {
                debug!(key, "Entry replaced during refresh");
                let value = live.entry.lock().value.clone();
                Ok(value)
            }
            None => {
                debug!(key, "Entry removed during refresh");
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    // == Set ==
    /// Overwrites the value for `key` and marks it fresh. TTL is unchanged.
    ///
    /// # Errors
    /// `NotFound` if the key was never added or was removed.
    pub fn set(&self, key: &str, value: V) -> Result<()> {
        let slot = self.slot(key)?;
        let now = self.clock.now();
        slot.entry.lock().overwrite(value, now);
        Ok(())
    }

    // == Peek ==
    /// Returns the current value without checking staleness or refreshing.
    pub fn peek(&self, key: &str) -> Result<V> {
        let slot = self.slot(key)?;
        let mut entry = slot.entry.lock();
        entry.touch(self.clock.now());
        Ok(entry.value.clone())
    }

    // == Remove ==
    /// Removes `key` together with its timestamp and TTL.
    ///
    /// # Errors
    /// `NotFound` if the key is not present, e.g. on a second removal.
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut slots = self.slots.write();
        if slots.remove(key).is_some() {
            self.stats.lock().set_total_entries(slots.len());
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    // == Expiry Inspection ==
    /// Returns the instant `key` goes stale.
    pub fn expires_at(&self, key: &str) -> Result<DateTime<Utc>> {
        Ok(self.slot(key)?.entry.lock().expires_at())
    }

    /// Returns the time left before `key` goes stale, zero if already stale.
    pub fn ttl_remaining(&self, key: &str) -> Result<Duration> {
        let slot = self.slot(key)?;
        let remaining = slot.entry.lock().ttl_remaining(self.clock.now());
        Ok(remaining)
    }

    // == Purge Idle ==
    /// Removes entries not read or written within the idle timeout.
    ///
    /// Returns the number of entries removed.
    pub fn purge_idle(&self) -> usize {
        let Some(idle_timeout) = self.idle_timeout else {
            return 0;
        };
        let now = self.clock.now();

        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| !slot.entry.lock().is_idle(now, idle_timeout));
        let removed = before - slots.len();

        let mut stats = self.stats.lock();
        stats.record_evictions(removed);
        stats.set_total_entries(slots.len());
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total_entries = self.len();
        let mut stats = self.stats.lock().clone();
        stats.set_total_entries(total_entries);
        stats
    }
}

impl<V> fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.slots.read().len())
            .field("clock", &self.clock)
            .field("stale_policy", &self.stale_policy)
            .field("refresh_wait", &self.refresh_wait)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("refresher panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("refresher panicked: {}", msg)
    } else {
        "refresher panicked".to_string()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Cache whose refresher sets the key to the number of refreshes so far.
    fn counting_cache(
        clock: &ManualClock,
        config: &Config,
    ) -> (ExpiringCache<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cache = ExpiringCache::from_config(
            config,
            move |cache: &ExpiringCache<usize>, key: &str| -> anyhow::Result<()> {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                cache.set(key, n)?;
                Ok(())
            },
        )
        .with_clock(clock.clone());
        (cache, calls)
    }

    /// Cache whose refresher never calls `set`.
    fn noop_cache(
        clock: &ManualClock,
        policy: StalePolicy,
    ) -> (ExpiringCache<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let config = Config {
            stale_policy: policy,
            ..Config::default()
        };
        let cache = ExpiringCache::from_config(
            &config,
            move |_: &ExpiringCache<usize>, _: &str| -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
        .with_clock(clock.clone());
        (cache, calls)
    }

    #[test]
    fn test_store_new() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.stale_policy(), StalePolicy::ResetOnAttempt);
    }

    #[test]
    fn test_add_initialized_does_not_refresh() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add("k", 42, Duration::from_secs(10), true).unwrap();

        assert_eq!(cache.get("k").unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_add_uninitialized_refreshes_once() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add("k", 0, Duration::from_secs(10), false).unwrap();

        assert_eq!(cache.get("k").unwrap(), 1);
        assert_eq!(cache.get("k").unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ttl_elapses_then_refreshes() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add("k", 0, Duration::from_secs(2), true).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k").unwrap(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("k").unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_immediate_refreshes_every_read() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add_immediate("k", 0).unwrap();

        assert_eq!(cache.get("k").unwrap(), 1);
        assert_eq!(cache.get("k").unwrap(), 2);
        assert_eq!(cache.get("k").unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_add_once_initialized_never_refreshes() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add_once("k", 5, true).unwrap();
        for _ in 0..100 {
            clock.advance(Duration::from_secs(60));
            assert_eq!(cache.get("k").unwrap(), 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_add_once_uninitialized_refreshes_first_read_only() {
        let clock = ManualClock::new();
        let (cache, calls) = noop_cache(&clock, StalePolicy::ResetOnAttempt);

        cache.add_once("k", 5, false).unwrap();
        for _ in 0..10 {
            clock.advance(Duration::from_secs(1));
            assert_eq!(cache.get("k").unwrap(), 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_secs_rejects_negative_ttl() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());

        let result = cache.add_secs("k", 1, -1, true);
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_add_rejects_out_of_range_ttl() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());

        let result = cache.add("k", 1, Duration::MAX, true);
        assert!(matches!(result, Err(CacheError::InvalidTtl(_))));
    }

    #[test]
    fn test_add_rejects_invalid_keys() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());

        assert!(matches!(
            cache.add_immediate("", 1),
            Err(CacheError::InvalidKey(_))
        ));
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            cache.add_immediate(long_key, 1),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_readd_replaces_record() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add_immediate("k", 1).unwrap();
        cache.add("k", 9, Duration::from_secs(60), true).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_then_get_is_fresh() {
        let clock = ManualClock::new();
        let (cache, calls) = counting_cache(&clock, &Config::default());

        cache.add("k", 0, Duration::from_secs(5), false).unwrap();
        cache.set("k", 77).unwrap();

        assert_eq!(cache.get("k").unwrap(), 77);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_keeps_ttl() {
        let clock = ManualClock::new();
        let (cache, _) = counting_cache(&clock, &Config::default());

        cache.add("k", 0, Duration::from_secs(5), true).unwrap();
        clock.advance(Duration::from_secs(3));
        cache.set("k", 1).unwrap();

        assert_eq!(cache.ttl_remaining("k").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_key_errors() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());

        assert_eq!(cache.get("nope"), Err(CacheError::NotFound("nope".to_string())));
        assert!(matches!(cache.set("nope", 1), Err(CacheError::NotFound(_))));
        assert!(matches!(cache.peek("nope"), Err(CacheError::NotFound(_))));
        assert!(matches!(cache.expires_at("nope"), Err(CacheError::NotFound(_))));
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_remove_twice() {
        let (cache, _) = counting_cache(&ManualClock::new(), &Config::default());

        cache.add_immediate("k", 1).unwrap();
        assert!(cache.remove("k").is_ok());
        assert!(matches!(cache.remove("k"), Err(CacheError::NotFound(_))));
        assert!(matches!(cache.get("k"), Err(CacheError::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reset_on_attempt_throttles_noop_refresher() {
        let clock = ManualClock::new();
        let (cache, calls) = noop_cache(&clock, StalePolicy::ResetOnAttempt);

        cache.add("k", 1, Duration::from_secs(10), false).unwrap();
        cache.get("k").unwrap();
        cache.get("k").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(10));
        cache.get("k").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_on_set_retries_noop_refresher() {
        let clock = ManualClock::new();
        let (cache, calls) = noop_cache(&clock, StalePolicy::ResetOnSet);

        cache.add("k", 1, Duration::from_secs(10), false).unwrap();
        cache.get("k").unwrap();
        cache.get("k").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.set("k", 2).unwrap();
        assert_eq!(cache.get("k").unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_refresh_error_keeps_stale_value() {
        let clock = ManualClock::new();
        let cache = ExpiringCache::new(
            |_: &ExpiringCache<&'static str>, _: &str| -> anyhow::Result<()> {
                anyhow::bail!("source offline")
            },
        )
        .with_clock(clock.clone());

        cache.add("k", "old", Duration::from_secs(5), false).unwrap();

        let err = cache.get("k").unwrap_err();
        assert_eq!(
            err,
            CacheError::Refresh {
                key: "k".to_string(),
                reason: "source offline".to_string(),
            }
        );
        assert_eq!(cache.peek("k").unwrap(), "old");
        assert!(matches!(cache.get("k"), Err(CacheError::Refresh { .. })));

        let stats = cache.stats();
        assert_eq!(stats.refresh_failures, 2);
        assert_eq!(stats.refreshes, 0);
    }

    #[test]
    fn test_refresher_panic_is_reported() {
        let cache = ExpiringCache::new(|_: &ExpiringCache<u8>, _: &str| -> anyhow::Result<()> {
            panic!("boom")
        })
        .with_clock(ManualClock::new());

        cache.add_immediate("k", 1).unwrap();

        match cache.get("k") {
            Err(CacheError::Refresh { reason, .. }) => assert!(reason.contains("boom")),
            other => panic!("unexpected result: {:?}", other),
        }
        // The refresh lock is released after the panic.
        assert!(matches!(cache.get("k"), Err(CacheError::Refresh { .. })));
    }

    #[test]
    fn test_reentrant_get_from_refresher() {
        let cache = ExpiringCache::new(
            |cache: &ExpiringCache<u32>, key: &str| -> anyhow::Result<()> {
                let current = cache.get(key)?;
                cache.set(key, current + 1)?;
                Ok(())
            },
        )
        .with_clock(ManualClock::new());

        cache.add_immediate("k", 10).unwrap();

        assert_eq!(cache.get("k").unwrap(), 11);
        assert_eq!(cache.get("k").unwrap(), 12);
    }

    #[test]
    fn test_refresher_can_touch_other_keys() {
        let cache = ExpiringCache::new(
            |cache: &ExpiringCache<u32>, key: &str| -> anyhow::Result<()> {
                if key == "total" {
                    let a = cache.get("a")?;
                    cache.set("total", a * 2)?;
                }
                Ok(())
            },
        )
        .with_clock(ManualClock::new());

        cache.add_once("a", 21, true).unwrap();
        cache.add_immediate("total", 0).unwrap();

        assert_eq!(cache.get("total").unwrap(), 42);
    }

    #[test]
    fn test_purge_idle() {
        let clock = ManualClock::new();
        let config = Config {
            idle_timeout: 60,
            ..Config::default()
        };
        let (cache, _) = counting_cache(&clock, &config);

        cache.add_once("cold", 1, true).unwrap();
        cache.add_once("warm", 2, true).unwrap();

        clock.advance(Duration::from_secs(30));
        cache.get("warm").unwrap();
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_idle(), 1);
        assert!(!cache.contains("cold"));
        assert!(cache.contains("warm"));

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_purge_idle_disabled() {
        let clock = ManualClock::new();
        let config = Config {
            idle_timeout: 0,
            ..Config::default()
        };
        let (cache, _) = counting_cache(&clock, &config);

        cache.add_once("k", 1, true).unwrap();
        clock.advance(Duration::from_secs(10 * 24 * 60 * 60));

        assert_eq!(cache.purge_idle(), 0);
        assert!(cache.contains("k"));
    }

    #[test]
    fn test_stats() {
        let clock = ManualClock::new();
        let (cache, _) = counting_cache(&clock, &Config::default());

        cache.add_immediate("a", 0).unwrap();
        cache.add_once("c", 0, true).unwrap();
        cache.get("a").unwrap(); // refresh
        cache.get("c").unwrap(); // hit
        let _ = cache.get("missing"); // miss

        let stats = cache.stats();
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 2);
    }

    #[test]
    fn test_stale_policy_from_str() {
        assert_eq!(
            "attempt".parse::<StalePolicy>().unwrap(),
            StalePolicy::ResetOnAttempt
        );
        assert_eq!(
            "RESET_ON_SET".parse::<StalePolicy>().unwrap(),
            StalePolicy::ResetOnSet
        );
        assert!("sometimes".parse::<StalePolicy>().is_err());
    }
}
