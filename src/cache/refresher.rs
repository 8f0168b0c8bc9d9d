//! Refresher Module
//!
//! The hook a cache calls to repopulate a stale entry.

use crate::cache::ExpiringCache;

// == Refresher Trait ==
/// Repopulates a stale entry from its source of truth.
///
/// Called synchronously from [`ExpiringCache::get`] on the reading thread,
/// with no cache lock held. Implementations are expected to call
/// [`ExpiringCache::set`] for `key`. Returning `Ok(())` without calling
/// `set` is allowed and leaves the current value in place.
///
/// Closures of the form `Fn(&ExpiringCache<V>, &str) -> anyhow::Result<()>`
/// implement this trait.
pub trait Refresher<V>: Send + Sync {
    fn refresh(&self, cache: &ExpiringCache<V>, key: &str) -> anyhow::Result<()>;
}

impl<V, F> Refresher<V> for F
where
    F: Fn(&ExpiringCache<V>, &str) -> anyhow::Result<()> + Send + Sync,
{
    fn refresh(&self, cache: &ExpiringCache<V>, key: &str) -> anyhow::Result<()> {
        self(cache, key)
    }
}
