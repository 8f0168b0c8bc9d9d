//! Lazy Cache - an in-process key/value cache with lazy refresh
//!
//! Entries carry a freshness timestamp and a TTL. Staleness is detected on
//! read, and a stale read calls a caller-supplied refresher before returning.

pub mod cache;
pub mod config;
pub mod demo;
pub mod error;
pub mod tasks;

pub use cache::{ExpiringCache, Refresher, StalePolicy};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_idle_sweep_task, spawn_poll_task};
