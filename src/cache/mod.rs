//! Cache Module
//!
//! Provides an in-memory cache with per-entry TTL and lazy, callback-driven refresh.

mod clock;
mod entry;
mod refresher;
mod stats;
mod store;


use std::time::Duration;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use refresher::Refresher;
pub use stats::CacheStats;
pub use store::{ExpiringCache, StalePolicy};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// TTL used by `add_once`; treated as "never" for polling purposes
pub const NEVER_TTL: Duration = Duration::from_secs(24 * 60 * 60);
