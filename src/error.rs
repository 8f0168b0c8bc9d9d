//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key was never added, or has been removed
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key is empty or too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL is negative or not representable as a timestamp offset
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// The refresh callback failed or panicked while refreshing a stale key
    #[error("Refresh failed for key '{key}': {reason}")]
    Refresh { key: String, reason: String },

    /// Another refresh of the same key did not finish within the wait budget
    #[error("Timed out waiting for refresh of key: {0}")]
    RefreshTimeout(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
