//! Demo Module
//!
//! Refresh logic and seed data for the demo driver: three keys, one per
//! insertion mode.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde_json::Value;
use tracing::info;

use crate::cache::{ExpiringCache, Refresher};
use crate::error::Result;

/// Keys seeded by [`seed`], in polling order.
pub const DEMO_KEYS: [&str; 3] = ["A", "B", "C"];

// == Demo Refresher ==
/// Refresh logic for the demo keys.
///
/// - `A` flips a boolean on every refresh
/// - `B` counts its refreshes
/// - `C` is left as-is
/// - anything else is logged
#[derive(Debug, Default)]
pub struct DemoRefresher {
    toggle: AtomicBool,
    counter: AtomicI64,
}

impl DemoRefresher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Refresher<Value> for DemoRefresher {
    fn refresh(&self, cache: &ExpiringCache<Value>, key: &str) -> anyhow::Result<()> {
        match key {
            "A" => {
                let flipped = !self.toggle.fetch_xor(true, Ordering::SeqCst);
                cache.set(key, Value::Bool(flipped))?;
            }
            "B" => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                cache.set(key, Value::from(n))?;
            }
            "C" => {}
            other => info!("No refresh logic for key {}", other),
        }
        Ok(())
    }
}

// == Render ==
/// Formats a demo value for printing. Strings are printed bare, everything
/// else as JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// == Seed ==
/// Seeds the demo keys:
/// - `B` with a 2 second TTL, stale on first read
/// - `A` with a zero TTL, stale on every read
/// - `C` with the "never" TTL, refreshed (as a no-op) on first read only
pub fn seed(cache: &ExpiringCache<Value>) -> Result<()> {
    cache.add_secs("B", Value::from(0), 2, false)?;
    cache.add_immediate("A", Value::Bool(false))?;
    cache.add_once("C", Value::from("INITIAL_VALUE"), false)?;
    Ok(())
}
