//! Background Tasks Module
//!
//! Contains tokio tasks that run alongside the cache.
//!
//! # Tasks
//! - Idle Sweep: Drops entries nobody has touched within the idle timeout
//! - Poller: Reads a fixed set of keys on an interval and prints them

mod idle_sweep;
mod poller;

pub use idle_sweep::spawn_idle_sweep_task;
pub use poller::{read_round, spawn_poll_task};
