//! Periodic background tasks.

pub mod stale_runner;
