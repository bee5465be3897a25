//! Shipyard event bus.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`] -- the event envelope published on build lifecycle
//!   changes and relayed to WebSocket clients.

pub mod bus;

pub use bus::{EventBus, PlatformEvent};
