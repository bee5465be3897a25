//! WebSocket fan-out of job events to dashboards.
//!
//! [`WsManager`] tracks subscribed sockets (optionally filtered to one
//! build), [`relay`] moves events from the bus onto them, and [`ws_handler`]
//! is the upgrade endpoint.

mod handler;
pub mod manager;
pub mod relay;

pub use handler::ws_handler;
pub use manager::WsManager;
