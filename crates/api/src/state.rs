use std::sync::Arc;

use shipyard_codegen::CodeGenerator;
use shipyard_db::{GenerationTracker, JobStore};
use shipyard_events::EventBus;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Build jobs and the dispatch queue.
    pub store: Arc<dyn JobStore>,
    /// In-flight code generations.
    pub generations: Arc<GenerationTracker>,
    /// Collaborator that rewrites failing sources during auto-fix.
    pub codegen: Arc<dyn CodeGenerator>,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Event bus for job lifecycle events.
    pub event_bus: Arc<EventBus>,
}
