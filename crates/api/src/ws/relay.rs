//! Fans job lifecycle events from the event bus out to dashboard sockets and
//! keeps idle sockets alive with pings.

use std::sync::Arc;
use std::time::Duration;

use shipyard_events::PlatformEvent;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};

use crate::ws::WsManager;

/// Interval between keep-alive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Forward every event on `receiver` to the sockets watching its job, and
/// ping all sockets every `ping_every`.
///
/// Exits when the channel closes, i.e. when the
/// [`EventBus`](shipyard_events::EventBus) is dropped.
pub async fn run(
    ws_manager: Arc<WsManager>,
    mut receiver: broadcast::Receiver<PlatformEvent>,
    ping_every: Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Ok(event) => forward(&ws_manager, &event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event relay shutting down");
                    break;
                }
            },
            _ = ping.tick() => {
                let count = ws_manager.connection_count().await;
                tracing::debug!(count, "WebSocket keep-alive ping");
                ws_manager.ping_all().await;
            }
        }
    }
}

async fn forward(ws_manager: &WsManager, event: &PlatformEvent) {
    match serde_json::to_string(event) {
        Ok(text) => {
            let delivered = ws_manager
                .send_event(event.source_entity_id, text.into())
                .await;
            tracing::trace!(event_type = %event.event_type, delivered, "Event relayed");
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                event_type = %event.event_type,
                "Failed to serialize event"
            );
        }
    }
}
