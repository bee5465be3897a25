use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shipyard_core::types::JobId;

use crate::state::AppState;
use crate::ws::manager::WsManager;

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    /// Watch a single build instead of every job event.
    pub job_id: Option<JobId>,
}

/// GET /api/v1/ws?job_id= -- upgrade to a socket that streams job events.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state.ws_manager, query.job_id))
}

/// Pump frames queued by the relay into the socket until either side closes.
/// Dashboards only listen, so inbound frames other than Close are dropped.
async fn serve_socket(socket: WebSocket, ws_manager: Arc<WsManager>, job_filter: Option<JobId>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let mut outbound = ws_manager.add(conn_id.clone(), job_filter).await;
    let (mut sink, mut inbound) = socket.split();
    tracing::info!(conn_id = %conn_id, job_id = ?job_filter, "Dashboard subscribed to job events");

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                // `None` once the manager has forgotten this socket.
                let Some(message) = queued else { break };
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    ws_manager.remove(&conn_id).await;
    tracing::info!(conn_id = %conn_id, "Dashboard unsubscribed");
}
