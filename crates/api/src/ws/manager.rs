use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use shipyard_core::types::{JobId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing frames to one dashboard socket.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One subscribed dashboard.
pub struct WsConnection {
    pub sender: WsSender,
    pub connected_at: Timestamp,
    /// Only events about this build reach the socket. `None` means all.
    pub job_filter: Option<JobId>,
}

impl WsConnection {
    fn wants(&self, job_id: Option<JobId>) -> bool {
        match self.job_filter {
            None => true,
            Some(watched) => job_id == Some(watched),
        }
    }
}

/// Registry of dashboard sockets subscribed to job events.
///
/// Shared as `Arc<WsManager>`; the relay task and the socket tasks all go
/// through the interior `RwLock`.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a socket and return the receiver its task drains.
    pub async fn add(
        &self,
        conn_id: String,
        job_filter: Option<JobId>,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
            job_filter,
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Deliver a serialized job event to every socket whose filter matches
    /// `job_id`. Returns how many sockets it was queued for.
    pub async fn send_event(&self, job_id: Option<JobId>, text: Utf8Bytes) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|conn| conn.wants(job_id))
            .filter(|conn| conn.sender.send(Message::Text(text.clone())).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every socket, then forget them all.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Ping every socket so idle proxies keep the connection open.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_filter_limits_delivery() {
        let manager = WsManager::new();
        let watched = uuid::Uuid::new_v4();
        let mut everything = manager.add("all".into(), None).await;
        let mut one_job = manager.add("one".into(), Some(watched)).await;

        let delivered = manager
            .send_event(Some(uuid::Uuid::new_v4()), "other".into())
            .await;
        assert_eq!(delivered, 1);
        let delivered = manager.send_event(Some(watched), "mine".into()).await;
        assert_eq!(delivered, 2);

        assert_eq!(everything.recv().await, Some(Message::Text("other".into())));
        assert_eq!(everything.recv().await, Some(Message::Text("mine".into())));
        assert_eq!(one_job.recv().await, Some(Message::Text("mine".into())));
        assert!(one_job.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_and_forgets_sockets() {
        let manager = WsManager::new();
        let mut rx = manager.add("a".into(), None).await;

        manager.shutdown_all().await;

        assert_eq!(rx.recv().await, Some(Message::Close(None)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(manager.connection_count().await, 0);
    }
}
