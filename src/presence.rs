use std::collections::HashMap;

use log::debug;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::{error::ChatError, proto::ServerEvent};

/// Outbound queue of one live WebSocket connection. Cloning shares the queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { conn_id, tx }
    }

    /// Queues an event for the writer task. Fails only when the connection
    /// is already gone and its queue closed.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), ChatError> {
        self.tx
            .send(event)
            .map_err(|_| ChatError::Transport(format!("connection {} is closed", self.conn_id)))
    }
}

/// Which live connection currently represents each user. In-memory only,
/// rebuilt as clients reconnect; never a source of truth for anything
/// persisted.
#[derive(Default)]
pub struct PresenceRegistry {
    users: RwLock<HashMap<String, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handle for `user_id`. Last announce wins; a handle left
    /// over from an earlier connection is silently dropped.
    pub async fn announce(&self, user_id: &str, handle: ConnectionHandle) {
        let mut users = self.users.write().await;
        if let Some(old) = users.insert(user_id.to_owned(), handle) {
            debug!("presence: {user_id} moved off connection {}", old.conn_id);
        }
    }

    /// Drops every entry owned by this connection. Called once, on disconnect,
    /// before the connection leaves its rooms.
    pub async fn forget(&self, conn_id: Uuid) {
        let mut users = self.users.write().await;
        users.retain(|_, handle| handle.conn_id != conn_id);
    }

    /// Direct-delivery lookup for collaborators outside the room fan-out path.
    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.users.read().await.get(user_id).cloned()
    }
}
