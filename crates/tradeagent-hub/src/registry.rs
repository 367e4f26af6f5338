//! Per-user registry of live sockets.
//!
//! A user may hold several sockets at once (multiple tabs, devices). Each
//! socket gets an outbound queue drained by its connection task.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

struct Entry {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
    connected_at: DateTime<Utc>,
}

/// Snapshot of one registered socket.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    users: DashMap<String, Vec<Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `user_id`.
    pub fn register(&self, user_id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let mut sockets = self.users.entry(user_id.to_string()).or_default();
        push(user_id, &mut sockets)
    }

    /// Register a socket unless the user already holds `limit` sockets.
    pub fn try_register(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Option<(ConnectionId, mpsc::UnboundedReceiver<String>)> {
        let mut sockets = self.users.entry(user_id.to_string()).or_default();
        if sockets.len() >= limit {
            let empty = sockets.is_empty();
            drop(sockets);
            if empty {
                self.users.remove_if(user_id, |_, sockets| sockets.is_empty());
            }
            warn!(user = %user_id, limit, "Per-user connection limit reached");
            return None;
        }
        Some(push(user_id, &mut sockets))
    }

    /// Remove a socket. Returns false if it was not registered.
    pub fn unregister(&self, user_id: &str, id: ConnectionId) -> bool {
        let Some(mut sockets) = self.users.get_mut(user_id) else {
            warn!(user = %user_id, "User not found in active connections during disconnect");
            return false;
        };

        let before = sockets.len();
        sockets.retain(|entry| entry.id != id);
        let removed = sockets.len() < before;
        let remaining = sockets.len();
        drop(sockets);

        if !removed {
            warn!(user = %user_id, connection = %id, "Socket not found during disconnect");
            return false;
        }

        info!(user = %user_id, connection = %id, remaining, "User disconnected a socket");
        if remaining == 0 {
            self.users.remove_if(user_id, |_, sockets| sockets.is_empty());
            debug!(user = %user_id, "User has no more active connections");
        }
        true
    }

    /// Queue `message` to every socket of `user_id`. Returns sockets reached.
    pub fn send_personal(&self, user_id: &str, message: &str) -> usize {
        let Some(sockets) = self.users.get(user_id) else {
            debug!(user = %user_id, "No active connections for personal message");
            return 0;
        };
        deliver(user_id, &sockets, message)
    }

    /// Queue `message` to every registered socket. Returns sockets reached.
    pub fn broadcast(&self, message: &str) -> usize {
        self.users
            .iter()
            .map(|entry| deliver(entry.key(), entry.value(), message))
            .sum()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.users.get(user_id).map_or(0, |sockets| sockets.len())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn total_connections(&self) -> usize {
        self.users.iter().map(|entry| entry.value().len()).sum()
    }

    /// Snapshot of all registered sockets.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.users
            .iter()
            .flat_map(|entry| {
                let user_id = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(|socket| ConnectionInfo {
                        id: socket.id,
                        user_id: user_id.clone(),
                        connected_at: socket.connected_at,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn push(user_id: &str, sockets: &mut Vec<Entry>) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = Uuid::new_v4();
    sockets.push(Entry {
        id,
        tx,
        connected_at: Utc::now(),
    });
    info!(
        user = %user_id,
        connection = %id,
        total = sockets.len(),
        "User connected"
    );
    (id, rx)
}

fn deliver(user_id: &str, sockets: &[Entry], message: &str) -> usize {
    sockets
        .iter()
        .filter(|socket| {
            let sent = socket.tx.send(message.to_string()).is_ok();
            if !sent {
                warn!(user = %user_id, connection = %socket.id, "Error sending message to socket");
            }
            sent
        })
        .count()
}
