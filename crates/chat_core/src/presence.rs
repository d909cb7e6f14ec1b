//! crates/chat_core/src/presence.rs
//!
//! The process-wide presence table: which live connection each user is reachable on.
//!
//! The table is held in memory only and is rebuilt as clients identify themselves
//! after a restart. It is not shared between processes, so a fan-out only reaches
//! recipients attached to the same instance as the sender.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::router::RealtimeEvent;

//=========================================================================================
// Connection Handles
//=========================================================================================

/// Opaque identifier of one realtime transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The push side of a live connection. The transport owns the matching receiver
/// and drains it into the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<RealtimeEvent>,
}

impl ConnectionHandle {
    /// Creates a handle with a bounded outbound queue of `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an event without waiting. Returns `false` when the queue is full
    /// or the connection has already gone away.
    pub fn push(&self, event: RealtimeEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

//=========================================================================================
// Presence Table
//=========================================================================================

#[derive(Default)]
struct PresenceIndex {
    by_user: HashMap<Uuid, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, HashSet<Uuid>>,
}

/// Maps user identities to their active connection, indexed both ways so that
/// disconnect cleanup is exact.
#[derive(Default)]
pub struct PresenceTable {
    index: Mutex<PresenceIndex>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user_id` to `handle`. Last identify wins: any previous handle for
    /// the user is replaced without being torn down.
    pub async fn identify(&self, user_id: Uuid, handle: ConnectionHandle) {
        let mut index = self.index.lock().await;
        let connection_id = handle.id();

        if let Some(previous) = index.by_user.insert(user_id, handle) {
            if previous.id() != connection_id {
                if let Some(users) = index.by_connection.get_mut(&previous.id()) {
                    users.remove(&user_id);
                    if users.is_empty() {
                        index.by_connection.remove(&previous.id());
                    }
                }
            }
        }

        index
            .by_connection
            .entry(connection_id)
            .or_default()
            .insert(user_id);
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.index.lock().await.by_user.get(&user_id).cloned()
    }

    /// Removes every user currently bound to `connection_id` and returns them.
    /// A connection that has since been superseded by a newer identify removes nothing.
    pub async fn drop_by_handle(&self, connection_id: ConnectionId) -> Vec<Uuid> {
        let mut index = self.index.lock().await;
        let Some(users) = index.by_connection.remove(&connection_id) else {
            return Vec::new();
        };

        let mut removed = Vec::with_capacity(users.len());
        for user_id in users {
            let bound_here = index
                .by_user
                .get(&user_id)
                .is_some_and(|handle| handle.id() == connection_id);
            if bound_here {
                index.by_user.remove(&user_id);
                removed.push(user_id);
            }
        }
        removed
    }

    pub async fn online_count(&self) -> usize {
        self.index.lock().await.by_user.len()
    }
}
