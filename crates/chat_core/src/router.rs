//! crates/chat_core/src/router.rs
//!
//! Best-effort realtime fan-out. Looks recipients up in the presence table and
//! queues a `message-received` event on each live connection. Offline recipients
//! are skipped silently: nothing is queued, retried, or reported.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::Recipient;
use crate::presence::PresenceTable;

/// Events pushed from the server to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    /// A message object the client should append to its conversation view.
    MessageReceived(serde_json::Value),
}

#[derive(Clone)]
pub struct FanoutRouter {
    presence: Arc<PresenceTable>,
}

impl FanoutRouter {
    pub fn new(presence: Arc<PresenceTable>) -> Self {
        Self { presence }
    }

    /// Pushes `payload` to the recipient's live connection, if any.
    /// Returns whether an event was queued.
    pub async fn deliver(&self, recipient_id: Uuid, payload: serde_json::Value) -> bool {
        let Some(handle) = self.presence.lookup(recipient_id).await else {
            return false;
        };

        let queued = handle.push(RealtimeEvent::MessageReceived(payload));
        if !queued {
            debug!(%recipient_id, connection = %handle.id(), "dropped realtime event");
        }
        queued
    }

    /// Delivers once per member of `recipient`, skipping the sender.
    /// Returns how many connections the event was queued on.
    pub async fn fan_out(
        &self,
        recipient: &Recipient,
        sender_id: Uuid,
        payload: serde_json::Value,
    ) -> usize {
        let mut delivered = 0;
        for member_id in recipient.member_ids() {
            if member_id == sender_id {
                continue;
            }
            if self.deliver(member_id, payload.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }
}
