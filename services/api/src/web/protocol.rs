//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server.
//! Every text frame is a JSON object `{"event": <name>, "data": <payload>}`.

use chat_core::RealtimeEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Binds this connection to the user in the presence table.
    AddUser(Uuid),

    /// Asks the server to push `msg` to the live connection(s) behind `to`,
    /// a user id or a group id.
    SendMsg { to: Uuid, msg: serde_json::Value },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A message pushed by another participant.
    MessageReceived(serde_json::Value),

    /// Reports a rejected client frame. The connection stays open.
    Error { message: String },
}

impl From<RealtimeEvent> for ServerMessage {
    fn from(event: RealtimeEvent) -> Self {
        match event {
            RealtimeEvent::MessageReceived(payload) => ServerMessage::MessageReceived(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_add_user() {
        let id = Uuid::new_v4();
        let frame = json!({ "event": "add-user", "data": id }).to_string();
        assert_eq!(
            serde_json::from_str::<ClientMessage>(&frame).unwrap(),
            ClientMessage::AddUser(id)
        );
    }

    #[test]
    fn parses_send_msg_with_opaque_payload() {
        let to = Uuid::new_v4();
        let frame = json!({
            "event": "send-msg",
            "data": { "to": to, "msg": { "content": "hi", "sender": "someone" } }
        })
        .to_string();
        match serde_json::from_str::<ClientMessage>(&frame).unwrap() {
            ClientMessage::SendMsg { to: parsed, msg } => {
                assert_eq!(parsed, to);
                assert_eq!(msg["content"], "hi");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_events() {
        let frame = json!({ "event": "typing", "data": null }).to_string();
        assert!(serde_json::from_str::<ClientMessage>(&frame).is_err());
    }

    #[test]
    fn server_messages_share_the_envelope() {
        let pushed: ServerMessage = RealtimeEvent::MessageReceived(json!({"content": "yo"})).into();
        assert_eq!(
            serde_json::to_value(&pushed).unwrap(),
            json!({ "event": "message-received", "data": { "content": "yo" } })
        );

        let error = ServerMessage::Error {
            message: "nope".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({ "event": "error", "data": { "message": "nope" } })
        );
    }
}
