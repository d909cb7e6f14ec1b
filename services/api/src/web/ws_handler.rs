//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a realtime connection.
//! Each socket gets a bounded outbound queue registered in the presence table;
//! a writer task drains that queue into the socket while the read loop handles
//! `add-user` and `send-msg` frames.

use crate::error::ApiError;
use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chat_core::ConnectionHandle;
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    // The sender is wrapped in an Arc<Mutex<>> so the writer task and the read loop can share it.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let (handle, mut outbound) =
        ConnectionHandle::channel(app_state.config.realtime_channel_capacity);
    let connection_id = handle.id();
    info!(%user_id, connection = %connection_id, "Realtime connection established");

    // --- 1. Writer Task ---
    let writer = {
        let ws_sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(event) = outbound.recv().await {
                if let Err(e) = send_server_message(&ws_sender, &ServerMessage::from(event)).await {
                    debug!(connection = %connection_id, "Stopping writer: {}", e);
                    break;
                }
            }
        })
    };

    // --- 2. Main Message Loop ---
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_text_message(text.as_str(), &app_state, user_id, &handle, &ws_sender).await;
            }
            Ok(Message::Close(_)) => {
                info!(connection = %connection_id, "Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %connection_id, "WebSocket receive error: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    let removed = app_state.presence.drop_by_handle(connection_id).await;
    writer.abort();
    info!(
        connection = %connection_id,
        released = removed.len(),
        "Realtime connection closed"
    );
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: &str,
    app_state: &Arc<AppState>,
    user_id: Uuid,
    handle: &ConnectionHandle,
    ws_sender: &WsSender,
) {
    let outcome = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => apply_client_message(app_state, user_id, handle, client_msg).await,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            Err("Unrecognized message".to_string())
        }
    };

    if let Err(message) = outcome {
        if let Err(e) = send_server_message(ws_sender, &ServerMessage::Error { message }).await {
            error!("Failed to send error frame: {}", e);
        }
    }
}

/// Applies one client frame. The error string is reported back to the client.
async fn apply_client_message(
    app_state: &AppState,
    user_id: Uuid,
    handle: &ConnectionHandle,
    client_msg: ClientMessage,
) -> Result<(), String> {
    match client_msg {
        ClientMessage::AddUser(claimed) => {
            if claimed != user_id {
                warn!(%user_id, %claimed, "add-user for a different user ignored");
                return Err("Cannot register presence for another user".to_string());
            }
            app_state.presence.identify(user_id, handle.clone()).await;
            debug!(%user_id, connection = %handle.id(), "User is online");
            Ok(())
        }
        ClientMessage::SendMsg { to, msg } => {
            let recipient = app_state
                .coordinator
                .resolve_live_target(user_id, to)
                .await
                .map_err(|e| {
                    warn!(%user_id, %to, "send-msg rejected: {}", e);
                    e.to_string()
                })?;
            let delivered = app_state.router.fan_out(&recipient, user_id, msg).await;
            debug!(%user_id, %to, delivered, "Live message fanned out");
            Ok(())
        }
    }
}

async fn send_server_message(ws_sender: &WsSender, message: &ServerMessage) -> Result<(), ApiError> {
    let json = serde_json::to_string(message).map_err(|e| ApiError::Internal(e.to_string()))?;
    ws_sender.lock().await.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BlobStore;
    use crate::config::Config;
    use chat_core::memory::{InMemoryDatabase, RecordingMailer};
    use chat_core::{GroupSpec, MessageCipher, RealtimeEvent};
    use serde_json::json;

    async fn state() -> AppState {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "ENCRYPTION_KEY" => Some("ws-secret".to_string()),
            _ => None,
        })
        .unwrap();
        let uploads = std::env::temp_dir().join(format!("ws-test-{}", Uuid::new_v4()));
        AppState::new(
            config,
            Arc::new(InMemoryDatabase::new()),
            Arc::new(RecordingMailer::default()),
            MessageCipher::new("ws-secret").unwrap(),
            BlobStore::new(uploads).await.unwrap(),
        )
    }

    #[tokio::test]
    async fn add_user_only_binds_the_session_user() {
        let app = state().await;
        let me = Uuid::new_v4();
        let (handle, _rx) = ConnectionHandle::channel(4);

        let spoof = apply_client_message(&app, me, &handle, ClientMessage::AddUser(Uuid::new_v4())).await;
        assert!(spoof.is_err());
        assert_eq!(app.presence.online_count().await, 0);

        apply_client_message(&app, me, &handle, ClientMessage::AddUser(me))
            .await
            .unwrap();
        assert_eq!(app.presence.lookup(me).await.map(|h| h.id()), Some(handle.id()));
    }

    #[tokio::test]
    async fn send_msg_reaches_the_online_recipient_only() {
        let app = state().await;
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice_handle, mut alice_rx) = ConnectionHandle::channel(4);
        let (bob_handle, mut bob_rx) = ConnectionHandle::channel(4);
        apply_client_message(&app, alice, &alice_handle, ClientMessage::AddUser(alice))
            .await
            .unwrap();
        apply_client_message(&app, bob, &bob_handle, ClientMessage::AddUser(bob))
            .await
            .unwrap();

        let msg = json!({ "sender": alice, "content": "hey" });
        apply_client_message(
            &app,
            alice,
            &alice_handle,
            ClientMessage::SendMsg { to: bob, msg: msg.clone() },
        )
        .await
        .unwrap();

        assert_eq!(bob_rx.try_recv().unwrap(), RealtimeEvent::MessageReceived(msg));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_msg_to_a_foreign_group_is_rejected() {
        let app = state().await;
        let (owner, a, b, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = app
            .directory
            .create_group(
                GroupSpec {
                    name: "Crew".to_string(),
                    members: vec![a, b],
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();
        let (handle, _rx) = ConnectionHandle::channel(4);

        let result = apply_client_message(
            &app,
            outsider,
            &handle,
            ClientMessage::SendMsg { to: group.id, msg: json!({}) },
        )
        .await;
        assert!(result.is_err());
    }
}
