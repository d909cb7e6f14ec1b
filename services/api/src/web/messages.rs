//! services/api/src/web/messages.rs
//!
//! Message store endpoints. Submitting only persists; the client pushes its own
//! copy to online recipients over the realtime channel afterwards.

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chat_core::domain::{DecoratedMessage, Message};
use chat_core::ports::PortError;
use chat_core::{MediaSubmission, TextSubmission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::form::FormData;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub from: Option<Uuid>,
    pub to: Option<Uuid>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_group_chat: bool,
    pub group_name: Option<String>,
}

/// A message as returned to a reader, with `content` in clear.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub sender: Uuid,
    pub users: Vec<Uuid>,
    pub is_group_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub content: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DecoratedMessage> for MessageView {
    fn from(m: DecoratedMessage) -> Self {
        Self {
            id: m.id,
            sender: m.sender,
            users: m.users,
            is_group_chat: m.is_group_chat,
            group_name: m.group_name,
            content: m.content,
            media_url: m.media_url,
            media_type: m.media_type,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub msg: String,
    /// The stored message, with `content` holding the submitted plaintext.
    pub data: MessageView,
}

/// Projects a freshly stored message for its sender, who already knows the plaintext.
fn stored_view(message: Message, content: String) -> MessageView {
    MessageView {
        id: message.id,
        sender: message.sender,
        users: message.users,
        is_group_chat: message.is_group_chat,
        group_name: message.group_name,
        content,
        media_url: message.body.media_url,
        media_type: message.body.media_type,
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

/// The claimed sender must be the logged-in user. A missing sender is left for
/// the coordinator to reject.
fn check_sender(claimed: Option<Uuid>, user_id: Uuid) -> Result<Option<Uuid>, ApiError> {
    match claimed {
        Some(from) if from != user_id => Err(PortError::Forbidden(
            "Cannot send messages on behalf of another user".to_string(),
        )
        .into()),
        other => Ok(other),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/messages - Store an encrypted text message
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Message stored", body = SendMessageResponse),
        (status = 400, description = "Missing sender, recipient or content"),
        (status = 403, description = "Sender is not the caller, or not a group member"),
        (status = 404, description = "Unknown recipient user or group")
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = check_sender(req.from, user_id)?;
    let content = req.content.clone();

    let message = state
        .coordinator
        .submit_text_message(TextSubmission {
            sender,
            target: req.to,
            content: req.content,
            is_group: req.is_group_chat,
            group_label: req.group_name,
        })
        .await?;

    Ok(Json(SendMessageResponse {
        msg: "Message added successfully.".to_string(),
        data: stored_view(message, content),
    }))
}

/// POST /api/messages/media - Upload a file and store it as a media message
#[utoipa::path(
    post,
    path = "/api/messages/media",
    request_body(content_type = "multipart/form-data", description = "file, from, to and isGroupChat (\"true\"/\"false\")."),
    responses(
        (status = 200, description = "Media message stored", body = SendMessageResponse),
        (status = 400, description = "Missing sender, recipient or file"),
        (status = 403, description = "Sender is not the caller, or not a group member"),
        (status = 404, description = "Unknown recipient user or group")
    )
)]
pub async fn send_media_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;

    let Some(sender) = check_sender(form.uuid("from")?, user_id)? else {
        return Err(PortError::Validation("Sender ID is required".to_string()).into());
    };
    let Some(target) = form.uuid("to")? else {
        return Err(PortError::Validation("Recipient ID is required".to_string()).into());
    };
    let is_group = form.flag("isGroupChat");
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    // Recipient checks run before the file touches disk.
    state
        .coordinator
        .resolve_recipient(sender, target, is_group, None)
        .await?;

    let media = state
        .blobs
        .store(&file.file_name, &file.content_type, &file.data)
        .await?;
    let original_name = media.original_name.clone();

    let message = state
        .coordinator
        .submit_media_message(MediaSubmission {
            sender: Some(sender),
            target: Some(target),
            media,
            is_group,
        })
        .await?;

    info!(message_id = %message.id, "Media message stored");
    Ok(Json(SendMessageResponse {
        msg: "Media message added successfully.".to_string(),
        data: stored_view(message, original_name),
    }))
}

/// GET /api/messages/{id} - The conversation with a user, or a group's history
#[utoipa::path(
    get,
    path = "/api/messages/{id}",
    params(("id" = Uuid, Path, description = "A user id (direct conversation) or a group id.")),
    responses(
        (status = 200, description = "Messages, oldest first, with decrypted content", body = [MessageView]),
        (status = 403, description = "Caller is not a member of the group")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(counterpart): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state
        .coordinator
        .list_conversation(user_id, counterpart)
        .await?;
    Ok(Json(
        messages.into_iter().map(MessageView::from).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_must_match_the_session() {
        let me = Uuid::new_v4();
        assert_eq!(check_sender(Some(me), me).unwrap(), Some(me));
        assert_eq!(check_sender(None, me).unwrap(), None);
        assert!(matches!(
            check_sender(Some(Uuid::new_v4()), me),
            Err(ApiError::Port(PortError::Forbidden(_)))
        ));
    }
}
