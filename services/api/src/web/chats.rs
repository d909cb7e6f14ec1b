//! services/api/src/web/chats.rs
//!
//! Conversation directory endpoints: direct chats and groups.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chat_core::domain::Chat;
use chat_core::ports::PortError;
use chat_core::GroupSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::form::FormData;
use crate::web::state::AppState;
use crate::web::users::UserSummary;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessChatRequest {
    pub user_id: Option<Uuid>,
}

/// A chat with its members resolved to user summaries.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: Uuid,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub users: Vec<UserSummary>,
    pub group_admin: Option<Uuid>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatView {
    async fn load(state: &AppState, chat: Chat) -> Result<Self, ApiError> {
        let mut users = Vec::with_capacity(chat.members.len());
        for member_id in &chat.members {
            match state.accounts.user(*member_id).await {
                Ok(user) => users.push(UserSummary::from(user)),
                Err(PortError::NotFound(_)) => {
                    warn!(chat_id = %chat.id, %member_id, "Chat member no longer exists");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            id: chat.id,
            chat_name: chat.name,
            is_group_chat: chat.is_group_chat,
            users,
            group_admin: chat.admin,
            bio: chat.bio,
            profile_picture: chat.profile_picture,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        })
    }

    async fn load_all(state: &AppState, chats: Vec<Chat>) -> Result<Vec<Self>, ApiError> {
        let mut views = Vec::with_capacity(chats.len());
        for chat in chats {
            views.push(Self::load(state, chat).await?);
        }
        Ok(views)
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /api/chats - Chats the caller belongs to, most recently updated first
#[utoipa::path(
    get,
    path = "/api/chats",
    responses(
        (status = 200, description = "The caller's chats", body = [ChatView]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_chats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = state.directory.list_chats_for(user_id).await?;
    Ok(Json(ChatView::load_all(&state, chats).await?))
}

/// POST /api/chat - Open the direct chat with a user, creating it on first contact
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = AccessChatRequest,
    responses(
        (status = 200, description = "Existing chat", body = ChatView),
        (status = 201, description = "Chat created", body = ChatView),
        (status = 400, description = "Missing or invalid userId"),
        (status = 404, description = "No user with that id")
    )
)]
pub async fn access_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AccessChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let other = req.user_id.ok_or_else(|| {
        ApiError::BadRequest("UserId param not sent with request".to_string())
    })?;

    let (chat, created) = state.directory.find_or_create_direct(user_id, other).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ChatView::load(&state, chat).await?)))
}

/// POST /api/groups - Create a group administered by the caller
#[utoipa::path(
    post,
    path = "/api/groups",
    request_body(content_type = "multipart/form-data", description = "name, members (JSON array of user ids), bio and an optional profilePicture file."),
    responses(
        (status = 201, description = "Group created", body = ChatView),
        (status = 400, description = "Missing name or fewer than 2 members")
    )
)]
pub async fn create_group_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;

    let mut spec = GroupSpec {
        name: form.text("name").unwrap_or_default().to_string(),
        members: form.uuid_list("members")?,
        bio: form.text("bio").map(str::to_string),
        profile_picture: None,
    };
    if let Some(file) = form.take_file("profilePicture") {
        let stored = state
            .blobs
            .store(&file.file_name, &file.content_type, &file.data)
            .await?;
        spec.profile_picture = Some(stored.url);
    }

    let group = state.directory.create_group(spec, user_id).await?;
    Ok((StatusCode::CREATED, Json(ChatView::load(&state, group).await?)))
}

/// GET /api/groups - Groups the caller belongs to
#[utoipa::path(
    get,
    path = "/api/groups",
    responses(
        (status = 200, description = "The caller's groups", body = [ChatView]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_groups_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let groups = state.directory.list_groups_for(user_id).await?;
    Ok(Json(ChatView::load_all(&state, groups).await?))
}
