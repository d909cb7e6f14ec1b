//! services/api/src/web/users.rs
//!
//! Authenticated user directory and profile endpoints.

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chat_core::domain::{ProfileUpdate, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::auth::MessageResponse;
use crate::web::form::FormData;
use crate::web::state::AppState;

//=========================================================================================
// Response Types
//=========================================================================================

/// The public slice of a user shown in pickers and chat headers.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.user_id,
            username: user.username,
            profile_picture: user.profile_picture,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_completed: bool,
    pub has_seen_profile_prompt: bool,
    pub contacts: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.user_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            bio: user.bio,
            profile_picture: user.profile_picture,
            profile_completed: user.profile_completed,
            has_seen_profile_prompt: user.has_seen_profile_prompt,
            contacts: user.contacts,
            created_at: user.created_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /users/all - Every user except the caller
#[utoipa::path(
    get,
    path = "/users/all",
    responses(
        (status = 200, description = "Other users", body = [UserSummary]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.accounts.list_users_except(user_id).await?;
    Ok(Json(
        users.into_iter().map(UserSummary::from).collect::<Vec<_>>(),
    ))
}

/// GET /users/contacts - Users the caller can start a conversation with
#[utoipa::path(
    get,
    path = "/users/contacts",
    responses(
        (status = 200, description = "Contacts", body = [UserSummary]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_contacts_handler(
    state: State<Arc<AppState>>,
    user: Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // Every other account is a potential contact.
    list_users_handler(state, user).await
}

/// GET /users/{username} - Look a profile up by username
#[utoipa::path(
    get,
    path = "/users/{username}",
    params(("username" = String, Path, description = "The username to look up.")),
    responses(
        (status = 200, description = "The profile", body = UserProfile),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.accounts.user_by_username(&username).await?;
    Ok(Json(UserProfile::from(user)))
}

/// POST /users/complete-profile - Save name, bio and an optional picture
#[utoipa::path(
    post,
    path = "/users/complete-profile",
    request_body(content_type = "multipart/form-data", description = "fullName, bio and an optional profilePicture file."),
    responses(
        (status = 200, description = "Profile completed", body = UserProfile),
        (status = 404, description = "User not found")
    )
)]
pub async fn complete_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormData::read(multipart).await?;

    let profile_picture = match form.take_file("profilePicture") {
        Some(file) => Some(
            state
                .blobs
                .store(&file.file_name, &file.content_type, &file.data)
                .await?
                .url,
        ),
        None => None,
    };

    let user = state
        .accounts
        .complete_profile(
            user_id,
            ProfileUpdate {
                full_name: form.text("fullName").map(str::to_string),
                bio: form.text("bio").map(str::to_string),
                profile_picture,
            },
        )
        .await?;

    info!(%user_id, "Profile completed");
    Ok(Json(UserProfile::from(user)))
}

/// POST /users/skip-profile-prompt - Stop showing the profile prompt
#[utoipa::path(
    post,
    path = "/users/skip-profile-prompt",
    responses(
        (status = 200, description = "Prompt skipped", body = MessageResponse)
    )
)]
pub async fn skip_profile_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.skip_profile_prompt(user_id).await?;
    Ok(MessageResponse::new("Profile prompt skipped"))
}
