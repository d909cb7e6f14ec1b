//! services/api/src/web/rest.rs
//!
//! The liveness endpoint and the master definition for the OpenAPI specification.

use axum::response::{IntoResponse, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{auth, chats, messages, users};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        ping_handler,
        auth::request_registration_otp_handler,
        auth::request_reset_otp_handler,
        auth::verify_otp_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::reset_password_handler,
        users::list_users_handler,
        users::list_contacts_handler,
        users::get_user_handler,
        users::complete_profile_handler,
        users::skip_profile_prompt_handler,
        messages::send_message_handler,
        messages::send_media_message_handler,
        messages::list_messages_handler,
        chats::list_chats_handler,
        chats::access_chat_handler,
        chats::create_group_handler,
        chats::list_groups_handler,
    ),
    components(
        schemas(
            PingResponse,
            auth::OtpRequest,
            auth::OtpPurposeParam,
            auth::VerifyOtpRequest,
            auth::SignupRequest,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::ResetPasswordRequest,
            auth::MessageResponse,
            users::UserSummary,
            users::UserProfile,
            messages::SendMessageRequest,
            messages::MessageView,
            messages::SendMessageResponse,
            chats::AccessChatRequest,
            chats::ChatView,
        )
    ),
    tags(
        (name = "Chat API", description = "Accounts, conversations and the encrypted message store. Live delivery runs over the /ws WebSocket.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Liveness
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct PingResponse {
    msg: String,
}

/// GET /ping - Liveness probe
#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Server is up", body = PingResponse))
)]
pub async fn ping_handler() -> impl IntoResponse {
    Json(PingResponse {
        msg: "Ping Successful".to_string(),
    })
}
