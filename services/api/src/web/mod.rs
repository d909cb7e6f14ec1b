pub mod auth;
pub mod chats;
pub mod form;
pub mod messages;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod users;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::adapters::blob_store::UPLOADS_ROUTE;

pub use middleware::require_auth;
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Largest accepted request body (uploads included).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds every HTTP and WebSocket route of the service.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/ping", get(rest::ping_handler))
        .route(
            "/users/request-registration-otp",
            post(auth::request_registration_otp_handler),
        )
        .route("/users/request-reset-otp", post(auth::request_reset_otp_handler))
        .route("/users/verify-otp", post(auth::verify_otp_handler))
        .route("/users/signup", post(auth::signup_handler))
        .route("/users/login", post(auth::login_handler))
        .route("/users/logout", post(auth::logout_handler))
        .route("/users/reset-password", post(auth::reset_password_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/all", get(users::list_users_handler))
        .route("/users/contacts", get(users::list_contacts_handler))
        .route("/users/complete-profile", post(users::complete_profile_handler))
        .route(
            "/users/skip-profile-prompt",
            post(users::skip_profile_prompt_handler),
        )
        .route("/users/{username}", get(users::get_user_handler))
        .route("/api/messages", post(messages::send_message_handler))
        .route("/api/messages/media", post(messages::send_media_message_handler))
        .route("/api/messages/{id}", get(messages::list_messages_handler))
        .route("/api/chats", get(chats::list_chats_handler))
        .route("/api/chat", post(chats::access_chat_handler))
        .route(
            "/api/groups",
            post(chats::create_group_handler).get(chats::list_groups_handler),
        )
        .route("/ws", get(ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let uploads = ServeDir::new(app_state.blobs.base_path());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
