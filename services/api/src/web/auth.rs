//! services/api/src/web/auth.rs
//!
//! Account endpoints: one-time passcodes, signup, login, logout and password reset.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chat_core::domain::OtpPurpose;
use chat_core::ports::PortError;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::middleware::{session_id_from_headers, SESSION_COOKIE};
use crate::web::state::AppState;

/// How long a login session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct OtpRequest {
    pub email: String,
}

/// Which flow a passcode belongs to.
#[derive(Deserialize, ToSchema, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurposeParam {
    Registration,
    Reset,
}

impl From<OtpPurposeParam> for OtpPurpose {
    fn from(purpose: OtpPurposeParam) -> Self {
        match purpose {
            OtpPurposeParam::Registration => OtpPurpose::Registration,
            OtpPurposeParam::Reset => OtpPurpose::Reset,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    pub purpose: OtpPurposeParam,
}

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address.
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub has_seen_profile_prompt: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn hash_password(password: &str) -> Result<String, ApiError> {
    if password.is_empty() {
        return Err(PortError::Validation("Password is required".to_string()).into());
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

fn session_cookie(value: &str, max_age_seconds: i64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly;{} SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        value,
        if secure { " Secure;" } else { "" },
        max_age_seconds
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /users/request-registration-otp - Email a passcode for account creation
#[utoipa::path(
    post,
    path = "/users/request-registration-otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "OTP sent", body = MessageResponse),
        (status = 400, description = "Email already registered")
    )
)]
pub async fn request_registration_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .accounts
        .request_otp(&req.email, OtpPurpose::Registration)
        .await?;
    Ok(MessageResponse::new("OTP sent to email"))
}

/// POST /users/request-reset-otp - Email a passcode for a password reset
#[utoipa::path(
    post,
    path = "/users/request-reset-otp",
    request_body = OtpRequest,
    responses(
        (status = 200, description = "OTP sent", body = MessageResponse),
        (status = 404, description = "No account found with this email")
    )
)]
pub async fn request_reset_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .accounts
        .request_otp(&req.email, OtpPurpose::Reset)
        .await?;
    Ok(MessageResponse::new("OTP sent to email"))
}

/// POST /users/verify-otp - Mark the latest matching passcode as verified
#[utoipa::path(
    post,
    path = "/users/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP")
    )
)]
pub async fn verify_otp_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .accounts
        .verify_otp(&req.email, &req.otp, req.purpose.into())
        .await?;
    Ok(MessageResponse::new("OTP verified successfully"))
}

/// POST /users/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/users/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = MessageResponse),
        (status = 400, description = "Invalid request, taken name, or unverified OTP"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password_hash = hash_password(&req.password)?;
    state
        .accounts
        .signup(&req.username, &req.email, password_hash)
        .await?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::new("User registered successfully"),
    ))
}

/// POST /users/login - Login with username or email
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "User not found or not verified")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Look the account up by username or email
    let credentials = state.accounts.credentials_for_login(&req.username).await?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&credentials.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(PortError::Unauthorized.into());
    }

    // 3. Create auth session in database
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(SESSION_TTL_DAYS);
    state
        .db
        .create_auth_session(&auth_session_id, credentials.user.user_id, Utc::now() + ttl)
        .await?;

    info!(user_id = %credentials.user.user_id, "User logged in");

    // 4. Return response with cookie
    let cookie = session_cookie(&auth_session_id, ttl.num_seconds(), state.config.cookie_secure);
    let response = LoginResponse {
        user_id: credentials.user.user_id,
        username: credentials.user.username,
        has_seen_profile_prompt: credentials.user.has_seen_profile_prompt,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /users/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/users/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(auth_session_id) = session_id_from_headers(&headers) {
        state.db.delete_auth_session(auth_session_id).await?;
    }

    let cookie = session_cookie("", 0, state.config.cookie_secure);
    Ok((
        [(header::SET_COOKIE, cookie)],
        MessageResponse::new("Logged out"),
    ))
}

/// POST /users/reset-password - Set a new password using a verified reset OTP
#[utoipa::path(
    post,
    path = "/users/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP"),
        (status = 404, description = "User not found")
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password_hash = hash_password(&req.password)?;
    state
        .accounts
        .reset_password(&req.email, &req.otp, &password_hash)
        .await?;
    Ok(MessageResponse::new("Password reset successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_against_the_original_password() {
        let hash = hash_password("hunter2").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"hunter2", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"hunter3", &parsed)
            .is_err());
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            hash_password(""),
            Err(ApiError::Port(PortError::Validation(_)))
        ));
    }

    #[test]
    fn cookie_flags_follow_config() {
        assert_eq!(
            session_cookie("abc", 60, true),
            "session=abc; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=60"
        );
        assert_eq!(
            session_cookie("", 0, false),
            "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0"
        );
    }
}
