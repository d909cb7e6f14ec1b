//! crates/chat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or SMTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Chat, Message, NewChat, NewMessage, NewUser, OneTimePasscode, OtpPurpose, ProfileUpdate,
    User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port and core operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Ciphertext could not be decrypted with the current key")]
    Decryption,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Inserts a new account. Fails with `Conflict` if the username or email is taken.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<User>;

    /// Looks a user up by username *or* email, returning the password hash too.
    async fn get_credentials_by_login(&self, login: &str) -> PortResult<UserCredentials>;

    async fn user_exists(&self, username: &str, email: &str) -> PortResult<bool>;

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    /// Applies the profile fields and marks the profile as completed.
    async fn complete_profile(&self, user_id: Uuid, profile: ProfileUpdate) -> PortResult<User>;

    async fn mark_profile_prompt_seen(&self, user_id: Uuid) -> PortResult<()>;

    async fn list_users_except(&self, user_id: Uuid) -> PortResult<Vec<User>>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- One-time passcodes ---
    async fn save_otp(&self, otp: OneTimePasscode) -> PortResult<()>;

    /// Most recently created, unexpired record matching (email, code, purpose).
    async fn find_latest_otp(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>>;

    async fn mark_otp_verified(&self, otp_id: Uuid) -> PortResult<()>;

    /// A verified, unexpired record for (email, purpose), optionally also matching `code`.
    async fn find_verified_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>>;

    async fn delete_otps(&self, email: &str, purpose: OtpPurpose) -> PortResult<u64>;

    async fn delete_otps_expired_before(&self, cutoff: DateTime<Utc>) -> PortResult<u64>;

    // --- Conversations ---
    /// A non-group chat whose member set is exactly `{a, b}`.
    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> PortResult<Option<Chat>>;

    async fn find_chat(&self, chat_id: Uuid) -> PortResult<Option<Chat>>;

    async fn create_chat(&self, new_chat: NewChat) -> PortResult<Chat>;

    /// Chats containing the user with at least two members, newest update first.
    async fn list_chats_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>>;

    /// Group chats containing the user, newest update first.
    async fn list_groups_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>>;

    // --- Messages ---
    async fn save_message(&self, new_message: NewMessage) -> PortResult<Message>;

    /// Messages whose `users` contain the id, oldest update first.
    async fn messages_for(&self, participant_id: Uuid) -> PortResult<Vec<Message>>;
}

#[async_trait]
pub trait OtpMailer: Send + Sync {
    /// Delivers a one-time passcode to the given address.
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> PortResult<()>;
}
