//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chat_core::domain::{
    Chat, Message, MessageBody, NewChat, NewMessage, NewUser, OneTimePasscode, OtpPurpose,
    ProfileUpdate, User, UserCredentials,
};
use chat_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        _ => unexpected(e),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "user_id, username, email, hashed_password, is_verified, \
    profile_completed, has_seen_profile_prompt, profile_picture, full_name, bio, contacts, \
    created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    username: String,
    email: String,
    hashed_password: String,
    is_verified: bool,
    profile_completed: bool,
    has_seen_profile_prompt: bool,
    profile_picture: Option<String>,
    full_name: Option<String>,
    bio: Option<String>,
    contacts: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_credentials(self) -> UserCredentials {
        UserCredentials {
            hashed_password: self.hashed_password,
            user: User {
                user_id: self.user_id,
                username: self.username,
                email: self.email,
                is_verified: self.is_verified,
                profile_completed: self.profile_completed,
                has_seen_profile_prompt: self.has_seen_profile_prompt,
                profile_picture: self.profile_picture,
                full_name: self.full_name,
                bio: self.bio,
                contacts: self.contacts,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        }
    }

    fn to_domain(self) -> User {
        self.to_credentials().user
    }
}

#[derive(FromRow)]
struct OtpRecord {
    id: Uuid,
    email: String,
    code: String,
    expires_at: DateTime<Utc>,
    is_verified: bool,
    purpose: String,
    created_at: DateTime<Utc>,
}
impl OtpRecord {
    fn to_domain(self) -> PortResult<OneTimePasscode> {
        let purpose = OtpPurpose::parse(&self.purpose).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown OTP purpose '{}'", self.purpose))
        })?;
        Ok(OneTimePasscode {
            id: self.id,
            email: self.email,
            code: self.code,
            expires_at: self.expires_at,
            is_verified: self.is_verified,
            purpose,
            created_at: self.created_at,
        })
    }
}

const CHAT_COLUMNS: &str =
    "id, name, is_group_chat, members, admin_id, bio, profile_picture, created_at, updated_at";

#[derive(FromRow)]
struct ChatRecord {
    id: Uuid,
    name: String,
    is_group_chat: bool,
    members: Vec<Uuid>,
    admin_id: Option<Uuid>,
    bio: Option<String>,
    profile_picture: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChatRecord {
    fn to_domain(self) -> Chat {
        Chat {
            id: self.id,
            name: self.name,
            is_group_chat: self.is_group_chat,
            members: self.members,
            admin: self.admin_id,
            bio: self.bio,
            profile_picture: self.profile_picture,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const MESSAGE_COLUMNS: &str = "id, text, media_url, media_type, users, sender, is_group_chat, \
    group_name, created_at, updated_at";

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    text: String,
    media_url: Option<String>,
    media_type: Option<String>,
    users: Vec<Uuid>,
    sender: Uuid,
    is_group_chat: bool,
    group_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> Message {
        Message {
            id: self.id,
            body: MessageBody {
                text: self.text,
                media_url: self.media_url,
                media_type: self.media_type,
            },
            users: self.users,
            sender: self.sender,
            is_group_chat: self.is_group_chat,
            group_name: self.group_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- User Management ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (user_id, username, email, hashed_password, is_verified) \
             VALUES ($1, $2, $3, $4, TRUE) RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.hashed_password)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PortError::Conflict("Username or email already exists".to_string())
                } else {
                    unexpected(e)
                }
            })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", username)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, || "No user with that email".to_string()))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_login(&self, login: &str) -> PortResult<UserCredentials> {
        let sql = format!(
            "SELECT {} FROM users WHERE username = $1 OR email = lower($1) LIMIT 1",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(login)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", login)))?;
        Ok(record.to_credentials())
    }

    async fn user_exists(&self, username: &str, email: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $1, updated_at = NOW() WHERE user_id = $2",
        )
        .bind(hashed_password)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn complete_profile(&self, user_id: Uuid, profile: ProfileUpdate) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET full_name = $1, bio = $2, \
             profile_picture = COALESCE($3, profile_picture), \
             profile_completed = TRUE, updated_at = NOW() \
             WHERE user_id = $4 RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(profile.full_name)
            .bind(profile.bio)
            .bind(profile.profile_picture)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or_unexpected(e, || format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn mark_profile_prompt_seen(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE users SET has_seen_profile_prompt = TRUE WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_users_except(&self, user_id: Uuid) -> PortResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE user_id <> $1 ORDER BY username ASC",
            USER_COLUMNS
        );
        let records = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Auth Methods ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- One-time passcodes ---

    async fn save_otp(&self, otp: OneTimePasscode) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO otps (id, email, code, expires_at, is_verified, purpose, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(otp.id)
        .bind(&otp.email)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .bind(otp.is_verified)
        .bind(otp.purpose.as_str())
        .bind(otp.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn find_latest_otp(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>> {
        let record = sqlx::query_as::<_, OtpRecord>(
            "SELECT id, email, code, expires_at, is_verified, purpose, created_at FROM otps \
             WHERE email = $1 AND code = $2 AND purpose = $3 AND expires_at > $4 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email)
        .bind(code)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(OtpRecord::to_domain).transpose()
    }

    async fn mark_otp_verified(&self, otp_id: Uuid) -> PortResult<()> {
        sqlx::query("UPDATE otps SET is_verified = TRUE WHERE id = $1")
            .bind(otp_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn find_verified_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>> {
        let record = sqlx::query_as::<_, OtpRecord>(
            "SELECT id, email, code, expires_at, is_verified, purpose, created_at FROM otps \
             WHERE email = $1 AND purpose = $2 AND is_verified = TRUE AND expires_at > $3 \
             AND ($4::TEXT IS NULL OR code = $4) \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(now)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(OtpRecord::to_domain).transpose()
    }

    async fn delete_otps(&self, email: &str, purpose: OtpPurpose) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE email = $1 AND purpose = $2")
            .bind(email)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn delete_otps_expired_before(&self, cutoff: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    // --- Conversations ---

    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> PortResult<Option<Chat>> {
        let sql = format!(
            "SELECT {} FROM chats WHERE is_group_chat = FALSE \
             AND members @> $1 AND cardinality(members) = 2 \
             ORDER BY created_at ASC LIMIT 1",
            CHAT_COLUMNS
        );
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(vec![a, b])
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(ChatRecord::to_domain))
    }

    async fn find_chat(&self, chat_id: Uuid) -> PortResult<Option<Chat>> {
        let sql = format!("SELECT {} FROM chats WHERE id = $1", CHAT_COLUMNS);
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.map(ChatRecord::to_domain))
    }

    async fn create_chat(&self, new_chat: NewChat) -> PortResult<Chat> {
        let sql = format!(
            "INSERT INTO chats (id, name, is_group_chat, members, admin_id, bio, profile_picture) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            CHAT_COLUMNS
        );
        let record = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_chat.name)
            .bind(new_chat.is_group_chat)
            .bind(&new_chat.members)
            .bind(new_chat.admin)
            .bind(&new_chat.bio)
            .bind(&new_chat.profile_picture)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_chats_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let sql = format!(
            "SELECT {} FROM chats WHERE $1 = ANY(members) AND cardinality(members) > 1 \
             ORDER BY updated_at DESC",
            CHAT_COLUMNS
        );
        let records = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_groups_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let sql = format!(
            "SELECT {} FROM chats WHERE is_group_chat = TRUE AND $1 = ANY(members) \
             ORDER BY updated_at DESC",
            CHAT_COLUMNS
        );
        let records = sqlx::query_as::<_, ChatRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Messages ---

    async fn save_message(&self, new_message: NewMessage) -> PortResult<Message> {
        let sql = format!(
            "INSERT INTO messages (id, text, media_url, media_type, users, sender, is_group_chat, group_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            MESSAGE_COLUMNS
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_message.body.text)
            .bind(&new_message.body.media_url)
            .bind(&new_message.body.media_type)
            .bind(&new_message.users)
            .bind(new_message.sender)
            .bind(new_message.is_group_chat)
            .bind(&new_message.group_name)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn messages_for(&self, participant_id: Uuid) -> PortResult<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE $1 = ANY(users) ORDER BY updated_at ASC",
            MESSAGE_COLUMNS
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(participant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
