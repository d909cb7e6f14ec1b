//! crates/chat_core/src/memory.rs
//!
//! In-memory implementations of the ports, used by the test suites.
//! Compiled for this crate's tests or with the `testing` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Chat, Message, NewChat, NewMessage, NewUser, OneTimePasscode, OtpPurpose, ProfileUpdate,
    User, UserCredentials,
};
use crate::ports::{DatabaseService, OtpMailer, PortError, PortResult};

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    otps: Vec<OneTimePasscode>,
    chats: Vec<Chat>,
    messages: Vec<Message>,
}

/// A `DatabaseService` backed by plain vectors behind a mutex.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn otp_count(&self) -> usize {
        self.tables().otps.len()
    }

    pub fn otps_for(&self, email: &str) -> Vec<OneTimePasscode> {
        self.tables()
            .otps
            .iter()
            .filter(|otp| otp.email == email)
            .cloned()
            .collect()
    }

    pub fn set_verified(&self, username: &str, verified: bool) {
        if let Some(creds) = self
            .tables()
            .users
            .iter_mut()
            .find(|c| c.user.username == username)
        {
            creds.user.is_verified = verified;
        }
    }

    pub fn password_hash(&self, user_id: Uuid) -> Option<String> {
        self.tables()
            .users
            .iter()
            .find(|c| c.user.user_id == user_id)
            .map(|c| c.hashed_password.clone())
    }

    pub fn message_count(&self) -> usize {
        self.tables().messages.len()
    }

    /// Inserts a verified account directly and returns its id.
    pub fn add_user(&self, username: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            is_verified: true,
            profile_completed: false,
            has_seen_profile_prompt: false,
            profile_picture: None,
            full_name: None,
            bio: None,
            contacts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let user_id = user.user_id;
        self.tables().users.push(UserCredentials {
            user,
            hashed_password: String::new(),
        });
        user_id
    }
}

fn newest_first(mut chats: Vec<Chat>) -> Vec<Chat> {
    // Insertion order reversed first so that equal timestamps still list the newest row first.
    chats.reverse();
    chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    chats
}

fn latest(otps: impl Iterator<Item = OneTimePasscode>) -> Option<OneTimePasscode> {
    otps.fold(None, |best: Option<OneTimePasscode>, otp| match best {
        Some(best) if best.created_at > otp.created_at => Some(best),
        _ => Some(otp),
    })
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut tables = self.tables();
        if tables
            .users
            .iter()
            .any(|c| c.user.username == new_user.username || c.user.email == new_user.email)
        {
            return Err(PortError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            is_verified: true,
            profile_completed: false,
            has_seen_profile_prompt: false,
            profile_picture: None,
            full_name: None,
            bio: None,
            contacts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.push(UserCredentials {
            user: user.clone(),
            hashed_password: new_user.hashed_password,
        });
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.tables()
            .users
            .iter()
            .find(|c| c.user.user_id == user_id)
            .map(|c| c.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<User> {
        self.tables()
            .users
            .iter()
            .find(|c| c.user.username == username)
            .map(|c| c.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<User> {
        self.tables()
            .users
            .iter()
            .find(|c| c.user.email == email)
            .map(|c| c.user.clone())
            .ok_or_else(|| PortError::NotFound("No user with that email".to_string()))
    }

    async fn get_credentials_by_login(&self, login: &str) -> PortResult<UserCredentials> {
        let email = login.to_lowercase();
        self.tables()
            .users
            .iter()
            .find(|c| c.user.username == login || c.user.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", login)))
    }

    async fn user_exists(&self, username: &str, email: &str) -> PortResult<bool> {
        Ok(self
            .tables()
            .users
            .iter()
            .any(|c| c.user.username == username || c.user.email == email))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut tables = self.tables();
        let creds = tables
            .users
            .iter_mut()
            .find(|c| c.user.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        creds.hashed_password = hashed_password.to_string();
        creds.user.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_profile(&self, user_id: Uuid, profile: ProfileUpdate) -> PortResult<User> {
        let mut tables = self.tables();
        let creds = tables
            .users
            .iter_mut()
            .find(|c| c.user.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        creds.user.full_name = profile.full_name;
        creds.user.bio = profile.bio;
        if profile.profile_picture.is_some() {
            creds.user.profile_picture = profile.profile_picture;
        }
        creds.user.profile_completed = true;
        creds.user.updated_at = Utc::now();
        Ok(creds.user.clone())
    }

    async fn mark_profile_prompt_seen(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        let creds = tables
            .users
            .iter_mut()
            .find(|c| c.user.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        creds.user.has_seen_profile_prompt = true;
        Ok(())
    }

    async fn list_users_except(&self, user_id: Uuid) -> PortResult<Vec<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .filter(|c| c.user.user_id != user_id)
            .map(|c| c.user.clone())
            .collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables()
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.tables().sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables().sessions.remove(session_id);
        Ok(())
    }

    async fn save_otp(&self, otp: OneTimePasscode) -> PortResult<()> {
        self.tables().otps.push(otp);
        Ok(())
    }

    async fn find_latest_otp(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>> {
        let tables = self.tables();
        Ok(latest(
            tables
                .otps
                .iter()
                .filter(|o| {
                    o.email == email && o.code == code && o.purpose == purpose && !o.is_expired(now)
                })
                .cloned(),
        ))
    }

    async fn mark_otp_verified(&self, otp_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        let otp = tables
            .otps
            .iter_mut()
            .find(|o| o.id == otp_id)
            .ok_or_else(|| PortError::NotFound(format!("OTP {} not found", otp_id)))?;
        otp.is_verified = true;
        Ok(())
    }

    async fn find_verified_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<OneTimePasscode>> {
        let tables = self.tables();
        Ok(latest(
            tables
                .otps
                .iter()
                .filter(|o| {
                    o.email == email
                        && o.purpose == purpose
                        && o.is_verified
                        && !o.is_expired(now)
                        && code.map_or(true, |c| o.code == c)
                })
                .cloned(),
        ))
    }

    async fn delete_otps(&self, email: &str, purpose: OtpPurpose) -> PortResult<u64> {
        let mut tables = self.tables();
        let before = tables.otps.len();
        tables
            .otps
            .retain(|o| !(o.email == email && o.purpose == purpose));
        Ok((before - tables.otps.len()) as u64)
    }

    async fn delete_otps_expired_before(&self, cutoff: DateTime<Utc>) -> PortResult<u64> {
        let mut tables = self.tables();
        let before = tables.otps.len();
        tables.otps.retain(|o| o.expires_at >= cutoff);
        Ok((before - tables.otps.len()) as u64)
    }

    async fn find_direct_chat(&self, a: Uuid, b: Uuid) -> PortResult<Option<Chat>> {
        Ok(self
            .tables()
            .chats
            .iter()
            .find(|c| {
                !c.is_group_chat && c.members.len() == 2 && c.has_member(a) && c.has_member(b)
            })
            .cloned())
    }

    async fn find_chat(&self, chat_id: Uuid) -> PortResult<Option<Chat>> {
        Ok(self.tables().chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn create_chat(&self, new_chat: NewChat) -> PortResult<Chat> {
        let now = Utc::now();
        let chat = Chat {
            id: Uuid::new_v4(),
            name: new_chat.name,
            is_group_chat: new_chat.is_group_chat,
            members: new_chat.members,
            admin: new_chat.admin,
            bio: new_chat.bio,
            profile_picture: new_chat.profile_picture,
            created_at: now,
            updated_at: now,
        };
        self.tables().chats.push(chat.clone());
        Ok(chat)
    }

    async fn list_chats_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let chats = self
            .tables()
            .chats
            .iter()
            .filter(|c| c.has_member(user_id) && c.members.len() >= 2)
            .cloned()
            .collect();
        Ok(newest_first(chats))
    }

    async fn list_groups_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        let chats = self
            .tables()
            .chats
            .iter()
            .filter(|c| c.is_group_chat && c.has_member(user_id))
            .cloned()
            .collect();
        Ok(newest_first(chats))
    }

    async fn save_message(&self, new_message: NewMessage) -> PortResult<Message> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            body: new_message.body,
            users: new_message.users,
            sender: new_message.sender,
            is_group_chat: new_message.is_group_chat,
            group_name: new_message.group_name,
            created_at: now,
            updated_at: now,
        };
        self.tables().messages.push(message.clone());
        Ok(message)
    }

    async fn messages_for(&self, participant_id: Uuid) -> PortResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .tables()
            .messages
            .iter()
            .filter(|m| m.users.contains(&participant_id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(messages)
    }
}

/// An `OtpMailer` that keeps every sent code for inspection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String, OtpPurpose)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, String, OtpPurpose)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent().last().map(|(_, code, _)| code.clone())
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_otp(&self, email: &str, code: &str, purpose: OtpPurpose) -> PortResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((email.to_string(), code.to_string(), purpose));
        Ok(())
    }
}
