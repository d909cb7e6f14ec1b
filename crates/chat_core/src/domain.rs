//! crates/chat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the chat application.
//! Apart from the wire-facing message projection, these structs are independent
//! of any database or serialization format.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

//=========================================================================================
// Users & Authentication
//=========================================================================================

/// Represents a registered user - used throughout the app.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub profile_completed: bool,
    pub has_seen_profile_prompt: bool,
    pub profile_picture: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub contacts: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

/// Fields required to insert a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
}

/// Profile fields written by the "complete profile" flow.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

//=========================================================================================
// One-time passcodes
//=========================================================================================

/// What a one-time passcode was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Registration,
    Reset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
            OtpPurpose::Reset => "reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registration" => Some(OtpPurpose::Registration),
            "reset" => Some(OtpPurpose::Reset),
            _ => None,
        }
    }
}

/// A single entry of the append-only passcode log.
#[derive(Debug, Clone)]
pub struct OneTimePasscode {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub is_verified: bool,
    pub purpose: OtpPurpose,
    pub created_at: DateTime<Utc>,
}

impl OneTimePasscode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

//=========================================================================================
// Conversations
//=========================================================================================

/// A direct (two-party) or group conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub is_group_chat: bool,
    pub members: Vec<Uuid>,
    /// Only set for group chats: the creator.
    pub admin: Option<Uuid>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

/// Insert shape for a new chat row.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub name: String,
    pub is_group_chat: bool,
    pub members: Vec<Uuid>,
    pub admin: Option<Uuid>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

/// Who a message is addressed to, resolved once at the delivery boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Direct(Uuid),
    Group { group_id: Uuid, members: Vec<Uuid> },
}

impl Recipient {
    /// The user ids a live fan-out should target.
    pub fn member_ids(&self) -> Vec<Uuid> {
        match self {
            Recipient::Direct(user_id) => vec![*user_id],
            Recipient::Group { members, .. } => members.clone(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Recipient::Group { .. })
    }
}

//=========================================================================================
// Messages
//=========================================================================================

/// The stored body of a message. `text` is always ciphertext.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBody {
    pub text: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

/// A persisted message as held by the message store.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub body: MessageBody,
    /// Direct: both participants. Group: the group id.
    pub users: Vec<Uuid>,
    pub sender: Uuid,
    pub is_group_chat: bool,
    pub group_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert shape for a new message row.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub body: MessageBody,
    pub users: Vec<Uuid>,
    pub sender: Uuid,
    pub is_group_chat: bool,
    pub group_name: Option<String>,
}

/// A media file that already lives in the blob store.
#[derive(Debug, Clone)]
pub struct MediaAttachment {
    pub original_name: String,
    pub url: String,
    pub mime_type: String,
}

/// A message projected for a reader: the stored record plus decrypted `content`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedMessage {
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
