//! crates/chat_core/src/directory.rs
//!
//! Resolves and creates direct and group conversations.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{Chat, NewChat};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Name given to every direct chat row.
const DIRECT_CHAT_NAME: &str = "sender";

/// Parameters of `ConversationDirectory::create_group`.
#[derive(Debug, Clone, Default)]
pub struct GroupSpec {
    pub name: String,
    pub members: Vec<Uuid>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Clone)]
pub struct ConversationDirectory {
    db: Arc<dyn DatabaseService>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Returns the direct chat between `a` and `b`, creating it on first use.
    /// `b` must be an existing user (`NotFound` otherwise).
    ///
    /// The lookup and the insert are two separate store calls, so two concurrent
    /// first requests for the same pair can both insert. Sequential calls always
    /// resolve to the same chat regardless of argument order.
    pub async fn find_or_create_direct(&self, a: Uuid, b: Uuid) -> PortResult<(Chat, bool)> {
        if a == b {
            return Err(PortError::Validation(
                "Cannot start a direct chat with yourself".to_string(),
            ));
        }

        self.db.get_user_by_id(b).await?;

        if let Some(chat) = self.db.find_direct_chat(a, b).await? {
            return Ok((chat, false));
        }

        let chat = self
            .db
            .create_chat(NewChat {
                name: DIRECT_CHAT_NAME.to_string(),
                is_group_chat: false,
                members: vec![a, b],
                admin: None,
                bio: None,
                profile_picture: None,
            })
            .await?;
        info!(chat_id = %chat.id, "created direct chat");
        Ok((chat, true))
    }

    /// Creates a group chat administered by `creator_id`.
    pub async fn create_group(&self, spec: GroupSpec, creator_id: Uuid) -> PortResult<Chat> {
        let name = spec.name.trim();
        if name.is_empty() || spec.members.len() < 2 {
            return Err(PortError::Validation(
                "Please provide a name and at least 2 members".to_string(),
            ));
        }

        let mut members: Vec<Uuid> = Vec::with_capacity(spec.members.len() + 1);
        for member in spec.members {
            if member != creator_id && !members.contains(&member) {
                members.push(member);
            }
        }
        if members.len() < 2 {
            return Err(PortError::Validation(
                "A group needs at least 2 members besides its creator".to_string(),
            ));
        }
        members.push(creator_id);

        let chat = self
            .db
            .create_chat(NewChat {
                name: name.to_string(),
                is_group_chat: true,
                members,
                admin: Some(creator_id),
                bio: spec.bio,
                profile_picture: spec.profile_picture,
            })
            .await?;
        info!(chat_id = %chat.id, members = chat.members.len(), "created group chat");
        Ok(chat)
    }

    pub async fn list_chats_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        self.db.list_chats_for(user_id).await
    }

    pub async fn list_groups_for(&self, user_id: Uuid) -> PortResult<Vec<Chat>> {
        self.db.list_groups_for(user_id).await
    }

    /// The group chat with this id, if there is one.
    pub async fn find_group(&self, chat_id: Uuid) -> PortResult<Option<Chat>> {
        Ok(self
            .db
            .find_chat(chat_id)
            .await?
            .filter(|chat| chat.is_group_chat))
    }
}
