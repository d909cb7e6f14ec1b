//! crates/chat_core/src/delivery.rs
//!
//! The message write path (validate, encrypt, persist) and the decrypting read path.
//!
//! Live fan-out is deliberately not part of `submit_*`: the sending client
//! receives the persisted record and then asks the realtime router to push its
//! own copy to the recipients. Storage success and live-delivery success are
//! therefore independent.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cipher::MessageCipher;
use crate::directory::ConversationDirectory;
use crate::domain::{
    DecoratedMessage, MediaAttachment, Message, MessageBody, NewMessage, Recipient,
};
use crate::ports::{DatabaseService, PortError, PortResult};

/// A text message as submitted over the request/response channel.
#[derive(Debug, Clone, Default)]
pub struct TextSubmission {
    pub sender: Option<Uuid>,
    pub target: Option<Uuid>,
    pub content: String,
    pub is_group: bool,
    pub group_label: Option<String>,
}

/// A media message whose file is already in the blob store.
#[derive(Debug, Clone)]
pub struct MediaSubmission {
    pub sender: Option<Uuid>,
    pub target: Option<Uuid>,
    pub media: MediaAttachment,
    pub is_group: bool,
}

#[derive(Clone)]
pub struct DeliveryCoordinator {
    db: Arc<dyn DatabaseService>,
    cipher: Arc<MessageCipher>,
    directory: ConversationDirectory,
}

impl DeliveryCoordinator {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        cipher: Arc<MessageCipher>,
        directory: ConversationDirectory,
    ) -> Self {
        Self {
            db,
            cipher,
            directory,
        }
    }

    //=====================================================================================
    // Write path
    //=====================================================================================

    /// Encrypts and stores a text message, returning the stored record (still encrypted).
    pub async fn submit_text_message(&self, submission: TextSubmission) -> PortResult<Message> {
        let sender = submission
            .sender
            .ok_or_else(|| PortError::Validation("Sender ID is required".to_string()))?;
        let target = submission
            .target
            .ok_or_else(|| PortError::Validation("Recipient ID is required".to_string()))?;
        if submission.content.is_empty() {
            return Err(PortError::Validation("Message content is required".to_string()));
        }

        let (recipient, group_name) = self
            .resolve_recipient(sender, target, submission.is_group, submission.group_label)
            .await?;
        let body = MessageBody {
            text: self.cipher.encrypt(&submission.content)?,
            media_url: None,
            media_type: None,
        };
        self.persist(sender, &recipient, group_name, body).await
    }

    /// Stores a media message. The original filename is encrypted into `text`;
    /// the URL and MIME type stay in clear.
    pub async fn submit_media_message(&self, submission: MediaSubmission) -> PortResult<Message> {
        let sender = submission
            .sender
            .ok_or_else(|| PortError::Validation("Sender ID is required".to_string()))?;
        let target = submission
            .target
            .ok_or_else(|| PortError::Validation("Recipient ID is required".to_string()))?;

        let (recipient, group_name) = self
            .resolve_recipient(sender, target, submission.is_group, None)
            .await?;
        let body = MessageBody {
            text: self.cipher.encrypt(&submission.media.original_name)?,
            media_url: Some(submission.media.url),
            media_type: Some(submission.media.mime_type),
        };
        self.persist(sender, &recipient, group_name, body).await
    }

    async fn persist(
        &self,
        sender: Uuid,
        recipient: &Recipient,
        group_name: Option<String>,
        body: MessageBody,
    ) -> PortResult<Message> {
        let users = match recipient {
            Recipient::Direct(target) => vec![sender, *target],
            Recipient::Group { group_id, .. } => vec![*group_id],
        };

        let message = self
            .db
            .save_message(NewMessage {
                body,
                users,
                sender,
                is_group_chat: recipient.is_group(),
                group_name,
            })
            .await?;
        debug!(message_id = %message.id, %sender, "message persisted");
        Ok(message)
    }

    //=====================================================================================
    // Recipient resolution
    //=====================================================================================

    /// Turns the raw target id into a `Recipient`. Groups must exist and contain
    /// the sender, whether or not the caller flagged the target as a group. A direct
    /// target must be a known user and gets its chat created on first contact.
    /// The returned label is the group name to store (caller's label, else the chat's).
    pub async fn resolve_recipient(
        &self,
        sender: Uuid,
        target: Uuid,
        is_group: bool,
        group_label: Option<String>,
    ) -> PortResult<(Recipient, Option<String>)> {
        let group = match self.directory.find_group(target).await? {
            Some(group) => group,
            None if is_group => {
                return Err(PortError::NotFound(format!("Group {} not found", target)))
            }
            None => {
                if sender == target {
                    self.db.get_user_by_id(target).await?;
                } else {
                    self.directory.find_or_create_direct(sender, target).await?;
                }
                return Ok((Recipient::Direct(target), None));
            }
        };

        if !group.has_member(sender) {
            return Err(PortError::Forbidden(format!(
                "User {} is not a member of group {}",
                sender, target
            )));
        }
        let label = group_label
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| group.name.clone());
        Ok((
            Recipient::Group {
                group_id: group.id,
                members: group.members,
            },
            Some(label),
        ))
    }

    /// Resolves the `to` of a live `send-msg`: a group id the sender belongs to
    /// fans out to the members, anything else is treated as a user id.
    pub async fn resolve_live_target(&self, sender: Uuid, to: Uuid) -> PortResult<Recipient> {
        match self.directory.find_group(to).await? {
            Some(group) if group.has_member(sender) => Ok(Recipient::Group {
                group_id: group.id,
                members: group.members,
            }),
            Some(_) => Err(PortError::Forbidden(format!(
                "User {} is not a member of group {}",
                sender, to
            ))),
            None => Ok(Recipient::Direct(to)),
        }
    }

    //=====================================================================================
    // Read path
    //=====================================================================================

    /// Every message whose participants include `participant_id`, oldest first,
    /// with `content` decrypted. Undecryptable rows get empty content.
    pub async fn list_messages(&self, participant_id: Uuid) -> PortResult<Vec<DecoratedMessage>> {
        let messages = self.db.messages_for(participant_id).await?;
        Ok(messages.into_iter().map(|m| self.decorate(m)).collect())
    }

    /// The conversation `viewer` sees when opening `counterpart`: the whole group
    /// history for a group they belong to, otherwise the direct messages between the two.
    pub async fn list_conversation(
        &self,
        viewer: Uuid,
        counterpart: Uuid,
    ) -> PortResult<Vec<DecoratedMessage>> {
        if let Some(group) = self.directory.find_group(counterpart).await? {
            if !group.has_member(viewer) {
                return Err(PortError::Forbidden(format!(
                    "User {} is not a member of group {}",
                    viewer, counterpart
                )));
            }
            return self.list_messages(counterpart).await;
        }

        let messages = self.db.messages_for(counterpart).await?;
        Ok(messages
            .into_iter()
            .filter(|m| !m.is_group_chat && m.users.contains(&viewer))
            .map(|m| self.decorate(m))
            .collect())
    }

    fn decorate(&self, message: Message) -> DecoratedMessage {
        let content = match self.cipher.decrypt(&message.body.text) {
            Ok(text) => text,
            Err(e) => {
                warn!(message_id = %message.id, "unreadable message text: {}", e);
                String::new()
            }
        };

        DecoratedMessage {
            id: message.id,
            sender: message.sender,
            users: message.users,
            is_group_chat: message.is_group_chat,
            group_name: message.group_name,
            content,
            media_url: message.body.media_url,
            media_type: message.body.media_type,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::GroupSpec;
    use crate::memory::InMemoryDatabase;

    struct Fixture {
        db: Arc<InMemoryDatabase>,
        directory: ConversationDirectory,
        coordinator: DeliveryCoordinator,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(InMemoryDatabase::new());
        let directory = ConversationDirectory::new(db.clone());
        let cipher = Arc::new(MessageCipher::new("delivery-tests").unwrap());
        let coordinator = DeliveryCoordinator::new(db.clone(), cipher, directory.clone());
        Fixture {
            db,
            directory,
            coordinator,
        }
    }

    fn text(sender: Uuid, target: Uuid, content: &str) -> TextSubmission {
        TextSubmission {
            sender: Some(sender),
            target: Some(target),
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_sender_or_content_is_rejected() {
        let f = fixture();
        let target = Uuid::new_v4();

        let no_sender = TextSubmission {
            target: Some(target),
            content: "hello".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            f.coordinator.submit_text_message(no_sender).await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            f.coordinator
                .submit_text_message(text(Uuid::new_v4(), target, ""))
                .await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn stored_text_is_encrypted_and_listed_decrypted() {
        let f = fixture();
        let (alice, bob) = (f.db.add_user("alice"), f.db.add_user("bob"));

        let stored = f
            .coordinator
            .submit_text_message(text(alice, bob, "hello"))
            .await
            .unwrap();
        assert_ne!(stored.body.text, "hello");
        assert_eq!(stored.users, vec![alice, bob]);

        for participant in [alice, bob] {
            let listed = f.coordinator.list_messages(participant).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].content, "hello");
        }
    }

    #[tokio::test]
    async fn first_direct_message_creates_the_chat() {
        let f = fixture();
        let (alice, bob) = (f.db.add_user("alice"), f.db.add_user("bob"));

        f.coordinator
            .submit_text_message(text(alice, bob, "hi"))
            .await
            .unwrap();

        assert!(f.db.find_direct_chat(bob, alice).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn media_message_stores_encrypted_filename() {
        let f = fixture();
        let (alice, bob) = (f.db.add_user("alice"), f.db.add_user("bob"));

        let stored = f
            .coordinator
            .submit_media_message(MediaSubmission {
                sender: Some(alice),
                target: Some(bob),
                media: MediaAttachment {
                    original_name: "holiday.png".to_string(),
                    url: "/uploads/1700000000-holiday.png".to_string(),
                    mime_type: "image/png".to_string(),
                },
                is_group: false,
            })
            .await
            .unwrap();

        assert!(!stored.body.text.is_empty());
        assert_ne!(stored.body.text, "holiday.png");
        assert_eq!(
            stored.body.media_url.as_deref(),
            Some("/uploads/1700000000-holiday.png")
        );

        let listed = f.coordinator.list_messages(bob).await.unwrap();
        assert_eq!(listed[0].content, "holiday.png");
        assert_eq!(listed[0].media_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn group_messages_are_keyed_by_group_id() {
        let f = fixture();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = f
            .directory
            .create_group(
                GroupSpec {
                    name: "Climbing".to_string(),
                    members: vec![bob, carol],
                    ..Default::default()
                },
                alice,
            )
            .await
            .unwrap();

        let stored = f
            .coordinator
            .submit_text_message(TextSubmission {
                is_group: true,
                ..text(alice, group.id, "saturday?")
            })
            .await
            .unwrap();

        assert!(stored.is_group_chat);
        assert_eq!(stored.users, vec![group.id]);
        assert_eq!(stored.group_name.as_deref(), Some("Climbing"));

        let history = f.coordinator.list_conversation(carol, group.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "saturday?");

        let outsider = Uuid::new_v4();
        assert!(matches!(
            f.coordinator.list_conversation(outsider, group.id).await,
            Err(PortError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let f = fixture();
        let result = f
            .coordinator
            .submit_text_message(TextSubmission {
                is_group: true,
                ..text(Uuid::new_v4(), Uuid::new_v4(), "anyone?")
            })
            .await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn conversation_excludes_third_parties() {
        let f = fixture();
        let (alice, bob, mallory) = (
            f.db.add_user("alice"),
            f.db.add_user("bob"),
            f.db.add_user("mallory"),
        );
        f.coordinator
            .submit_text_message(text(alice, bob, "for bob"))
            .await
            .unwrap();
        f.coordinator
            .submit_text_message(text(bob, mallory, "for mallory"))
            .await
            .unwrap();

        let seen_by_alice = f.coordinator.list_conversation(alice, bob).await.unwrap();
        assert_eq!(seen_by_alice.len(), 1);
        assert_eq!(seen_by_alice[0].content, "for bob");
    }

    #[tokio::test]
    async fn wrong_key_fails_soft_per_message() {
        let f = fixture();
        let (alice, bob) = (f.db.add_user("alice"), f.db.add_user("bob"));
        f.coordinator
            .submit_text_message(text(alice, bob, "old key"))
            .await
            .unwrap();

        let rotated = DeliveryCoordinator::new(
            f.db.clone(),
            Arc::new(MessageCipher::new("another-key").unwrap()),
            f.directory.clone(),
        );
        rotated
            .submit_text_message(text(alice, bob, "new key"))
            .await
            .unwrap();

        let listed = rotated.list_messages(bob).await.unwrap();
        assert_eq!(
            listed.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["", "new key"]
        );
    }

    #[tokio::test]
    async fn live_target_resolves_groups_and_users() {
        let f = fixture();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let group = f
            .directory
            .create_group(
                GroupSpec {
                    name: "Trio".to_string(),
                    members: vec![bob, carol],
                    ..Default::default()
                },
                alice,
            )
            .await
            .unwrap();

        assert!(f
            .coordinator
            .resolve_live_target(alice, group.id)
            .await
            .unwrap()
            .is_group());
        assert_eq!(
            f.coordinator.resolve_live_target(alice, bob).await.unwrap(),
            Recipient::Direct(bob)
        );
        assert!(matches!(
            f.coordinator.resolve_live_target(Uuid::new_v4(), group.id).await,
            Err(PortError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn direct_message_to_unknown_user_is_not_found() {
        let f = fixture();
        let alice = f.db.add_user("alice");

        let result = f
            .coordinator
            .submit_text_message(text(alice, Uuid::new_v4(), "anyone there?"))
            .await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
        assert_eq!(f.db.message_count(), 0);
        assert!(f.directory.list_chats_for(alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_target_is_membership_checked_without_the_group_flag() {
        let f = fixture();
        let (alice, bob, carol) = (
            f.db.add_user("alice"),
            f.db.add_user("bob"),
            f.db.add_user("carol"),
        );
        let outsider = f.db.add_user("outsider");
        let group = f
            .directory
            .create_group(
                GroupSpec {
                    name: "Book club".to_string(),
                    members: vec![bob, carol],
                    ..Default::default()
                },
                alice,
            )
            .await
            .unwrap();

        let spoofed = f
            .coordinator
            .submit_text_message(text(outsider, group.id, "spoofed"))
            .await;
        assert!(matches!(spoofed, Err(PortError::Forbidden(_))));
        assert!(f
            .db
            .find_direct_chat(outsider, group.id)
            .await
            .unwrap()
            .is_none());
        assert!(f
            .coordinator
            .list_conversation(bob, group.id)
            .await
            .unwrap()
            .is_empty());

        let stored = f
            .coordinator
            .submit_text_message(text(carol, group.id, "chapter 3 tonight"))
            .await
            .unwrap();
        assert!(stored.is_group_chat);
        assert_eq!(stored.users, vec![group.id]);
        assert_eq!(stored.group_name.as_deref(), Some("Book club"));
    }
}
