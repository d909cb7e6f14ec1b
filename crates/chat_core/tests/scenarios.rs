//! End-to-end flows across the core services, backed by the in-memory store.

use std::sync::Arc;

use chat_core::memory::{InMemoryDatabase, RecordingMailer};
use chat_core::{
    AccountService, ConnectionHandle, ConversationDirectory, DeliveryCoordinator, FanoutRouter,
    MessageCipher, OtpPurpose, PortError, PresenceTable, RealtimeEvent, TextSubmission,
};
use serde_json::json;
use uuid::Uuid;

struct Harness {
    db: Arc<InMemoryDatabase>,
    mailer: Arc<RecordingMailer>,
    presence: Arc<PresenceTable>,
    router: FanoutRouter,
    coordinator: DeliveryCoordinator,
    accounts: AccountService,
}

fn harness() -> Harness {
    let db = Arc::new(InMemoryDatabase::new());
    let mailer = Arc::new(RecordingMailer::default());
    let presence = Arc::new(PresenceTable::new());
    let directory = ConversationDirectory::new(db.clone());
    let cipher = Arc::new(MessageCipher::new("scenario-secret").unwrap());
    Harness {
        router: FanoutRouter::new(presence.clone()),
        coordinator: DeliveryCoordinator::new(db.clone(), cipher, directory),
        accounts: AccountService::new(db.clone(), mailer.clone()),
        db,
        mailer,
        presence,
    }
}

#[tokio::test]
async fn message_to_offline_user_is_stored_encrypted() {
    let h = harness();
    let (alice, bob) = (h.db.add_user("alice"), h.db.add_user("bob"));

    let stored = h
        .coordinator
        .submit_text_message(TextSubmission {
            sender: Some(alice),
            target: Some(bob),
            content: "hello".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_ne!(stored.body.text, "hello");

    let recipient = h.coordinator.resolve_live_target(alice, bob).await.unwrap();
    assert_eq!(h.router.fan_out(&recipient, alice, json!({"content": "hello"})).await, 0);

    assert_eq!(h.db.message_count(), 1);
    for participant in [alice, bob] {
        let listed = h.coordinator.list_messages(participant).await.unwrap();
        assert_eq!(listed[0].content, "hello");
    }
}

#[tokio::test]
async fn message_to_online_user_is_pushed_once() {
    let h = harness();
    let (alice, bob) = (h.db.add_user("alice"), h.db.add_user("bob"));
    let (alice_handle, mut alice_rx) = ConnectionHandle::channel(8);
    let (bob_handle, mut bob_rx) = ConnectionHandle::channel(8);
    h.presence.identify(alice, alice_handle).await;
    h.presence.identify(bob, bob_handle).await;

    h.coordinator
        .submit_text_message(TextSubmission {
            sender: Some(alice),
            target: Some(bob),
            content: "hi".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let payload = json!({"sender": alice, "content": "hi"});
    let recipient = h.coordinator.resolve_live_target(alice, bob).await.unwrap();
    assert_eq!(h.router.fan_out(&recipient, alice, payload.clone()).await, 1);

    assert_eq!(
        bob_rx.try_recv().unwrap(),
        RealtimeEvent::MessageReceived(payload)
    );
    assert!(bob_rx.try_recv().is_err());
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn registration_requires_a_verified_passcode() {
    let h = harness();
    let email = "erin@example.com";

    h.accounts
        .request_otp(email, OtpPurpose::Registration)
        .await
        .unwrap();
    let code = h.mailer.last_code().unwrap();
    let wrong = if code == "100000" { "100001" } else { "100000" };

    assert!(matches!(
        h.accounts.verify_otp(email, wrong, OtpPurpose::Registration).await,
        Err(PortError::Validation(_))
    ));
    assert!(matches!(
        h.accounts.signup("erin", email, "hash".to_string()).await,
        Err(PortError::Validation(_))
    ));

    h.accounts
        .verify_otp(email, &code, OtpPurpose::Registration)
        .await
        .unwrap();
    assert!(h.db.otps_for(email)[0].is_verified);

    let user = h
        .accounts
        .signup("erin", email, "hash".to_string())
        .await
        .unwrap();
    assert!(user.is_verified);
    assert!(h.db.otps_for(email).is_empty());
}

#[tokio::test]
async fn password_reset_consumes_the_passcode() {
    let h = harness();
    let email = "frank@example.com";
    h.accounts
        .request_otp(email, OtpPurpose::Registration)
        .await
        .unwrap();
    let code = h.mailer.last_code().unwrap();
    h.accounts
        .verify_otp(email, &code, OtpPurpose::Registration)
        .await
        .unwrap();
    let user = h
        .accounts
        .signup("frank", email, "old-hash".to_string())
        .await
        .unwrap();

    h.accounts.request_otp(email, OtpPurpose::Reset).await.unwrap();
    let reset_code = h.mailer.last_code().unwrap();

    assert!(matches!(
        h.accounts.reset_password(email, &reset_code, "new-hash").await,
        Err(PortError::Validation(_))
    ));

    h.accounts
        .verify_otp(email, &reset_code, OtpPurpose::Reset)
        .await
        .unwrap();
    h.accounts
        .reset_password(email, &reset_code, "new-hash")
        .await
        .unwrap();

    assert_eq!(h.db.password_hash(user.user_id).as_deref(), Some("new-hash"));
    assert!(h.db.otps_for(email).is_empty());
}
