//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::BlobStore;
use crate::config::Config;
use chat_core::ports::{DatabaseService, OtpMailer};
use chat_core::{
    AccountService, ConversationDirectory, DeliveryCoordinator, FanoutRouter, MessageCipher,
    PresenceTable,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub presence: Arc<PresenceTable>,
    pub router: FanoutRouter,
    pub coordinator: DeliveryCoordinator,
    pub directory: ConversationDirectory,
    pub accounts: AccountService,
    pub blobs: BlobStore,
}

impl AppState {
    /// Wires the core services around the given adapters.
    pub fn new(
        config: Config,
        db: Arc<dyn DatabaseService>,
        mailer: Arc<dyn OtpMailer>,
        cipher: MessageCipher,
        blobs: BlobStore,
    ) -> Self {
        let presence = Arc::new(PresenceTable::new());
        let directory = ConversationDirectory::new(db.clone());
        Self {
            router: FanoutRouter::new(presence.clone()),
            coordinator: DeliveryCoordinator::new(db.clone(), Arc::new(cipher), directory.clone()),
            accounts: AccountService::new(db.clone(), mailer),
            directory,
            presence,
            blobs,
            config: Arc::new(config),
            db,
        }
    }
}
