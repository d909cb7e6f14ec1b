pub mod accounts;
pub mod cipher;
pub mod delivery;
pub mod directory;
pub mod domain;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod ports;
pub mod presence;
pub mod router;

pub use accounts::AccountService;
pub use cipher::MessageCipher;
pub use delivery::{DeliveryCoordinator, MediaSubmission, TextSubmission};
pub use directory::{ConversationDirectory, GroupSpec};
pub use domain::{
    Chat, DecoratedMessage, MediaAttachment, Message, MessageBody, OneTimePasscode,
    OtpPurpose, ProfileUpdate, Recipient, User, UserCredentials,
};
pub use ports::{DatabaseService, OtpMailer, PortError, PortResult};
pub use presence::{ConnectionHandle, ConnectionId, PresenceTable};
pub use router::{FanoutRouter, RealtimeEvent};
