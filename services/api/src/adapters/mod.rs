pub mod blob_store;
pub mod db;
pub mod mailer;

pub use blob_store::BlobStore;
pub use db::DbAdapter;
pub use mailer::{LogMailer, SmtpMailer};
