//! services/api/src/adapters/blob_store.rs
//!
//! Disk-backed storage for uploaded media and profile pictures. Files are
//! written under the configured uploads directory and served back at `/uploads/*`.

use std::path::{Component, Path, PathBuf};

use chat_core::domain::MediaAttachment;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;

/// URL prefix the uploads directory is mounted under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Reduces a client-supplied file name to a safe single path segment.
fn sanitize_file_name(original: &str) -> String {
    let last = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Verify that a stored name stays within the base directory.
fn ensure_within(base: &Path, name: &str) -> Result<PathBuf, ApiError> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            _ => return Err(ApiError::BadRequest("Invalid file name".to_string())),
        }
    }
    if !resolved.starts_with(base) || resolved == base {
        return Err(ApiError::BadRequest("Invalid file name".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await?;
        info!(path = %base_path.display(), "Uploads directory ready");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Writes the bytes as `<unix-millis>-<nonce>-<name>` and returns the attachment
    /// describing where they can be fetched.
    pub async fn store(
        &self,
        original_name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<MediaAttachment, ApiError> {
        if data.is_empty() {
            return Err(ApiError::BadRequest("No file uploaded".to_string()));
        }

        // Two uploads of the same name in the same millisecond must not collide.
        let nonce = Uuid::new_v4().simple().to_string();
        let stored_name = format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            &nonce[..8],
            sanitize_file_name(original_name)
        );
        let path = ensure_within(&self.base_path, &stored_name)?;
        fs::write(&path, data).await?;

        debug!(file = %stored_name, size = data.len(), "Stored upload");
        Ok(MediaAttachment {
            original_name: original_name.to_string(),
            url: format!("{}/{}", UPLOADS_ROUTE, stored_name),
            mime_type: mime_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_reduced_to_one_segment() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cat pic.jpg"), "cat_pic.jpg");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn traversal_is_rejected() {
        let base = Path::new("/srv/uploads");
        assert!(ensure_within(base, "../secret").is_err());
        assert!(ensure_within(base, "/etc/passwd").is_err());
        assert_eq!(
            ensure_within(base, "1-a.png").unwrap(),
            PathBuf::from("/srv/uploads/1-a.png")
        );
    }

    #[tokio::test]
    async fn store_writes_file_and_builds_url() {
        let dir = std::env::temp_dir().join(format!("blob-store-{}", Uuid::new_v4()));
        let store = BlobStore::new(dir.clone()).await.unwrap();

        let attachment = store.store("notes.txt", "text/plain", b"hello").await.unwrap();
        assert_eq!(attachment.original_name, "notes.txt");
        assert_eq!(attachment.mime_type, "text/plain");
        assert!(attachment.url.starts_with("/uploads/"));
        assert!(attachment.url.ends_with("-notes.txt"));

        let stored_name = attachment.url.trim_start_matches("/uploads/");
        let bytes = fs::read(dir.join(stored_name)).await.unwrap();
        assert_eq!(bytes, b"hello");

        assert!(store.store("empty.txt", "text/plain", b"").await.is_err());
        let _ = fs::remove_dir_all(&dir).await;
    }
}
