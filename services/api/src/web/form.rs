//! services/api/src/web/form.rs
//!
//! Collects a `multipart/form-data` body into text fields and uploaded files.

use axum::extract::Multipart;
use bytes::Bytes;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ApiError;

/// A file part of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Drains the whole body. Parts carrying a filename are kept as files,
    /// everything else must be UTF-8 text.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read file bytes: {}", e))
                })?;
                form.files.insert(
                    name,
                    UploadedFile {
                        file_name,
                        content_type,
                        data,
                    },
                );
            } else {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Field '{}' is not valid text: {}", name, e))
                })?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// A trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// A text field holding a UUID. Absent is `None`, malformed is an error.
    pub fn uuid(&self, name: &str) -> Result<Option<Uuid>, ApiError> {
        self.text(name)
            .map(|v| {
                Uuid::parse_str(v)
                    .map_err(|_| ApiError::BadRequest(format!("Field '{}' is not a valid id", name)))
            })
            .transpose()
    }

    /// Form booleans arrive as the strings `"true"`/`"false"`.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// A text field holding a JSON array of UUIDs.
    pub fn uuid_list(&self, name: &str) -> Result<Vec<Uuid>, ApiError> {
        match self.text(name) {
            Some(raw) => serde_json::from_str(raw).map_err(|_| {
                ApiError::BadRequest(format!("Field '{}' must be a JSON array of ids", name))
            }),
            None => Ok(Vec::new()),
        }
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}
