use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::helpers::now_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct File {
    pub id: String,
    pub user_id: String,
    /// Blob name under the owner's directory, e.g. `<hex>.pdf.gz`
    #[serde(skip_serializing)]
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: Option<String>,
    /// Original (uncompressed) size in bytes
    pub file_size: i64,
    pub file_hash: String,
    pub share_token: String,
    pub is_public: bool,
    pub download_count: i64,
    pub last_downloaded_at: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewFile {
    pub user_id: String,
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub file_hash: String,
    pub share_token: String,
    pub expires_at: Option<String>,
}

impl File {
    pub fn new(new: NewFile) -> Self {
        let now = now_rfc3339();

        Self {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            stored_name: new.stored_name,
            original_name: new.original_name,
            mime_type: Some(new.mime_type),
            file_size: new.file_size,
            file_hash: new.file_hash,
            share_token: new.share_token,
            is_public: true,
            download_count: 0,
            last_downloaded_at: None,
            expires_at: new.expires_at,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn content_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
    }

    pub fn size_bytes(&self) -> u64 {
        self.file_size.max(0) as u64
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
