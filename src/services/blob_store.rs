use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::utils::crypto::random_token;
use crate::utils::error::{AppError, AppResult};

/// Gzip blobs on the local filesystem, laid out as
/// `{root}/files/{user_id}/{stored_name}`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    files_dir: PathBuf,
}

/// A path segment must be a single normal component: no separators, no
/// `..`, nothing absolute.
fn check_segment(segment: &str) -> AppResult<()> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !segment.contains(['/', '\\']) => Ok(()),
        _ => Err(AppError::BadRequest(
            "Path traversal detected".to_string(),
        )),
    }
}

impl BlobStore {
    pub async fn new(root: &Path) -> AppResult<Self> {
        let files_dir = root.join("files");
        fs::create_dir_all(&files_dir).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to create blob directory '{}': {}",
                files_dir.display(),
                e
            ))
        })?;

        info!(path = %files_dir.display(), "Blob store initialized");

        Ok(Self { files_dir })
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn blob_path(&self, user_id: &str, stored_name: &str) -> AppResult<PathBuf> {
        check_segment(user_id)?;
        check_segment(stored_name)?;
        Ok(self.files_dir.join(user_id).join(stored_name))
    }

    /// Write `data` next to the final blob under a hidden temporary name.
    /// Readers never see it until [`BlobStore::promote`] renames it.
    pub async fn stage(&self, user_id: &str, stored_name: &str, data: &[u8]) -> AppResult<PathBuf> {
        let path = self.blob_path(user_id, stored_name)?;
        let staged = path.with_file_name(format!(".{}.{}.tmp", stored_name, random_token()));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Storage(format!("Failed to create user directory: {}", e))
            })?;
        }

        fs::write(&staged, data).await.map_err(|e| {
            AppError::Storage(format!("Failed to write blob {}: {}", staged.display(), e))
        })?;

        debug!(user_id, stored_name, size = data.len(), "Staged blob");
        Ok(staged)
    }

    /// Atomically replace the blob with a staged file.
    pub async fn promote(&self, staged: &Path, user_id: &str, stored_name: &str) -> AppResult<()> {
        let path = self.blob_path(user_id, stored_name)?;
        fs::rename(staged, &path).await.map_err(|e| {
            AppError::Storage(format!("Failed to move blob into {}: {}", path.display(), e))
        })?;

        debug!(user_id, stored_name, "Stored blob");
        Ok(())
    }

    pub async fn discard(&self, staged: &Path) {
        if let Err(e) = fs::remove_file(staged).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove staged blob {}: {}", staged.display(), e);
        }
    }

    pub async fn write(&self, user_id: &str, stored_name: &str, data: &[u8]) -> AppResult<()> {
        let staged = self.stage(user_id, stored_name, data).await?;
        if let Err(e) = self.promote(&staged, user_id, stored_name).await {
            self.discard(&staged).await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn read(&self, user_id: &str, stored_name: &str) -> AppResult<Vec<u8>> {
        let path = self.blob_path(user_id, stored_name)?;

        let data = fs::read(&path).await.map_err(|e| {
            AppError::Storage(format!("Failed to read blob {}: {}", path.display(), e))
        })?;

        debug!(user_id, stored_name, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    /// Removes a blob. Returns `false` when it was already gone.
    pub async fn remove(&self, user_id: &str, stored_name: &str) -> AppResult<bool> {
        let path = self.blob_path(user_id, stored_name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(user_id, stored_name, "Deleted blob");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete blob {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.files_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
