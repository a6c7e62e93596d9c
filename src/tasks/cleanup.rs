use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::database::DbPool;
use crate::models::file::File;
use crate::services::blob_store::BlobStore;
use crate::services::file_storage::remove_file_record;

pub async fn cleanup_expired_files(db: &DbPool, blobs: &BlobStore) -> anyhow::Result<usize> {
    let now = Utc::now().to_rfc3339();

    tracing::info!("Starting cleanup of expired files");

    let expired_files = sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE expires_at IS NOT NULL AND expires_at < ?",
    )
    .bind(&now)
    .fetch_all(db.as_ref())
    .await?;

    let count = expired_files.len();
    tracing::info!("Found {} expired files to delete", count);

    for file in expired_files {
        if let Err(e) = remove_file_record(db, blobs, &file).await {
            tracing::warn!("Failed to remove expired file {}: {}", file.id, e);
            continue;
        }

        tracing::info!(
            "Expired file removed: id={}, name={}, owner={}",
            file.id,
            file.original_name,
            file.user_id
        );
    }

    tracing::info!("Cleanup completed: {} files processed", count);
    Ok(count)
}

pub fn start_cleanup_task(db: DbPool, blobs: Arc<BlobStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            match cleanup_expired_files(&db, &blobs).await {
                Ok(count) => {
                    tracing::info!("File cleanup task completed: {} files cleaned", count);
                }
                Err(e) => {
                    tracing::error!("File cleanup task failed: {}", e);
                }
            }
        }
    });
}
