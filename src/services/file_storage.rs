use chrono::{DateTime, Duration, Utc};

use crate::database::DbPool;
use crate::models::file::{File, NewFile};
use crate::models::user::User;
use crate::services::auth::find_user_by_id;
use crate::services::blob_store::BlobStore;
use crate::services::compression::{compress, decompress};
use crate::services::file_validation::validate_upload;
use crate::services::plans::{PlanConfig, resolve_plan};
use crate::utils::crypto::{hash_file, random_token};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::{format_gb, format_mb, now_rfc3339};
use crate::utils::validation::sanitize_file_name;

async fn load_owner(pool: &DbPool, user_id: &str) -> AppResult<User> {
    find_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn check_upload_limit(plan: &PlanConfig, size: u64) -> AppResult<()> {
    if let Some(limit) = plan.upload_limit.bytes()
        && size > limit
    {
        return Err(AppError::BadRequest(format!(
            "Upload limit is {}MB for your plan.",
            format_mb(limit)
        )));
    }
    Ok(())
}

fn check_quota(plan: &PlanConfig, used: u64, additional: u64) -> AppResult<()> {
    if !plan.quota.allows(used.saturating_add(additional)) {
        let remaining = plan.quota.remaining(used).unwrap_or(0);
        return Err(AppError::BadRequest(format!(
            "Quota exceeded. You have {} GB remaining.",
            format_gb(remaining)
        )));
    }
    Ok(())
}

fn is_expired(file: &File, now: DateTime<Utc>) -> bool {
    file.expires_at
        .as_deref()
        .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
        .is_some_and(|e| e.with_timezone(&Utc) <= now)
}

/// Insert the row and charge the owner's quota as one unit.
async fn record_new_file(pool: &DbPool, file: &File) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO files (id, user_id, stored_name, original_name, mime_type, file_size, file_hash, share_token, is_public, download_count, last_downloaded_at, expires_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&file.id)
    .bind(&file.user_id)
    .bind(&file.stored_name)
    .bind(&file.original_name)
    .bind(&file.mime_type)
    .bind(file.file_size)
    .bind(&file.file_hash)
    .bind(&file.share_token)
    .bind(file.is_public)
    .bind(file.download_count)
    .bind(&file.last_downloaded_at)
    .bind(&file.expires_at)
    .bind(&file.created_at)
    .bind(&file.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET quota_used = quota_used + ?, updated_at = ? WHERE id = ?")
        .bind(file.file_size)
        .bind(&file.updated_at)
        .bind(&file.user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn save_file(
    pool: &DbPool,
    blobs: &BlobStore,
    user_id: &str,
    original_name: &str,
    claimed_mime: Option<&str>,
    data: Vec<u8>,
) -> AppResult<File> {
    let owner = load_owner(pool, user_id).await?;
    let plan = resolve_plan(Some(&owner));
    let size = data.len() as u64;

    tracing::info!(
        "Uploading file: {} ({} bytes, user={}, plan={})",
        original_name,
        size,
        owner.id,
        plan.name.as_str()
    );

    check_upload_limit(plan, size)?;
    check_quota(plan, owner.quota_used_bytes(), size)?;

    let file_hash = hash_file(&data);
    let duplicate = sqlx::query_as::<_, File>("SELECT * FROM files WHERE user_id = ? AND file_hash = ?")
        .bind(&owner.id)
        .bind(&file_hash)
        .fetch_optional(pool.as_ref())
        .await?;

    if let Some(existing) = duplicate {
        tracing::info!(
            "Duplicate upload rejected: hash={}, existing_id={}",
            file_hash,
            existing.id
        );
        return Err(AppError::BadRequest(
            "File already exists in your storage".to_string(),
        ));
    }

    let upload = validate_upload(original_name, claimed_mime, &data)?;
    let stored_name = format!("{}.{}.gz", random_token(), upload.extension);
    let expires_at = plan
        .default_expiry_days
        .map(|days| (Utc::now() + Duration::days(days as i64)).to_rfc3339());

    let compressed = compress(&data)?;
    blobs.write(&owner.id, &stored_name, &compressed).await?;

    let file = File::new(NewFile {
        user_id: owner.id.clone(),
        stored_name,
        original_name: upload.file_name,
        mime_type: upload.mime_type,
        file_size: size as i64,
        file_hash,
        share_token: random_token(),
        expires_at,
    });

    if let Err(e) = record_new_file(pool, &file).await {
        if let Err(cleanup) = blobs.remove(&file.user_id, &file.stored_name).await {
            tracing::warn!("Failed to remove orphaned blob {}: {}", file.stored_name, cleanup);
        }
        return Err(e);
    }

    tracing::info!(
        "File saved: id={}, name={}, size={} bytes, stored={} bytes",
        file.id,
        file.original_name,
        file.file_size,
        compressed.len()
    );

    Ok(file)
}

/// Resolve a share token to the file's original bytes.
///
/// Private files are only served to their owner. The download counter is
/// bumped with a single `UPDATE`, and a failure to do so does not fail the
/// download.
pub async fn open_shared_file(
    pool: &DbPool,
    blobs: &BlobStore,
    token: &str,
    requester_id: Option<&str>,
) -> AppResult<(File, Vec<u8>)> {
    tracing::debug!("Resolving share token");

    let file = sqlx::query_as::<_, File>("SELECT * FROM files WHERE share_token = ?")
        .bind(token)
        .fetch_optional(pool.as_ref())
        .await?
        .filter(|f| !is_expired(f, Utc::now()))
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    if !file.is_public && !requester_id.is_some_and(|id| file.is_owned_by(id)) {
        return Err(AppError::Forbidden("Unauthorized access".to_string()));
    }

    let compressed = blobs.read(&file.user_id, &file.stored_name).await?;
    let data = decompress(&compressed)?;

    let bumped = sqlx::query(
        "UPDATE files SET download_count = download_count + 1, last_downloaded_at = ? WHERE id = ?",
    )
    .bind(now_rfc3339())
    .bind(&file.id)
    .execute(pool.as_ref())
    .await;

    match bumped {
        Ok(_) => tracing::info!(
            "File downloaded: id={}, name={}, download_count={}",
            file.id,
            file.original_name,
            file.download_count + 1
        ),
        Err(e) => tracing::warn!("Failed to record download of {}: {}", file.id, e),
    }

    Ok((file, data))
}

pub async fn list_user_files(pool: &DbPool, user_id: &str) -> AppResult<Vec<File>> {
    tracing::debug!("Listing files for user: {}", user_id);

    let files = sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool.as_ref())
    .await?;

    tracing::debug!("Found {} files for user {}", files.len(), user_id);
    Ok(files)
}

pub async fn find_owned_file(pool: &DbPool, file_id: &str, user_id: &str) -> AppResult<File> {
    sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = ? AND user_id = ?")
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("File not found or access denied".to_string()))
}

pub async fn set_visibility(
    pool: &DbPool,
    file_id: &str,
    user_id: &str,
    make_public: bool,
) -> AppResult<File> {
    let result =
        sqlx::query("UPDATE files SET is_public = ?, updated_at = ? WHERE id = ? AND user_id = ?")
            .bind(make_public)
            .bind(now_rfc3339())
            .bind(file_id)
            .bind(user_id)
            .execute(pool.as_ref())
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "File not found or access denied".to_string(),
        ));
    }

    tracing::info!("File visibility changed: id={}, public={}", file_id, make_public);
    find_owned_file(pool, file_id, user_id).await
}

pub async fn regenerate_share_token(
    pool: &DbPool,
    file_id: &str,
    user_id: &str,
) -> AppResult<String> {
    let token = random_token();

    let result = sqlx::query(
        "UPDATE files SET share_token = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(&token)
    .bind(now_rfc3339())
    .bind(file_id)
    .bind(user_id)
    .execute(pool.as_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "File not found or access denied".to_string(),
        ));
    }

    tracing::info!("Share token regenerated: id={}", file_id);
    Ok(token)
}

pub async fn rename_file(
    pool: &DbPool,
    file_id: &str,
    user_id: &str,
    new_name: &str,
) -> AppResult<File> {
    let new_name = sanitize_file_name(new_name)?;

    let result = sqlx::query(
        "UPDATE files SET original_name = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(&new_name)
    .bind(now_rfc3339())
    .bind(file_id)
    .bind(user_id)
    .execute(pool.as_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "File not found or access denied".to_string(),
        ));
    }

    tracing::info!("File renamed: id={}, name={}", file_id, new_name);
    find_owned_file(pool, file_id, user_id).await
}

#[allow(clippy::too_many_arguments)]
async fn apply_content_change(
    pool: &DbPool,
    blobs: &BlobStore,
    file: &File,
    staged: &std::path::Path,
    new_size: u64,
    file_hash: &str,
    original_name: &str,
    delta: i64,
) -> AppResult<()> {
    let now = now_rfc3339();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE files SET file_size = ?, file_hash = ?, original_name = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new_size as i64)
    .bind(file_hash)
    .bind(original_name)
    .bind(&now)
    .bind(&file.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET quota_used = MAX(0, quota_used + ?), updated_at = ? WHERE id = ?")
        .bind(delta)
        .bind(&now)
        .bind(&file.user_id)
        .execute(&mut *tx)
        .await?;

    // Swap the blob only once both statements succeeded; a failed rename
    // drops the transaction and rolls the row back.
    blobs
        .promote(staged, &file.user_id, &file.stored_name)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Replace a file's content in place, keeping its id and share token.
pub async fn update_content(
    pool: &DbPool,
    blobs: &BlobStore,
    file_id: &str,
    user_id: &str,
    data: Vec<u8>,
    new_name: Option<&str>,
) -> AppResult<File> {
    let owner = load_owner(pool, user_id).await?;
    let file = find_owned_file(pool, file_id, user_id).await?;
    let plan = resolve_plan(Some(&owner));

    let new_size = data.len() as u64;
    check_upload_limit(plan, new_size)?;
    if new_size > file.size_bytes() {
        check_quota(plan, owner.quota_used_bytes(), new_size - file.size_bytes())?;
    }

    let original_name = match new_name {
        Some(name) if name != file.original_name => sanitize_file_name(name)?,
        _ => file.original_name.clone(),
    };

    // The new blob stays staged until the row and quota changes are in
    // place; any failure leaves the old blob, row and quota untouched.
    let compressed = compress(&data)?;
    let staged = blobs
        .stage(&file.user_id, &file.stored_name, &compressed)
        .await?;

    let delta = new_size as i64 - file.file_size;
    let applied = apply_content_change(
        pool,
        blobs,
        &file,
        &staged,
        new_size,
        &hash_file(&data),
        &original_name,
        delta,
    )
    .await;

    if let Err(e) = applied {
        blobs.discard(&staged).await;
        return Err(e);
    }

    tracing::info!(
        "File content updated: id={}, size={} bytes (delta {})",
        file.id,
        new_size,
        delta
    );

    find_owned_file(pool, file_id, user_id).await
}

/// Drop a file's blob (best effort), its row, and its share of the owner's quota.
pub async fn remove_file_record(pool: &DbPool, blobs: &BlobStore, file: &File) -> AppResult<()> {
    match blobs.remove(&file.user_id, &file.stored_name).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("Blob already missing for file {}", file.id),
        Err(e) => tracing::warn!("Failed to delete blob for file {}: {}", file.id, e),
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(&file.id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() > 0 {
        sqlx::query(
            "UPDATE users SET quota_used = MAX(0, quota_used - ?), updated_at = ? WHERE id = ?",
        )
        .bind(file.file_size)
        .bind(now_rfc3339())
        .bind(&file.user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn delete_file(
    pool: &DbPool,
    blobs: &BlobStore,
    file_id: &str,
    user_id: &str,
) -> AppResult<()> {
    tracing::info!("User {} deleting file {}", user_id, file_id);

    let file = find_owned_file(pool, file_id, user_id).await?;
    remove_file_record(pool, blobs, &file).await?;

    tracing::info!(
        "File deleted: id={}, name={}, owner={}",
        file.id,
        file.original_name,
        user_id
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::plans::PlanName;
    use tempfile::TempDir;

    struct Fixture {
        pool: DbPool,
        blobs: BlobStore,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let pool = crate::database::create_memory_pool().await.unwrap();
        let blobs = BlobStore::new(dir.path()).await.unwrap();
        Fixture {
            pool,
            blobs,
            _dir: dir,
        }
    }

    async fn insert_user(pool: &DbPool, email: &str, plan: PlanName) -> User {
        let mut user = User::new(email.to_string(), "hash".to_string(), false, true);
        user.plan = Some(plan.as_str().to_string());
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, plan, is_admin, is_verified, is_active, quota_used, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, 1, 1, 0, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.plan)
        .bind(&user.created_at)
        .bind(&user.updated_at)
        .execute(pool.as_ref())
        .await
        .unwrap();
        user
    }

    async fn quota_used(pool: &DbPool, user_id: &str) -> u64 {
        find_user_by_id(pool, user_id)
            .await
            .unwrap()
            .unwrap()
            .quota_used_bytes()
    }

    #[tokio::test]
    async fn test_save_and_download_round_trip() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "o@example.com", PlanName::Paid).await;
        let data = b"hello, shared world".to_vec();

        let file = save_file(
            &fx.pool,
            &fx.blobs,
            &owner.id,
            "hello.txt",
            Some("text/plain"),
            data.clone(),
        )
        .await
        .unwrap();

        assert_eq!(file.share_token.len(), 32);
        assert!(file.stored_name.ends_with(".txt.gz"));
        assert!(file.is_public);
        assert!(file.expires_at.is_none());
        assert_eq!(quota_used(&fx.pool, &owner.id).await, data.len() as u64);

        let on_disk = fx.blobs.read(&owner.id, &file.stored_name).await.unwrap();
        assert!(crate::services::compression::is_gzip(&on_disk));

        let (served, bytes) = open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None)
            .await
            .unwrap();
        assert_eq!(bytes, data);
        assert_eq!(served.id, file.id);

        let reloaded = find_owned_file(&fx.pool, &file.id, &owner.id).await.unwrap();
        assert_eq!(reloaded.download_count, 1);
        assert!(reloaded.last_downloaded_at.is_some());
    }

    #[tokio::test]
    async fn test_free_plan_files_expire() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "f@example.com", PlanName::Free).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"a".to_vec())
            .await
            .unwrap();
        let expires = DateTime::parse_from_rfc3339(file.expires_at.as_deref().unwrap()).unwrap();
        let days = (expires.with_timezone(&Utc) - Utc::now()).num_days();
        assert!((29..=30).contains(&days));
    }

    #[tokio::test]
    async fn test_expired_file_is_not_found() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "e@example.com", PlanName::Free).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"a".to_vec())
            .await
            .unwrap();

        sqlx::query("UPDATE files SET expires_at = ? WHERE id = ?")
            .bind((Utc::now() - Duration::minutes(1)).to_rfc3339())
            .bind(&file.id)
            .execute(fx.pool.as_ref())
            .await
            .unwrap();

        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, &file.share_token, Some(&owner.id)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_private_file_only_served_to_owner() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "o@example.com", PlanName::Paid).await;
        let other = insert_user(&fx.pool, "x@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "s.txt", None, b"secret".to_vec())
            .await
            .unwrap();
        set_visibility(&fx.pool, &file.id, &owner.id, false)
            .await
            .unwrap();

        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, &file.share_token, Some(&other.id)).await,
            Err(AppError::Forbidden(_))
        ));

        let (_, bytes) = open_shared_file(&fx.pool, &fx.blobs, &file.share_token, Some(&owner.id))
            .await
            .unwrap();
        assert_eq!(bytes, b"secret");

        let reloaded = find_owned_file(&fx.pool, &file.id, &owner.id).await.unwrap();
        assert_eq!(reloaded.download_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_token_not_found() {
        let fx = fixture().await;
        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, "0123456789abcdef0123456789abcdef", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_blob_is_storage_error() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "o@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.bin", None, vec![1, 2, 3])
            .await
            .unwrap();
        fx.blobs.remove(&owner.id, &file.stored_name).await.unwrap();

        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None).await,
            Err(AppError::Storage(_))
        ));
        let reloaded = find_owned_file(&fx.pool, &file.id, &owner.id).await.unwrap();
        assert_eq!(reloaded.download_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_content_rejected() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "d@example.com", PlanName::Paid).await;
        save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"same".to_vec())
            .await
            .unwrap();
        let err = save_file(&fx.pool, &fx.blobs, &owner.id, "b.txt", None, b"same".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("already exists")));
    }

    #[tokio::test]
    async fn test_quota_exceeded_rejected() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "q@example.com", PlanName::Free).await;
        sqlx::query("UPDATE users SET quota_used = ? WHERE id = ?")
            .bind(2 * 1024 * 1024 * 1024_i64 - 2)
            .bind(&owner.id)
            .execute(fx.pool.as_ref())
            .await
            .unwrap();

        let err = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"abc".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.starts_with("Quota exceeded")));

        save_file(&fx.pool, &fx.blobs, &owner.id, "b.txt", None, b"ab".to_vec())
            .await
            .unwrap();
    }

    #[test]
    fn test_upload_limit_check() {
        let free = crate::services::plans::plan_config(PlanName::Free);
        assert!(check_upload_limit(free, 200 * 1024 * 1024).is_ok());
        let err = check_upload_limit(free, 200 * 1024 * 1024 + 1).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Upload limit is 200MB for your plan."));

        let enterprise = crate::services::plans::plan_config(PlanName::Enterprise);
        assert!(check_upload_limit(enterprise, u64::MAX).is_ok());
        assert!(check_quota(enterprise, u64::MAX, u64::MAX).is_ok());
    }

    #[tokio::test]
    async fn test_regenerate_token_invalidates_old() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "r@example.com", PlanName::Paid).await;
        let other = insert_user(&fx.pool, "x@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"a".to_vec())
            .await
            .unwrap();

        let token = regenerate_share_token(&fx.pool, &file.id, &owner.id)
            .await
            .unwrap();
        assert_eq!(token.len(), 32);
        assert_ne!(token, file.share_token);

        assert!(matches!(
            open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(
            open_shared_file(&fx.pool, &fx.blobs, &token, None)
                .await
                .is_ok()
        );

        assert!(matches!(
            regenerate_share_token(&fx.pool, &file.id, &other.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_and_update_content() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "u@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "notes.txt", None, b"v1".to_vec())
            .await
            .unwrap();

        let renamed = rename_file(&fx.pool, &file.id, &owner.id, "../plans.txt")
            .await
            .unwrap();
        assert_eq!(renamed.original_name, "plans.txt");

        let updated = update_content(
            &fx.pool,
            &fx.blobs,
            &file.id,
            &owner.id,
            b"version two".to_vec(),
            Some("final.txt"),
        )
        .await
        .unwrap();
        assert_eq!(updated.file_size, 11);
        assert_eq!(updated.original_name, "final.txt");
        assert_eq!(updated.share_token, file.share_token);
        assert_eq!(quota_used(&fx.pool, &owner.id).await, 11);

        let (_, bytes) = open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None)
            .await
            .unwrap();
        assert_eq!(bytes, b"version two");

        update_content(&fx.pool, &fx.blobs, &file.id, &owner.id, Vec::new(), None)
            .await
            .unwrap();
        assert_eq!(quota_used(&fx.pool, &owner.id).await, 0);
    }

    #[tokio::test]
    async fn test_delete_refunds_quota_and_removes_blob() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "del@example.com", PlanName::Paid).await;
        let other = insert_user(&fx.pool, "x@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, vec![9; 100])
            .await
            .unwrap();

        assert!(matches!(
            delete_file(&fx.pool, &fx.blobs, &file.id, &other.id).await,
            Err(AppError::NotFound(_))
        ));

        delete_file(&fx.pool, &fx.blobs, &file.id, &owner.id)
            .await
            .unwrap();
        assert_eq!(quota_used(&fx.pool, &owner.id).await, 0);
        assert!(list_user_files(&fx.pool, &owner.id).await.unwrap().is_empty());
        assert!(fx.blobs.read(&owner.id, &file.stored_name).await.is_err());
    }

    async fn block_quota_updates(pool: &DbPool) {
        sqlx::query(
            "CREATE TRIGGER block_quota BEFORE UPDATE OF quota_used ON users
             BEGIN SELECT RAISE(ABORT, 'quota locked'); END",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();
    }

    fn blob_names(blobs: &BlobStore, user_id: &str) -> Vec<String> {
        match std::fs::read_dir(blobs.files_dir().join(user_id)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_failed_quota_charge_leaves_no_file() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "q@example.com", PlanName::Paid).await;
        block_quota_updates(&fx.pool).await;

        let result = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"hello".to_vec()).await;
        assert!(matches!(result, Err(AppError::Database(_))));

        assert!(list_user_files(&fx.pool, &owner.id).await.unwrap().is_empty());
        assert_eq!(quota_used(&fx.pool, &owner.id).await, 0);
        assert!(blob_names(&fx.blobs, &owner.id).is_empty());
    }

    #[tokio::test]
    async fn test_failed_content_update_keeps_previous_version() {
        let fx = fixture().await;
        let owner = insert_user(&fx.pool, "r@example.com", PlanName::Paid).await;
        let file = save_file(&fx.pool, &fx.blobs, &owner.id, "a.txt", None, b"v1".to_vec())
            .await
            .unwrap();
        block_quota_updates(&fx.pool).await;

        let result = update_content(
            &fx.pool,
            &fx.blobs,
            &file.id,
            &owner.id,
            b"a much longer second draft".to_vec(),
            Some("b.txt"),
        )
        .await;
        assert!(matches!(result, Err(AppError::Database(_))));

        let row = find_owned_file(&fx.pool, &file.id, &owner.id).await.unwrap();
        assert_eq!(row.file_size, 2);
        assert_eq!(row.file_hash, file.file_hash);
        assert_eq!(row.original_name, "a.txt");
        assert_eq!(quota_used(&fx.pool, &owner.id).await, 2);

        let (_, bytes) = open_shared_file(&fx.pool, &fx.blobs, &file.share_token, None)
            .await
            .unwrap();
        assert_eq!(bytes, b"v1");
        assert_eq!(blob_names(&fx.blobs, &owner.id), vec![file.stored_name.clone()]);
    }
}
