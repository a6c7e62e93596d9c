use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::database::DbPool;
use crate::models::user::{User, UserResponse};
use crate::services::auth::find_user_by_id;
use crate::services::plans::PlanName;
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::now_rfc3339;

const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    ToggleActive,
    ToggleAdmin,
    ResetQuota,
    Ban,
    Unban,
    SetPlan { plan: PlanName },
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserResponse>,
    pub total: i64,
}

pub async fn list_users(
    pool: &DbPool,
    limit: Option<i64>,
    offset: Option<i64>,
    search: Option<&str>,
) -> AppResult<UserPage> {
    let limit = limit.unwrap_or(50).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    let search_pattern = format!("%{}%", search.unwrap_or_default());

    let total = sqlx::query("SELECT COUNT(*) as count FROM users WHERE email LIKE ?")
        .bind(&search_pattern)
        .fetch_one(pool.as_ref())
        .await?
        .get::<i64, _>("count");

    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE email LIKE ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(&search_pattern)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(UserPage {
        users: users.into_iter().map(UserResponse::from).collect(),
        total,
    })
}

pub async fn apply_user_action(
    pool: &DbPool,
    requester_id: &str,
    target_id: &str,
    action: UserAction,
) -> AppResult<UserResponse> {
    let target = find_user_by_id(pool, target_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let is_self = target.id == requester_id;
    let now = now_rfc3339();

    let query = match &action {
        UserAction::ToggleActive => {
            if is_self {
                return Err(AppError::BadRequest(
                    "Cannot deactivate yourself".to_string(),
                ));
            }
            sqlx::query("UPDATE users SET is_active = NOT is_active, updated_at = ? WHERE id = ?")
        }
        UserAction::ToggleAdmin => {
            if is_self {
                return Err(AppError::BadRequest(
                    "Cannot change your own admin status".to_string(),
                ));
            }
            sqlx::query("UPDATE users SET is_admin = NOT is_admin, updated_at = ? WHERE id = ?")
        }
        UserAction::ResetQuota => {
            sqlx::query("UPDATE users SET quota_used = 0, updated_at = ? WHERE id = ?")
        }
        UserAction::Ban => {
            if is_self {
                return Err(AppError::BadRequest("Cannot ban yourself".to_string()));
            }
            sqlx::query(
                "UPDATE users SET is_active = 0, banned_at = ?1, updated_at = ?1 WHERE id = ?2",
            )
        }
        UserAction::Unban => sqlx::query(
            "UPDATE users SET is_active = 1, banned_at = NULL, updated_at = ? WHERE id = ?",
        ),
        UserAction::SetPlan { plan } => {
            sqlx::query("UPDATE users SET plan = ?, updated_at = ? WHERE id = ?")
                .bind(plan.as_str())
        }
    };

    query
        .bind(&now)
        .bind(&target.id)
        .execute(pool.as_ref())
        .await?;

    tracing::info!(
        "Admin {} applied {:?} to user {}",
        requester_id,
        action,
        target.id
    );

    let updated = find_user_by_id(pool, &target.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(UserResponse::from(updated))
}
