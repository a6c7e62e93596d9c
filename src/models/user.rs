use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::helpers::now_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub plan: Option<String>,
    /// Plan column of older rows; consulted when `plan` is empty.
    pub subscription_type: Option<String>,
    pub is_admin: bool,
    pub is_verified: bool,
    pub is_active: bool,
    pub banned_at: Option<String>,
    pub quota_used: i64,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_login: Option<String>,
}

impl User {
    pub fn new(email: String, password_hash: String, is_admin: bool, verified: bool) -> Self {
        let now = now_rfc3339();

        Self {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            plan: Some("free".to_string()),
            subscription_type: None,
            is_admin,
            is_verified: verified,
            is_active: true,
            banned_at: None,
            quota_used: 0,
            verification_token: None,
            created_at: now.clone(),
            updated_at: now,
            last_login: None,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.banned_at.is_some()
    }

    pub fn quota_used_bytes(&self) -> u64 {
        self.quota_used.max(0) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub plan: String,
    pub is_admin: bool,
    pub is_verified: bool,
    pub is_active: bool,
    pub banned_at: Option<String>,
    pub quota_used: i64,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let plan = crate::services::plans::resolve_plan(Some(&user))
            .name
            .as_str()
            .to_string();

        Self {
            id: user.id,
            email: user.email,
            plan,
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            is_active: user.is_active,
            banned_at: user.banned_at,
            quota_used: user.quota_used,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}
