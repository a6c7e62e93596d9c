use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::config::AppConfig;
use crate::database::DbPool;
use crate::models::user::{User, UserResponse};
use crate::services::plans::{PlanConfig, resolve_plan};
use crate::services::settings::load_settings;
use crate::utils::crypto::{hash_password, random_token, verify_password};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::now_rfc3339;
use crate::utils::jwt::JwtService;
use crate::utils::validation::{validate_email, validate_password};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub verification_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub plan: &'static PlanConfig,
    pub quota_used: u64,
    /// `None` when the plan has no quota
    pub quota_remaining: Option<u64>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn find_user_by_id(pool: &DbPool, user_id: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool.as_ref())
        .await?;
    Ok(user)
}

pub async fn find_user_by_email(pool: &DbPool, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER(?)")
        .bind(email.trim())
        .fetch_optional(pool.as_ref())
        .await?;
    Ok(user)
}

pub async fn register_user(
    pool: &DbPool,
    config: &AppConfig,
    request: RegisterRequest,
) -> AppResult<RegisterResponse> {
    let settings = load_settings(pool).await?;
    if !settings.registration_open {
        return Err(AppError::Forbidden(
            "Registration is currently closed".to_string(),
        ));
    }

    let email = normalize_email(&request.email);
    validate_email(&email)?;
    validate_password(&request.password)?;

    if find_user_by_email(pool, &email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".to_string()));
    }

    let total_users = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool.as_ref())
        .await?
        .get::<i64, _>("count");

    let is_admin = total_users == 0 || config.admin_email.as_deref() == Some(email.as_str());
    let password_hash = hash_password(&request.password)?;

    let mut user = User::new(email, password_hash, is_admin, settings.auth_auto_verify);
    if !user.is_verified {
        user.verification_token = Some(random_token());
    }

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, plan, subscription_type, is_admin, is_verified, is_active, banned_at, quota_used, verification_token, created_at, updated_at, last_login)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.plan)
    .bind(&user.subscription_type)
    .bind(user.is_admin)
    .bind(user.is_verified)
    .bind(user.is_active)
    .bind(&user.banned_at)
    .bind(user.quota_used)
    .bind(&user.verification_token)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .bind(&user.last_login)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(
        "User registered: id={}, email={}, admin={}",
        user.id,
        user.email,
        user.is_admin
    );

    if let Some(token) = &user.verification_token {
        // Mail delivery is handled outside this service; the link is logged
        // so an operator can forward it.
        tracing::info!(
            "Verification link for {}: {}/api/auth/verify?token={}",
            user.email,
            settings.site_url,
            token
        );
    }

    let verification_required = !user.is_verified;
    Ok(RegisterResponse {
        user: UserResponse::from(user),
        verification_required,
    })
}

pub async fn verify_email(pool: &DbPool, token: &str) -> AppResult<UserResponse> {
    if token.is_empty() {
        return Err(AppError::BadRequest("Missing verification token".to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE verification_token = ?")
        .bind(token)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Verification link is invalid or used".to_string()))?;

    sqlx::query(
        "UPDATE users SET is_verified = 1, verification_token = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(now_rfc3339())
    .bind(&user.id)
    .execute(pool.as_ref())
    .await?;

    tracing::info!("Email verified: id={}, email={}", user.id, user.email);

    let user = find_user_by_id(pool, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(UserResponse::from(user))
}

pub async fn login_user(
    pool: &DbPool,
    request: LoginRequest,
    jwt_service: &JwtService,
) -> AppResult<LoginResponse> {
    let user = match find_user_by_email(pool, &request.email).await? {
        Some(u) => u,
        None => {
            tracing::debug!("Login for unknown email {}", request.email);
            return Err(AppError::Auth("Invalid credentials".to_string()));
        }
    };

    if !verify_password(&request.password, &user.password_hash)? {
        tracing::debug!("Invalid password for user {}", user.id);
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    if !user.is_active || user.is_banned() {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    if !user.is_verified {
        return Err(AppError::Forbidden(
            "Email address has not been verified".to_string(),
        ));
    }

    let now = now_rfc3339();
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(&now)
        .bind(&user.id)
        .execute(pool.as_ref())
        .await?;

    let token = jwt_service.generate_token(&user.id, &user.email)?;

    tracing::info!("User logged in: id={}", user.id);

    let mut user = user;
    user.last_login = Some(now);
    Ok(LoginResponse {
        user: UserResponse::from(user),
        token,
    })
}

pub async fn profile(pool: &DbPool, user_id: &str) -> AppResult<ProfileResponse> {
    let user = find_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let plan = resolve_plan(Some(&user));
    let quota_used = user.quota_used_bytes();

    Ok(ProfileResponse {
        quota_remaining: plan.quota.remaining(quota_used),
        quota_used,
        plan,
        user: UserResponse::from(user),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config() -> AppConfig {
        AppConfig::with_storage("unit-test-secret-key", std::env::temp_dir())
    }

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "password123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_is_admin_and_needs_verification() {
        let pool = crate::database::create_memory_pool().await.unwrap();

        let first = register_user(&pool, &config(), register("First@Example.com"))
            .await
            .unwrap();
        assert!(first.user.is_admin);
        assert!(first.verification_required);
        assert_eq!(first.user.email, "first@example.com");
        assert_eq!(first.user.plan, "free");

        let second = register_user(&pool, &config(), register("second@example.com"))
            .await
            .unwrap();
        assert!(!second.user.is_admin);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_case_insensitively() {
        let pool = crate::database::create_memory_pool().await.unwrap();
        register_user(&pool, &config(), register("a@example.com"))
            .await
            .unwrap();
        let err = register_user(&pool, &config(), register("A@EXAMPLE.COM"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_configured_admin_email() {
        let pool = crate::database::create_memory_pool().await.unwrap();
        let mut config = config();
        config.admin_email = Some("boss@example.com".to_string());

        register_user(&pool, &config, register("first@example.com"))
            .await
            .unwrap();
        let boss = register_user(&pool, &config, register("boss@example.com"))
            .await
            .unwrap();
        assert!(boss.user.is_admin);
    }

    #[tokio::test]
    async fn test_verification_then_login() {
        let pool = crate::database::create_memory_pool().await.unwrap();
        let jwt = JwtService::new("unit-test-secret-key", 1);
        let response = register_user(&pool, &config(), register("v@example.com"))
            .await
            .unwrap();

        let login = LoginRequest {
            email: "v@example.com".to_string(),
            password: "password123".to_string(),
        };
        assert!(matches!(
            login_user(&pool, login, &jwt).await,
            Err(AppError::Forbidden(_))
        ));

        let token: String = sqlx::query("SELECT verification_token FROM users WHERE id = ?")
            .bind(&response.user.id)
            .fetch_one(pool.as_ref())
            .await
            .unwrap()
            .get("verification_token");
        let verified = verify_email(&pool, &token).await.unwrap();
        assert!(verified.is_verified);
        assert!(verify_email(&pool, &token).await.is_err());

        let login = LoginRequest {
            email: "V@example.com".to_string(),
            password: "password123".to_string(),
        };
        let session = login_user(&pool, login, &jwt).await.unwrap();
        assert_eq!(jwt.extract_user_id(&session.token).unwrap(), response.user.id);
        assert!(session.user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_error() {
        let pool = crate::database::create_memory_pool().await.unwrap();
        let jwt = JwtService::new("unit-test-secret-key", 1);
        register_user(&pool, &config(), register("w@example.com"))
            .await
            .unwrap();

        let login = LoginRequest {
            email: "w@example.com".to_string(),
            password: "not the password".to_string(),
        };
        assert!(matches!(
            login_user(&pool, login, &jwt).await,
            Err(AppError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_verify_and_closed_registration() {
        let pool = crate::database::create_memory_pool().await.unwrap();

        let mut updates = BTreeMap::new();
        updates.insert("auth_auto_verify".to_string(), "true".to_string());
        crate::services::settings::update_settings(&pool, &updates)
            .await
            .unwrap();
        let response = register_user(&pool, &config(), register("auto@example.com"))
            .await
            .unwrap();
        assert!(!response.verification_required);
        assert!(response.user.is_verified);

        let mut updates = BTreeMap::new();
        updates.insert("registration_open".to_string(), "false".to_string());
        crate::services::settings::update_settings(&pool, &updates)
            .await
            .unwrap();
        assert!(matches!(
            register_user(&pool, &config(), register("late@example.com")).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_reports_plan_and_remaining_quota() {
        let pool = crate::database::create_memory_pool().await.unwrap();
        let response = register_user(&pool, &config(), register("p@example.com"))
            .await
            .unwrap();

        sqlx::query("UPDATE users SET quota_used = ? WHERE id = ?")
            .bind(1024_i64)
            .bind(&response.user.id)
            .execute(pool.as_ref())
            .await
            .unwrap();

        let profile = profile(&pool, &response.user.id).await.unwrap();
        assert_eq!(profile.quota_used, 1024);
        assert_eq!(
            profile.quota_remaining,
            Some(2 * 1024 * 1024 * 1024 - 1024)
        );
    }
}
