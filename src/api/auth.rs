use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::database::DbPool;
use crate::middleware::auth::{CurrentUser, SESSION_COOKIE};
use crate::services::auth::{
    LoginRequest, RegisterRequest, login_user, profile, register_user, verify_email,
};
use crate::services::blob_store::BlobStore;
use crate::utils::error::AppResult;
use crate::utils::helpers::{json_response, success};
use crate::utils::jwt::JwtService;

pub struct AppState {
    pub db: DbPool,
    pub jwt_service: Arc<JwtService>,
    pub blobs: Arc<BlobStore>,
    pub config: Arc<AppConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(db: DbPool, config: AppConfig) -> anyhow::Result<Self> {
        let jwt_service = Arc::new(JwtService::new(
            &config.secret_key,
            config.session_ttl_hours,
        ));
        let blobs = Arc::new(BlobStore::new(&config.storage_dir).await?);

        Ok(Self {
            db,
            jwt_service,
            blobs,
            config: Arc::new(config),
            started_at: Instant::now(),
        })
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let response = register_user(&state.db, &state.config, payload).await?;
    json_response(&response)
}

#[derive(Deserialize)]
struct VerifyQuery {
    #[serde(default)]
    token: String,
}

async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let user = verify_email(&state.db, &query.token).await?;
    Ok(Json(serde_json::json!({ "success": true, "user": user })))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<serde_json::Value>)> {
    let response = login_user(&state.db, payload, &state.jwt_service).await?;

    let session = Cookie::build((SESSION_COOKIE, response.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .max_age(cookie::time::Duration::seconds(
            state.jwt_service.ttl_seconds(),
        ));

    Ok((jar.add(session), json_response(&response)?))
}

/// Always answers with an expired session cookie, whether or not the
/// request carried one.
async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    (jar.add(cookie), success())
}

async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<serde_json::Value>> {
    let response = profile(&state.db, &user.id).await?;
    json_response(&response)
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify", get(verify))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .with_state(state)
}

pub fn protected_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/me", get(me))
        .with_state(state)
}
