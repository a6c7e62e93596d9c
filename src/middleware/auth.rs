use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::api::AppState;
use crate::services::auth::find_user_by_id;
use crate::utils::error::{AppError, AppResult};

pub const SESSION_COOKIE: &str = "yf_session";

/// The authenticated caller, placed in request extensions by the auth
/// middlewares.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
}

/// Session token from `Authorization: Bearer` or, failing that, the
/// session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

async fn resolve_user(state: &AppState, token: &str) -> AppResult<CurrentUser> {
    let user_id = state.jwt_service.extract_user_id(token)?;

    // Banned or deactivated accounts lose access even with a live token.
    let user = find_user_by_id(&state.db, &user_id)
        .await?
        .ok_or_else(|| AppError::Auth("User no longer exists".to_string()))?;

    if !user.is_active || user.is_banned() {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        is_admin: user.is_admin,
    })
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    let user = resolve_user(&state, &token).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Attaches the caller when a valid session is presented and lets the
/// request through anonymously otherwise.
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_token(request.headers()) {
        match resolve_user(&state, &token).await {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(AppError::Database(e)) => return Err(AppError::Database(e)),
            Err(e) => tracing::debug!("Ignoring unusable session: {}", e),
        }
    }

    Ok(next.run(request).await)
}
