use axum::{extract::Request, middleware::Next, response::Response};

use crate::middleware::auth::CurrentUser;
use crate::utils::error::AppError;

/// Must run inside [`crate::middleware::auth::auth_middleware`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    if !user.is_admin {
        tracing::debug!("Non-admin {} denied admin route", user.id);
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}
