use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::AppState;
use crate::middleware::auth::CurrentUser;
use crate::services::settings::{load_settings, setting_value_to_string, update_settings};
use crate::services::user_admin::{UserAction, apply_user_action, list_users};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::json_response;

#[derive(Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
    q: Option<String>,
}

async fn get_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<serde_json::Value>> {
    let page = list_users(&state.db, params.limit, params.offset, params.q.as_deref()).await?;
    json_response(&page)
}

/// Body is `{ "userId": ..., "action": ..., ... }`; the action fields are
/// parsed separately so an unknown action is a 400, not a 422.
async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentUser>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = body
        .get("userId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("userId is required".to_string()))?
        .to_string();

    let action: UserAction = serde_json::from_value(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid action: {}", e)))?;

    let user = apply_user_action(&state.db, &admin.id, &user_id, action).await?;
    Ok(Json(serde_json::json!({ "success": true, "user": user })))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let settings = load_settings(&state.db).await?;
    json_response(&settings)
}

async fn save_settings(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<CurrentUser>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<Json<serde_json::Value>> {
    let updates: BTreeMap<String, String> = body
        .iter()
        .map(|(k, v)| (k.clone(), setting_value_to_string(v)))
        .collect();

    let settings = update_settings(&state.db, &updates).await?;
    tracing::info!("Settings saved by admin {}", admin.email);
    json_response(&settings)
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/admin/users", get(get_users).patch(update_user))
        .route("/admin/settings", get(get_settings).post(save_settings))
        .route_layer(axum::middleware::from_fn(
            crate::middleware::admin::require_admin,
        ))
        .with_state(state)
}
