use axum::Json;
use serde::Serialize;

use crate::utils::error::{AppError, AppResult};

pub fn to_json<T: Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))
}

pub fn json_response<T: Serialize>(value: &T) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(to_json(value)?))
}

pub fn success() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Formats a byte count as gigabytes with two decimals, the way quota
/// messages present remaining space.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

pub fn format_mb(bytes: u64) -> String {
    format!("{:.0}", bytes as f64 / (1024.0 * 1024.0))
}
