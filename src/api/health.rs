use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::api::AppState;
use crate::database;
use crate::utils::helpers::now_rfc3339;

#[derive(Serialize)]
struct DatabaseHealth {
    status: &'static str,
    latency_ms: Option<u128>,
}

#[derive(Serialize)]
struct StorageHealth {
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    uptime_seconds: u64,
    version: &'static str,
    database: DatabaseHealth,
    storage: StorageHealth,
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let started = Instant::now();
    let database = match database::ping(&state.db).await {
        Ok(()) => DatabaseHealth {
            status: "ok",
            latency_ms: Some(started.elapsed().as_millis()),
        },
        Err(e) => {
            tracing::error!("Health check database ping failed: {}", e);
            DatabaseHealth {
                status: "unavailable",
                latency_ms: None,
            }
        }
    };

    let storage_ok = state.blobs.is_available().await;
    if !storage_ok {
        tracing::error!(
            "Health check storage unavailable: {}",
            state.blobs.files_dir().display()
        );
    }

    let healthy = database.status == "ok" && storage_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: now_rfc3339(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        database,
        storage: StorageHealth {
            status: if storage_ok { "ok" } else { "unavailable" },
        },
    };

    (status, Json(body))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}
