use axum::{Router, extract::DefaultBodyLimit, http::Method};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::config::AppConfig;
use crate::database;

pub async fn build_state(config: AppConfig) -> anyhow::Result<Arc<AppState>> {
    let db = database::create_pool(&config.database_url).await?;
    tracing::info!("Database connected and migrations applied");

    let state = AppState::new(db, config).await?;
    tracing::info!(
        "Blob store ready at {}",
        state.blobs.files_dir().display()
    );

    Ok(Arc::new(state))
}

/// API under `/api`, everything else served from the public directory.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let public_dir = ServeDir::new(&state.config.public_dir);
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .nest("/api", crate::api::routes(state))
        .fallback_service(public_dir)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn register_routes(config: AppConfig) -> anyhow::Result<Router> {
    let state = build_state(config).await?;

    crate::tasks::cleanup::start_cleanup_task(
        state.db.clone(),
        state.blobs.clone(),
        Duration::from_secs(state.config.cleanup_interval_secs.max(1)),
    );
    tracing::info!(
        "File cleanup task started (every {}s)",
        state.config.cleanup_interval_secs
    );

    Ok(build_router(state))
}
