pub mod admin;
pub mod auth;
pub mod files;
pub mod health;
pub mod public;

use axum::Router;
use std::sync::Arc;

pub use auth::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    // Downloads work anonymously but still see the caller when a session
    // is presented, so owners can fetch their private files.
    let download_routes = files::public_routes(state.clone()).route_layer(
        axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::optional_auth_middleware,
        ),
    );

    let protected_routes = Router::new()
        .merge(auth::protected_routes(state.clone()))
        .merge(files::routes(state.clone()))
        .merge(admin::routes(state.clone()))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(auth::routes(state.clone()))
        .merge(public::routes(state.clone()))
        .merge(health::routes(state))
        .merge(download_routes)
        .merge(protected_routes)
}
