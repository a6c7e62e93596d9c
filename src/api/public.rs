use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::api::AppState;
use crate::services::plans::{PLANS, PlanConfig};
use crate::services::settings::load_settings;
use crate::utils::error::AppResult;

#[derive(Serialize)]
struct SiteInfo {
    brand_name: String,
    site_url: String,
    support_email: String,
    monthly_price_usd: String,
    registration_open: bool,
    plans: &'static [PlanConfig],
}

async fn site_info(State(state): State<Arc<AppState>>) -> AppResult<Json<SiteInfo>> {
    let settings = load_settings(&state.db).await?;

    Ok(Json(SiteInfo {
        brand_name: settings.brand_name,
        site_url: settings.site_url,
        support_email: settings.support_email,
        monthly_price_usd: settings.monthly_price_usd,
        registration_open: settings.registration_open,
        plans: &PLANS,
    }))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/public/site", get(site_info))
        .with_state(state)
}
