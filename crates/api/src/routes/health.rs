use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use nimbus_weather::cache::CacheStats;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    env: String,
    forecast_cache: CacheStats,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let forecast_cache = state.forecasts.cache().stats_at(Utc::now()).await;
    Json(HealthResponse {
        status: "ok",
        env: state.nimbus_env.clone(),
        forecast_cache,
    })
}
