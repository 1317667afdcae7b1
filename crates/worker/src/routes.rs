use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use nimbus_core::health::{evaluate, PollSnapshot};
use serde::Serialize;

use crate::WorkerState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: i64,
    poll: PollSnapshot,
    reasons: Vec<String>,
}

pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<WorkerState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let snapshot = state.poll_state.snapshot();
    let reasons: Vec<String> = evaluate(&snapshot, &state.thresholds, now)
        .iter()
        .map(ToString::to_string)
        .collect();

    Json(HealthResponse {
        status: if reasons.is_empty() { "ok" } else { "degraded" },
        uptime_secs: (now - snapshot.started_at).num_seconds(),
        poll: snapshot,
        reasons,
    })
}
