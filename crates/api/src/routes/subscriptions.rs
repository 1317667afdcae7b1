use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use nimbus_core::types::{NewSubscription, Subscription};
use nimbus_db::queries::subscriptions;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::UserContext,
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/subscriptions", get(list_subscriptions).post(add_subscription))
        .route("/v1/subscriptions/{id}/toggle", post(toggle_subscription))
        .route("/v1/subscriptions/{id}", delete(remove_subscription))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSubscriptionRequest {
    url: String,
    name: String,
    #[serde(default)]
    zone: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListResponse {
    items: Vec<Subscription>,
    active: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSubscriptionResponse {
    id: String,
    status: &'static str,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> ApiResult<Json<SubscriptionListResponse>> {
    user.require_admin()?;
    let items = subscriptions::list(state.store.as_ref()).await?;
    let active = items.iter().filter(|item| item.active).count();
    Ok(Json(SubscriptionListResponse { items, active }))
}

pub async fn add_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Json(payload): Json<AddSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    user.require_admin()?;

    let url = payload.url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ApiError::BadRequest("url must be an http(s) feed url".to_string()));
    }
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let zone = payload
        .zone
        .map(|zone| zone.trim().to_ascii_uppercase())
        .filter(|zone| !zone.is_empty());

    let new = NewSubscription {
        url: url.to_string(),
        zone,
        name: name.to_string(),
        added_by: user.user_id.clone(),
    };
    let subscription = subscriptions::create(state.store.as_ref(), new, Utc::now()).await?;
    tracing::info!(subscription_id = %subscription.id, added_by = %user.user_id, "feed subscription added");
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn toggle_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    user.require_admin()?;
    let subscription = subscriptions::toggle(state.store.as_ref(), &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("subscription not found".to_string()))?;
    tracing::info!(subscription_id = %id, active = subscription.active, "feed subscription toggled");
    Ok(Json(subscription))
}

pub async fn remove_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<RemoveSubscriptionResponse>> {
    user.require_admin()?;
    if !subscriptions::remove(state.store.as_ref(), &id).await? {
        return Err(ApiError::NotFound("subscription not found".to_string()));
    }
    tracing::info!(subscription_id = %id, "feed subscription removed");
    Ok(Json(RemoveSubscriptionResponse {
        id,
        status: "removed",
    }))
}
