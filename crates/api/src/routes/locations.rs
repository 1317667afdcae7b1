use axum::{
    extract::{Path, State},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::Utc;
use nimbus_core::types::SavedLocation;
use nimbus_db::queries::saved_locations;
use nimbus_weather::models::SevenDayForecast;
use nimbus_weather::Forecasted;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    middleware::auth::UserContext,
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/locations", get(list_locations))
        .route(
            "/v1/locations/{nickname}",
            put(save_location).delete(remove_location),
        )
        .route("/v1/locations/{nickname}/forecast", get(saved_forecast))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SaveLocationRequest {
    location: String,
}

#[derive(Debug, Serialize)]
pub struct LocationListResponse {
    items: Vec<SavedLocation>,
}

#[derive(Debug, Serialize)]
pub struct RemoveLocationResponse {
    nickname: String,
    status: &'static str,
}

pub async fn list_locations(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
) -> ApiResult<Json<LocationListResponse>> {
    let items = saved_locations::list_for_user(state.store.as_ref(), &user.user_id).await?;
    Ok(Json(LocationListResponse { items }))
}

/// Resolves the location first so only places the forecast service can
/// answer for are saved.
pub async fn save_location(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(nickname): Path<String>,
    Json(payload): Json<SaveLocationRequest>,
) -> ApiResult<Json<SavedLocation>> {
    let resolved = state.forecasts.resolve(&payload.location).await?;
    let saved = saved_locations::save(
        state.store.as_ref(),
        &user.user_id,
        &nickname,
        &resolved,
        Utc::now(),
    )
    .await?;
    Ok(Json(saved))
}

pub async fn remove_location(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(nickname): Path<String>,
) -> ApiResult<Json<RemoveLocationResponse>> {
    if !saved_locations::remove(state.store.as_ref(), &user.user_id, &nickname).await? {
        return Err(ApiError::NotFound(format!("no saved location named {}", nickname)));
    }
    Ok(Json(RemoveLocationResponse {
        nickname,
        status: "removed",
    }))
}

pub async fn saved_forecast(
    State(state): State<AppState>,
    Extension(user): Extension<UserContext>,
    Path(nickname): Path<String>,
) -> ApiResult<Json<Forecasted<SevenDayForecast>>> {
    let saved = saved_locations::find(state.store.as_ref(), &user.user_id, &nickname)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no saved location named {}", nickname)))?;
    let forecast = state.forecasts.seven_day_for(saved.to_resolved()).await?;
    Ok(Json(forecast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{test_state, user, StubWeather};
    use std::sync::Arc;

    fn body(location: &str) -> Json<SaveLocationRequest> {
        Json(SaveLocationRequest {
            location: location.to_string(),
        })
    }

    #[tokio::test]
    async fn test_save_list_and_forecast() {
        let state = test_state(Arc::new(StubWeather::default()));

        let Json(saved) = save_location(
            State(state.clone()),
            Extension(user("U1")),
            Path("Home".to_string()),
            body("07430"),
        )
        .await
        .unwrap();
        assert_eq!(saved.nickname, "Home");
        assert_eq!(saved.formatted_address, "Mahwah, Bergen County, New Jersey");

        let Json(listed) = list_locations(State(state.clone()), Extension(user("U1")))
            .await
            .unwrap();
        assert_eq!(listed.items.len(), 1);

        let Json(others) = list_locations(State(state.clone()), Extension(user("U2")))
            .await
            .unwrap();
        assert!(others.items.is_empty());

        let Json(forecast) = saved_forecast(State(state), Extension(user("U1")), Path("home".to_string()))
            .await
            .unwrap();
        assert_eq!(forecast.location.latitude, 41.0887);
        assert_eq!(forecast.data.forecast.periods.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_location_is_not_saved() {
        let state = test_state(Arc::new(StubWeather::default()));
        let err = save_location(
            State(state.clone()),
            Extension(user("U1")),
            Path("Work".to_string()),
            body("99999"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let Json(listed) = list_locations(State(state), Extension(user("U1")))
            .await
            .unwrap();
        assert!(listed.items.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_missing_nickname() {
        let state = test_state(Arc::new(StubWeather::default()));
        save_location(
            State(state.clone()),
            Extension(user("U1")),
            Path("Cabin".to_string()),
            body("44.26,-72.58"),
        )
        .await
        .unwrap();

        let Json(removed) = remove_location(State(state.clone()), Extension(user("U1")), Path("CABIN".to_string()))
            .await
            .unwrap();
        assert_eq!(removed.status, "removed");

        let err = remove_location(State(state.clone()), Extension(user("U1")), Path("cabin".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = saved_forecast(State(state), Extension(user("U1")), Path("cabin".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
