use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use nimbus_weather::models::{ActiveAlerts, CurrentConditions, HourlyOutlook, SevenDayForecast};
use nimbus_weather::Forecasted;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/forecast", get(seven_day))
        .route("/v1/forecast/hourly", get(hourly))
        .route("/v1/conditions", get(current_conditions))
        .route("/v1/alerts", get(active_alerts))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationParams {
    location: Option<String>,
    hours: Option<u32>,
}

impl LocationParams {
    fn location(&self) -> ApiResult<&str> {
        match self.location.as_deref().map(str::trim) {
            Some(location) if !location.is_empty() => Ok(location),
            _ => Err(ApiError::BadRequest(
                "location query parameter is required".to_string(),
            )),
        }
    }
}

pub async fn seven_day(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Forecasted<SevenDayForecast>>> {
    let forecast = state.forecasts.seven_day(params.location()?).await?;
    Ok(Json(forecast))
}

pub async fn hourly(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Forecasted<HourlyOutlook>>> {
    let outlook = state
        .forecasts
        .hourly(params.location()?, params.hours)
        .await?;
    Ok(Json(outlook))
}

pub async fn current_conditions(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Forecasted<CurrentConditions>>> {
    let conditions = state
        .forecasts
        .current_conditions(params.location()?)
        .await?;
    Ok(Json(conditions))
}

pub async fn active_alerts(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> ApiResult<Json<Forecasted<ActiveAlerts>>> {
    let alerts = state.forecasts.active_alerts(params.location()?).await?;
    Ok(Json(alerts))
}
