pub mod forecast;
pub mod health;
pub mod locations;
pub mod subscriptions;

use axum::Router;

use crate::state::AppState;

pub fn v1_router(state: AppState) -> Router {
    Router::new()
        .merge(forecast::router(state.clone()))
        .merge(locations::router(state.clone()))
        .merge(subscriptions::router(state))
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use nimbus_core::admins::AdminList;
    use nimbus_core::types::{Coordinates, ResolvedLocation};
    use nimbus_core::{Error, Result};
    use nimbus_db::store::MemoryStore;
    use nimbus_weather::models::{
        ActiveAlerts, CurrentConditions, Forecast, ForecastPeriod, GridPoint, HourlyForecast,
        HourlyOutlook, SevenDayForecast,
    };
    use nimbus_weather::{ForecastCache, ForecastService, Geocoder, LocationResolver, WeatherApi};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::middleware::auth::UserContext;
    use crate::state::AppState;

    pub const ADMIN: &str = "U_ADMIN";

    /// Knows a single ZIP code; everything else is unknown.
    pub struct StubGeocoder;

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode_zip(&self, zipcode: &str) -> Result<ResolvedLocation> {
            if zipcode == "07430" {
                Ok(ResolvedLocation {
                    latitude: 41.0887,
                    longitude: -74.1438,
                    display_name: "Mahwah, Bergen County, New Jersey".to_string(),
                    formatted_address: "Mahwah, Bergen County, New Jersey".to_string(),
                    zipcode: Some(zipcode.to_string()),
                })
            } else {
                Err(Error::NotFound(format!("no match for {}", zipcode)))
            }
        }

        async fn geocode_address(&self, query: &str) -> Result<ResolvedLocation> {
            Err(Error::NotFound(format!("no match for {}", query)))
        }
    }

    #[derive(Default)]
    pub struct StubWeather {
        pub calls: AtomicUsize,
        pub down: AtomicBool,
    }

    impl StubWeather {
        fn enter(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Transport("HTTP 503 from api.weather.gov".to_string()));
            }
            Ok(())
        }
    }

    fn grid() -> GridPoint {
        GridPoint {
            grid_id: "OKX".to_string(),
            grid_x: 22,
            grid_y: 51,
            forecast_office: None,
            time_zone: None,
            forecast_url: None,
            forecast_hourly_url: None,
            observation_stations_url: None,
        }
    }

    fn period() -> ForecastPeriod {
        ForecastPeriod {
            number: 1,
            name: "Tonight".to_string(),
            start_time: "2024-03-01T18:00:00-05:00".to_string(),
            end_time: "2024-03-02T06:00:00-05:00".to_string(),
            is_daytime: false,
            temperature: Some(31.0),
            temperature_unit: Some("F".to_string()),
            temperature_trend: None,
            wind_speed: Some("5 mph".to_string()),
            wind_direction: Some("NW".to_string()),
            icon: None,
            short_forecast: "Mostly Clear".to_string(),
            detailed_forecast: "Mostly clear, with a low around 31.".to_string(),
        }
    }

    #[async_trait]
    impl WeatherApi for StubWeather {
        async fn seven_day(&self, _: Coordinates) -> Result<SevenDayForecast> {
            self.enter()?;
            Ok(SevenDayForecast {
                forecast: Forecast {
                    updated: None,
                    units: Some("us".to_string()),
                    periods: vec![period()],
                },
                grid_point: grid(),
                current_observation: None,
            })
        }

        async fn hourly(&self, _: Coordinates, hours: u32) -> Result<HourlyOutlook> {
            self.enter()?;
            Ok(HourlyOutlook {
                hourly_forecast: HourlyForecast {
                    updated: Some(hours.to_string()),
                    units: None,
                    periods: vec![],
                },
                grid_point: grid(),
                current_observation: None,
            })
        }

        async fn current_conditions(&self, _: Coordinates) -> Result<CurrentConditions> {
            self.enter()?;
            Ok(CurrentConditions {
                current_observation: None,
                nearest_forecast: Some(period()),
                grid_point: grid(),
                observation_stations: vec![],
            })
        }

        async fn active_alerts(&self, _: Coordinates) -> Result<ActiveAlerts> {
            self.enter()?;
            Ok(ActiveAlerts::new(vec![]))
        }
    }

    pub fn test_state(weather: Arc<StubWeather>) -> AppState {
        let store = Arc::new(MemoryStore::new());
        let forecasts = ForecastService::new(
            LocationResolver::new(Arc::new(StubGeocoder)),
            weather,
            ForecastCache::new(store.clone()),
        );
        AppState {
            store,
            forecasts: Arc::new(forecasts),
            admins: AdminList::new([ADMIN]),
            nimbus_env: "test".to_string(),
        }
    }

    pub fn admin() -> UserContext {
        UserContext {
            user_id: ADMIN.to_string(),
            is_admin: true,
        }
    }

    pub fn user(id: &str) -> UserContext {
        UserContext {
            user_id: id.to_string(),
            is_admin: false,
        }
    }
}
