//! Client for the National Weather Service JSON API (api.weather.gov).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_core::types::Coordinates;
use nimbus_core::{Error, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{
    ActiveAlerts, CurrentConditions, Forecast, ForecastPeriod, GridPoint, HourlyForecast,
    HourlyOutlook, Measurement, Observation, ObservationStation, PointAlert, SevenDayForecast,
};

pub const NWS_BASE_URL: &str = "https://api.weather.gov";

#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn seven_day(&self, at: Coordinates) -> Result<SevenDayForecast>;
    /// Hourly forecast trimmed to the first `hours` periods.
    async fn hourly(&self, at: Coordinates, hours: u32) -> Result<HourlyOutlook>;
    async fn current_conditions(&self, at: Coordinates) -> Result<CurrentConditions>;
    async fn active_alerts(&self, at: Coordinates) -> Result<ActiveAlerts>;
}

#[derive(Clone)]
pub struct NwsClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Feature<P> {
    properties: P,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection<F> {
    #[serde(default = "Vec::new")]
    features: Vec<F>,
}

#[derive(Debug, Deserialize)]
struct StationFeature {
    properties: StationProperties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    grid_id: String,
    grid_x: i64,
    grid_y: i64,
    #[serde(default)]
    forecast_office: Option<String>,
    #[serde(default)]
    time_zone: Option<String>,
    #[serde(default)]
    forecast: Option<String>,
    #[serde(default)]
    forecast_hourly: Option<String>,
    #[serde(default)]
    observation_stations: Option<String>,
}

impl From<PointProperties> for GridPoint {
    fn from(p: PointProperties) -> Self {
        GridPoint {
            grid_id: p.grid_id,
            grid_x: p.grid_x,
            grid_y: p.grid_y,
            forecast_office: p.forecast_office,
            time_zone: p.time_zone,
            forecast_url: p.forecast,
            forecast_hourly_url: p.forecast_hourly,
            observation_stations_url: p.observation_stations,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationProperties {
    station_identifier: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    elevation: Option<Measurement>,
}

impl NwsClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("http client: {}", err)))?;
        Ok(Self::with_client(client, NWS_BASE_URL))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/geo+json")
            .send()
            .await
            .map_err(|err| Error::Transport(format!("{}: {}", what, err)))?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(Error::NotFound(format!("{} not available", what)));
            }
            status => {
                return Err(Error::Transport(format!("{} failed: HTTP {}", what, status)));
            }
        }

        resp.json()
            .await
            .map_err(|err| Error::Parse(format!("{}: {}", what, err)))
    }

    /// Resolves a point to its forecast office grid cell.
    pub async fn grid_point(&self, at: Coordinates) -> Result<GridPoint> {
        let url = format!(
            "{}/points/{:.4},{:.4}",
            self.base_url, at.latitude, at.longitude
        );
        let point: Feature<PointProperties> = self
            .get_json(&url, &format!("grid point for {}", at))
            .await?;
        Ok(point.properties.into())
    }

    async fn forecast(&self, grid: &GridPoint) -> Result<Forecast> {
        let url = required_link(&grid.forecast_url, "forecast")?;
        let feature: Feature<Forecast> = self.get_json(url, "forecast").await?;
        Ok(feature.properties)
    }

    async fn hourly_forecast(&self, grid: &GridPoint) -> Result<HourlyForecast> {
        let url = required_link(&grid.forecast_hourly_url, "hourly forecast")?;
        let feature: Feature<HourlyForecast> = self.get_json(url, "hourly forecast").await?;
        Ok(feature.properties)
    }

    async fn stations(&self, grid: &GridPoint) -> Result<Vec<ObservationStation>> {
        let url = required_link(&grid.observation_stations_url, "observation stations")?;
        let collection: FeatureCollection<StationFeature> =
            self.get_json(url, "observation stations").await?;
        Ok(collection
            .features
            .into_iter()
            .map(|feature| ObservationStation {
                id: feature.properties.station_identifier,
                name: feature.properties.name,
                elevation: feature.properties.elevation,
                coordinates: feature.geometry.map(|g| g.coordinates).unwrap_or_default(),
            })
            .collect())
    }

    async fn latest_observation(&self, station_id: &str) -> Result<Observation> {
        let url = format!("{}/stations/{}/observations/latest", self.base_url, station_id);
        let feature: Feature<Observation> = self
            .get_json(&url, &format!("observation for {}", station_id))
            .await?;
        Ok(feature.properties)
    }

    /// Latest observation from the nearest station. Observations are
    /// supplementary, so failures are logged and yield `None`.
    async fn nearest_observation(&self, stations: &[ObservationStation]) -> Option<Observation> {
        let station = stations.first()?;
        match self.latest_observation(&station.id).await {
            Ok(observation) => Some(observation),
            Err(err) => {
                tracing::warn!(station = %station.id, error = %err, "failed to fetch latest observation");
                None
            }
        }
    }
}

fn required_link<'a>(link: &'a Option<String>, what: &str) -> Result<&'a str> {
    link.as_deref()
        .ok_or_else(|| Error::NotFound(format!("no {} available for this location", what)))
}

/// Period covering `now`, falling back to the first one.
fn period_covering(periods: &[ForecastPeriod], now: DateTime<Utc>) -> Option<ForecastPeriod> {
    let covers = |p: &&ForecastPeriod| {
        match (
            DateTime::parse_from_rfc3339(&p.start_time),
            DateTime::parse_from_rfc3339(&p.end_time),
        ) {
            (Ok(start), Ok(end)) => start <= now && now < end,
            _ => false,
        }
    };
    periods
        .iter()
        .find(covers)
        .or_else(|| periods.first())
        .cloned()
}

#[async_trait]
impl WeatherApi for NwsClient {
    async fn seven_day(&self, at: Coordinates) -> Result<SevenDayForecast> {
        let grid = self.grid_point(at).await?;
        let (forecast, stations) =
            tokio::try_join!(self.forecast(&grid), self.stations(&grid))?;
        let current_observation = self.nearest_observation(&stations).await;

        Ok(SevenDayForecast {
            forecast,
            grid_point: grid,
            current_observation,
        })
    }

    async fn hourly(&self, at: Coordinates, hours: u32) -> Result<HourlyOutlook> {
        let grid = self.grid_point(at).await?;
        let (mut hourly_forecast, stations) =
            tokio::try_join!(self.hourly_forecast(&grid), self.stations(&grid))?;
        hourly_forecast.periods.truncate(hours as usize);
        let current_observation = self.nearest_observation(&stations).await;

        Ok(HourlyOutlook {
            hourly_forecast,
            grid_point: grid,
            current_observation,
        })
    }

    async fn current_conditions(&self, at: Coordinates) -> Result<CurrentConditions> {
        let grid = self.grid_point(at).await?;
        let (forecast, stations) =
            tokio::try_join!(self.forecast(&grid), self.stations(&grid))?;
        let current_observation = self.nearest_observation(&stations).await;
        Ok(CurrentConditions {
            current_observation,
            nearest_forecast: period_covering(&forecast.periods, Utc::now()),
            grid_point: grid,
            observation_stations: stations.into_iter().take(3).collect(),
        })
    }

    async fn active_alerts(&self, at: Coordinates) -> Result<ActiveAlerts> {
        let url = format!(
            "{}/alerts/active?point={:.4},{:.4}",
            self.base_url, at.latitude, at.longitude
        );
        let collection: FeatureCollection<Feature<PointAlert>> = self
            .get_json(&url, &format!("active alerts for {}", at))
            .await?;
        Ok(ActiveAlerts::new(
            collection.features.into_iter().map(|f| f.properties).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn period(number: u32, start: &str, end: &str) -> ForecastPeriod {
        serde_json::from_value(json!({
            "number": number,
            "name": "Tonight",
            "startTime": start,
            "endTime": end,
            "isDaytime": false,
            "temperature": 41,
            "temperatureUnit": "F",
            "shortForecast": "Mostly Cloudy",
            "detailedForecast": "Mostly cloudy, with a low around 41."
        }))
        .unwrap()
    }

    #[test]
    fn test_points_payload_maps_to_grid_point() {
        let payload = json!({
            "properties": {
                "gridId": "OKX",
                "gridX": 22,
                "gridY": 51,
                "forecastOffice": "https://api.weather.gov/offices/OKX",
                "timeZone": "America/New_York",
                "forecast": "https://api.weather.gov/gridpoints/OKX/22,51/forecast",
                "forecastHourly": "https://api.weather.gov/gridpoints/OKX/22,51/forecast/hourly",
                "observationStations": "https://api.weather.gov/gridpoints/OKX/22,51/stations"
            }
        });
        let point: Feature<PointProperties> = serde_json::from_value(payload).unwrap();
        let grid: GridPoint = point.properties.into();
        assert_eq!(grid.grid_id, "OKX");
        assert_eq!((grid.grid_x, grid.grid_y), (22, 51));
        assert_eq!(
            grid.forecast_hourly_url.as_deref(),
            Some("https://api.weather.gov/gridpoints/OKX/22,51/forecast/hourly")
        );
    }

    #[test]
    fn test_station_collection_decodes() {
        let payload = json!({
            "features": [{
                "geometry": { "type": "Point", "coordinates": [-74.1, 41.1] },
                "properties": {
                    "stationIdentifier": "KTEB",
                    "name": "Teterboro Airport",
                    "elevation": { "unitCode": "wmoUnit:m", "value": 2.1 }
                }
            }]
        });
        let collection: FeatureCollection<StationFeature> =
            serde_json::from_value(payload).unwrap();
        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].properties.station_identifier, "KTEB");
        assert_eq!(
            collection.features[0].geometry.as_ref().unwrap().coordinates,
            vec![-74.1, 41.1]
        );
    }

    #[test]
    fn test_alert_collection_decodes() {
        let payload = json!({
            "features": [{
                "geometry": { "type": "Polygon", "coordinates": [[[-74.1, 41.1], [-74.2, 41.2]]] },
                "properties": {
                    "id": "urn:oid:2.49.0.1.840.0.abc",
                    "event": "Flood Watch",
                    "severity": "Severe",
                    "headline": "Flood Watch issued"
                }
            }]
        });
        let collection: FeatureCollection<Feature<PointAlert>> =
            serde_json::from_value(payload).unwrap();
        let alerts = ActiveAlerts::new(collection.features.into_iter().map(|f| f.properties).collect());
        assert_eq!(alerts.alert_count, 1);
        assert_eq!(alerts.alerts[0].event.as_deref(), Some("Flood Watch"));
    }

    #[test]
    fn test_period_covering_now() {
        let periods = vec![
            period(1, "2024-03-01T06:00:00-05:00", "2024-03-01T18:00:00-05:00"),
            period(2, "2024-03-01T18:00:00-05:00", "2024-03-02T06:00:00-05:00"),
        ];
        let evening = Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(period_covering(&periods, evening).unwrap().number, 2);

        let later = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(period_covering(&periods, later).unwrap().number, 1);
        assert!(period_covering(&[], evening).is_none());
    }

    #[test]
    fn test_missing_link_is_not_found() {
        let err = required_link(&None, "forecast").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = NwsClient::with_client(reqwest::Client::new(), "http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
