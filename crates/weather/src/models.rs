use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridPoint {
    pub grid_id: String,
    pub grid_x: i64,
    pub grid_y: i64,
    #[serde(default)]
    pub forecast_office: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub forecast_url: Option<String>,
    #[serde(default)]
    pub forecast_hourly_url: Option<String>,
    #[serde(default)]
    pub observation_stations_url: Option<String>,
}

/// A value with its unit, as NWS reports measurements (`wmoUnit:degC`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub number: u32,
    #[serde(default)]
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub is_daytime: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    #[serde(default)]
    pub temperature_trend: Option<String>,
    #[serde(default)]
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub short_forecast: String,
    #[serde(default)]
    pub detailed_forecast: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    pub periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPeriod {
    pub number: u32,
    pub start_time: String,
    pub end_time: String,
    pub is_daytime: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    #[serde(default)]
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub short_forecast: String,
    #[serde(default)]
    pub probability_of_precipitation: Option<Measurement>,
    #[serde(default)]
    pub dewpoint: Option<Measurement>,
    #[serde(default)]
    pub relative_humidity: Option<Measurement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourlyForecast {
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    pub periods: Vec<HourlyPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObservationStation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub elevation: Option<Measurement>,
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text_description: Option<String>,
    #[serde(default)]
    pub temperature: Option<Measurement>,
    #[serde(default)]
    pub dewpoint: Option<Measurement>,
    #[serde(default)]
    pub wind_direction: Option<Measurement>,
    #[serde(default)]
    pub wind_speed: Option<Measurement>,
    #[serde(default)]
    pub wind_gust: Option<Measurement>,
    #[serde(default)]
    pub barometric_pressure: Option<Measurement>,
    #[serde(default)]
    pub visibility: Option<Measurement>,
    #[serde(default)]
    pub relative_humidity: Option<Measurement>,
    #[serde(default)]
    pub wind_chill: Option<Measurement>,
    #[serde(default)]
    pub heat_index: Option<Measurement>,
    #[serde(default)]
    pub precipitation_last_hour: Option<Measurement>,
}

/// Active alert for a point, from the NWS JSON alerts API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PointAlert {
    pub id: String,
    #[serde(default)]
    pub area_desc: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub certainty: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub effective: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SevenDayForecast {
    pub forecast: Forecast,
    pub grid_point: GridPoint,
    #[serde(default)]
    pub current_observation: Option<Observation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourlyOutlook {
    pub hourly_forecast: HourlyForecast,
    pub grid_point: GridPoint,
    #[serde(default)]
    pub current_observation: Option<Observation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    #[serde(default)]
    pub current_observation: Option<Observation>,
    /// The forecast period covering now.
    #[serde(default)]
    pub nearest_forecast: Option<ForecastPeriod>,
    pub grid_point: GridPoint,
    #[serde(default)]
    pub observation_stations: Vec<ObservationStation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlerts {
    pub alerts: Vec<PointAlert>,
    pub alert_count: usize,
}

impl ActiveAlerts {
    pub fn new(alerts: Vec<PointAlert>) -> Self {
        Self {
            alert_count: alerts.len(),
            alerts,
        }
    }
}
