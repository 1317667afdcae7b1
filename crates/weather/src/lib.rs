pub mod cache;
pub mod geocode;
pub mod models;
pub mod nws;
pub mod service;

pub use cache::{CacheKey, CacheKind, ForecastCache};
pub use geocode::{Geocoder, LocationResolver, NominatimGeocoder};
pub use nws::{NwsClient, WeatherApi};
pub use service::{ForecastService, Forecasted};
