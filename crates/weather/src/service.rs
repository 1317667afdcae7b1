use nimbus_core::types::ResolvedLocation;
use nimbus_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheKey, CacheKind, ForecastCache};
use crate::geocode::LocationResolver;
use crate::models::{ActiveAlerts, CurrentConditions, HourlyOutlook, SevenDayForecast};
use crate::nws::WeatherApi;

pub const DEFAULT_HOURLY_HOURS: u32 = 24;
pub const MAX_HOURLY_HOURS: u32 = 156;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecasted<T> {
    pub location: ResolvedLocation,
    pub data: T,
    pub from_cache: bool,
}

/// Location resolution and weather fetches behind the forecast cache.
pub struct ForecastService {
    resolver: LocationResolver,
    api: Arc<dyn WeatherApi>,
    cache: ForecastCache,
}

pub fn clamp_hours(hours: Option<u32>) -> u32 {
    hours
        .unwrap_or(DEFAULT_HOURLY_HOURS)
        .clamp(1, MAX_HOURLY_HOURS)
}

impl ForecastService {
    pub fn new(resolver: LocationResolver, api: Arc<dyn WeatherApi>, cache: ForecastCache) -> Self {
        Self {
            resolver,
            api,
            cache,
        }
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    pub async fn resolve(&self, input: &str) -> Result<ResolvedLocation> {
        self.resolver.resolve(input).await
    }

    pub async fn seven_day(&self, input: &str) -> Result<Forecasted<SevenDayForecast>> {
        let location = self.resolve(input).await?;
        self.seven_day_for(location).await
    }

    pub async fn hourly(&self, input: &str, hours: Option<u32>) -> Result<Forecasted<HourlyOutlook>> {
        let location = self.resolve(input).await?;
        self.hourly_for(location, hours).await
    }

    pub async fn current_conditions(&self, input: &str) -> Result<Forecasted<CurrentConditions>> {
        let location = self.resolve(input).await?;
        self.current_conditions_for(location).await
    }

    pub async fn active_alerts(&self, input: &str) -> Result<Forecasted<ActiveAlerts>> {
        let location = self.resolve(input).await?;
        self.active_alerts_for(location).await
    }

    pub async fn seven_day_for(&self, location: ResolvedLocation) -> Result<Forecasted<SevenDayForecast>> {
        let at = location.coordinates();
        let key = CacheKey::new(CacheKind::SevenDay, at);
        self.cached(location, key, self.api.seven_day(at)).await
    }

    pub async fn hourly_for(
        &self,
        location: ResolvedLocation,
        hours: Option<u32>,
    ) -> Result<Forecasted<HourlyOutlook>> {
        let hours = clamp_hours(hours);
        let at = location.coordinates();
        let key = CacheKey::hourly(at, hours);
        self.cached(location, key, self.api.hourly(at, hours)).await
    }

    pub async fn current_conditions_for(
        &self,
        location: ResolvedLocation,
    ) -> Result<Forecasted<CurrentConditions>> {
        let at = location.coordinates();
        let key = CacheKey::new(CacheKind::Current, at);
        self.cached(location, key, self.api.current_conditions(at)).await
    }

    pub async fn active_alerts_for(&self, location: ResolvedLocation) -> Result<Forecasted<ActiveAlerts>> {
        let at = location.coordinates();
        let key = CacheKey::new(CacheKind::Alerts, at);
        self.cached(location, key, self.api.active_alerts(at)).await
    }

    /// `fetch` is only polled on a miss.
    async fn cached<T, F>(&self, location: ResolvedLocation, key: CacheKey, fetch: F) -> Result<Forecasted<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cache.get(&key).await {
            match serde_json::from_value::<T>(value) {
                Ok(data) => {
                    tracing::debug!(key = %key.storage_key(), "cache hit");
                    return Ok(Forecasted {
                        location,
                        data,
                        from_cache: true,
                    });
                }
                Err(err) => {
                    tracing::warn!(key = %key.storage_key(), error = %err, "discarding undecodable cache entry");
                }
            }
        }

        let data = fetch.await?;
        let value = serde_json::to_value(&data)
            .map_err(|err| Error::Parse(format!("encoding weather payload: {}", err)))?;
        // Durable write-through runs detached.
        drop(self.cache.put(&key, value).await);

        Ok(Forecasted {
            location,
            data,
            from_cache: false,
        })
    }
}
