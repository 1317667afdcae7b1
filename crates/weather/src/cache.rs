//! TTL cache for weather payloads.
//!
//! Reads and writes go to an in-memory map; every write is persisted to the
//! `forecast_cache` collection by a detached task so the cache survives
//! restarts. Expiry is only checked on read.

use chrono::{DateTime, Duration, Utc};
use nimbus_core::types::Coordinates;
use nimbus_core::Result;
use nimbus_db::{Collection, SharedStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    SevenDay,
    Hourly,
    Current,
    Alerts,
}

impl CacheKind {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheKind::SevenDay | CacheKind::Hourly => Duration::minutes(30),
            CacheKind::Current => Duration::minutes(10),
            CacheKind::Alerts => Duration::minutes(5),
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            CacheKind::SevenDay => "forecast_7day",
            CacheKind::Hourly => "forecast_hourly",
            CacheKind::Current => "current",
            CacheKind::Alerts => "alerts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub coordinates: Coordinates,
    /// Hour count for hourly forecasts.
    pub extra: Option<u32>,
}

impl CacheKey {
    pub fn new(kind: CacheKind, coordinates: Coordinates) -> Self {
        Self {
            kind,
            coordinates,
            extra: None,
        }
    }

    pub fn hourly(coordinates: Coordinates, hours: u32) -> Self {
        Self {
            kind: CacheKind::Hourly,
            coordinates,
            extra: Some(hours),
        }
    }

    /// `forecast_7day_41.06_-74.14`, `forecast_hourly_41.06_-74.14_24`, ...
    pub fn storage_key(&self) -> String {
        let base = format!(
            "{}_{}_{}",
            self.kind.prefix(),
            self.coordinates.latitude,
            self.coordinates.longitude
        );
        match self.extra {
            Some(extra) => format!("{}_{}", base, extra),
            None => base,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub kind: CacheKind,
    pub data: Value,
    pub captured_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now - self.captured_at < self.kind.ttl()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub valid: usize,
    pub expired: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct ForecastCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    store: SharedStore,
}

impl ForecastCache {
    pub fn new(store: SharedStore) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Builds a cache warmed from durable storage. Stale and undecodable
    /// entries are skipped.
    pub async fn load(store: SharedStore, now: DateTime<Utc>) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut skipped = 0usize;

        for (key, value) in store.scan(Collection::ForecastCache).await? {
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) if entry.is_fresh_at(now) => {
                    entries.insert(key, entry);
                }
                Ok(_) => skipped += 1,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "skipping undecodable cache entry");
                    skipped += 1;
                }
            }
        }

        tracing::info!(loaded = entries.len(), skipped, "forecast cache loaded");
        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            store,
        })
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(&key.storage_key())?;
        if entry.kind == key.kind && entry.is_fresh_at(now) {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    pub async fn put(&self, key: &CacheKey, data: Value) -> JoinHandle<()> {
        self.put_at(key, data, Utc::now()).await
    }

    /// Updates memory before returning; the returned handle tracks the
    /// durable write and may be dropped.
    pub async fn put_at(&self, key: &CacheKey, data: Value, now: DateTime<Utc>) -> JoinHandle<()> {
        let storage_key = key.storage_key();
        self.entries.write().await.insert(
            storage_key.clone(),
            CacheEntry {
                kind: key.kind,
                data,
                captured_at: now,
            },
        );

        let entries = self.entries.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            // Persist whatever is current for the key, not the value this
            // task was spawned with.
            let latest = entries.read().await.get(&storage_key).cloned();
            let Some(entry) = latest else {
                return;
            };
            let result = match serde_json::to_value(&entry) {
                Ok(value) => store.put(Collection::ForecastCache, &storage_key, value).await,
                Err(err) => Err(nimbus_core::Error::Persistence(err.to_string())),
            };
            if let Err(err) = result {
                tracing::warn!(key = %storage_key, error = %err, "cache write-through failed");
            }
        })
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let entries = self.entries.read().await;
        let valid = entries.values().filter(|e| e.is_fresh_at(now)).count();
        CacheStats {
            valid,
            expired: entries.len() - valid,
            total: entries.len(),
        }
    }

    /// Drops stale entries from memory and storage. Returns how many were
    /// removed. The map stays write-locked until storage is updated, so a
    /// concurrent `put` for a purged key lands after the delete.
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        self.store
            .delete_many(Collection::ForecastCache, &expired)
            .await?;
        for key in &expired {
            entries.remove(key);
        }
        tracing::debug!(purged = expired.len(), "purged expired cache entries");
        Ok(expired.len())
    }
}
