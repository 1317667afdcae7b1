//! Durable key-value storage.
//!
//! Every collection is an independent map from a stable string key to a JSON
//! document. Backends: in-memory (tests), one JSON file per collection, and
//! a single Postgres table.

use async_trait::async_trait;
use nimbus_core::config::{Settings, StoreBackend};
use nimbus_core::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Subscriptions,
    ProcessedAlerts,
    ForecastCache,
    SavedLocations,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Subscriptions,
        Collection::ProcessedAlerts,
        Collection::ForecastCache,
        Collection::SavedLocations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Subscriptions => "subscriptions",
            Collection::ProcessedAlerts => "processed_alerts",
            Collection::ForecastCache => "forecast_cache",
            Collection::SavedLocations => "saved_locations",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>>;

    /// Inserts or overwrites.
    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()>;

    /// Returns whether a value was removed.
    async fn delete(&self, collection: Collection, key: &str) -> Result<bool>;

    /// All entries ordered by key.
    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>>;

    /// Rewrites an existing value in one atomic step. Missing keys are left
    /// missing and yield `None`; a failing change leaves the value untouched.
    async fn update(&self, collection: Collection, key: &str, change: Change) -> Result<Option<Value>>;

    async fn delete_many(&self, collection: Collection, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(collection, key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub type SharedStore = Arc<dyn KvStore>;

/// Read-modify-write step applied by [`KvStore::update`].
pub type Change = Box<dyn FnOnce(Value) -> Result<Value> + Send>;

/// Opens the backend selected in settings.
pub async fn open(settings: &Settings) -> Result<SharedStore> {
    let store: SharedStore = match settings.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::open(&settings.data_dir).await?),
        StoreBackend::Postgres => {
            let url = settings.database_url.as_deref().ok_or_else(|| {
                Error::Config("postgres store requires a database url".to_string())
            })?;
            Arc::new(PgStore::connect(url).await?)
        }
    };
    tracing::info!(backend = ?settings.store_backend, "store opened");
    Ok(store)
}

pub(crate) fn persistence<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Error + '_ {
    move |err| Error::Persistence(format!("{}: {}", context, err))
}
