pub mod processed_alerts;
pub mod saved_locations;
pub mod subscriptions;

use nimbus_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::store::Collection;

pub(crate) fn decode<T: DeserializeOwned>(collection: Collection, key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|err| {
        Error::Persistence(format!("undecodable {} entry {}: {}", collection, key, err))
    })
}

pub(crate) fn encode<T: Serialize>(collection: Collection, value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| Error::Persistence(format!("unencodable {} entry: {}", collection, err)))
}
