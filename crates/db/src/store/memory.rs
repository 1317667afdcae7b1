use async_trait::async_trait;
use nimbus_core::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{Change, Collection, KvStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(&collection)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, collection: Collection, key: &str, change: Change) -> Result<Option<Value>> {
        let mut collections = self.collections.write().await;
        let Some(slot) = collections
            .get_mut(&collection)
            .and_then(|entries| entries.get_mut(key))
        else {
            return Ok(None);
        };
        let next = change(slot.clone())?;
        *slot = next.clone();
        Ok(Some(next))
    }
}
