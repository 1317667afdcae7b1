//! Ledger of alert ids already delivered.
//!
//! Pruning happens on read: any load that observes records older than the
//! retention window deletes them from storage before returning.

use chrono::{DateTime, Utc};
use nimbus_core::types::ProcessedAlertRecord;
use nimbus_core::Result;
use std::collections::HashSet;

use super::{decode, encode};
use crate::store::{Collection, KvStore};

/// Returns the ids of all unexpired records, pruning expired and
/// undecodable ones.
pub async fn load(store: &dyn KvStore, now: DateTime<Utc>) -> Result<HashSet<String>> {
    let mut processed = HashSet::new();
    let mut stale = Vec::new();

    for (key, value) in store.scan(Collection::ProcessedAlerts).await? {
        match decode::<ProcessedAlertRecord>(Collection::ProcessedAlerts, &key, value) {
            Ok(record) if !record.is_stale_at(now) => {
                processed.insert(record.alert_id);
            }
            Ok(_) => stale.push(key),
            Err(err) => {
                tracing::warn!(alert_id = %key, error = %err, "dropping processed-alert record");
                stale.push(key);
            }
        }
    }

    if !stale.is_empty() {
        let pruned = store
            .delete_many(Collection::ProcessedAlerts, &stale)
            .await?;
        tracing::info!(pruned, retained = processed.len(), "pruned processed-alert ledger");
    }

    Ok(processed)
}

pub async fn has_processed(store: &dyn KvStore, alert_id: &str, now: DateTime<Utc>) -> Result<bool> {
    Ok(load(store, now).await?.contains(alert_id))
}

pub async fn mark_processed(store: &dyn KvStore, alert_id: &str, now: DateTime<Utc>) -> Result<()> {
    let record = ProcessedAlertRecord {
        alert_id: alert_id.to_string(),
        processed_at: now,
    };
    let value = encode(Collection::ProcessedAlerts, &record)?;
    store.put(Collection::ProcessedAlerts, alert_id, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_mark_then_has_processed() {
        let store = MemoryStore::new();
        assert!(!has_processed(&store, "A1", now()).await.unwrap());
        mark_processed(&store, "A1", now()).await.unwrap();
        assert!(has_processed(&store, "A1", now()).await.unwrap());
        assert!(!has_processed(&store, "A2", now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_records_older_than_seven_days_are_pruned_on_read() {
        let store = MemoryStore::new();
        mark_processed(&store, "old", now() - Duration::days(8))
            .await
            .unwrap();
        mark_processed(&store, "recent", now() - Duration::days(6))
            .await
            .unwrap();

        let processed = load(&store, now()).await.unwrap();
        assert!(processed.contains("recent"));
        assert!(!processed.contains("old"));

        assert!(store
            .get(Collection::ProcessedAlerts, "old")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get(Collection::ProcessedAlerts, "recent")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_record_expires_by_age() {
        let store = MemoryStore::new();
        mark_processed(&store, "A1", now()).await.unwrap();
        assert!(has_processed(&store, "A1", now() + Duration::days(7)).await.unwrap());
        assert!(!has_processed(&store, "A1", now() + Duration::days(7) + Duration::seconds(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_records_are_dropped() {
        let store = MemoryStore::new();
        store
            .put(Collection::ProcessedAlerts, "junk", json!("not a record"))
            .await
            .unwrap();
        mark_processed(&store, "A1", now()).await.unwrap();

        let processed = load(&store, now()).await.unwrap();
        assert_eq!(processed.len(), 1);
        assert_eq!(store.len(Collection::ProcessedAlerts).await, 1);
    }
}
