use chrono::{DateTime, Utc};
use nimbus_core::types::{default_feeds, NewSubscription, Subscription};
use nimbus_core::Result;

use super::{decode, encode};
use crate::store::{Collection, KvStore};

/// All subscriptions, oldest first. Undecodable entries are logged and skipped.
pub async fn list(store: &dyn KvStore) -> Result<Vec<Subscription>> {
    let mut subscriptions = Vec::new();
    for (key, value) in store.scan(Collection::Subscriptions).await? {
        match decode::<Subscription>(Collection::Subscriptions, &key, value) {
            Ok(subscription) => subscriptions.push(subscription),
            Err(err) => tracing::warn!(subscription_id = %key, error = %err, "skipping subscription"),
        }
    }
    subscriptions.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
    Ok(subscriptions)
}

pub async fn list_active(store: &dyn KvStore) -> Result<Vec<Subscription>> {
    Ok(list(store)
        .await?
        .into_iter()
        .filter(|subscription| subscription.active)
        .collect())
}

pub async fn get_by_id(store: &dyn KvStore, id: &str) -> Result<Option<Subscription>> {
    store
        .get(Collection::Subscriptions, id)
        .await?
        .map(|value| decode(Collection::Subscriptions, id, value))
        .transpose()
}

pub async fn insert(store: &dyn KvStore, subscription: &Subscription) -> Result<()> {
    let value = encode(Collection::Subscriptions, subscription)?;
    store
        .put(Collection::Subscriptions, &subscription.id, value)
        .await
}

pub async fn create(
    store: &dyn KvStore,
    new: NewSubscription,
    now: DateTime<Utc>,
) -> Result<Subscription> {
    let subscription = Subscription {
        id: format!("feed_{}", nanoid::nanoid!(12)),
        url: new.url,
        zone: new.zone,
        name: new.name,
        active: true,
        last_checked: None,
        last_alert_id: None,
        added_by: new.added_by,
        added_at: now,
    };
    insert(store, &subscription).await?;
    Ok(subscription)
}

pub async fn remove(store: &dyn KvStore, id: &str) -> Result<bool> {
    store.delete(Collection::Subscriptions, id).await
}

/// Applies `change` to the stored subscription in one atomic store update,
/// so concurrent writers never resurrect a removed row or revert each
/// other's fields.
async fn modify<F>(store: &dyn KvStore, id: &str, change: F) -> Result<Option<Subscription>>
where
    F: FnOnce(&mut Subscription) + Send + 'static,
{
    let key = id.to_string();
    let updated = store
        .update(
            Collection::Subscriptions,
            id,
            Box::new(move |value| {
                let mut subscription: Subscription = decode(Collection::Subscriptions, &key, value)?;
                change(&mut subscription);
                encode(Collection::Subscriptions, &subscription)
            }),
        )
        .await?;
    updated
        .map(|value| decode(Collection::Subscriptions, id, value))
        .transpose()
}

pub async fn set_active(
    store: &dyn KvStore,
    id: &str,
    active: bool,
) -> Result<Option<Subscription>> {
    modify(store, id, move |subscription| subscription.active = active).await
}

/// Flips the active flag (pause / resume).
pub async fn toggle(store: &dyn KvStore, id: &str) -> Result<Option<Subscription>> {
    modify(store, id, |subscription| subscription.active = !subscription.active).await
}

/// Stamps a completed check. Only the check fields are written; a
/// subscription removed mid-cycle stays removed and a pause made while the
/// feed was being checked is kept.
pub async fn record_check(
    store: &dyn KvStore,
    id: &str,
    last_alert_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let last_alert_id = last_alert_id.map(str::to_string);
    modify(store, id, move |subscription| {
        subscription.last_checked = Some(now);
        if let Some(alert_id) = last_alert_id {
            subscription.last_alert_id = Some(alert_id);
        }
    })
    .await?;
    Ok(())
}

/// Installs the default zone feeds when no subscription exists yet.
pub async fn bootstrap_defaults(store: &dyn KvStore, now: DateTime<Utc>) -> Result<usize> {
    if !store.scan(Collection::Subscriptions).await?.is_empty() {
        return Ok(0);
    }
    let defaults = default_feeds();
    for (id, feed) in &defaults {
        let subscription = Subscription {
            id: id.clone(),
            url: feed.url.clone(),
            zone: feed.zone.clone(),
            name: feed.name.clone(),
            active: true,
            last_checked: None,
            last_alert_id: None,
            added_by: feed.added_by.clone(),
            added_at: now,
        };
        insert(store, &subscription).await?;
    }
    tracing::info!(count = defaults.len(), "installed default feed subscriptions");
    Ok(defaults.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Change, MemoryStore};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn new_feed(name: &str) -> NewSubscription {
        NewSubscription {
            url: format!("https://api.weather.gov/alerts/active.atom?zone={}", name),
            zone: Some(name.to_string()),
            name: name.to_string(),
            added_by: "U_ADMIN".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        let created = create(&store, new_feed("NYZ072"), now()).await.unwrap();
        assert!(created.id.starts_with("feed_"));
        assert!(created.active);
        assert_eq!(created.added_at, now());

        let fetched = get_by_id(&store, &created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_list_orders_by_added_at() {
        let store = MemoryStore::new();
        let later = create(&store, new_feed("B"), now() + Duration::minutes(5))
            .await
            .unwrap();
        let earlier = create(&store, new_feed("A"), now()).await.unwrap();
        let ids: Vec<String> = list(&store).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn test_toggle_and_list_active() {
        let store = MemoryStore::new();
        let feed = create(&store, new_feed("A"), now()).await.unwrap();
        create(&store, new_feed("B"), now()).await.unwrap();

        let paused = toggle(&store, &feed.id).await.unwrap().unwrap();
        assert!(!paused.active);
        assert_eq!(list_active(&store).await.unwrap().len(), 1);

        let resumed = toggle(&store, &feed.id).await.unwrap().unwrap();
        assert!(resumed.active);
        assert_eq!(list_active(&store).await.unwrap().len(), 2);

        assert!(toggle(&store, "feed_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let feed = create(&store, new_feed("A"), now()).await.unwrap();
        assert!(remove(&store, &feed.id).await.unwrap());
        assert!(!remove(&store, &feed.id).await.unwrap());
        assert!(list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_check() {
        let store = MemoryStore::new();
        let feed = create(&store, new_feed("A"), now()).await.unwrap();
        let checked_at = now() + Duration::minutes(5);

        record_check(&store, &feed.id, Some("urn:alert:1"), checked_at)
            .await
            .unwrap();
        record_check(&store, &feed.id, None, checked_at + Duration::minutes(5))
            .await
            .unwrap();

        let fetched = get_by_id(&store, &feed.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_alert_id.as_deref(), Some("urn:alert:1"));
        assert_eq!(fetched.last_checked, Some(checked_at + Duration::minutes(5)));

        record_check(&store, "feed_gone", None, checked_at).await.unwrap();
        assert!(get_by_id(&store, "feed_gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_only_when_empty() {
        let store = MemoryStore::new();
        assert_eq!(bootstrap_defaults(&store, now()).await.unwrap(), 2);
        assert_eq!(bootstrap_defaults(&store, now()).await.unwrap(), 0);

        let subs = list(&store).await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].id, "feed_njz103");
        assert_eq!(subs[1].zone.as_deref(), Some("NJZ104"));
    }

    #[tokio::test]
    async fn test_list_skips_undecodable_entries() {
        let store = MemoryStore::new();
        create(&store, new_feed("A"), now()).await.unwrap();
        store
            .put(Collection::Subscriptions, "feed_broken", json!({"url": 7}))
            .await
            .unwrap();
        assert_eq!(list(&store).await.unwrap().len(), 1);
    }

    enum Interference {
        Remove,
        Pause,
    }

    /// Changes the row behind the caller's back right after every `get`,
    /// the way an admin request racing a poll cycle would.
    struct InterferingStore {
        inner: MemoryStore,
        interference: Interference,
    }

    #[async_trait]
    impl KvStore for InterferingStore {
        async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
            let value = self.inner.get(collection, key).await?;
            match self.interference {
                Interference::Remove => {
                    self.inner.delete(collection, key).await?;
                }
                Interference::Pause => {
                    let pause: Change = Box::new(|mut value| {
                        value["active"] = json!(false);
                        Ok(value)
                    });
                    self.inner.update(collection, key, pause).await?;
                }
            }
            Ok(value)
        }
        async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
            self.inner.put(collection, key, value).await
        }
        async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
            self.inner.delete(collection, key).await
        }
        async fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>> {
            self.inner.scan(collection).await
        }
        async fn update(&self, collection: Collection, key: &str, change: Change) -> Result<Option<Value>> {
            self.inner.update(collection, key, change).await
        }
    }

    async fn interfering(interference: Interference) -> (InterferingStore, Subscription) {
        let inner = MemoryStore::new();
        let feed = create(&inner, new_feed("A"), now()).await.unwrap();
        (InterferingStore { inner, interference }, feed)
    }

    #[tokio::test]
    async fn test_record_check_does_not_resurrect_a_removed_feed() {
        let (store, feed) = interfering(Interference::Remove).await;
        // The worker still holds the feed from its cycle snapshot.
        assert!(get_by_id(&store, &feed.id).await.unwrap().is_some());

        record_check(&store, &feed.id, Some("urn:alert:1"), now()).await.unwrap();
        assert!(list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_check_keeps_a_concurrent_pause() {
        let (store, feed) = interfering(Interference::Pause).await;
        assert!(get_by_id(&store, &feed.id).await.unwrap().unwrap().active);

        record_check(&store, &feed.id, Some("urn:alert:1"), now()).await.unwrap();
        let stored = store.inner.get(Collection::Subscriptions, &feed.id).await.unwrap().unwrap();
        let stored: Subscription = serde_json::from_value(stored).unwrap();
        assert!(!stored.active);
        assert_eq!(stored.last_checked, Some(now()));
        assert_eq!(stored.last_alert_id.as_deref(), Some("urn:alert:1"));
    }
}
