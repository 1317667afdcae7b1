use chrono::{DateTime, Utc};
use nimbus_core::types::{ResolvedLocation, SavedLocation};
use nimbus_core::{Error, Result};

use super::{decode, encode};
use crate::store::{Collection, KvStore};

/// Nicknames compare case-insensitively, so the key folds case.
fn key_for(user_id: &str, nickname: &str) -> String {
    format!("{}:{}", user_id, nickname.trim().to_lowercase())
}

pub async fn list_for_user(store: &dyn KvStore, user_id: &str) -> Result<Vec<SavedLocation>> {
    let prefix = format!("{}:", user_id);
    let mut locations = Vec::new();
    for (key, value) in store.scan(Collection::SavedLocations).await? {
        if !key.starts_with(&prefix) {
            continue;
        }
        match decode::<SavedLocation>(Collection::SavedLocations, &key, value) {
            Ok(location) => locations.push(location),
            Err(err) => tracing::warn!(key = %key, error = %err, "skipping saved location"),
        }
    }
    locations.sort_by(|a, b| a.saved_at.cmp(&b.saved_at));
    Ok(locations)
}

pub async fn find(store: &dyn KvStore, user_id: &str, nickname: &str) -> Result<Option<SavedLocation>> {
    let key = key_for(user_id, nickname);
    store
        .get(Collection::SavedLocations, &key)
        .await?
        .map(|value| decode(Collection::SavedLocations, &key, value))
        .transpose()
}

/// Saves under the nickname, replacing any location already saved under the
/// same nickname in any letter case.
pub async fn save(
    store: &dyn KvStore,
    user_id: &str,
    nickname: &str,
    location: &ResolvedLocation,
    now: DateTime<Utc>,
) -> Result<SavedLocation> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(Error::InvalidInput("nickname must not be empty".to_string()));
    }
    let saved = SavedLocation {
        user_id: user_id.to_string(),
        nickname: nickname.to_string(),
        latitude: location.latitude,
        longitude: location.longitude,
        formatted_address: location.formatted_address.clone(),
        saved_at: now,
    };
    let value = encode(Collection::SavedLocations, &saved)?;
    store
        .put(Collection::SavedLocations, &key_for(user_id, nickname), value)
        .await?;
    Ok(saved)
}

pub async fn remove(store: &dyn KvStore, user_id: &str, nickname: &str) -> Result<bool> {
    store
        .delete(Collection::SavedLocations, &key_for(user_id, nickname))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use nimbus_core::types::Coordinates;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 2, 9, 30, 0).unwrap()
    }

    fn ramsey() -> ResolvedLocation {
        ResolvedLocation {
            latitude: 41.06,
            longitude: -74.14,
            display_name: "Ramsey, Bergen County, New Jersey, United States".to_string(),
            formatted_address: "Ramsey, Bergen County, New Jersey".to_string(),
            zipcode: Some("07446".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_and_find_case_insensitive() {
        let store = MemoryStore::new();
        save(&store, "U1", "Home", &ramsey(), now()).await.unwrap();

        let found = find(&store, "U1", "HOME").await.unwrap().unwrap();
        assert_eq!(found.nickname, "Home");
        assert_eq!(found.coordinates(), Coordinates::new(41.06, -74.14));
        assert!(find(&store, "U2", "home").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resave_is_last_write_wins() {
        let store = MemoryStore::new();
        save(&store, "U1", "home", &ramsey(), now()).await.unwrap();
        let cabin = ResolvedLocation::from_coordinates(Coordinates::new(44.0, -71.5));
        save(&store, "U1", "Home", &cabin, now() + Duration::days(1))
            .await
            .unwrap();

        let locations = list_for_user(&store, "U1").await.unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].nickname, "Home");
        assert_eq!(locations[0].latitude, 44.0);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user() {
        let store = MemoryStore::new();
        save(&store, "U1", "home", &ramsey(), now()).await.unwrap();
        save(&store, "U1", "work", &ramsey(), now() + Duration::hours(1))
            .await
            .unwrap();
        save(&store, "U10", "home", &ramsey(), now()).await.unwrap();

        let names: Vec<String> = list_for_user(&store, "U1")
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.nickname)
            .collect();
        assert_eq!(names, vec!["home", "work"]);
    }

    #[tokio::test]
    async fn test_remove_and_empty_nickname() {
        let store = MemoryStore::new();
        save(&store, "U1", "home", &ramsey(), now()).await.unwrap();
        assert!(remove(&store, "U1", "Home").await.unwrap());
        assert!(!remove(&store, "U1", "home").await.unwrap());

        let err = save(&store, "U1", "  ", &ramsey(), now()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
