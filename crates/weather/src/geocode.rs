use async_trait::async_trait;
use nimbus_core::location::{format_display_name, LocationQuery};
use nimbus_core::types::ResolvedLocation;
use nimbus_core::{Error, Result};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode_zip(&self, zipcode: &str) -> Result<ResolvedLocation>;
    async fn geocode_address(&self, query: &str) -> Result<ResolvedLocation>;
}

const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

/// OpenStreetMap Nominatim search, restricted to the United States.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    search_url: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

impl NominatimGeocoder {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("http client: {}", err)))?;
        Ok(Self::with_client(client, NOMINATIM_SEARCH_URL))
    }

    pub fn with_client(client: reqwest::Client, search_url: impl Into<String>) -> Self {
        Self {
            client,
            search_url: search_url.into(),
        }
    }

    async fn search(&self, params: &[(&str, &str)], what: &str) -> Result<NominatimPlace> {
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[("format", "json"), ("countrycodes", "us"), ("limit", "1")])
            .query(params)
            .send()
            .await
            .map_err(|err| Error::Transport(format!("geocoding {}: {}", what, err)))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "geocoding {} failed: HTTP {}",
                what,
                resp.status()
            )));
        }

        let places: Vec<NominatimPlace> = resp
            .json()
            .await
            .map_err(|err| Error::Parse(format!("geocoding response for {}: {}", what, err)))?;

        places
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("could not find location: {}", what)))
    }
}

fn to_resolved(place: NominatimPlace, zipcode: Option<&str>) -> Result<ResolvedLocation> {
    let latitude = place
        .lat
        .parse()
        .map_err(|_| Error::Parse(format!("invalid latitude: {}", place.lat)))?;
    let longitude = place
        .lon
        .parse()
        .map_err(|_| Error::Parse(format!("invalid longitude: {}", place.lon)))?;
    Ok(ResolvedLocation {
        latitude,
        longitude,
        formatted_address: format_display_name(&place.display_name),
        display_name: place.display_name,
        zipcode: zipcode.map(str::to_string),
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode_zip(&self, zipcode: &str) -> Result<ResolvedLocation> {
        let place = self
            .search(&[("postalcode", zipcode)], &format!("ZIP code {}", zipcode))
            .await?;
        to_resolved(place, Some(zipcode))
    }

    async fn geocode_address(&self, query: &str) -> Result<ResolvedLocation> {
        let place = self.search(&[("q", query)], query).await?;
        to_resolved(place, None)
    }
}

pub const DEFAULT_MEMO_CAPACITY: usize = 1024;

/// Insertion-ordered map that forgets its oldest answer once full.
struct Memo {
    entries: HashMap<String, ResolvedLocation>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Memo {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<&ResolvedLocation> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, location: ResolvedLocation) {
        if self.entries.insert(key.clone(), location).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Turns free-form input into coordinates, memoizing geocoder answers.
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    memo: RwLock<Memo>,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self::with_memo_capacity(geocoder, DEFAULT_MEMO_CAPACITY)
    }

    pub fn with_memo_capacity(geocoder: Arc<dyn Geocoder>, capacity: usize) -> Self {
        Self {
            geocoder,
            memo: RwLock::new(Memo::new(capacity)),
        }
    }

    pub async fn memo_len(&self) -> usize {
        self.memo.read().await.len()
    }

    pub async fn resolve(&self, input: &str) -> Result<ResolvedLocation> {
        let query = LocationQuery::parse(input)?;

        let memo_key = match &query {
            LocationQuery::Coordinates(at) => return Ok(ResolvedLocation::from_coordinates(*at)),
            LocationQuery::ZipCode(zip) => format!("zip_{}", zip),
            other => other
                .address_query()
                .unwrap_or_default()
                .to_lowercase(),
        };

        if let Some(hit) = self.memo.read().await.get(&memo_key) {
            return Ok(hit.clone());
        }

        let resolved = match &query {
            LocationQuery::ZipCode(zip) => self.geocoder.geocode_zip(zip).await?,
            other => {
                let address = other.address_query().unwrap_or_default();
                self.geocoder.geocode_address(&address).await?
            }
        };

        tracing::debug!(input, latitude = resolved.latitude, longitude = resolved.longitude, "resolved location");
        self.memo
            .write()
            .await
            .insert(memo_key, resolved.clone());
        Ok(resolved)
    }
}
