//! Atom/CAP alert feed client.
//!
//! NWS publishes one Atom `<feed>` per zone with CAP fields on every
//! `<entry>` under the `cap:` prefix. Geocodes and parameters arrive as
//! interleaved `<valueName>`/`<value>` pairs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_core::types::{Alert, Geocode};
use nimbus_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_alerts(&self, url: &str) -> Result<Vec<Alert>>;
}

#[derive(Clone)]
pub struct CapFeedClient {
    client: reqwest::Client,
}

impl CapFeedClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("http client: {}", err)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for CapFeedClient {
    async fn fetch_alerts(&self, url: &str) -> Result<Vec<Alert>> {
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/atom+xml")
            .send()
            .await
            .map_err(|err| Error::Transport(format!("fetching {}: {}", url, err)))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "fetching {} failed: HTTP {}",
                url,
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|err| Error::Transport(format!("reading {}: {}", url, err)))?;
        parse_feed(&body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    id: String,
    title: String,
    updated: String,
    published: Option<String>,
    summary: String,
    #[serde(rename = "link")]
    links: Vec<RawLink>,
    #[serde(alias = "cap:event")]
    event: Option<String>,
    #[serde(alias = "cap:effective")]
    effective: Option<String>,
    #[serde(alias = "cap:expires")]
    expires: Option<String>,
    #[serde(alias = "cap:status")]
    status: Option<String>,
    #[serde(rename = "msgType", alias = "cap:msgType")]
    msg_type: Option<String>,
    #[serde(alias = "cap:category")]
    category: Option<String>,
    #[serde(alias = "cap:urgency")]
    urgency: Option<String>,
    #[serde(alias = "cap:severity")]
    severity: Option<String>,
    #[serde(alias = "cap:certainty")]
    certainty: Option<String>,
    #[serde(alias = "cap:description")]
    description: Option<String>,
    #[serde(alias = "cap:instruction")]
    instruction: Option<String>,
    #[serde(rename = "areaDesc", alias = "cap:areaDesc")]
    area_desc: Option<String>,
    #[serde(alias = "cap:polygon")]
    polygon: Option<String>,
    #[serde(alias = "cap:geocode")]
    geocode: Option<RawValues>,
    #[serde(rename = "parameter", alias = "cap:parameter")]
    parameters: Vec<RawValues>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

/// Either `valueName`/`value` pairs or direct `SAME`/`UGC` children.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawValues {
    #[serde(rename = "valueName", alias = "cap:valueName")]
    names: Vec<String>,
    #[serde(rename = "value", alias = "cap:value")]
    values: Vec<String>,
    #[serde(rename = "SAME", alias = "cap:SAME")]
    same: Vec<String>,
    #[serde(rename = "UGC", alias = "cap:UGC")]
    ugc: Vec<String>,
}

impl RawValues {
    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.trim(), value.trim()))
    }

    fn into_geocode(self) -> Option<Geocode> {
        let mut geocode = Geocode::default();
        for (name, value) in self.pairs() {
            match name.to_ascii_uppercase().as_str() {
                "FIPS6" | "SAME" => geocode.same.push(value.to_string()),
                "UGC" => geocode.ugc.push(value.to_string()),
                _ => {}
            }
        }
        geocode.same.extend(non_empty_all(self.same));
        geocode.ugc.extend(non_empty_all(self.ugc));
        (!geocode.is_empty()).then_some(geocode)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty_all(values: Vec<String>) -> impl Iterator<Item = String> {
    values.into_iter().filter_map(|v| non_empty(Some(v)))
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = non_empty(value)?;
    match DateTime::parse_from_rfc3339(&value) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(err) => {
            tracing::debug!(value = %value, error = %err, "ignoring unparseable alert timestamp");
            None
        }
    }
}

fn parse_enum<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    non_empty(value).and_then(|v| v.parse().ok())
}

impl RawEntry {
    fn into_alert(self) -> Alert {
        let link = self
            .links
            .into_iter()
            .find_map(|link| non_empty(link.href).or_else(|| non_empty(link.text)))
            .unwrap_or_default();

        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for group in &self.parameters {
            for (name, value) in group.pairs() {
                if !name.is_empty() && !value.is_empty() {
                    parameters
                        .entry(name.to_string())
                        .or_default()
                        .push(value.to_string());
                }
            }
        }

        Alert {
            id: self.id.trim().to_string(),
            title: self.title.trim().to_string(),
            updated: self.updated.trim().to_string(),
            summary: self.summary.trim().to_string(),
            link,
            published: non_empty(self.published),
            event: non_empty(self.event),
            effective: parse_time(self.effective),
            expires: parse_time(self.expires),
            status: parse_enum(self.status),
            msg_type: parse_enum(self.msg_type),
            category: parse_enum(self.category),
            urgency: parse_enum(self.urgency),
            severity: parse_enum(self.severity),
            certainty: parse_enum(self.certainty),
            description: non_empty(self.description),
            instruction: non_empty(self.instruction),
            area_desc: non_empty(self.area_desc),
            polygon: non_empty(self.polygon),
            geocode: self.geocode.and_then(RawValues::into_geocode),
            parameters,
        }
    }
}

/// Decodes an alert feed document. The root element must be `feed`.
///
/// Entries without an `id` are skipped with a warning: the id is the
/// dedup key, and an empty one would make every id-less alert count as
/// already delivered after the first.
pub fn parse_feed(xml: &str) -> Result<Vec<Alert>> {
    ensure_feed_root(xml)?;
    let feed: RawFeed = quick_xml::de::from_str(xml)
        .map_err(|err| Error::Parse(format!("alert feed: {}", err)))?;
    let mut alerts = Vec::with_capacity(feed.entries.len());
    for alert in feed.entries.into_iter().map(RawEntry::into_alert) {
        if alert.id.is_empty() {
            tracing::warn!(title = %alert.title, updated = %alert.updated, "skipping feed entry without id");
            continue;
        }
        alerts.push(alert);
    }
    Ok(alerts)
}

fn ensure_feed_root(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"feed" {
                    return Ok(());
                }
                return Err(Error::Parse(format!(
                    "unexpected root element <{}>",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }
            Ok(Event::Eof) => return Err(Error::Parse("alert feed is empty".to_string())),
            Ok(_) => {}
            Err(err) => return Err(Error::Parse(format!("alert feed: {}", err))),
        }
    }
}
