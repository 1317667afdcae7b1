use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declares one of the closed CAP value sets. Each variant maps to the exact
/// string the feed publishes.
macro_rules! cap_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                $(
                    if value.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("unknown {} value: {}", stringify!($name), value))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

cap_enum!(AlertStatus {
    Actual => "Actual",
    Exercise => "Exercise",
    System => "System",
    Test => "Test",
    Draft => "Draft",
});

cap_enum!(MessageType {
    Alert => "Alert",
    Update => "Update",
    Cancel => "Cancel",
    Ack => "Ack",
    Error => "Error",
});

cap_enum!(AlertCategory {
    Geo => "Geo",
    Met => "Met",
    Safety => "Safety",
    Security => "Security",
    Rescue => "Rescue",
    Fire => "Fire",
    Health => "Health",
    Env => "Env",
    Transport => "Transport",
    Infra => "Infra",
    Cbrne => "CBRNE",
    Other => "Other",
});

cap_enum!(Urgency {
    Immediate => "Immediate",
    Expected => "Expected",
    Future => "Future",
    Past => "Past",
    Unknown => "Unknown",
});

cap_enum!(Severity {
    Extreme => "Extreme",
    Severe => "Severe",
    Moderate => "Moderate",
    Minor => "Minor",
    Unknown => "Unknown",
});

cap_enum!(Certainty {
    Observed => "Observed",
    Likely => "Likely",
    Possible => "Possible",
    Unlikely => "Unlikely",
    Unknown => "Unknown",
});

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Geocode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub same: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ugc: Vec<String>,
}

impl Geocode {
    pub fn is_empty(&self) -> bool {
        self.same.is_empty() && self.ugc.is_empty()
    }
}

/// One weather-hazard notification as published by the upstream feed.
///
/// `id` is assigned upstream and stays stable across re-fetches of the same
/// event; it is the deduplication key for delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub updated: String,
    pub summary: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AlertStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<AlertCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<Certainty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocode: Option<Geocode>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl Alert {
    pub fn is_severe(&self) -> bool {
        matches!(self.severity, Some(Severity::Extreme | Severity::Severe))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|expires| expires <= now).unwrap_or(false)
    }

    /// Event name when the feed provides one, otherwise the entry title.
    pub fn headline(&self) -> &str {
        self.event.as_deref().unwrap_or(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_alert_id: Option<String>,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscription {
    pub url: String,
    #[serde(default)]
    pub zone: Option<String>,
    pub name: String,
    pub added_by: String,
}

/// Zone feeds installed on first start.
pub fn default_feeds() -> Vec<(String, NewSubscription)> {
    [("NJZ103", "Western Bergen County, NJ"), ("NJZ104", "Eastern Bergen County, NJ")]
        .into_iter()
        .map(|(zone, name)| {
            (
                format!("feed_{}", zone.to_lowercase()),
                NewSubscription {
                    url: format!("https://api.weather.gov/alerts/active.atom?zone={}", zone),
                    zone: Some(zone.to_string()),
                    name: name.to_string(),
                    added_by: "system".to_string(),
                },
            )
        })
        .collect()
}

pub const PROCESSED_ALERT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedAlertRecord {
    pub alert_id: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedAlertRecord {
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.processed_at > Duration::days(PROCESSED_ALERT_RETENTION_DAYS)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
    pub formatted_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
}

impl ResolvedLocation {
    pub fn from_coordinates(at: Coordinates) -> Self {
        let label = format!("{}, {}", at.latitude, at.longitude);
        Self {
            latitude: at.latitude,
            longitude: at.longitude,
            display_name: label.clone(),
            formatted_address: label,
            zipcode: None,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedLocation {
    pub user_id: String,
    pub nickname: String,
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub saved_at: DateTime<Utc>,
}

impl SavedLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn to_resolved(&self) -> ResolvedLocation {
        ResolvedLocation {
            latitude: self.latitude,
            longitude: self.longitude,
            display_name: self.nickname.clone(),
            formatted_address: self.formatted_address.clone(),
            zipcode: None,
        }
    }
}
