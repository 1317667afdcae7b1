use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Postgres,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(Error::Config(format!("unknown store backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub nimbus_env: String,
    pub store_backend: StoreBackend,
    pub data_dir: String,
    pub database_url: Option<String>,
    pub slack_bot_token: Option<String>,
    pub target_channel_id: Option<String>,
    pub polling_interval_minutes: u64,
    pub health_check_interval_secs: u64,
    pub max_consecutive_failures: u32,
    pub admin_users: Vec<String>,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub api_bind: String,
    pub worker_bind: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nimbus_env = lookup("NIMBUS_ENV").unwrap_or_else(|| "dev".to_string());
        let store_backend = match lookup("NIMBUS_STORE") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::File,
        };
        let data_dir = lookup("NIMBUS_DATA_DIR").unwrap_or_else(|| "data".to_string());
        let database_url = lookup("DATABASE_URL").or_else(|| lookup("NIMBUS_DATABASE_URL"));
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL or NIMBUS_DATABASE_URL must be set for the postgres store".to_string(),
            ));
        }
        let slack_bot_token = lookup("SLACK_BOT_TOKEN").filter(|v| !v.is_empty());
        let target_channel_id = lookup("TARGET_CHANNEL_ID").filter(|v| !v.is_empty());
        let polling_interval_minutes = lookup("POLLING_INTERVAL_MINUTES")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(5);
        let health_check_interval_secs = lookup("NIMBUS_HEALTH_CHECK_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);
        let max_consecutive_failures = lookup("NIMBUS_MAX_CONSECUTIVE_FAILURES")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(3);
        let admin_users = lookup("NIMBUS_ADMIN_USERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let http_timeout_secs = lookup("NIMBUS_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30);
        let user_agent = lookup("NIMBUS_USER_AGENT")
            .unwrap_or_else(|| "NWS-Weather-Alerts-Slack/1.0".to_string());
        let api_bind = lookup("NIMBUS_API_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let worker_bind =
            lookup("NIMBUS_WORKER_BIND").unwrap_or_else(|| "0.0.0.0:3001".to_string());

        Ok(Self {
            nimbus_env,
            store_backend,
            data_dir,
            database_url,
            slack_bot_token,
            target_channel_id,
            polling_interval_minutes,
            health_check_interval_secs,
            max_consecutive_failures,
            admin_users,
            http_timeout_secs,
            user_agent,
            api_bind,
            worker_bind,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_minutes * 60)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
