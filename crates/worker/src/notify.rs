use async_trait::async_trait;
use nimbus_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Chat platform seen by the poller and the health monitor.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `target` is a channel id or, for direct messages, a user id.
    async fn post_message(&self, target: &str, text: &str, blocks: Option<Value>) -> Result<()>;

    /// Cheap authenticated call used as a connectivity check.
    async fn probe(&self) -> Result<()>;
}

pub const SLACK_API_URL: &str = "https://slack.com/api";

pub struct SlackNotifier {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackNotifier {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("http client: {}", err)))?;
        Ok(Self {
            client,
            token: token.into(),
            base_url: SLACK_API_URL.to_string(),
        })
    }

    async fn call(&self, method: &str, body: Value) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Transport(format!("slack {}: {}", method, err)))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "slack {} failed: HTTP {}",
                method,
                resp.status()
            )));
        }

        let reply: SlackResponse = resp
            .json()
            .await
            .map_err(|err| Error::Parse(format!("slack {} response: {}", method, err)))?;
        check_reply(method, reply)
    }
}

fn check_reply(method: &str, reply: SlackResponse) -> Result<()> {
    if reply.ok {
        Ok(())
    } else {
        Err(Error::Transport(format!(
            "slack {} rejected: {}",
            method,
            reply.error.as_deref().unwrap_or("unknown_error")
        )))
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post_message(&self, target: &str, text: &str, blocks: Option<Value>) -> Result<()> {
        let mut body = json!({
            "channel": target,
            "text": text,
        });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }
        self.call("chat.postMessage", body).await
    }

    async fn probe(&self) -> Result<()> {
        self.call("auth.test", json!({})).await
    }
}
