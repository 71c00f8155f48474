// Slack Web API (chat.postMessage / chat.update) and Socket Mode ingestion.

pub mod error;
pub mod models;
pub mod socket_mode;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

pub use error::{Result, SlackError};
pub use models::{InboundEvent, InboundKind, PostedMessage};
pub use socket_mode::SocketModeClient;

use crate::models::{ApiStatus, ConnectionInfo, PostMessageRequest, UpdateMessageRequest};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Prefix of app-level tokens (Socket Mode).
pub const APP_TOKEN_PREFIX: &str = "xapp-";
/// Prefix of bot user OAuth tokens (Web API).
pub const BOT_TOKEN_PREFIX: &str = "xoxb-";

#[derive(Debug, Clone)]
pub struct SlackOptions {
    pub bot_token: String,
    pub app_token: String,
}

impl SlackOptions {
    /// Checks both tokens carry the prefix Slack issues them with.
    pub fn validate(&self) -> Result<()> {
        if !self.app_token.starts_with(APP_TOKEN_PREFIX) {
            return Err(SlackError::InvalidToken(format!(
                "SLACK_APP_TOKEN must have the prefix \"{}\"",
                APP_TOKEN_PREFIX
            )));
        }
        if !self.bot_token.starts_with(BOT_TOKEN_PREFIX) {
            return Err(SlackError::InvalidToken(format!(
                "SLACK_BOT_TOKEN must have the prefix \"{}\"",
                BOT_TOKEN_PREFIX
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SlackService {
    options: SlackOptions,
    http_client: Client,
    base_url: String,
}

impl SlackService {
    pub fn new(options: SlackOptions) -> Self {
        Self {
            options,
            http_client: Client::new(),
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    /// Point the client at another API root (local stubs).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn options(&self) -> &SlackOptions {
        &self.options
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<PostedMessage> {
        let body = PostMessageRequest { channel, text };
        self.call("chat.postMessage", &self.options.bot_token, Some(&body))
            .await
    }

    pub async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()> {
        let body = UpdateMessageRequest { channel, ts, text };
        let _: serde_json::Value = self
            .call("chat.update", &self.options.bot_token, Some(&body))
            .await?;
        Ok(())
    }

    /// Ask for a Socket Mode websocket URL. Each URL is good for one connection.
    pub async fn open_connection(&self) -> Result<String> {
        let info: ConnectionInfo = self
            .call::<(), _>("apps.connections.open", &self.options.app_token, None)
            .await?;
        Ok(info.url)
    }

    async fn call<B, T>(&self, method: &str, token: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http_client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let payload: serde_json::Value = response.json().await?;

        let status: ApiStatus = serde_json::from_value(payload.clone())?;
        if !status.ok {
            let error = status.error.unwrap_or_else(|| "unknown".to_string());
            warn!(method, error = %error, "Slack API call failed");
            return Err(SlackError::Api {
                method: method.to_string(),
                error,
            });
        }

        debug!(method, "Slack API call succeeded");
        Ok(serde_json::from_value(payload)?)
    }
}
