use anyhow::{Context, Result};
use dotenvy::dotenv;
use slack::SlackOptions;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_port: u16,
    /// Base URL the relay uses to reach the chat endpoint
    pub backend_url: String,
    pub streamed_response: bool,
    pub slack_app_token: String,
    pub slack_bot_token: String,
    pub gemini_api_key: String,
    pub shutdown_timeout: Duration,
    /// Export spans to stdout
    pub otel_stdout: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_port: u16 = lookup("BACKEND_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("BACKEND_PORT must be a valid port number")?;

        let backend_url = lookup("BACKEND_URL")
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}/", backend_port));

        // Only the exact string "true" enables streaming
        let streamed_response = lookup("STREAMED_RESPONSE")
            .map(|v| v == "true")
            .unwrap_or(true);

        let slack_app_token = lookup("SLACK_APP_TOKEN").context("SLACK_APP_TOKEN must be set")?;
        let slack_bot_token = lookup("SLACK_BOT_TOKEN").context("SLACK_BOT_TOKEN must be set")?;

        let gemini_api_key = lookup("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?;

        let shutdown_timeout = Duration::from_secs(
            lookup("SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("SHUTDOWN_TIMEOUT_SECS must be a whole number of seconds")?,
        );

        let otel_stdout = match lookup("OTEL_STDOUT") {
            Some(value) => value
                .parse()
                .context("OTEL_STDOUT must be \"true\" or \"false\"")?,
            None => true,
        };

        let config = Self {
            backend_port,
            backend_url,
            streamed_response,
            slack_app_token,
            slack_bot_token,
            gemini_api_key,
            shutdown_timeout,
            otel_stdout,
        };
        config.slack_options().validate()?;

        Ok(config)
    }

    /// Credentials for the Slack Web API and Socket Mode.
    pub fn slack_options(&self) -> SlackOptions {
        SlackOptions {
            bot_token: self.slack_bot_token.clone(),
            app_token: self.slack_app_token.clone(),
        }
    }
}
