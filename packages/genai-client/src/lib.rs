//! Minimal Gemini REST API client
//!
//! A small client for the Gemini `generateContent` API with no domain-specific
//! logic. Supports one-shot generation and SSE streaming of text fragments.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use genai_client::GenAIClient;
//!
//! let client = GenAIClient::from_env()?;
//!
//! // Full response
//! let text = client.generate_content("What are goroutines?").await?;
//!
//! // Streamed fragments
//! let mut stream = client.generate_content_stream("What are goroutines?").await?;
//! while let Some(fragment) = stream.next().await {
//!     print!("{}", fragment?);
//! }
//! ```

pub mod error;
pub mod streaming;
pub mod types;

pub use error::{GenAIError, Result};
pub use streaming::GenerateContentStream;
pub use types::*;

use reqwest::Client;
use tracing::{debug, warn};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for every request unless overridden with [`GenAIClient::with_model`].
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini API client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct GenAIClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GenAIClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create from environment variable `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| GenAIError::Config("GEMINI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (proxies, local stubs).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    /// Generate a complete response for `prompt`.
    pub async fn generate_content(&self, prompt: &str) -> Result<String> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(self.endpoint("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::user_prompt(prompt))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Gemini request failed");
                GenAIError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini API error");
            return Err(GenAIError::Api(format!("Gemini API error: {}", error_text)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenAIError::Parse(e.to_string()))?;

        let text = body
            .text()
            .ok_or_else(|| GenAIError::Api("No text in Gemini response".into()))?;

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis(),
            "Gemini content generated"
        );

        Ok(text)
    }

    /// Streaming generation.
    ///
    /// Returns a stream of text fragments in generation order. Errors that
    /// happen after the response head arrives surface as stream items.
    pub async fn generate_content_stream(&self, prompt: &str) -> Result<GenerateContentStream> {
        let response = self
            .http_client
            .post(format!("{}?alt=sse", self.endpoint("streamGenerateContent")))
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::user_prompt(prompt))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Gemini streaming request failed");
                GenAIError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini streaming API error");
            return Err(GenAIError::Api(format!(
                "Gemini streaming API error: {}",
                error_text
            )));
        }

        Ok(GenerateContentStream::new(response.bytes_stream()))
    }
}
