//! Error types for the Gemini client.

use thiserror::Error;

/// Result type for Gemini client operations.
pub type Result<T> = std::result::Result<T, GenAIError>;

/// Gemini client errors.
#[derive(Debug, Error)]
pub enum GenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout, body interrupted)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, blocked prompt, empty candidates)
    #[error("API error: {0}")]
    Api(String),

    /// Parse error (invalid JSON, invalid UTF-8, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}
