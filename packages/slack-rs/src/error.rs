use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlackError>;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("request to slack failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Slack answered with `"ok": false`.
    #[error("slack api error in {method}: {error}")]
    Api { method: String, error: String },

    #[error("could not parse slack response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("socket mode connection failed: {0}")]
    Socket(String),
}
