use thiserror::Error;

/// Failures while reading the framer's event stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event stream interrupted: {0}")]
    Transport(String),

    #[error("event stream line is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("could not parse frame payload {data:?}")]
    Json {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected frame payload: {0}")]
    UnexpectedPayload(String),
}

/// Failures of one relay attempt. None of them escape the per-event task.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("could not deliver message: {0:#}")]
    Delivery(anyhow::Error),

    #[error("invalid response from backend")]
    InvalidResponse(#[source] reqwest::Error),

    #[error("unexpected response from backend (status {status}, content type {content_type:?})")]
    UnexpectedResponse {
        status: reqwest::StatusCode,
        content_type: String,
    },
}
