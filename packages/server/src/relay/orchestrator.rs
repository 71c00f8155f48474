//! One relay per inbound chat event.
//!
//! POSTs the query to the framer, forwards the trace context, and either
//! projects the event stream onto a chat message or posts the JSON answer.
//! Only a connection failure produces a user-visible fallback message.

use std::sync::Arc;

use axum::http::HeaderMap;
use reqwest::header::CONTENT_TYPE;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::common::{ChatEvent, ChatResponse};
use crate::kernel::{inject_context, BaseMessenger};
use crate::relay::decoder::{assemble, FrameDecoder};
use crate::relay::error::RelayError;
use crate::relay::projector::{project, ProjectionOutcome};
use crate::server::routes::CHAT_STREAM_PATH;

/// Posted when the framer cannot be reached at all.
pub const FALLBACK_MESSAGE: &str = "Could not connect to the backend. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Event stream projected onto a message.
    Streamed(ProjectionOutcome),
    /// JSON answer posted as one message.
    Posted,
    /// Backend unreachable; the fallback message was posted.
    Fallback,
}

#[derive(Clone)]
pub struct Relay {
    http: reqwest::Client,
    endpoint: String,
    messenger: Arc<dyn BaseMessenger>,
}

impl Relay {
    /// `backend_url` is the framer's base URL, e.g. `http://localhost:3000/`.
    pub fn new(backend_url: &str, messenger: Arc<dyn BaseMessenger>) -> Self {
        Self::with_client(reqwest::Client::new(), backend_url, messenger)
    }

    pub fn with_client(
        http: reqwest::Client,
        backend_url: &str,
        messenger: Arc<dyn BaseMessenger>,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}{}", backend_url.trim_end_matches('/'), CHAT_STREAM_PATH),
            messenger,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Handle `event` on its own task. Never blocks the caller; errors are
    /// logged inside the task.
    pub fn dispatch(&self, event: ChatEvent) -> JoinHandle<()> {
        let relay = self.clone();
        let span = info_span!(
            "ReceivedSlackMessage",
            event = event.kind.as_str(),
            channel = %event.channel,
            user_id = %event.user_id,
        );

        tokio::spawn(
            async move {
                match relay.run(event).await {
                    Ok(outcome) => info!(?outcome, "Relay finished"),
                    Err(e) => error!(error = %e, "Relay failed"),
                }
            }
            .instrument(span),
        )
    }

    /// Run one relay to completion.
    pub async fn run(&self, event: ChatEvent) -> Result<RelayOutcome, RelayError> {
        let span = info_span!(
            "SendingPayload",
            endpoint = %self.endpoint,
            http_method = "POST",
            http_status_code = tracing::field::Empty,
        );

        let response = async {
            let mut headers = HeaderMap::new();
            inject_context(&mut headers);

            self.http
                .post(&self.endpoint)
                .headers(headers)
                .json(&event.to_query())
                .send()
                .await
        }
        .instrument(span.clone())
        .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(parent: &span, error = %e, "Could not connect to the backend");
                self.messenger
                    .post_message(&event.channel, FALLBACK_MESSAGE)
                    .await
                    .map_err(RelayError::Delivery)?;
                return Ok(RelayOutcome::Fallback);
            }
        };
        span.record("http_status_code", response.status().as_u16());

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        self.process_response(&event.channel, response, content_type)
            .instrument(info_span!("ProcessBackendResponse", content_type = tracing::field::Empty))
            .await
    }

    async fn process_response(
        &self,
        channel: &str,
        response: reqwest::Response,
        content_type: String,
    ) -> Result<RelayOutcome, RelayError> {
        tracing::Span::current().record("content_type", content_type.as_str());

        // Prefix match: the header may carry a charset
        if content_type.starts_with("text/event-stream") {
            let signals = assemble(FrameDecoder::new(response.bytes_stream()));
            let outcome = project(self.messenger.as_ref(), channel, signals).await?;
            return Ok(RelayOutcome::Streamed(outcome));
        }

        if content_type.starts_with("application/json") {
            let body: ChatResponse = response.json().await.map_err(|e| {
                warn!(error = %e, "Received invalid JSON response");
                RelayError::InvalidResponse(e)
            })?;
            self.messenger
                .post_message(channel, &body.full_response)
                .await
                .map_err(RelayError::Delivery)?;
            info!("Posted full JSON response");
            return Ok(RelayOutcome::Posted);
        }

        Err(RelayError::UnexpectedResponse {
            status: response.status(),
            content_type,
        })
    }
}
