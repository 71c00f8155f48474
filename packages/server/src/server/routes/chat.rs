//! Chat endpoint.
//!
//! POST /v1/chat/stream
//!
//! Body `{"user_id": ..., "query": ...}`. Answers either with one JSON object
//! `{"full_response": ...}` or, when streaming is enabled, with an event stream
//! carrying one frame per engine fragment followed by a single `stream_end`
//! frame (see `common::frame`).
//!
//! The first fragment is awaited before the response head is sent, so an
//! engine that fails immediately still gets a proper 500. A failure after
//! that point aborts the body: the peer sees a truncated stream without
//! `stream_end`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, error, field, info, info_span, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::common::{ChatQuery, ChatResponse, StreamFrame, MESSAGE_PART_EVENT, STREAM_END_EVENT};
use crate::kernel::extract_context;
use crate::server::app::AppState;

pub const CHAT_STREAM_PATH: &str = "/v1/chat/stream";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request")]
    InvalidRequest(#[source] serde_json::Error),

    #[error("could not generate response properly")]
    Generation(#[source] anyhow::Error),
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Chat handler.
///
/// The request span joins the caller's trace when a `traceparent` header is
/// present.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ChatError> {
    let span = info_span!(
        "ProcessingChatRequest",
        streamed = state.deps.streamed_response,
        user_id = field::Empty,
        chunks_count = field::Empty,
    );
    if let Err(e) = span.set_parent(extract_context(&headers)) {
        debug!(error = ?e, "Could not attach remote trace context");
    }

    handle_chat(state, body, span.clone()).instrument(span).await
}

async fn handle_chat(state: AppState, body: Bytes, span: Span) -> Result<Response, ChatError> {
    let query: ChatQuery = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejecting malformed chat request");
        ChatError::InvalidRequest(e)
    })?;
    span.record("user_id", query.user_id.as_str());

    let generator = state.deps.generator.clone();

    if !state.deps.streamed_response {
        let full_response = generator.generate(&query.query).await.map_err(|e| {
            error!(error = %e, "Could not generate AI response");
            ChatError::Generation(e)
        })?;

        info!("Sent full JSON response");
        return Ok(Json(ChatResponse { full_response }).into_response());
    }

    // Fused: the first poll below may already exhaust the stream
    let mut fragments = generator.generate_stream(&query.query).fuse();

    let first = match fragments.next().await {
        Some(Err(e)) => {
            error!(error = %e, "Could not generate AI response");
            return Err(ChatError::Generation(e));
        }
        first => first,
    };

    let frames = frame_stream(stream::iter(first).chain(fragments), span);

    Ok(Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response())
}

struct FrameState<S> {
    fragments: S,
    sequence: u64,
    finished: bool,
    span: Span,
}

/// Turn engine fragments into SSE events, one body chunk each.
///
/// Ends with a `stream_end` frame when the fragments run out. An engine error
/// is passed through as the final item so the transport aborts the response
/// instead of ending it cleanly.
pub fn frame_stream<S>(fragments: S, span: Span) -> impl Stream<Item = anyhow::Result<Event>> + Send
where
    S: Stream<Item = anyhow::Result<String>> + Unpin + Send,
{
    let state = FrameState {
        fragments,
        sequence: 0,
        finished: false,
        span,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        match state.fragments.next().await {
            Some(Ok(text)) => {
                state.sequence += 1;
                let frame = StreamFrame::TextChunk {
                    sequence: state.sequence,
                    text,
                };
                debug!(
                    parent: &state.span,
                    chunk_id = state.sequence,
                    event = MESSAGE_PART_EVENT,
                    "Sent text chunk"
                );
                Some((Ok(frame.to_event()), state))
            }
            Some(Err(e)) => {
                error!(
                    parent: &state.span,
                    error = %e,
                    chunks_sent = state.sequence,
                    "Generation failed mid-stream, aborting response"
                );
                state.finished = true;
                Some((Err(e), state))
            }
            None => {
                state.span.record("chunks_count", state.sequence);
                let frame = StreamFrame::StreamEnd {
                    sequence: state.sequence + 1,
                };
                debug!(
                    parent: &state.span,
                    chunk_id = frame.sequence(),
                    event = STREAM_END_EVENT,
                    status = "done",
                    "Sent status chunk"
                );
                state.finished = true;
                Some((Ok(frame.to_event()), state))
            }
        }
    })
}

/// Fallback for every method other than POST.
pub async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    /// Render the events the way the handler sends them.
    async fn render(fragments: Vec<anyhow::Result<String>>) -> Vec<Result<String, String>> {
        Sse::new(frame_stream(stream::iter(fragments), Span::none()))
            .into_response()
            .into_body()
            .into_data_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| String::from_utf8(bytes.to_vec()).unwrap())
                    .map_err(|e| e.to_string())
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_frames_are_numbered_and_terminated() {
        let body: String = render(vec![Ok("a".into()), Ok("b".into())])
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            body,
            concat!(
                "id: 1\nevent: message_part\ndata: {\"text_chunk\": \"a\"}\n\n",
                "id: 2\nevent: message_part\ndata: {\"text_chunk\": \"b\"}\n\n",
                "id: 3\nevent: stream_end\ndata: {\"status\": \"done\"}\n\n",
            )
        );
    }

    #[tokio::test]
    async fn test_empty_generation_still_ends_stream() {
        let chunks = render(vec![]).await;
        assert_eq!(
            chunks,
            vec![Ok("id: 1\nevent: stream_end\ndata: {\"status\": \"done\"}\n\n".to_string())]
        );
    }

    #[tokio::test]
    async fn test_error_ends_stream_without_stream_end() {
        let chunks = render(vec![
            Ok("a".into()),
            Err(anyhow::anyhow!("engine down")),
            Ok("never sent".into()),
        ])
        .await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(chunks[1].as_ref().unwrap_err().contains("engine down"));
    }

    #[tokio::test]
    async fn test_sse_headers() {
        let response = Sse::new(frame_stream(stream::iter(vec![]), Span::none())).into_response();

        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.ends_with(b"data: {\"status\": \"done\"}\n\n"));
    }
}
