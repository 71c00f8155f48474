//! Chat endpoint tests.
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot` against the
//! deterministic mock engine.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use relay_core::{
    common::{ChatResponse, StreamFrame},
    kernel::{BaseTextGenerator, FragmentStream, MockTextGenerator, ServerDeps, TestDependencies},
    relay::{assemble, project, DecodeError, FrameDecoder, RelayError},
    server::build_app,
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

const SCENARIO_BODY: &str = r#"{"user_id":"abc","query":"What are goroutines?"}"#;

// ============================================================================
// Test Helpers
// ============================================================================

fn scenario_engine() -> MockTextGenerator {
    MockTextGenerator::new(["Goroutines are ", "lightweight threads."])
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/stream")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(deps: &TestDependencies, streamed: bool, request: Request<Body>) -> Response {
    build_app(deps.server_deps(streamed))
        .oneshot(request)
        .await
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Engine whose stream must never be polled once it has ended.
struct SilentGenerator;

#[async_trait]
impl BaseTextGenerator for SilentGenerator {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    fn generate_stream(&self, _prompt: &str) -> FragmentStream {
        // `unfold` panics when polled after returning `None`
        stream::unfold((), |()| async { None::<(anyhow::Result<String>, ())> }).boxed()
    }
}

fn decode(response: Response) -> FrameDecoder {
    FrameDecoder::new(response.into_body().into_data_stream())
}

// ============================================================================
// Streaming mode
// ============================================================================

#[tokio::test]
async fn streamed_scenario_emits_exact_frames() {
    let deps = TestDependencies::new(scenario_engine());

    let response = send(&deps, true, chat_request(SCENARIO_BODY)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(
        body_string(response).await,
        concat!(
            "id: 1\nevent: message_part\ndata: {\"text_chunk\": \"Goroutines are \"}\n\n",
            "id: 2\nevent: message_part\ndata: {\"text_chunk\": \"lightweight threads.\"}\n\n",
            "id: 3\nevent: stream_end\ndata: {\"status\": \"done\"}\n\n",
        )
    );
    assert_eq!(deps.generator.calls(), vec!["What are goroutines?".to_string()]);
}

#[tokio::test]
async fn streamed_ids_are_contiguous_and_end_once() {
    let deps = TestDependencies::new(MockTextGenerator::new(["a", "b", "c", "d", "e"]));

    let response = send(&deps, true, chat_request(SCENARIO_BODY)).await;
    let frames: Vec<StreamFrame> = decode(response).map(|f| f.unwrap()).collect().await;

    let ids: Vec<u64> = frames.iter().map(StreamFrame::sequence).collect();
    assert_eq!(ids, (1..=6).collect::<Vec<_>>());

    let ends = frames
        .iter()
        .filter(|f| matches!(f, StreamFrame::StreamEnd { .. }))
        .count();
    assert_eq!(ends, 1);
    assert!(matches!(frames.last(), Some(StreamFrame::StreamEnd { .. })));
}

#[tokio::test]
async fn empty_generation_streams_only_stream_end() {
    let deps = TestDependencies::new(MockTextGenerator::new(Vec::<String>::new()));

    let response = send(&deps, true, chat_request(SCENARIO_BODY)).await;

    assert_eq!(
        body_string(response).await,
        "id: 1\nevent: stream_end\ndata: {\"status\": \"done\"}\n\n"
    );
}

#[tokio::test]
async fn exhausted_engine_stream_still_ends_cleanly() {
    let app = build_app(ServerDeps::new(Arc::new(SilentGenerator), true));

    let response = app.oneshot(chat_request(SCENARIO_BODY)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        "id: 1\nevent: stream_end\ndata: {\"status\": \"done\"}\n\n"
    );
}

// ============================================================================
// JSON mode
// ============================================================================

#[tokio::test]
async fn unstreamed_response_is_json() {
    let deps = TestDependencies::new(scenario_engine());

    let response = send(&deps, false, chat_request(SCENARIO_BODY)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let body: ChatResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body.full_response, "Goroutines are lightweight threads.");
}

#[tokio::test]
async fn streamed_chunks_concatenate_to_full_response() {
    let fragments = ["Rust ", "has ", "ownership", ", ", "borrowing ", "and lifetimes."];

    let streamed = TestDependencies::new(MockTextGenerator::new(fragments));
    let response = send(&streamed, true, chat_request(SCENARIO_BODY)).await;
    let concatenated: String = decode(response)
        .filter_map(|frame| async move {
            match frame.unwrap() {
                StreamFrame::TextChunk { text, .. } => Some(text),
                StreamFrame::StreamEnd { .. } => None,
            }
        })
        .collect()
        .await;

    let unstreamed = TestDependencies::new(MockTextGenerator::new(fragments));
    let response = send(&unstreamed, false, chat_request(SCENARIO_BODY)).await;
    let body: ChatResponse = serde_json::from_str(&body_string(response).await).unwrap();

    assert_eq!(concatenated, body.full_response);
}

// ============================================================================
// Request validation
// ============================================================================

#[tokio::test]
async fn malformed_body_is_rejected_before_generation() {
    for body in ["{not json", r#"{"user_id":"abc"}"#, ""] {
        let deps = TestDependencies::new(scenario_engine());

        let response = send(&deps, true, chat_request(body)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body:?}");
        assert_eq!(body_string(response).await, "invalid request");
        assert_eq!(deps.generator.call_count(), 0);
    }
}

#[tokio::test]
async fn non_post_is_method_not_allowed() {
    let deps = TestDependencies::new(scenario_engine());

    for method in ["GET", "PUT", "DELETE"] {
        let request = Request::builder()
            .method(method)
            .uri("/v1/chat/stream")
            .body(Body::empty())
            .unwrap();

        let response = send(&deps, true, request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
    assert_eq!(deps.generator.call_count(), 0);
}

#[tokio::test]
async fn request_with_trace_context_is_served() {
    let deps = TestDependencies::new(scenario_engine());
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/stream")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::from(SCENARIO_BODY))
        .unwrap();

    let response = send(&deps, false, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Engine failures
// ============================================================================

#[tokio::test]
async fn immediate_engine_failure_is_500() {
    for streamed in [true, false] {
        let deps = TestDependencies::new(scenario_engine().failing_after(0));

        let response = send(&deps, streamed, chat_request(SCENARIO_BODY)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_string(response).await,
            "could not generate response properly"
        );
    }
}

#[tokio::test]
async fn failure_after_two_fragments_truncates_stream() {
    let deps = TestDependencies::new(MockTextGenerator::new(["A", "B", "C"]).failing_after(2));

    let response = send(&deps, true, chat_request(SCENARIO_BODY)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let items: Vec<Result<StreamFrame, DecodeError>> = decode(response).collect().await;

    let chunks: Vec<&StreamFrame> = items.iter().filter_map(|i| i.as_ref().ok()).collect();
    assert_eq!(
        chunks,
        vec![
            &StreamFrame::TextChunk {
                sequence: 1,
                text: "A".to_string()
            },
            &StreamFrame::TextChunk {
                sequence: 2,
                text: "B".to_string()
            },
        ]
    );
    assert!(matches!(items.last(), Some(Err(DecodeError::Transport(_)))));
}

#[tokio::test]
async fn projection_of_truncated_stream_keeps_marker() {
    let deps = TestDependencies::new(MockTextGenerator::new(["A", "B", "C"]).failing_after(2));

    let response = send(&deps, true, chat_request(SCENARIO_BODY)).await;
    let signals = assemble(decode(response));

    let err = assert_err!(project(deps.messenger.as_ref(), "C1", signals).await);
    assert!(matches!(err, RelayError::Decode(DecodeError::Transport(_))));

    assert_eq!(deps.messenger.posts().len(), 1);
    assert_eq!(deps.messenger.last_text().as_deref(), Some("AB..."));
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_reports_mode() {
    let deps = TestDependencies::new(scenario_engine());
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = send(&deps, true, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = assert_ok!(serde_json::from_str(&body_string(response).await));
    assert_eq!(body, serde_json::json!({"status": "ok", "streamed_response": true}));
}
