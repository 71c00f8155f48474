//! Trace context crosses the relay → chat endpoint hop.
//!
//! Installs the global subscriber, so it lives in its own test binary.

use std::sync::{Arc, Mutex};

use axum::{http::HeaderMap, routing::post, Json, Router};
use opentelemetry::trace::TraceContextExt;
use relay_core::{
    common::{ChatEvent, EventKind},
    kernel::{extract_context, init_telemetry, MockMessenger},
    relay::Relay,
};
use serde_json::json;
use tokio_test::assert_ok;

#[tokio::test]
async fn relay_sends_traceparent_to_backend() {
    let providers = assert_ok!(init_telemetry(false));

    let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::new(Mutex::new(None));
    let app = Router::new().route(
        "/v1/chat/stream",
        post({
            let seen = seen.clone();
            move |headers: HeaderMap| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(headers);
                    Json(json!({"full_response": "ok"}))
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let messenger = Arc::new(MockMessenger::new());
    let relay = Relay::new(&format!("http://{}/", addr), messenger.clone());
    relay
        .dispatch(ChatEvent {
            channel: "C1".to_string(),
            user_id: "abc".to_string(),
            query: "hello".to_string(),
            kind: EventKind::Mention,
        })
        .await
        .unwrap();

    let headers = seen.lock().unwrap().take().expect("backend was not called");
    let traceparent = headers
        .get("traceparent")
        .expect("traceparent header missing")
        .to_str()
        .unwrap()
        .to_string();

    // 00-<trace id>-<span id>-<flags>
    let parts: Vec<&str> = traceparent.split('-').collect();
    assert_eq!(parts.len(), 4, "traceparent: {traceparent}");
    assert_eq!(parts[0], "00");
    assert_eq!(parts[1].len(), 32);
    assert_ne!(parts[1], "0".repeat(32));

    // The endpoint side reads it back as a valid remote parent
    let cx = extract_context(&headers);
    let remote = cx.span().span_context().clone();
    assert!(remote.is_valid());
    assert!(remote.is_remote());
    assert_eq!(remote.trace_id().to_string(), parts[1]);

    assert_eq!(messenger.last_text().as_deref(), Some("ok"));
    providers.shutdown();
}
