use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    streamed_response: bool,
}

/// Liveness probe. Reports the response mode the chat endpoint runs in.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        streamed_response: state.deps.streamed_response,
    })
}
