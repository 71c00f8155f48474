//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::kernel::ServerDeps;
use crate::server::routes::{
    chat_stream_handler, health_handler, method_not_allowed, CHAT_STREAM_PATH,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps) -> Router {
    let state = AppState {
        deps: Arc::new(deps),
    };

    Router::new()
        .route(
            CHAT_STREAM_PATH,
            post(chat_stream_handler).fallback(method_not_allowed),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// How the listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every open response finished within the grace period.
    Drained,
    /// Responses were still open at the deadline; the server was aborted.
    TimedOut,
}

/// Serve `app` until `shutdown` is cancelled.
///
/// On cancellation the listener stops accepting connections and open
/// responses (event streams included) get `grace` to finish. Connections
/// still open after that are abandoned to the runtime.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<ShutdownOutcome> {
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    tokio::select! {
        joined = &mut server => {
            joined.context("Server task failed")?.context("Server failed")?;
            return Ok(ShutdownOutcome::Drained);
        }
        () = shutdown.cancelled() => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined
                .context("Server task failed")?
                .context("Server shutdown failed")?;
            info!("All open responses finished");
            Ok(ShutdownOutcome::Drained)
        }
        Err(_) => {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Open responses did not finish in time, aborting"
            );
            server.abort();
            Ok(ShutdownOutcome::TimedOut)
        }
    }
}
