// Main entry point for the chat relay

use std::sync::Arc;

use anyhow::{Context, Result};
use genai_client::GenAIClient;
use relay_core::{
    kernel::{init_telemetry, GenAIAdapter, ServerDeps, SlackAdapter},
    relay::Relay,
    server::{build_app, serve_with_shutdown},
    Config,
};
use slack::{InboundEvent, SlackService, SocketModeClient};
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging and trace export
    let providers = init_telemetry(config.otel_stdout).context("Failed to initialize telemetry")?;
    tracing::info!(
        streamed_response = config.streamed_response,
        "Starting chat relay"
    );

    // Build the chat endpoint
    let generator = GenAIAdapter::new(Arc::new(GenAIClient::new(config.gemini_api_key.clone())));
    let app = build_app(ServerDeps::new(
        Arc::new(generator),
        config.streamed_response,
    ));

    let addr = format!("0.0.0.0:{}", config.backend_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    let shutdown = CancellationToken::new();

    let server = tokio::spawn(serve_with_shutdown(
        listener,
        app,
        shutdown.clone(),
        config.shutdown_timeout,
    ));

    // Slack ingestion: Socket Mode feeds events to the relay
    let slack = SlackService::new(config.slack_options());
    let relay = Relay::new(
        &config.backend_url,
        Arc::new(SlackAdapter::new(Arc::new(slack.clone()))),
    );

    let (tx, mut rx) = mpsc::channel::<InboundEvent>(64);

    let socket_task = tokio::spawn({
        let shutdown = shutdown.clone();
        let socket = SocketModeClient::new(slack);
        async move {
            if let Err(e) = socket.run(tx, shutdown.clone()).await {
                tracing::error!(error = %e, "Slack Socket Mode failed, shutting down");
                shutdown.cancel();
            }
        }
    });

    let ingest_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            relay.dispatch(event.into());
        }
    });

    tokio::select! {
        () = shutdown_signal() => {},
        () = shutdown.cancelled() => {},
    }
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // Stop ingesting, then give open responses (including event streams) until
    // the deadline to finish.
    shutdown.cancel();

    match server.await {
        Ok(Ok(outcome)) => tracing::info!(?outcome, "Backend stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Backend shutdown failed"),
        Err(e) => tracing::error!(error = %e, "Backend task failed"),
    }

    socket_task.abort();
    ingest_task.abort();

    // Flush and stop trace export
    tracing::info!("Stopping OpenTelemetry...");
    providers.shutdown();

    tracing::info!("Graceful shutdown successful");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
