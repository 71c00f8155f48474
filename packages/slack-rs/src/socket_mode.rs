//! Socket Mode ingestion.
//!
//! Opens a websocket with `apps.connections.open`, acknowledges every envelope
//! and forwards the user messages the bot should answer. The connection is
//! re-established after Slack asks for it (`disconnect`) or the socket drops.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SlackError};
use crate::models::{Envelope, InboundEvent, InboundKind};
use crate::SlackService;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

enum ConnectionEnd {
    Shutdown,
    Reconnect,
}

pub struct SocketModeClient {
    service: SlackService,
    reconnect_delay: Duration,
}

impl SocketModeClient {
    pub fn new(service: SlackService) -> Self {
        Self {
            service,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Forward inbound events to `tx` until `shutdown` fires or the receiver
    /// is dropped.
    ///
    /// Socket failures are retried after the reconnect delay. A rejected
    /// `apps.connections.open` call (bad token, missing scope) is returned.
    pub async fn run(&self, tx: mpsc::Sender<InboundEvent>, shutdown: CancellationToken) -> Result<()> {
        loop {
            match self.run_connection(&tx, &shutdown).await {
                Ok(ConnectionEnd::Shutdown) => break,
                Ok(ConnectionEnd::Reconnect) => info!("Slack socket closed, reconnecting"),
                Err(e @ SlackError::Api { .. }) => return Err(e),
                Err(e) => warn!(error = %e, "Connection failed. Retrying later..."),
            }

            if tx.is_closed() {
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("Slack Socket Mode stopped");
        Ok(())
    }

    async fn run_connection(
        &self,
        tx: &mpsc::Sender<InboundEvent>,
        shutdown: &CancellationToken,
    ) -> Result<ConnectionEnd> {
        let url = self.service.open_connection().await?;

        info!("Connecting to Slack with Socket Mode...");
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| SlackError::Socket(e.to_string()))?;
        info!("Connected to Slack with Socket Mode");

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_write.close().await;
                    return Ok(ConnectionEnd::Shutdown);
                }
                next = ws_read.next() => next,
            };

            let text = match next {
                Some(Ok(WsMessage::Text(text))) => text,
                Some(Ok(WsMessage::Close(_))) | None => return Ok(ConnectionEnd::Reconnect),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SlackError::Socket(e.to_string())),
            };

            let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(error = %e, "Ignoring unparseable socket frame");
                    continue;
                }
            };

            if let Some(envelope_id) = &envelope.envelope_id {
                let ack = json!({ "envelope_id": envelope_id });
                if let Err(e) = ws_write.send(WsMessage::Text(ack.to_string().into())).await {
                    warn!(error = %e, "Failed to ACK Slack envelope");
                }
            }

            match envelope.kind.as_str() {
                "hello" => info!("Received hello from slack. Good to go now"),
                "disconnect" => {
                    info!(reason = ?envelope.reason, "Slack requested disconnect");
                    return Ok(ConnectionEnd::Reconnect);
                }
                "events_api" => {
                    let Some(event) = inbound_event(&envelope) else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        debug!("Inbound event receiver dropped");
                        return Ok(ConnectionEnd::Shutdown);
                    }
                }
                other => debug!(kind = other, "Ignoring socket mode envelope"),
            }
        }
    }
}

/// Extract the message the bot should answer, if any.
///
/// Mentions are answered in any channel. Plain messages only in direct
/// messages, and never when sent by a bot or carrying a subtype (edits,
/// joins, ...).
pub fn inbound_event(envelope: &Envelope) -> Option<InboundEvent> {
    if envelope.kind != "events_api" {
        return None;
    }
    let event = envelope.payload.as_ref()?.event.as_ref()?;

    let kind = match event.kind.as_str() {
        "app_mention" => InboundKind::Mention,
        "message"
            if event.channel_type.as_deref() == Some("im")
                && event.bot_id.is_none()
                && event.subtype.is_none() =>
        {
            InboundKind::DirectMessage
        }
        other => {
            debug!(event_type = other, "Ignoring event");
            return None;
        }
    };

    let user = event.user.as_deref().filter(|u| !u.is_empty())?;
    let channel = event.channel.as_deref()?;

    Some(InboundEvent {
        kind,
        channel: channel.to_string(),
        user: user.to_string(),
        text: event.text.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlackOptions;
    use axum::{
        extract::ws::{Message, WebSocketUpgrade},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::Value;

    fn envelope(raw: Value) -> Envelope {
        serde_json::from_value(raw).unwrap()
    }

    fn events_api(event: Value) -> Envelope {
        envelope(json!({
            "type": "events_api",
            "envelope_id": "e1",
            "payload": { "type": "event_callback", "event": event }
        }))
    }

    #[test]
    fn test_app_mention_is_answered() {
        let event = inbound_event(&events_api(json!({
            "type": "app_mention",
            "user": "U1",
            "channel": "C1",
            "text": "<@B1> What are goroutines?"
        })))
        .unwrap();

        assert_eq!(event.kind, InboundKind::Mention);
        assert_eq!(event.channel, "C1");
        assert_eq!(event.user, "U1");
        assert_eq!(event.text, "<@B1> What are goroutines?");
    }

    #[test]
    fn test_direct_message_is_answered() {
        let event = inbound_event(&events_api(json!({
            "type": "message",
            "channel_type": "im",
            "user": "U1",
            "channel": "D1",
            "text": "hi"
        })))
        .unwrap();

        assert_eq!(event.kind, InboundKind::DirectMessage);
        assert_eq!(event.channel, "D1");
    }

    #[test]
    fn test_filtered_messages() {
        let cases = [
            json!({"type": "message", "channel_type": "channel", "user": "U1", "channel": "C1", "text": "hi"}),
            json!({"type": "message", "channel_type": "im", "bot_id": "B1", "user": "U1", "channel": "D1", "text": "hi"}),
            json!({"type": "message", "channel_type": "im", "subtype": "message_changed", "channel": "D1"}),
            json!({"type": "message", "channel_type": "im", "user": "", "channel": "D1", "text": "hi"}),
            json!({"type": "reaction_added", "user": "U1"}),
        ];

        for case in cases {
            assert!(inbound_event(&events_api(case.clone())).is_none(), "{case}");
        }
    }

    #[test]
    fn test_non_event_envelopes_are_ignored() {
        assert!(inbound_event(&envelope(json!({"type": "hello"}))).is_none());
        assert!(inbound_event(&envelope(json!({
            "type": "disconnect",
            "reason": "refresh_requested"
        })))
        .is_none());
    }

    #[tokio::test]
    async fn test_run_acks_and_forwards_events() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<String>();

        let ws_url = format!("ws://{}/socket", addr);
        let app = Router::new()
            .route(
                "/apps.connections.open",
                post(move || {
                    let ws_url = ws_url.clone();
                    async move { Json(json!({"ok": true, "url": ws_url})) }
                }),
            )
            .route(
                "/socket",
                get(move |ws: WebSocketUpgrade| {
                    let ack_tx = ack_tx.clone();
                    async move {
                        ws.on_upgrade(move |mut socket| async move {
                            let _ = socket.send(Message::Text(json!({"type": "hello"}).to_string())).await;
                            let event = json!({
                                "type": "events_api",
                                "envelope_id": "env-1",
                                "payload": {"event": {
                                    "type": "app_mention", "user": "U1", "channel": "C1", "text": "hello bot"
                                }}
                            });
                            let _ = socket.send(Message::Text(event.to_string())).await;
                            while let Some(Ok(msg)) = socket.recv().await {
                                if let Message::Text(text) = msg {
                                    let _ = ack_tx.send(text);
                                }
                            }
                        })
                        .into_response()
                    }
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let service = SlackService::new(SlackOptions {
            bot_token: "xoxb-bot".to_string(),
            app_token: "xapp-app".to_string(),
        })
        .with_base_url(format!("http://{}", addr));
        let client = SocketModeClient::new(service).with_reconnect_delay(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { client.run(tx, shutdown).await }
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, InboundKind::Mention);
        assert_eq!(event.text, "hello bot");

        let ack: Value = serde_json::from_str(&ack_rx.recv().await.unwrap()).unwrap();
        assert_eq!(ack, json!({"envelope_id": "env-1"}));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
