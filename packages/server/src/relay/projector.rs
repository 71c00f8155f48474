//! Mirrors decoder signals onto one chat message.
//!
//! The first text creates the message with a trailing [`PROVISIONAL_MARKER`];
//! every later text replaces it, still marked; completion strips the marker.
//! Calls are awaited one at a time, so update order is signal order.

use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::common::MessageHandle;
use crate::kernel::BaseMessenger;
use crate::relay::decoder::Signal;
use crate::relay::error::{DecodeError, RelayError};

/// Suffix shown while an answer is still streaming.
pub const PROVISIONAL_MARKER: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningMessage {
    pub handle: MessageHandle,
    pub accumulated_text: String,
    pub finalized: bool,
}

impl RunningMessage {
    /// Text the user currently sees.
    pub fn visible_text(&self) -> String {
        if self.finalized {
            self.accumulated_text.clone()
        } else {
            format!("{}{}", self.accumulated_text, PROVISIONAL_MARKER)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionOutcome {
    /// The stream completed and the marker was removed.
    Finalized(RunningMessage),
    /// The signals ended without completion; the message (if any) keeps its marker.
    Truncated(Option<RunningMessage>),
}

/// Drive `signals` to completion against `messenger`.
///
/// A failed post/update stops the projection (no retry); so does a decode
/// error.
pub async fn project<S>(
    messenger: &dyn BaseMessenger,
    channel: &str,
    signals: S,
) -> Result<ProjectionOutcome, RelayError>
where
    S: Stream<Item = Result<Signal, DecodeError>>,
{
    futures::pin_mut!(signals);
    let mut message: Option<RunningMessage> = None;

    while let Some(signal) = signals.next().await {
        match signal? {
            Signal::TextUpdated { sequence, text } => {
                debug!(sequence, "Received text chunk");
                match message.as_mut() {
                    None => {
                        let created = RunningMessage {
                            handle: MessageHandle(String::new()),
                            accumulated_text: text,
                            finalized: false,
                        };
                        let handle = post(messenger, channel, &created.visible_text()).await?;
                        message = Some(RunningMessage { handle, ..created });
                    }
                    Some(running) => {
                        running.accumulated_text = text;
                        update(messenger, channel, running).await?;
                    }
                }
            }
            Signal::StreamComplete { sequence, text } => {
                debug!(sequence, "Received status done");
                let finished = match message.take() {
                    None => {
                        let handle = post(messenger, channel, &text).await?;
                        RunningMessage {
                            handle,
                            accumulated_text: text,
                            finalized: true,
                        }
                    }
                    Some(mut running) => {
                        running.accumulated_text = text;
                        running.finalized = true;
                        update(messenger, channel, &running).await?;
                        running
                    }
                };
                return Ok(ProjectionOutcome::Finalized(finished));
            }
        }
    }

    warn!(
        channel,
        has_message = message.is_some(),
        "Stream ended before completion"
    );
    Ok(ProjectionOutcome::Truncated(message))
}

async fn post(
    messenger: &dyn BaseMessenger,
    channel: &str,
    text: &str,
) -> Result<MessageHandle, RelayError> {
    messenger.post_message(channel, text).await.map_err(|e| {
        warn!(channel, error = %e, "Failed to post message");
        RelayError::Delivery(e)
    })
}

async fn update(
    messenger: &dyn BaseMessenger,
    channel: &str,
    running: &RunningMessage,
) -> Result<(), RelayError> {
    messenger
        .update_message(channel, &running.handle, &running.visible_text())
        .await
        .map_err(|e| {
            warn!(channel, handle = %running.handle, error = %e, "Failed to update message");
            RelayError::Delivery(e)
        })
}
