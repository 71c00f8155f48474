//! Event-stream frames.
//!
//! One frame per SSE event:
//!
//! ```text
//! id: 1
//! event: message_part
//! data: {"text_chunk": "Goroutines are "}
//!
//! id: 2
//! event: stream_end
//! data: {"status": "done"}
//!
//! ```
//!
//! Ids start at 1 and are contiguous; `stream_end` is always the last frame.

use axum::response::sse::Event;
use serde_json::Value;

pub const MESSAGE_PART_EVENT: &str = "message_part";
pub const STREAM_END_EVENT: &str = "stream_end";
pub const DONE_STATUS: &str = "done";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    TextChunk { sequence: u64, text: String },
    StreamEnd { sequence: u64 },
}

impl StreamFrame {
    pub fn sequence(&self) -> u64 {
        match self {
            StreamFrame::TextChunk { sequence, .. } | StreamFrame::StreamEnd { sequence } => {
                *sequence
            }
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::TextChunk { .. } => MESSAGE_PART_EVENT,
            StreamFrame::StreamEnd { .. } => STREAM_END_EVENT,
        }
    }

    /// JSON payload of the `data:` line.
    ///
    /// Written out by hand: peers expect a space after the colon, which
    /// `serde_json` never emits.
    pub fn data(&self) -> String {
        match self {
            StreamFrame::TextChunk { text, .. } => {
                format!("{{\"text_chunk\": {}}}", Value::from(text.as_str()))
            }
            StreamFrame::StreamEnd { .. } => {
                format!("{{\"status\": {}}}", Value::from(DONE_STATUS))
            }
        }
    }

    /// SSE event carrying this frame.
    pub fn to_event(&self) -> Event {
        Event::default()
            .id(self.sequence().to_string())
            .event(self.event_name())
            .data(self.data())
    }
}
