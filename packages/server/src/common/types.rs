// Wire and event types shared by the framer and the relay

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/chat/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatQuery {
    pub user_id: String,
    pub query: String,
}

/// Non-streamed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub full_response: String,
}

/// Opaque address of a posted message (the Slack message timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub String);

impl MessageHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Mention,
    DirectMessage,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Mention => "mention",
            EventKind::DirectMessage => "dm",
        }
    }
}

/// A user message the relay should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub channel: String,
    pub user_id: String,
    pub query: String,
    pub kind: EventKind,
}

impl ChatEvent {
    pub fn to_query(&self) -> ChatQuery {
        ChatQuery {
            user_id: self.user_id.clone(),
            query: self.query.clone(),
        }
    }
}

impl From<slack::InboundEvent> for ChatEvent {
    fn from(event: slack::InboundEvent) -> Self {
        Self {
            channel: event.channel,
            user_id: event.user,
            query: event.text,
            kind: match event.kind {
                slack::InboundKind::Mention => EventKind::Mention,
                slack::InboundKind::DirectMessage => EventKind::DirectMessage,
            },
        }
    }
}
