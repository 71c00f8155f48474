use serde::{Deserialize, Serialize};

/// Common envelope of every Web API response.
#[derive(Debug, Deserialize)]
pub struct ApiStatus {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// `chat.postMessage` result. `ts` addresses the message for later updates.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionInfo {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct PostMessageRequest<'a> {
    pub channel: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UpdateMessageRequest<'a> {
    pub channel: &'a str,
    pub ts: &'a str,
    pub text: &'a str,
}

/// Frame received over the Socket Mode websocket.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<EventCallback>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventCallback {
    #[serde(default)]
    pub event: Option<EventBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventBody {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Mention,
    DirectMessage,
}

/// A user message the bot should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub kind: InboundKind,
    pub channel: String,
    pub user: String,
    pub text: String,
}
