use serde::Serialize;
use utoipa::ToSchema;

use crate::state::channel::{ChannelMessage, OriginId, Topic};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already encoded data field.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public`, `admin` or `channel`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the fixtures failed to load and no game is running.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Token handed to the single admin SSE subscriber.
pub struct AdminHandshake {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// One raw channel write, as relayed on `/sse/channel`.
pub struct ChannelEvent {
    /// Channel key the value was written under.
    pub key: String,
    /// Writer of the value.
    #[schema(value_type = String)]
    pub origin: OriginId,
    /// JSON value exactly as written.
    pub value: String,
}

impl From<ChannelMessage> for ChannelEvent {
    fn from(message: ChannelMessage) -> Self {
        Self {
            key: message.topic.key().to_string(),
            origin: message.origin,
            value: message.payload,
        }
    }
}

impl ChannelEvent {
    /// Topic of the write, recovered from its key.
    pub fn topic(&self) -> Option<Topic> {
        self.key.parse().ok()
    }
}
