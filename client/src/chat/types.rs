//! JSON wire shapes for the guild-chat HTTP+WS API `HttpChatTransport`
//! talks to. Kept separate from the `ChatTransport` trait's own vocabulary
//! (`ChatMessage`, `Attachment`, ...) since the REST payloads have their
//! own field names and nesting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(super) struct WireChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAttachment {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireMessage {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WirePin {
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateChannelRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

/// A raw gateway-style event frame received over the websocket
/// subscription, matching the `{"t": "...", "d": {...}}` envelope common
/// to guild-chat gateways.
#[derive(Debug, Deserialize)]
pub(super) struct GatewayEvent {
    pub t: String,
    pub d: serde_json::Value,
}
