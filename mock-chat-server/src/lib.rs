//! An in-process stand-in for the guild-chat service `HttpChatTransport`
//! talks to: channels, paged message history with multipart attachments,
//! pins, and a websocket gateway that rebroadcasts new messages. Built to
//! satisfy exactly the URL shapes and wire JSON `chat::http`/`chat::types`
//! construct, so the real transport can point at this server unmodified.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

mod handlers;

#[derive(Clone)]
pub struct StoredAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct StoredMessage {
    pub id: String,
    pub author_id: String,
    pub attachment_ids: Vec<String>,
}

#[derive(Default)]
pub struct ChannelState {
    pub id: String,
    pub messages: Vec<StoredMessage>,
    /// Pinned message ids, oldest pin first. Bootstrap treats the last
    /// entry as the current replay anchor.
    pub pins: Vec<String>,
}

pub struct AppState {
    pub base_url: String,
    /// Keyed by the composite id `"{guild}:{name}"` handed out as the
    /// opaque channel id everywhere else in this server and in the
    /// transport trait, which carries no separate guild parameter past
    /// channel creation.
    pub channels: Mutex<HashMap<String, ChannelState>>,
    pub attachments: Mutex<HashMap<String, StoredAttachment>>,
    pub next_id: Mutex<u64>,
    /// Every `MESSAGE_CREATE` event ever posted, regardless of channel —
    /// `HttpChatTransport::subscribe_new_messages` ignores its channel
    /// argument and filters client-side by message type only, so there is
    /// nothing here to scope the broadcast by.
    pub events: broadcast::Sender<Value>,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            base_url,
            channels: Mutex::new(HashMap::new()),
            attachments: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
            events,
        }
    }

    pub fn fresh_id(&self, prefix: &str) -> String {
        let mut n = self.next_id.lock();
        *n += 1;
        format!("{prefix}-{n}")
    }
}

pub fn app(base_url: String) -> Router {
    let state = Arc::new(AppState::new(base_url));
    Router::new()
        .route("/guilds/:guild/channels", get(handlers::list_channels).post(handlers::create_channel))
        .route("/channels/:channel/pins", get(handlers::list_pins))
        .route(
            "/channels/:channel/pins/:message",
            put(handlers::pin_message).delete(handlers::unpin_message),
        )
        .route("/channels/:channel/messages", get(handlers::list_messages).post(handlers::post_message))
        .route("/attachments/:id", get(handlers::get_attachment))
        .route("/gateway", get(handlers::gateway))
        .with_state(state)
}
