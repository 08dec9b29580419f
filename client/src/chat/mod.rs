//! The chat transport adapter: a thin façade over the remote chat
//! service. Only the interface is ours to define; `http` is one concrete
//! implementation against a guild-chat HTTP+WS API, and `mock-chat-server`
//! (a separate workspace crate) gives integration tests a second
//! implementation surface without a real account.

mod http;
mod types;

pub use http::HttpChatTransport;
pub use types::*;

use async_trait::async_trait;

use crate::error::TransportResult;

/// One attachment to include on a posted message: a filename (by
/// convention the `"tx"`/`"data"` channel name) and its raw bytes.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelId {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub author_id: String,
    /// Attachment URLs in post order; fetched lazily via
    /// `fetch_attachment`.
    pub attachment_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PinnedMessage {
    pub id: String,
}

/// The surface the engine needs from the remote chat service. Every
/// method is fallible over the network; callers (bootstrap, the writer,
/// the live applier) decide how to degrade on error.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn list_channels(&self, guild: &str) -> TransportResult<Vec<ChannelId>>;
    async fn create_channel(&self, guild: &str, name: &str) -> TransportResult<ChannelId>;
    async fn list_pinned(&self, channel: &str) -> TransportResult<Vec<PinnedMessage>>;
    /// Newest-first, paged; callers must reverse within a page to replay
    /// chronologically.
    async fn list_messages(
        &self,
        channel: &str,
        limit: u32,
        before: Option<&str>,
    ) -> TransportResult<Vec<ChatMessage>>;
    /// Returns attachment ids in submission order.
    async fn post_message(&self, channel: &str, attachments: Vec<Attachment>) -> TransportResult<Vec<String>>;
    async fn pin(&self, channel: &str, message: &str) -> TransportResult<()>;
    async fn unpin(&self, channel: &str, message: &str) -> TransportResult<()>;
    async fn fetch_attachment(&self, url: &str) -> TransportResult<Vec<u8>>;

    /// Subscribes to new messages posted to `channel`. The returned
    /// receiver yields every message including ones authored by the local
    /// identity; self-filtering is the live applier's job, not the
    /// transport's, so the same adapter works for any channel.
    async fn subscribe_new_messages(&self, channel: &str) -> TransportResult<tokio::sync::mpsc::Receiver<ChatMessage>>;

    /// The authenticated user id, used by the live applier to filter out
    /// the bot's own messages.
    fn self_id(&self) -> &str;
}
