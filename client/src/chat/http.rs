//! `HttpChatTransport`: REST via `reqwest` for everything except the
//! live-message stream, which rides a `tokio-tungstenite` websocket.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::types::{CreateChannelRequest, GatewayEvent, WireChannel, WireMessage, WirePin};
use super::{Attachment, ChannelId, ChatMessage, ChatTransport, PinnedMessage};
use crate::error::TransportResult;

/// Talks to a guild-chat HTTP+WS API. `base_url` fronts the REST surface
/// (`GET /guilds/{g}/channels`, `POST .../messages`, ...); `ws_url` is the
/// gateway endpoint the subscription connects to. Both come from the
/// resolved `Config`, alongside the server/guild id and token.
pub struct HttpChatTransport {
    client: Client,
    base_url: String,
    ws_url: String,
    token: String,
    self_id: String,
}

impl HttpChatTransport {
    pub fn new(base_url: String, ws_url: String, token: String, self_id: String) -> TransportResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, base_url, ws_url, token, self_id })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.token)
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn list_channels(&self, guild: &str) -> TransportResult<Vec<ChannelId>> {
        let url = self.url(&format!("/guilds/{guild}/channels"));
        let resp = self.authed(self.client.get(&url)).send().await?.error_for_status()?;
        let channels: Vec<WireChannel> = resp.json().await?;
        Ok(channels.into_iter().map(|c| ChannelId { id: c.id, name: c.name }).collect())
    }

    async fn create_channel(&self, guild: &str, name: &str) -> TransportResult<ChannelId> {
        let url = self.url(&format!("/guilds/{guild}/channels"));
        let body = CreateChannelRequest { name, kind: "text" };
        let resp = self.authed(self.client.post(&url)).json(&body).send().await?.error_for_status()?;
        let channel: WireChannel = resp.json().await?;
        Ok(ChannelId { id: channel.id, name: channel.name })
    }

    async fn list_pinned(&self, channel: &str) -> TransportResult<Vec<PinnedMessage>> {
        let url = self.url(&format!("/channels/{channel}/pins"));
        let resp = self.authed(self.client.get(&url)).send().await?.error_for_status()?;
        let pins: Vec<WirePin> = resp.json().await?;
        Ok(pins.into_iter().map(|p| PinnedMessage { id: p.message_id }).collect())
    }

    async fn list_messages(
        &self,
        channel: &str,
        limit: u32,
        before: Option<&str>,
    ) -> TransportResult<Vec<ChatMessage>> {
        let mut url = self.url(&format!("/channels/{channel}/messages?limit={limit}"));
        if let Some(before) = before {
            url.push_str(&format!("&before={before}"));
        }
        let resp = self.authed(self.client.get(&url)).send().await?.error_for_status()?;
        let messages: Vec<WireMessage> = resp.json().await?;
        Ok(messages
            .into_iter()
            .map(|m| ChatMessage {
                id: m.id,
                author_id: m.author_id,
                attachment_urls: m.attachments.into_iter().map(|a| a.url).collect(),
            })
            .collect())
    }

    async fn post_message(&self, channel: &str, attachments: Vec<Attachment>) -> TransportResult<Vec<String>> {
        let url = self.url(&format!("/channels/{channel}/messages"));
        let mut form = reqwest::multipart::Form::new();
        for (i, attachment) in attachments.iter().enumerate() {
            let part = reqwest::multipart::Part::bytes(attachment.data.clone()).file_name(attachment.filename.clone());
            form = form.part(format!("file{i}"), part);
        }
        let resp = self.authed(self.client.post(&url)).multipart(form).send().await?.error_for_status()?;
        let message: WireMessage = resp.json().await?;
        Ok(message.attachments.into_iter().map(|a| a.url).collect())
    }

    async fn pin(&self, channel: &str, message: &str) -> TransportResult<()> {
        let url = self.url(&format!("/channels/{channel}/pins/{message}"));
        self.authed(self.client.put(&url)).send().await?.error_for_status()?;
        Ok(())
    }

    async fn unpin(&self, channel: &str, message: &str) -> TransportResult<()> {
        let url = self.url(&format!("/channels/{channel}/pins/{message}"));
        self.authed(self.client.delete(&url)).send().await?.error_for_status()?;
        Ok(())
    }

    async fn fetch_attachment(&self, url: &str) -> TransportResult<Vec<u8>> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn subscribe_new_messages(&self, channel: &str) -> TransportResult<mpsc::Receiver<ChatMessage>> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_url).await?;
        let (_write, mut read) = ws_stream.split();
        let (sender, receiver) = mpsc::channel(256);
        let channel = channel.to_string();

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let Ok(WsMessage::Text(text)) = frame else { continue };
                let Ok(event) = serde_json::from_str::<GatewayEvent>(&text) else { continue };
                if event.t != "MESSAGE_CREATE" {
                    continue;
                }
                let Ok(wire) = serde_json::from_value::<WireMessage>(event.d) else { continue };
                let message = ChatMessage {
                    id: wire.id,
                    author_id: wire.author_id,
                    attachment_urls: wire.attachments.into_iter().map(|a| a.url).collect(),
                };
                if sender.send(message).await.is_err() {
                    break;
                }
            }
            tracing::warn!(%channel, "live-message subscription stream ended");
        });

        Ok(receiver)
    }

    fn self_id(&self) -> &str {
        &self.self_id
    }
}
