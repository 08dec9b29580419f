use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, ChannelState, StoredAttachment, StoredMessage};

#[derive(Serialize)]
pub struct WireChannel {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct WireAttachment {
    pub url: String,
}

#[derive(Serialize)]
pub struct WireMessage {
    pub id: String,
    pub author_id: String,
    pub attachments: Vec<WireAttachment>,
}

#[derive(Serialize)]
pub struct WirePin {
    pub message_id: String,
}

#[derive(Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[allow(dead_code)]
    pub kind: String,
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    pub limit: u32,
    pub before: Option<String>,
}

fn composite(guild: &str, name: &str) -> String {
    format!("{guild}:{name}")
}

fn to_wire_message(state: &AppState, msg: &StoredMessage) -> WireMessage {
    let attachments = msg
        .attachment_ids
        .iter()
        .map(|id| WireAttachment { url: format!("{}/attachments/{id}", state.base_url) })
        .collect();
    WireMessage { id: msg.id.clone(), author_id: msg.author_id.clone(), attachments }
}

pub async fn list_channels(State(state): State<Arc<AppState>>, Path(guild): Path<String>) -> Json<Vec<WireChannel>> {
    let prefix = format!("{guild}:");
    let channels = state.channels.lock();
    let wire = channels
        .keys()
        .filter(|id| id.starts_with(&prefix))
        .map(|id| WireChannel { id: id.clone(), name: id[prefix.len()..].to_string() })
        .collect();
    Json(wire)
}

pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Path(guild): Path<String>,
    Json(req): Json<CreateChannelRequest>,
) -> Json<WireChannel> {
    let id = composite(&guild, &req.name);
    state.channels.lock().entry(id.clone()).or_insert_with(|| ChannelState { id: id.clone(), ..Default::default() });
    Json(WireChannel { id, name: req.name })
}

pub async fn list_pins(State(state): State<Arc<AppState>>, Path(channel): Path<String>) -> Json<Vec<WirePin>> {
    let channels = state.channels.lock();
    let pins = channels.get(&channel).map(|c| c.pins.clone()).unwrap_or_default();
    Json(pins.into_iter().map(|message_id| WirePin { message_id }).collect())
}

pub async fn pin_message(State(state): State<Arc<AppState>>, Path((channel, message)): Path<(String, String)>) -> StatusCode {
    let mut channels = state.channels.lock();
    let Some(chan) = channels.get_mut(&channel) else { return StatusCode::NOT_FOUND };
    if !chan.pins.contains(&message) {
        chan.pins.push(message);
    }
    StatusCode::NO_CONTENT
}

pub async fn unpin_message(State(state): State<Arc<AppState>>, Path((channel, message)): Path<(String, String)>) -> StatusCode {
    let mut channels = state.channels.lock();
    let Some(chan) = channels.get_mut(&channel) else { return StatusCode::NOT_FOUND };
    chan.pins.retain(|id| id != &message);
    StatusCode::NO_CONTENT
}

/// Mirrors the real service's only pagination mode: newest-first, with
/// `before` excluding that message and everything newer than it.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Json<Vec<WireMessage>> {
    let channels = state.channels.lock();
    let Some(chan) = channels.get(&channel) else { return Json(Vec::new()) };

    let mut ordered: Vec<&StoredMessage> = chan.messages.iter().rev().collect();
    if let Some(before) = &query.before {
        if let Some(pos) = ordered.iter().position(|m| &m.id == before) {
            ordered = ordered.split_off(pos + 1);
        }
    }
    ordered.truncate(query.limit as usize);
    Json(ordered.into_iter().map(|m| to_wire_message(&state, m)).collect())
}

const AUTHOR_ID: &str = "mock-server-author";

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<WireMessage>, StatusCode> {
    let mut attachment_ids = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let filename = field.file_name().unwrap_or("attachment").to_string();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_vec();
        let id = state.fresh_id("att");
        state.attachments.lock().insert(id.clone(), StoredAttachment { filename, data });
        attachment_ids.push(id);
    }

    let message = StoredMessage { id: state.fresh_id("msg"), author_id: AUTHOR_ID.to_string(), attachment_ids };

    {
        let mut channels = state.channels.lock();
        let chan = channels.entry(channel.clone()).or_insert_with(|| ChannelState { id: channel.clone(), ..Default::default() });
        chan.messages.push(message.clone());
    }

    let wire = to_wire_message(&state, &message);
    let event = json!({
        "t": "MESSAGE_CREATE",
        "d": {
            "id": wire.id,
            "author_id": wire.author_id,
            "attachments": wire.attachments.iter().map(|a| json!({"url": a.url})).collect::<Vec<_>>(),
        }
    });
    let _ = state.events.send(event);

    Ok(Json(wire))
}

pub async fn get_attachment(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Vec<u8>, StatusCode> {
    state.attachments.lock().get(&id).map(|a| a.data.clone()).ok_or(StatusCode::NOT_FOUND)
}

pub async fn gateway(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_gateway_socket(socket, state))
}

async fn handle_gateway_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if socket.send(WsMessage::Text(event.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                if incoming.is_none() {
                    break;
                }
            }
        }
    }
}
