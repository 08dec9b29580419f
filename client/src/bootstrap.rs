//! Bootstrap and optional compaction: discover/create the two channels,
//! replay the tx history from the pinned anchor (or seed the root folder
//! if there is none), and optionally rewrite the log to a fresh, shorter
//! anchor.

use std::sync::Arc;

use crate::chat::{Attachment, ChatTransport};
use crate::db::Db;
use crate::error::TransportResult;
use crate::tx::{join_lines, InodeRecord, Tx, BLOCK};

pub const MAX_MSGS_PER_PAGE: u32 = 100;

pub const TX_CHANNEL_NAME: &str = "tx";
pub const DATA_CHANNEL_NAME: &str = "data";

pub struct BootstrapResult {
    pub tx_channel: String,
    pub data_channel: String,
}

async fn ensure_channel(transport: &dyn ChatTransport, guild: &str, name: &str) -> TransportResult<String> {
    let channels = transport.list_channels(guild).await?;
    if let Some(existing) = channels.into_iter().find(|c| c.name == name) {
        return Ok(existing.id);
    }
    Ok(transport.create_channel(guild, name).await?.id)
}

/// Runs bootstrap against an empty `db`, returning once `db` holds every
/// entry implied by the tx log (or just the root folder, for a fresh
/// guild). `compact` additionally re-pivots the anchor on success.
pub async fn bootstrap(transport: Arc<dyn ChatTransport>, guild: &str, db: &mut dyn Db, compact: bool) -> TransportResult<BootstrapResult> {
    let tx_channel = ensure_channel(transport.as_ref(), guild, TX_CHANNEL_NAME).await?;
    let data_channel = ensure_channel(transport.as_ref(), guild, DATA_CHANNEL_NAME).await?;

    let pins = transport.list_pinned(&tx_channel).await?;
    let Some(anchor) = pins.last() else {
        // No pin: fresh guild. Seed root and publish+pin its Write tx.
        let root = InodeRecord::new_folder("/", chrono::Utc::now());
        db.insert("/".to_string(), root.clone());
        let line = Tx::Write(root).encode();
        let ids = transport.post_message(&tx_channel, vec![Attachment { filename: TX_CHANNEL_NAME.to_string(), data: line.into_bytes() }]).await?;
        if let Some(id) = ids.first() {
            transport.pin(&tx_channel, id).await?;
        }
        return Ok(BootstrapResult { tx_channel, data_channel });
    };

    let mut compaction_buffer: Vec<String> = Vec::new();

    // The transport only supports backward pagination ("before"), so we
    // page from the present toward the anchor, collecting every message
    // newer than (and including) it, then reverse once at the end to
    // replay oldest-first — the total order the replay needs.
    let mut collected: Vec<crate::chat::ChatMessage> = Vec::new();
    let mut before: Option<String> = None;
    'paging: loop {
        let page = transport.list_messages(&tx_channel, MAX_MSGS_PER_PAGE, before.as_deref()).await?;
        if page.is_empty() {
            break;
        }
        let full_page = page.len() == MAX_MSGS_PER_PAGE as usize;
        for message in page {
            let is_anchor = message.id == anchor.id;
            collected.push(message);
            if is_anchor {
                break 'paging;
            }
        }
        if !full_page {
            break;
        }
        before = collected.last().map(|m| m.id.clone());
    }
    collected.reverse();

    for message in collected {
        for url in &message.attachment_urls {
            let bytes = transport.fetch_attachment(url).await?;
            let body = String::from_utf8_lossy(&bytes);
            for line in body.lines().filter(|l| !l.trim().is_empty()) {
                if compact {
                    compaction_buffer.push(line.to_string());
                }
                for tx in Tx::decode_lines(line) {
                    match tx {
                        Tx::Write(record) => db.insert(record.path.clone(), record),
                        Tx::Delete { path } => db.delete(&path),
                    }
                }
            }
        }
    }

    if compact {
        if let Err(err) = compact_log(transport.as_ref(), &tx_channel, &anchor.id, &compaction_buffer).await {
            tracing::warn!(%err, "compaction aborted, replay anchor unchanged");
        }
    }

    Ok(BootstrapResult { tx_channel, data_channel })
}

/// Slices the buffered log lines into `BLOCK`-sized messages, posts them,
/// pins the first new message, then unpins the old anchor. Best-effort:
/// any post failure leaves the old anchor in place.
async fn compact_log(transport: &dyn ChatTransport, tx_channel: &str, old_anchor: &str, lines: &[String]) -> TransportResult<()> {
    if lines.is_empty() {
        return Ok(());
    }

    let mut slices: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && (current.len() + line.len() + 1) as i64 > BLOCK {
            slices.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        slices.push(current);
    }

    let mut first_new_id: Option<String> = None;
    for slice in slices {
        let ids = transport.post_message(tx_channel, vec![Attachment { filename: TX_CHANNEL_NAME.to_string(), data: slice.into_bytes() }]).await?;
        if first_new_id.is_none() {
            first_new_id = ids.into_iter().next();
        }
    }

    if let Some(id) = first_new_id {
        transport.pin(tx_channel, &id).await?;
        transport.unpin(tx_channel, old_anchor).await?;
    }
    Ok(())
}

/// Re-encodes a slice of already-decoded txs; used only by tests that want
/// to exercise `compact_log` without round-tripping through JSON strings.
#[cfg(test)]
fn encode_all(txs: &[Tx]) -> Vec<String> {
    join_lines(txs.iter()).lines().map(|l| l.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChannelId, ChatMessage, PinnedMessage};
    use crate::db::MapDb;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A minimal in-memory `ChatTransport` stub good enough to exercise
    /// bootstrap's replay and compaction paths without a real server.
    struct FakeTransport {
        channels: Mutex<HashMap<String, String>>, // opaque id -> name
        messages: Mutex<Vec<(String, Vec<String>)>>, // (channel, attachment bodies)
        attachments: Mutex<HashMap<String, Vec<u8>>>,
        pins: Mutex<Vec<String>>,
        next_id: Mutex<u64>,
        next_channel_id: Mutex<u64>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                channels: Mutex::new(HashMap::new()),
                messages: Mutex::new(Vec::new()),
                attachments: Mutex::new(HashMap::new()),
                pins: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
                next_channel_id: Mutex::new(0),
            }
        }

        fn fresh_id(&self) -> String {
            let mut n = self.next_id.lock();
            *n += 1;
            format!("msg-{n}")
        }

        /// A channel id shaped like a real snowflake: opaque, unrelated to
        /// the channel's name.
        fn fresh_channel_id(&self) -> String {
            let mut n = self.next_channel_id.lock();
            *n += 1;
            format!("snowflake-{n}")
        }

        /// Seeds a pre-existing tx history as if posted before this run
        /// started, so bootstrap must replay it.
        fn seed_history(&self, channel: &str, lines: &[&str]) -> String {
            let id = self.fresh_id();
            self.attachments.lock().insert(id.clone(), lines.join("\n").into_bytes());
            self.messages.lock().push((channel.to_string(), vec![id.clone()]));
            id
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn list_channels(&self, _guild: &str) -> TransportResult<Vec<ChannelId>> {
            Ok(self.channels.lock().iter().map(|(id, name)| ChannelId { id: id.clone(), name: name.clone() }).collect())
        }
        async fn create_channel(&self, _guild: &str, name: &str) -> TransportResult<ChannelId> {
            let id = self.fresh_channel_id();
            self.channels.lock().insert(id.clone(), name.to_string());
            Ok(ChannelId { id, name: name.to_string() })
        }
        async fn list_pinned(&self, _channel: &str) -> TransportResult<Vec<PinnedMessage>> {
            Ok(self.pins.lock().iter().map(|id| PinnedMessage { id: id.clone() }).collect())
        }
        async fn list_messages(&self, channel: &str, limit: u32, before: Option<&str>) -> TransportResult<Vec<ChatMessage>> {
            let messages = self.messages.lock();
            // Stored oldest-first (push order); real APIs return newest
            // first, so reverse before applying the "before" cursor.
            let mut relevant: Vec<_> = messages.iter().filter(|(c, _)| c == channel).rev().collect();
            if let Some(before) = before {
                if let Some(pos) = relevant.iter().position(|(_, ids)| ids.first().map(|s| s.as_str()) == Some(before)) {
                    relevant = relevant.split_off(pos + 1);
                }
            }
            relevant.truncate(limit as usize);
            Ok(relevant
                .into_iter()
                .map(|(_, ids)| ChatMessage { id: ids[0].clone(), author_id: "other".into(), attachment_urls: ids.clone() })
                .collect())
        }
        async fn post_message(&self, channel: &str, attachments: Vec<Attachment>) -> TransportResult<Vec<String>> {
            let mut ids = Vec::new();
            for attachment in attachments {
                let id = self.fresh_id();
                self.attachments.lock().insert(id.clone(), attachment.data);
                ids.push(id);
            }
            self.messages.lock().push((channel.to_string(), ids.clone()));
            Ok(ids)
        }
        async fn pin(&self, _channel: &str, message: &str) -> TransportResult<()> {
            self.pins.lock().push(message.to_string());
            Ok(())
        }
        async fn unpin(&self, _channel: &str, message: &str) -> TransportResult<()> {
            self.pins.lock().retain(|id| id != message);
            Ok(())
        }
        async fn fetch_attachment(&self, url: &str) -> TransportResult<Vec<u8>> {
            self.attachments.lock().get(url).cloned().ok_or_else(|| "no such attachment".into())
        }
        async fn subscribe_new_messages(&self, _channel: &str) -> TransportResult<tokio::sync::mpsc::Receiver<ChatMessage>> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
        fn self_id(&self) -> &str {
            "self"
        }
    }

    #[tokio::test]
    async fn fresh_guild_seeds_root_and_pins_it() {
        let transport = Arc::new(FakeTransport::new());
        let mut db = MapDb::new();
        let result = bootstrap(transport.clone(), "guild", &mut db, false).await.unwrap();
        assert_eq!(transport.channels.lock().get(&result.tx_channel), Some(&"tx".to_string()));
        assert_eq!(transport.channels.lock().get(&result.data_channel), Some(&"data".to_string()));
        assert!(db.get("/").unwrap().is_folder());
        assert_eq!(transport.pins.lock().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_reuses_existing_channels_by_name_not_opaque_id() {
        // Channel ids are opaque snowflakes here, same as on a real
        // guild-chat service; a second bootstrap run against the same
        // guild must still find the channels it made last time by name
        // instead of minting duplicates.
        let transport = Arc::new(FakeTransport::new());
        let mut db = MapDb::new();
        bootstrap(transport.clone(), "guild", &mut db, false).await.unwrap();
        assert_eq!(transport.channels.lock().len(), 2);

        let mut db2 = MapDb::new();
        bootstrap(transport.clone(), "guild", &mut db2, false).await.unwrap();
        assert_eq!(transport.channels.lock().len(), 2);
    }

    #[tokio::test]
    async fn replay_applies_write_then_delete_in_order() {
        let transport = Arc::new(FakeTransport::new());
        transport.channels.lock().insert("tx".into(), "tx".into());
        transport.channels.lock().insert("data".into(), "data".into());
        let anchor = transport.seed_history("tx", &["{\"tx\":0,\"type\":1,\"path\":\"/\"}"]);
        transport.pins.lock().push(anchor);
        transport.seed_history("tx", &["{\"tx\":0,\"type\":0,\"path\":\"/a\",\"size\":0}", "{\"tx\":1,\"path\":\"/a\"}"]);

        let mut db = MapDb::new();
        bootstrap(transport, "guild", &mut db, false).await.unwrap();
        assert!(db.get("/").is_some());
        assert!(db.get("/a").is_none());
    }

    #[test]
    fn encode_all_round_trips_through_lines() {
        let txs = vec![Tx::Delete { path: "/a".into() }, Tx::Delete { path: "/b".into() }];
        let lines = encode_all(&txs);
        assert_eq!(lines.len(), 2);
    }
}
