//! The write aggregator: batches outbound posts per channel
//! under `MAX_MSG_FILES`/`BLOCK`/`QUEUE_TIMEOUT` bounds, one long-lived
//! `tokio::task` per channel. `send_tx`/`send_data` are the synchronous
//! (submit-and-await-reply) API the engine calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::chat::{Attachment, ChatTransport};
use crate::error::{TransportError, TransportResult};
use crate::tx::BLOCK;

pub const MAX_MSG_FILES: usize = 10;
pub const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

type Reply = oneshot::Sender<TransportResult<String>>;

struct QueueItem {
    payload: Vec<u8>,
    reply: Reply,
}

/// Handle callers use to submit a payload and block (via the oneshot
/// reply) until the aggregator's worker posts it and gets back an
/// attachment id.
#[derive(Clone)]
pub struct Writer {
    tx_queue: mpsc::Sender<QueueItem>,
    data_queue: mpsc::Sender<QueueItem>,
}

impl Writer {
    /// Spawns the tx-queue and data-queue worker tasks and returns a
    /// handle. `filename` is the constant attachment filename each queue
    /// uses (`"tx"` or `"data"`), matching the channel it targets.
    pub fn spawn(transport: Arc<dyn ChatTransport>, tx_channel: String, data_channel: String) -> Self {
        let (tx_sender, tx_receiver) = mpsc::channel(1024);
        let (data_sender, data_receiver) = mpsc::channel(1024);

        tokio::spawn(run_queue(transport.clone(), tx_channel, "tx".to_string(), tx_receiver));
        tokio::spawn(run_queue(transport, data_channel, "data".to_string(), data_receiver));

        Self { tx_queue: tx_sender, data_queue: data_sender }
    }

    pub async fn send_tx(&self, payload: Vec<u8>) -> TransportResult<String> {
        submit(&self.tx_queue, payload).await
    }

    pub async fn send_data(&self, payload: Vec<u8>) -> TransportResult<String> {
        submit(&self.data_queue, payload).await
    }
}

async fn submit(queue: &mpsc::Sender<QueueItem>, payload: Vec<u8>) -> TransportResult<String> {
    let (reply_tx, reply_rx) = oneshot::channel();
    queue
        .send(QueueItem { payload, reply: reply_tx })
        .await
        .map_err(|_| -> TransportError { "write aggregator queue is closed".into() })?;
    reply_rx.await.map_err(|_| -> TransportError { "write aggregator dropped the reply".into() })?
}

/// The dequeue loop: hold over leftovers from the
/// previous batch, arm a deadline, pull until one of the three stop
/// conditions fires, post, fan the reply out index-aligned with the
/// posted attachments.
async fn run_queue(
    transport: Arc<dyn ChatTransport>,
    channel: String,
    filename: String,
    mut receiver: mpsc::Receiver<QueueItem>,
) {
    let mut held_over: Option<QueueItem> = None;

    loop {
        let mut batch: Vec<QueueItem> = Vec::new();
        let mut batch_bytes: usize = 0;

        if let Some(item) = held_over.take() {
            batch_bytes += item.payload.len();
            batch.push(item);
        }

        let deadline = Instant::now() + QUEUE_TIMEOUT;
        'collect: loop {
            if batch.len() >= MAX_MSG_FILES {
                break 'collect;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break 'collect;
            }
            match tokio::time::timeout(remaining, receiver.recv()).await {
                Ok(Some(item)) => {
                    if !batch.is_empty() && batch_bytes + item.payload.len() > BLOCK as usize {
                        held_over = Some(item);
                        break 'collect;
                    }
                    batch_bytes += item.payload.len();
                    batch.push(item);
                }
                Ok(None) => {
                    // Sender side dropped (shutdown); flush whatever we have
                    // and exit after.
                    if batch.is_empty() {
                        return;
                    }
                    break 'collect;
                }
                Err(_) => break 'collect, // timeout fired
            }
        }

        if batch.is_empty() {
            continue;
        }

        let attachments: Vec<Attachment> = batch
            .iter()
            .map(|item| Attachment { filename: filename.clone(), data: item.payload.clone() })
            .collect();

        match transport.post_message(&channel, attachments).await {
            Ok(ids) => {
                for (item, id) in batch.into_iter().zip(ids.into_iter()) {
                    let _ = item.reply.send(Ok(id));
                }
            }
            Err(err) => {
                let message = err.to_string();
                for item in batch {
                    let _ = item.reply.send(Err(message.clone().into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChannelId, ChatMessage, PinnedMessage};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A transport stub that records every `post_message` call so tests
    /// can assert on batch shape.
    struct RecordingTransport {
        posts: Mutex<Vec<Vec<Attachment>>>,
        next_ids: Mutex<VecDeque<String>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { posts: Mutex::new(Vec::new()), next_ids: Mutex::new(VecDeque::new()) }
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn list_channels(&self, _guild: &str) -> TransportResult<Vec<ChannelId>> {
            Ok(Vec::new())
        }
        async fn create_channel(&self, _guild: &str, _name: &str) -> TransportResult<ChannelId> {
            Ok(ChannelId { id: "c".into(), name: "c".into() })
        }
        async fn list_pinned(&self, _channel: &str) -> TransportResult<Vec<PinnedMessage>> {
            Ok(Vec::new())
        }
        async fn list_messages(
            &self,
            _channel: &str,
            _limit: u32,
            _before: Option<&str>,
        ) -> TransportResult<Vec<ChatMessage>> {
            Ok(Vec::new())
        }
        async fn post_message(&self, _channel: &str, attachments: Vec<Attachment>) -> TransportResult<Vec<String>> {
            let mut ids = self.next_ids.lock();
            let assigned: Vec<String> = attachments
                .iter()
                .enumerate()
                .map(|(i, _)| ids.pop_front().unwrap_or_else(|| format!("auto-{i}")))
                .collect();
            self.posts.lock().push(attachments);
            Ok(assigned)
        }
        async fn pin(&self, _channel: &str, _message: &str) -> TransportResult<()> {
            Ok(())
        }
        async fn unpin(&self, _channel: &str, _message: &str) -> TransportResult<()> {
            Ok(())
        }
        async fn fetch_attachment(&self, _url: &str) -> TransportResult<Vec<u8>> {
            Ok(Vec::new())
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
    async fn batch_respects_count_and_size_bounds() {
        let transport = Arc::new(RecordingTransport::new());
        let writer = Writer::spawn(transport.clone(), "tx".into(), "data".into());

        // Send MAX_MSG_FILES + 2 small items; they must not all land in one
        // message (the first batch stops at MAX_MSG_FILES).
        let mut handles = Vec::new();
        for i in 0..(MAX_MSG_FILES + 2) {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move { writer.send_tx(format!("{i}").into_bytes()).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let posts = transport.posts.lock();
        assert!(posts.iter().all(|batch| batch.len() <= MAX_MSG_FILES));
        assert!(posts.iter().all(|batch| batch.iter().map(|a| a.data.len()).sum::<usize>() <= BLOCK as usize));
        let total: usize = posts.iter().map(|b| b.len()).sum();
        assert_eq!(total, MAX_MSG_FILES + 2);
    }

    #[tokio::test]
    async fn oversized_next_item_is_held_for_next_batch() {
        let transport = Arc::new(RecordingTransport::new());
        let writer = Writer::spawn(transport.clone(), "tx".into(), "data".into());

        let small = writer.send_data(vec![1; 10]);
        let big = writer.send_data(vec![2; BLOCK as usize]);
        let (r1, r2) = tokio::join!(small, big);
        r1.unwrap();
        r2.unwrap();

        let posts = transport.posts.lock();
        assert!(posts.len() >= 2, "oversized item must not share a message with the held-over small one");
    }

    #[tokio::test]
    async fn failure_replies_error_to_every_item_in_batch() {
        struct FailingTransport;
        #[async_trait]
        impl ChatTransport for FailingTransport {
            async fn list_channels(&self, _guild: &str) -> TransportResult<Vec<ChannelId>> {
                Ok(Vec::new())
            }
            async fn create_channel(&self, _guild: &str, _name: &str) -> TransportResult<ChannelId> {
                Ok(ChannelId { id: "c".into(), name: "c".into() })
            }
            async fn list_pinned(&self, _channel: &str) -> TransportResult<Vec<PinnedMessage>> {
                Ok(Vec::new())
            }
            async fn list_messages(
                &self,
                _channel: &str,
                _limit: u32,
                _before: Option<&str>,
            ) -> TransportResult<Vec<ChatMessage>> {
                Ok(Vec::new())
            }
            async fn post_message(&self, _channel: &str, _attachments: Vec<Attachment>) -> TransportResult<Vec<String>> {
                Err("rate limited".into())
            }
            async fn pin(&self, _channel: &str, _message: &str) -> TransportResult<()> {
                Ok(())
            }
            async fn unpin(&self, _channel: &str, _message: &str) -> TransportResult<()> {
                Ok(())
            }
            async fn fetch_attachment(&self, _url: &str) -> TransportResult<Vec<u8>> {
                Ok(Vec::new())
            }
            async fn subscribe_new_messages(&self, _channel: &str) -> TransportResult<tokio::sync::mpsc::Receiver<ChatMessage>> {
                let (_tx, rx) = tokio::sync::mpsc::channel(1);
                Ok(rx)
            }
            fn self_id(&self) -> &str {
                "self"
            }
        }

        let writer = Writer::spawn(Arc::new(FailingTransport), "tx".into(), "data".into());
        let result = writer.send_tx(vec![1, 2, 3]).await;
        assert!(result.is_err());
    }
}
