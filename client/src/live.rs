//! The live applier: the long-lived task that drains the
//! inbound subscription on the tx channel and folds foreign writes into
//! the running `Engine`. Spawned once at startup, handed the same `Arc
//! <Engine>` the FUSE dispatcher holds — no process-wide globals.

use std::sync::Arc;

use crate::engine::Engine;
use crate::tx::Tx;

/// Subscribes to `tx_channel` and applies every inbound message until the
/// stream ends (the transport dropped the sender, e.g. on reconnect
/// failure). Self-authored messages and anything not on the tx channel
/// are filtered by the caller wiring the subscription to this channel in
/// the first place; the remaining self-id check happens here too since a
/// manual channel post could originate from the same account.
pub async fn run(engine: Arc<Engine>, tx_channel: String) {
    let self_id = engine.transport().self_id().to_string();
    let mut receiver = match engine.transport().subscribe_new_messages(&tx_channel).await {
        Ok(receiver) => receiver,
        Err(err) => {
            tracing::error!(%err, "failed to subscribe to live tx channel");
            return;
        }
    };

    while let Some(message) = receiver.recv().await {
        if message.author_id == self_id {
            continue;
        }
        for url in &message.attachment_urls {
            let bytes = match engine.transport().fetch_attachment(url).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(%err, url, "failed to fetch live tx attachment");
                    continue;
                }
            };
            let body = String::from_utf8_lossy(&bytes);
            for tx in Tx::decode_lines(&body) {
                match tx {
                    Tx::Write(record) => {
                        if let Err(err) = engine.apply_live_write(record).await {
                            tracing::warn!(%err, "failed to apply live write tx");
                        }
                    }
                    Tx::Delete { path } => engine.apply_live_delete(&path),
                }
            }
        }
    }

    tracing::warn!("live tx subscription stream ended");
}
