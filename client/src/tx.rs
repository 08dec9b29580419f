//! Line-delimited JSON transaction codec.
//!
//! A `Tx` is either a `Write` (the full inode record) or a `Delete` (path
//! only). Kind/type discriminants are small stable integers so the log
//! stays forward-compatible: unknown `tx` values are skipped with a
//! warning rather than failing the whole replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub const BLOCK: i64 = 8_388_119;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InodeKind {
    File = 0,
    Folder = 1,
}

/// One namespace mutation. `kind` 0 is `Write` (carries the full record),
/// `kind` 1 is `Delete` (path only); `Delete` rows are never stored in the
/// DB, only ever appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub enum Tx {
    Write(InodeRecord),
    Delete { path: String },
}

/// The DB value for a live path. `ctim`/`mtim` carry nanosecond resolution
/// via `chrono::DateTime<Utc>`, serialized RFC3339Nano to match the wire
/// shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InodeRecord {
    pub kind: InodeKind,
    pub path: String,
    pub size: u64,
    pub ctim: DateTime<Utc>,
    pub mtim: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<String>,
}

impl InodeRecord {
    pub fn new_folder(path: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind: InodeKind::Folder,
            path: path.into(),
            size: 0,
            ctim: now,
            mtim: now,
            file_ids: Vec::new(),
            checksums: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == InodeKind::Folder
    }
}

/// The wire-level JSON object. Kept separate from `Tx`/`InodeRecord`
/// because the wire field names (`tx`, `ids`, `sums`) don't match the
/// in-memory names, and the delete form omits nearly everything.
#[derive(Debug, Serialize, Deserialize)]
struct WireTx {
    tx: u8,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<u8>,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ctim: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mtim: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sums: Option<Vec<String>>,
}

impl Tx {
    pub fn path(&self) -> &str {
        match self {
            Tx::Write(rec) => &rec.path,
            Tx::Delete { path } => path,
        }
    }

    pub fn encode(&self) -> String {
        let wire = match self {
            Tx::Write(rec) => WireTx {
                tx: 0,
                kind: Some(rec.kind as u8),
                path: rec.path.clone(),
                size: if rec.size == 0 { None } else { Some(rec.size) },
                ctim: Some(rec.ctim),
                mtim: Some(rec.mtim),
                ids: if rec.file_ids.is_empty() { None } else { Some(rec.file_ids.clone()) },
                sums: if rec.checksums.is_empty() { None } else { Some(rec.checksums.clone()) },
            },
            Tx::Delete { path } => WireTx {
                tx: 1,
                kind: None,
                path: path.clone(),
                size: None,
                ctim: None,
                mtim: None,
                ids: None,
                sums: None,
            },
        };
        serde_json::to_string(&wire).expect("Tx serialization cannot fail")
    }

    /// Enforces the wire-size invariant: a single tx's serialized
    /// form must not exceed `BLOCK` bytes.
    pub fn encode_checked(&self) -> EngineResult<String> {
        let line = self.encode();
        if line.len() as i64 > BLOCK {
            return Err(EngineError::Denied(format!(
                "tx for {} would be {} bytes, over the {}-byte block limit",
                self.path(),
                line.len(),
                BLOCK
            )));
        }
        Ok(line)
    }

    fn decode_one(line: &str) -> Option<Tx> {
        let wire: WireTx = match serde_json::from_str(line) {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(%err, line, "skipping undecodable tx line");
                return None;
            }
        };
        match wire.tx {
            0 => {
                let kind = match wire.kind {
                    Some(0) => InodeKind::File,
                    Some(1) => InodeKind::Folder,
                    other => {
                        tracing::warn!(?other, path = %wire.path, "skipping write tx with unknown type");
                        return None;
                    }
                };
                Some(Tx::Write(InodeRecord {
                    kind,
                    path: wire.path,
                    size: wire.size.unwrap_or(0),
                    ctim: wire.ctim.unwrap_or_else(Utc::now),
                    mtim: wire.mtim.unwrap_or_else(Utc::now),
                    file_ids: wire.ids.unwrap_or_default(),
                    checksums: wire.sums.unwrap_or_default(),
                }))
            }
            1 => Some(Tx::Delete { path: wire.path }),
            other => {
                tracing::warn!(kind = other, path = %wire.path, "skipping tx with unknown kind");
                None
            }
        }
    }

    /// Decodes every non-empty line of a multi-line attachment body, in
    /// file order. Undecodable or unknown-kind lines are skipped (logged),
    /// replay continues.
    pub fn decode_lines(body: &str) -> Vec<Tx> {
        body.lines().filter(|l| !l.trim().is_empty()).filter_map(Tx::decode_one).collect()
    }
}

/// Joins encoded txs into one newline-terminated payload, as posted in a
/// single attachment.
pub fn join_lines<'a>(txs: impl Iterator<Item = &'a Tx>) -> String {
    let mut out = String::new();
    for tx in txs {
        out.push_str(&tx.encode());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap()
    }

    #[test]
    fn write_round_trips() {
        let rec = InodeRecord {
            kind: InodeKind::File,
            path: "/a/b.txt".to_string(),
            size: 12345,
            ctim: now(),
            mtim: now(),
            file_ids: vec!["id1".into(), "id2".into()],
            checksums: vec!["aaa".into(), "bbb".into()],
        };
        let tx = Tx::Write(rec.clone());
        let line = tx.encode();
        let decoded = Tx::decode_lines(&line);
        assert_eq!(decoded, vec![Tx::Write(rec)]);
    }

    #[test]
    fn delete_omits_everything_but_path() {
        let tx = Tx::Delete { path: "/a/b.txt".to_string() };
        let line = tx.encode();
        assert!(!line.contains("size"));
        assert!(!line.contains("ctim"));
        let decoded = Tx::decode_lines(&line);
        assert_eq!(decoded, vec![Tx::Delete { path: "/a/b.txt".to_string() }]);
    }

    #[test]
    fn root_folder_write_matches_literal_wire_shape() {
        let rec = InodeRecord::new_folder("/", now());
        let tx = Tx::Write(rec);
        let line = tx.encode();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["tx"], 0);
        assert_eq!(value["type"], 1);
        assert_eq!(value["path"], "/");
        assert!(value.get("size").is_none());
        assert!(value.get("ids").is_none());
        assert!(value.get("sums").is_none());
    }

    #[test]
    fn unknown_kind_is_skipped_not_fatal() {
        let lines = "{\"tx\":9,\"path\":\"/x\"}\n{\"tx\":1,\"path\":\"/y\"}\n";
        let decoded = Tx::decode_lines(lines);
        assert_eq!(decoded, vec![Tx::Delete { path: "/y".to_string() }]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let lines = "\n{\"tx\":1,\"path\":\"/y\"}\n\n";
        let decoded = Tx::decode_lines(lines);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn oversized_tx_is_rejected() {
        let rec = InodeRecord {
            kind: InodeKind::File,
            path: "/big".to_string(),
            size: 1,
            ctim: now(),
            mtim: now(),
            file_ids: vec!["x".repeat(BLOCK as usize)],
            checksums: vec!["y".into()],
        };
        let tx = Tx::Write(rec);
        assert!(tx.encode_checked().is_err());
    }

    #[test]
    fn join_lines_is_newline_terminated_and_ordered() {
        let a = Tx::Delete { path: "/a".to_string() };
        let b = Tx::Delete { path: "/b".to_string() };
        let joined = join_lines([&a, &b].into_iter());
        let decoded = Tx::decode_lines(&joined);
        assert_eq!(decoded, vec![a, b]);
        assert!(joined.ends_with('\n'));
    }
}
