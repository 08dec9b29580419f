//! The in-memory namespace index: `path -> InodeRecord`, plus prefix
//! iteration for `readdir`/emptiness checks. Two backends behind one
//! trait, selected by the `database_backend` config/CLI flag.

use std::collections::BTreeMap;

use radix_trie::{Trie, TrieCommon};

use crate::tx::InodeRecord;

pub trait Db: Send {
    fn get(&self, path: &str) -> Option<InodeRecord>;
    fn insert(&mut self, path: String, record: InodeRecord);
    fn delete(&mut self, path: &str);
    /// Every `(path, record)` whose path starts with `prefix`, in any
    /// order.
    fn iter_prefix(&self, prefix: &str) -> Vec<(String, InodeRecord)>;
}

/// A plain ordered map, range-scanned for prefix queries. `O(log n +
/// m)`-ish via `BTreeMap::range`, not radix-optimal but a perfectly valid
/// backend.
#[derive(Default)]
pub struct MapDb {
    entries: BTreeMap<String, InodeRecord>,
}

impl MapDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Db for MapDb {
    fn get(&self, path: &str) -> Option<InodeRecord> {
        self.entries.get(path).cloned()
    }

    fn insert(&mut self, path: String, record: InodeRecord) {
        self.entries.insert(path, record);
    }

    fn delete(&mut self, path: &str) {
        self.entries.remove(path);
    }

    fn iter_prefix(&self, prefix: &str) -> Vec<(String, InodeRecord)> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Radix/patricia-tree backend, the better structure for `O(k + m)`
/// prefix iteration.
#[derive(Default)]
pub struct RadixDb {
    trie: Trie<String, InodeRecord>,
}

impl RadixDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Db for RadixDb {
    fn get(&self, path: &str) -> Option<InodeRecord> {
        self.trie.get(&path.to_string()).cloned()
    }

    fn insert(&mut self, path: String, record: InodeRecord) {
        self.trie.insert(path, record);
    }

    fn delete(&mut self, path: &str) {
        self.trie.remove(&path.to_string());
    }

    fn iter_prefix(&self, prefix: &str) -> Vec<(String, InodeRecord)> {
        match self.trie.subtrie(&prefix.to_string()) {
            Some(sub) => sub.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    Radix,
    Map,
}

impl DbBackend {
    pub fn new_db(self) -> Box<dyn Db> {
        match self {
            DbBackend::Radix => Box::new(RadixDb::new()),
            DbBackend::Map => Box::new(MapDb::new()),
        }
    }
}

/// Parent of `p`: strip the last segment, normalize
/// backslashes (Windows guests) to forward slashes first. Root `/` is its
/// own parent.
pub fn parent_of(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, _)) if parent.is_empty() => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}
