//! The filesystem engine: ties the namespace index, block cache, range
//! tracker and write aggregator together behind the VFS-shaped operations
//! the `fs/*.rs` dispatcher calls. `fs/mod.rs` stays a thin
//! dispatch-plus-`block_on` layer; this module is where the actual
//! precondition/lock/tx-emission logic lives.
//!
//! Two lock tiers: the coarse `FS` lock (`EngineState` behind a
//! `parking_lot::Mutex`) guards the DB and the open-file map; each open
//! file then has its own reader/writer lock plus an atomic `syncing`
//! guard. Nothing holds `FS` across a network call or a per-file lock
//! acquisition.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha1::{Digest, Sha1};

use crate::block_cache::{Cache, CacheBackend};
use crate::chat::ChatTransport;
use crate::db::{parent_of, Db};
use crate::error::{EngineError, EngineResult};
use crate::load::Load;
use crate::tx::{InodeKind, InodeRecord, Tx, BLOCK};
use crate::writer::Writer;

pub const MAX_READ_RETRIES: u32 = 20;
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

#[derive(Debug, Clone)]
pub struct EntryAttr {
    pub kind: EntryKind,
    pub size: u64,
    pub ctim: DateTime<Utc>,
    pub mtim: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct StatfsInfo {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

struct OpenFileInner {
    cache: Box<dyn Cache>,
    load: Load,
    ctim: DateTime<Utc>,
    mtim: DateTime<Utc>,
    dirty: bool,
}

/// The per-open-file state. `syncing` is the atomic that enforces "at
/// most one uploader per path".
pub struct OpenFile {
    inner: RwLock<OpenFileInner>,
    syncing: AtomicBool,
}

impl OpenFile {
    fn new(cache: Box<dyn Cache>, ctim: DateTime<Utc>, mtim: DateTime<Utc>) -> Self {
        Self {
            inner: RwLock::new(OpenFileInner { cache, load: Load::new(), ctim, mtim, dirty: false }),
            syncing: AtomicBool::new(false),
        }
    }
}

struct EngineState {
    db: Box<dyn Db>,
    open: HashMap<String, Arc<OpenFile>>,
    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,
    next_inode: u64,
}

/// Constructed once at startup, shared by `Arc` with the FUSE dispatcher
/// and the live-applier task. No process-wide mutable singletons.
pub struct Engine {
    state: Mutex<EngineState>,
    writer: Writer,
    transport: Arc<dyn ChatTransport>,
    tx_channel: String,
    data_channel: String,
    cache_backend: CacheBackend,
    runtime: tokio::runtime::Runtime,
}

impl Engine {
    pub fn new(
        db: Box<dyn Db>,
        writer: Writer,
        transport: Arc<dyn ChatTransport>,
        tx_channel: String,
        data_channel: String,
        cache_backend: CacheBackend,
        runtime: tokio::runtime::Runtime,
    ) -> Arc<Self> {
        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        inode_to_path.insert(1, "/".to_string());
        path_to_inode.insert("/".to_string(), 1);

        Arc::new(Self {
            state: Mutex::new(EngineState { db, open: HashMap::new(), inode_to_path, path_to_inode, next_inode: 2 }),
            writer,
            transport,
            tx_channel,
            data_channel,
            cache_backend,
            runtime,
        })
    }

    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    pub fn tx_channel(&self) -> &str {
        &self.tx_channel
    }

    pub fn data_channel(&self) -> &str {
        &self.data_channel
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    // --- inode <-> path bookkeeping (FUSE needs stable u64 handles; the
    // engine's own namespace is path-keyed) ---

    pub fn path_for_ino(&self, ino: u64) -> Option<String> {
        self.state.lock().inode_to_path.get(&ino).cloned()
    }

    pub fn ino_for_path(&self, path: &str) -> u64 {
        let mut state = self.state.lock();
        if let Some(&ino) = state.path_to_inode.get(path) {
            return ino;
        }
        let ino = state.next_inode;
        state.next_inode += 1;
        state.path_to_inode.insert(path.to_string(), ino);
        state.inode_to_path.insert(ino, path.to_string());
        ino
    }

    pub fn child_path(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    // --- VFS operations ---

    pub async fn mknod(&self, path: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        if state.open.contains_key(path) {
            return Err(EngineError::Exists(path.to_string()));
        }
        let parent = parent_of(path);
        let parent_ok = parent == "/" || state.db.get(&parent).map(|r| r.is_folder()).unwrap_or(false);
        if !parent_ok {
            return Err(EngineError::NotFound(parent));
        }
        if state.db.get(path).is_some() {
            return Err(EngineError::Exists(path.to_string()));
        }
        let now = Utc::now();
        state.open.insert(path.to_string(), Arc::new(OpenFile::new(self.cache_backend.new_cache(), now, now)));
        Ok(())
    }

    pub async fn mkdir(&self, path: &str) -> EngineResult<()> {
        {
            let state = self.state.lock();
            if state.open.contains_key(path) {
                return Err(EngineError::Exists(path.to_string()));
            }
            let parent = parent_of(path);
            let parent_ok = parent == "/" || state.db.get(&parent).map(|r| r.is_folder()).unwrap_or(false);
            if !parent_ok {
                return Err(EngineError::NotFound(parent));
            }
            if state.db.get(path).is_some() {
                return Err(EngineError::Exists(path.to_string()));
            }
        }

        let record = InodeRecord::new_folder(path, Utc::now());
        {
            let mut state = self.state.lock();
            state.db.insert(path.to_string(), record.clone());
        }
        self.emit_tx(&Tx::Write(record)).await?;
        Ok(())
    }

    pub async fn open(&self, path: &str) -> EngineResult<()> {
        {
            let state = self.state.lock();
            if state.open.contains_key(path) {
                return Ok(());
            }
        }
        let record = {
            let state = self.state.lock();
            state.db.get(path)
        };
        // A missing path is ENOENT, not the legacy EEXIST.
        let record = record.ok_or_else(|| EngineError::NotFound(path.to_string()))?;
        if record.is_folder() {
            return Ok(());
        }

        let mut cache = self.cache_backend.new_cache();
        cache.truncate(record.size as i64);
        let entry = Arc::new(OpenFile::new(cache, record.ctim, record.mtim));
        {
            let mut state = self.state.lock();
            state.open.insert(path.to_string(), entry.clone());
        }
        self.spawn_loader(path.to_string(), entry, record);
        Ok(())
    }

    /// Background chunk loader: chunk 0 first, then (if more than one
    /// chunk) the last chunk, then the remaining chunks in order — the
    /// streaming order that gets tail-seeks to land quickly.
    fn spawn_loader(&self, path: String, entry: Arc<OpenFile>, record: InodeRecord) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let total = record.file_ids.len();
            if total == 0 {
                return;
            }
            let order: Vec<usize> = if total == 1 { vec![0] } else { std::iter::once(0).chain(std::iter::once(total - 1)).chain(1..total - 1).collect() };

            for idx in order {
                let Some(file_id) = record.file_ids.get(idx) else { continue };
                match transport.fetch_attachment(file_id).await {
                    Ok(bytes) => {
                        let start = idx as i64 * BLOCK;
                        let end = start + bytes.len() as i64;
                        let mut inner = entry.inner.write();
                        inner.cache.write_range(start, end, &bytes);
                        inner.load.add_range(start, end);
                    }
                    Err(err) => {
                        tracing::warn!(%err, path = %path, chunk = idx, "chunk download failed, aborting loader");
                        return;
                    }
                }
            }
        });
    }

    pub async fn read(&self, path: &str, offset: i64, size: u32) -> EngineResult<Vec<u8>> {
        let entry = {
            let state = self.state.lock();
            state.open.get(path).cloned()
        };
        let Some(entry) = entry else {
            return Err(EngineError::BadFd(0));
        };

        let mut retries = 0u32;
        loop {
            let ready = entry.inner.read().load.bytes_ready(offset);
            if ready > 0 {
                let inner = entry.inner.read();
                let end = (offset + size as i64).min(offset + ready).min(inner.cache.size());
                if end <= offset {
                    return Ok(Vec::new());
                }
                let mut buf = vec![0u8; (end - offset) as usize];
                let n = inner.cache.read_range(offset, end, &mut buf);
                buf.truncate(n.max(0) as usize);
                return Ok(buf);
            }
            if retries >= MAX_READ_RETRIES {
                return Ok(Vec::new());
            }
            retries += 1;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn write(&self, path: &str, offset: i64, data: &[u8]) -> EngineResult<u32> {
        let entry = {
            let state = self.state.lock();
            state.open.get(path).cloned()
        };
        let Some(entry) = entry else {
            return Err(EngineError::BadFd(0));
        };

        let end = offset + data.len() as i64;
        let mut inner = entry.inner.write();
        if end > inner.cache.size() {
            inner.cache.truncate(end);
        }
        let written = inner.cache.write_range(offset, end, data);
        if !inner.load.is_ready(offset, end) {
            inner.load.add_range(offset, end);
        }
        inner.mtim = Utc::now();
        inner.dirty = true;
        Ok(written.max(0) as u32)
    }

    pub async fn truncate(&self, path: &str, size: i64) -> EngineResult<()> {
        let entry = {
            let state = self.state.lock();
            state.open.get(path).cloned()
        };
        let Some(entry) = entry else {
            return Err(EngineError::NotFound(path.to_string()));
        };

        let mut inner = entry.inner.write();
        let old_size = inner.cache.size();
        if size == old_size {
            return Ok(());
        }
        if size < old_size {
            inner.load.truncate(size);
        } else {
            inner.load.add_range(old_size, size);
        }
        inner.cache.truncate(size);
        inner.mtim = Utc::now();
        inner.dirty = true;
        Ok(())
    }

    pub async fn unlink(&self, path: &str) -> EngineResult<()> {
        let record = {
            let mut state = self.state.lock();
            let record = state.db.get(path);
            if record.is_none() {
                state.open.remove(path);
                return Ok(());
            }
            record
        };
        if record.map(|r| r.is_folder()).unwrap_or(false) {
            return Err(EngineError::IsDir(path.to_string()));
        }
        {
            let mut state = self.state.lock();
            state.open.remove(path);
            state.db.delete(path);
        }
        self.emit_tx(&Tx::Delete { path: path.to_string() }).await?;
        Ok(())
    }

    pub async fn rmdir(&self, path: &str) -> EngineResult<()> {
        {
            let state = self.state.lock();
            match state.db.get(path) {
                None => return Err(EngineError::NotFound(path.to_string())),
                Some(r) if !r.is_folder() => return Err(EngineError::NotDir(path.to_string())),
                _ => {}
            }
            // Compare parent(child) == path, not a raw prefix match, to
            // avoid e.g. "/a" vs "/ab" false positives.
            let non_empty = state.db.iter_prefix(path).into_iter().any(|(p, _)| p != path && parent_of(&p) == path);
            if non_empty {
                return Err(EngineError::NotEmpty(path.to_string()));
            }
        }
        {
            let mut state = self.state.lock();
            state.db.delete(path);
        }
        self.emit_tx(&Tx::Delete { path: path.to_string() }).await?;
        Ok(())
    }

    pub async fn rename(&self, old_path: &str, new_path: &str) -> EngineResult<()> {
        let new_parent = parent_of(new_path);
        let old_record;
        {
            let mut state = self.state.lock();
            let parent_ok = new_parent == "/" || state.db.get(&new_parent).map(|r| r.is_folder()).unwrap_or(false);
            if !parent_ok {
                return Err(EngineError::NotFound(new_parent));
            }
            old_record = state.db.get(old_path);
            if let Some(entry) = state.open.remove(old_path) {
                state.open.insert(new_path.to_string(), entry);
            }
            if old_record.is_none() {
                // Unpublished mknod'd file: only the open-map entry moves,
                // nothing is in the DB to rewrite or delete.
                return Ok(());
            }
        }

        let record = old_record.unwrap();
        if record.is_folder() {
            let state = self.state.lock();
            let has_children = state.db.iter_prefix(old_path).into_iter().any(|(p, _)| p != old_path && parent_of(&p) == old_path);
            if has_children {
                return Err(EngineError::NotEmpty(old_path.to_string()));
            }
        }

        let mut new_record = record.clone();
        new_record.path = new_path.to_string();
        let write_tx = Tx::Write(new_record.clone());
        let delete_tx = Tx::Delete { path: old_path.to_string() };

        let write_line = write_tx.encode_checked()?;
        let delete_line = delete_tx.encode_checked()?;
        if (write_line.len() + delete_line.len() + 2) as i64 <= BLOCK {
            let payload = crate::tx::join_lines([&write_tx, &delete_tx].into_iter());
            self.writer.send_tx(payload.into_bytes()).await.map_err(|err| EngineError::Denied(err.to_string()))?;
        } else {
            self.writer.send_tx(format!("{write_line}\n").into_bytes()).await.map_err(|err| EngineError::Denied(err.to_string()))?;
            self.writer.send_tx(format!("{delete_line}\n").into_bytes()).await.map_err(|err| EngineError::Denied(err.to_string()))?;
        }

        let mut state = self.state.lock();
        state.db.insert(new_path.to_string(), new_record);
        state.db.delete(old_path);
        Ok(())
    }

    /// A no-op on a clean file; otherwise spawns a detached uploader and
    /// returns immediately. Takes `Arc<Self>` since the uploader outlives
    /// this call.
    pub async fn release(self: Arc<Self>, path: &str) -> EngineResult<()> {
        let entry = {
            let state = self.state.lock();
            state.open.get(path).cloned()
        };
        let Some(entry) = entry else {
            return Ok(());
        };
        if !entry.inner.read().dirty {
            return Ok(());
        }
        if entry.syncing.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            // Another uploader already owns this path.
            return Ok(());
        }

        let old_record = {
            let state = self.state.lock();
            state.db.get(path)
        };
        let path_owned = path.to_string();
        let engine = self.clone();
        let entry_task = entry.clone();

        tokio::spawn(async move {
            if let Err(err) = engine.upload(&path_owned, &entry_task, old_record).await {
                tracing::warn!(%err, path = %path_owned, "release upload aborted");
            }
            entry_task.syncing.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    async fn upload(&self, path: &str, entry: &Arc<OpenFile>, old_record: Option<InodeRecord>) -> EngineResult<()> {
        let size = entry.inner.read().cache.size();
        let chunk_count = if size == 0 { 0 } else { ((size + BLOCK - 1) / BLOCK) as usize };

        let mut file_ids = Vec::with_capacity(chunk_count);
        let mut checksums = Vec::with_capacity(chunk_count);

        for i in 0..chunk_count {
            let start = i as i64 * BLOCK;
            let end = (start + BLOCK).min(size);
            if start > size {
                break;
            }
            let buf = {
                let inner = entry.inner.read();
                let mut buf = vec![0u8; (end - start) as usize];
                inner.cache.read_range(start, end, &mut buf);
                buf
            };
            let digest = sha1_b64url(&buf);

            // Content-addressed chunk reuse: skip the upload when this
            // chunk's digest matches the published one.
            if let Some(old) = &old_record {
                if i < old.checksums.len() && old.checksums[i] == digest {
                    file_ids.push(old.file_ids[i].clone());
                    checksums.push(digest);
                    continue;
                }
            }

            let file_id = self.writer.send_data(buf).await.map_err(|err| EngineError::Denied(err.to_string()))?;
            file_ids.push(file_id);
            checksums.push(digest);
        }

        let (ctim, mtim) = {
            let inner = entry.inner.read();
            (inner.ctim, inner.mtim)
        };
        let record = InodeRecord { kind: InodeKind::File, path: path.to_string(), size: size.max(0) as u64, ctim, mtim, file_ids, checksums };
        self.emit_tx(&Tx::Write(record.clone())).await?;

        {
            let mut state = self.state.lock();
            state.db.insert(path.to_string(), record);
        }
        entry.inner.write().dirty = false;
        Ok(())
    }

    pub async fn getattr(&self, path: &str) -> EngineResult<EntryAttr> {
        let open_entry = {
            let state = self.state.lock();
            state.open.get(path).cloned()
        };
        if let Some(entry) = open_entry {
            let inner = entry.inner.read();
            return Ok(EntryAttr { kind: EntryKind::File, size: inner.cache.size().max(0) as u64, ctim: inner.ctim, mtim: inner.mtim });
        }

        let record = {
            let state = self.state.lock();
            state.db.get(path)
        };
        record
            .map(|r| EntryAttr { kind: if r.is_folder() { EntryKind::Folder } else { EntryKind::File }, size: r.size, ctim: r.ctim, mtim: r.mtim })
            .ok_or_else(|| EngineError::NotFound(path.to_string()))
    }

    pub async fn readdir(&self, path: &str) -> EngineResult<Vec<(String, EntryKind)>> {
        let state = self.state.lock();
        match state.db.get(path) {
            None => return Err(EngineError::NotFound(path.to_string())),
            Some(r) if !r.is_folder() => return Err(EngineError::NotDir(path.to_string())),
            _ => {}
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (child_path, record) in state.db.iter_prefix(path) {
            if child_path == path || parent_of(&child_path) != path || state.open.contains_key(&child_path) {
                continue;
            }
            seen.insert(child_path.clone());
            out.push((name_of(&child_path), if record.is_folder() { EntryKind::Folder } else { EntryKind::File }));
        }
        for open_path in state.open.keys() {
            if parent_of(open_path) == path && !seen.contains(open_path) {
                out.push((name_of(open_path), EntryKind::File));
            }
        }
        Ok(out)
    }

    /// Synthetic figures, sized off the block size the way a RAM-backed
    /// filesystem reports a large, roughly-accurate free-space figure.
    /// Affects only `df`-like reporting, never real capacity checks.
    pub async fn statfs(&self) -> StatfsInfo {
        StatfsInfo {
            blocks: 1_000_000,
            bfree: 1_000_000,
            bavail: 1_000_000,
            files: 1_000_000,
            ffree: 1_000_000,
            bsize: BLOCK as u32,
            namelen: 255,
            frsize: BLOCK as u32,
        }
    }

    // --- live applier hooks, called from `live.rs` ---

    pub async fn apply_live_write(&self, record: InodeRecord) -> EngineResult<()> {
        let path = record.path.clone();
        let entry = {
            let mut state = self.state.lock();
            state.db.insert(path.clone(), record.clone());
            state.open.get(&path).cloned()
        };
        let Some(entry) = entry else {
            return Ok(());
        };

        let new_size = record.size as i64;
        {
            let mut inner = entry.inner.write();
            if new_size < inner.cache.size() {
                inner.load.truncate(new_size);
            }
            inner.cache.truncate(new_size);
        }

        for (i, checksum) in record.checksums.iter().enumerate() {
            let start = i as i64 * BLOCK;
            if start >= entry.inner.read().cache.size() {
                tracing::warn!(path = %path, chunk = i, "file changed while upcoming change is applied");
                return Ok(());
            }
            let end = (start + BLOCK).min(new_size);
            let local_digest = {
                let inner = entry.inner.read();
                let mut buf = vec![0u8; (end - start).max(0) as usize];
                inner.cache.read_range(start, end, &mut buf);
                sha1_b64url(&buf)
            };
            if &local_digest == checksum {
                continue;
            }
            let Some(file_id) = record.file_ids.get(i) else { continue };
            match self.transport.fetch_attachment(file_id).await {
                Ok(bytes) => {
                    let mut inner = entry.inner.write();
                    inner.cache.write_range(start, start + bytes.len() as i64, &bytes);
                    inner.load.add_range(start, start + bytes.len() as i64);
                }
                Err(err) => {
                    tracing::warn!(%err, path = %path, chunk = i, "live chunk download failed");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub fn apply_live_delete(&self, path: &str) {
        let mut state = self.state.lock();
        state.db.delete(path);
        state.open.remove(path);
    }

    /// Builds and submits one encoded tx line on the tx queue, outside any
    /// lock: a slow post must never stall other filesystem operations.
    async fn emit_tx(&self, tx: &Tx) -> EngineResult<()> {
        let line = tx.encode_checked()?;
        self.writer.send_tx(format!("{line}\n").into_bytes()).await.map_err(|err| EngineError::Denied(err.to_string()))?;
        Ok(())
    }
}

fn name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn sha1_b64url(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    base64::engine::general_purpose::URL_SAFE.encode(digest)
}
