//! The per-open-file byte cache. Two backends, selected by the
//! `cache_backend` config/CLI flag, behind one trait so the engine never
//! knows which one it's holding.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use tempfile::NamedTempFile;

pub trait Cache: Send {
    /// Copies `[start, end)` into `buf`, returns bytes actually copied
    /// (fewer than requested if `end > size()`).
    fn read_range(&self, start: i64, end: i64, buf: &mut [u8]) -> i64;

    /// Copies from `buf` into `[start, end)`, returns bytes written,
    /// clipped to the current allocated size. Writing past the end
    /// requires a prior `truncate`.
    fn write_range(&mut self, start: i64, end: i64, buf: &[u8]) -> i64;

    /// Extends (zero-filling) or shrinks to `size`.
    fn truncate(&mut self, size: i64);

    fn size(&self) -> i64;

    /// Releases the underlying storage (temp file removal for the disk
    /// backend; a no-op deallocation for memory).
    fn rm(&mut self);
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    buf: Vec<u8>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl Cache for MemoryCache {
    fn read_range(&self, start: i64, end: i64, buf: &mut [u8]) -> i64 {
        if start < 0 || start as usize >= self.buf.len() {
            return 0;
        }
        let start = start as usize;
        let end = (end.max(start as i64) as usize).min(self.buf.len());
        let n = (end - start).min(buf.len());
        buf[..n].copy_from_slice(&self.buf[start..start + n]);
        n as i64
    }

    fn write_range(&mut self, start: i64, end: i64, data: &[u8]) -> i64 {
        if start < 0 {
            return 0;
        }
        let start = start as usize;
        let end = (end.max(start as i64) as usize).min(self.buf.len());
        if start > self.buf.len() {
            return 0;
        }
        let n = (end - start).min(data.len());
        self.buf[start..start + n].copy_from_slice(&data[..n]);
        n as i64
    }

    fn truncate(&mut self, size: i64) {
        let size = size.max(0) as usize;
        self.buf.resize(size, 0);
    }

    fn size(&self) -> i64 {
        self.buf.len() as i64
    }

    fn rm(&mut self) {
        self.buf.clear();
    }
}

/// Disk-backed cache: a temp file on the host, positioned I/O via
/// `FileExt::{read_at,write_at}` so concurrent readers don't need to seek
/// the shared handle.
pub struct DiskCache {
    file: Option<NamedTempFile>,
    size: i64,
}

impl DiskCache {
    pub fn new() -> io::Result<Self> {
        let file = NamedTempFile::new()?;
        Ok(Self { file: Some(file), size: 0 })
    }

    fn handle(&self) -> &File {
        self.file.as_ref().expect("DiskCache used after rm()").as_file()
    }
}

impl Cache for DiskCache {
    fn read_range(&self, start: i64, end: i64, buf: &mut [u8]) -> i64 {
        if start < 0 || start >= self.size {
            return 0;
        }
        let end = end.max(start).min(self.size);
        let want = ((end - start) as usize).min(buf.len());
        if want == 0 {
            return 0;
        }
        match self.handle().read_at(&mut buf[..want], start as u64) {
            Ok(n) => n as i64,
            Err(_) => 0,
        }
    }

    fn write_range(&mut self, start: i64, end: i64, data: &[u8]) -> i64 {
        if start < 0 || start > self.size {
            return 0;
        }
        let end = end.max(start).min(self.size);
        let want = ((end - start) as usize).min(data.len());
        if want == 0 {
            return 0;
        }
        match self.handle().write_at(&data[..want], start as u64) {
            Ok(n) => n as i64,
            Err(_) => 0,
        }
    }

    fn truncate(&mut self, size: i64) {
        let size = size.max(0);
        if let Some(file) = &self.file {
            let _ = file.as_file().set_len(size as u64);
        }
        self.size = size;
    }

    fn size(&self) -> i64 {
        self.size
    }

    fn rm(&mut self) {
        self.file = None;
        self.size = 0;
    }
}

/// Which backend newly opened files should use; selected once at mount
/// time from config/CLI (`cache backend (memory|disk)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Disk,
}

impl CacheBackend {
    pub fn new_cache(self) -> Box<dyn Cache> {
        match self {
            CacheBackend::Memory => Box::new(MemoryCache::new()),
            CacheBackend::Disk => match DiskCache::new() {
                Ok(cache) => Box::new(cache),
                Err(err) => {
                    tracing::warn!(%err, "falling back to memory cache: temp file creation failed");
                    Box::new(MemoryCache::new())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(mut cache: Box<dyn Cache>) {
        cache.truncate(10);
        assert_eq!(cache.size(), 10);
        let written = cache.write_range(0, 5, b"hello");
        assert_eq!(written, 5);
        let mut buf = [0u8; 5];
        let read = cache.read_range(0, 5, &mut buf);
        assert_eq!(read, 5);
        assert_eq!(&buf, b"hello");

        // write past current size is clipped to size()
        let n = cache.write_range(8, 20, b"xxxxxxxx");
        assert_eq!(n, 2);

        cache.truncate(20);
        assert_eq!(cache.size(), 20);
        let mut tail = [0xffu8; 5];
        let n = cache.read_range(15, 20, &mut tail);
        assert_eq!(n, 5);
        assert_eq!(tail, [0u8; 5]);

        cache.truncate(3);
        assert_eq!(cache.size(), 3);
        let mut buf = [0u8; 5];
        let n = cache.read_range(0, 5, &mut buf);
        assert_eq!(n, 3);

        cache.rm();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn memory_backend_behaves() {
        exercise(Box::new(MemoryCache::new()));
    }

    #[test]
    fn disk_backend_behaves() {
        exercise(Box::new(DiskCache::new().unwrap()));
    }

    #[test]
    fn read_past_end_returns_fewer_bytes() {
        let mut cache = MemoryCache::new();
        cache.truncate(3);
        cache.write_range(0, 3, b"abc");
        let mut buf = [0u8; 10];
        let n = cache.read_range(0, 10, &mut buf);
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
    }
}
