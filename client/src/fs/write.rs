use super::prelude::*;

/// FUSE `write`: buffers straight into the open file's block cache.
pub fn write(
    fs: &mut FsWrapper,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let Some(path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.write(&path, offset, data)) {
        Ok(written) => reply.written(written),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `release`: hands off to the engine, which spawns the detached
/// uploader only if the file is dirty. Always replies `ok` — the upload
/// itself is best-effort and asynchronous.
pub fn release(fs: &mut FsWrapper, _req: &Request<'_>, ino: u64, _fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
    let Some(path) = fs.path_for(ino) else {
        reply.ok();
        return;
    };
    let engine = fs.engine.clone();
    fs.engine.block_on(async move {
        if let Err(err) = engine.release(&path).await {
            tracing::warn!(%err, path = %path, "release failed");
        }
    });
    reply.ok();
}

pub fn flush(_fs: &mut FsWrapper, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
    reply.ok();
}
