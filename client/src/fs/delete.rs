use super::prelude::*;

/// FUSE `unlink`: deletes a file. The engine rejects folders with `EISDIR`
/// — `unlink`/`rmdir` are not interchangeable here.
pub fn unlink(fs: &mut FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.unlink(&full_path)) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `rmdir`: deletes a folder, refusing with `ENOTEMPTY` if it has any
/// remaining children.
pub fn rmdir(fs: &mut FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.rmdir(&full_path)) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error((&err).into()),
    }
}
