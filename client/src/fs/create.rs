use super::prelude::*;

/// FUSE `create` (open-with-O_CREAT): `mknod`s the path in the engine, then
/// replies with the freshly minted handle and attributes in one round trip.
pub fn create(fs: &mut FsWrapper, req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, _flags: i32, reply: ReplyCreate) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };

    if let Err(err) = fs.engine.block_on(fs.engine.mknod(&full_path)) {
        reply.error((&err).into());
        return;
    }

    let ino = fs.engine.ino_for_path(&full_path);
    match fs.engine.block_on(fs.engine.getattr(&full_path)) {
        Ok(attr) => reply.created(&fs.entry_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid()), 0, FH, 0),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `mknod`: plain `mknod(2)` (e.g. some tools call this instead of
/// `create` for a zero-byte file). Identical engine call, `ReplyEntry`
/// instead of `ReplyCreate`.
pub fn mknod(fs: &mut FsWrapper, req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, _rdev: u32, reply: ReplyEntry) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };

    if let Err(err) = fs.engine.block_on(fs.engine.mknod(&full_path)) {
        reply.error((&err).into());
        return;
    }

    let ino = fs.engine.ino_for_path(&full_path);
    match fs.engine.block_on(fs.engine.getattr(&full_path)) {
        Ok(attr) => reply.entry(&fs.entry_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid()), 0),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `mkdir`: publishes the folder's `Write` tx immediately — folders,
/// unlike files, have no open/dirty/release cycle.
pub fn mkdir(fs: &mut FsWrapper, req: &Request<'_>, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };

    if let Err(err) = fs.engine.block_on(fs.engine.mkdir(&full_path)) {
        reply.error((&err).into());
        return;
    }

    let ino = fs.engine.ino_for_path(&full_path);
    match fs.engine.block_on(fs.engine.getattr(&full_path)) {
        Ok(attr) => reply.entry(&fs.entry_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid()), 0),
        Err(err) => reply.error((&err).into()),
    }
}
