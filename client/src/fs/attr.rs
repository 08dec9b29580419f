use super::prelude::*;

/// FUSE `getattr`: a cheap in-memory lookup against the engine's open-file
/// map or namespace index, no network call.
pub fn getattr(fs: &mut FsWrapper, req: &Request, ino: u64, reply: ReplyAttr) {
    let Some(path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.getattr(&path)) {
        Ok(attr) => reply.attr(&fs.attr_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid())),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `setattr`: only `size` (truncate) is meaningful here. Mode bits are
/// the synthetic 0777/0755 every entry reports; chmod/chown/utimes are
/// accepted and ignored rather than rejected, matching what common FUSE
/// clients expect from a filesystem with no permission model.
#[allow(clippy::too_many_arguments)]
pub fn setattr(
    fs: &mut FsWrapper,
    req: &Request<'_>,
    ino: u64,
    _mode: Option<u32>,
    _uid: Option<u32>,
    _gid: Option<u32>,
    size: Option<u64>,
    _atime: Option<TimeOrNow>,
    _mtime: Option<TimeOrNow>,
    _ctime: Option<SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<SystemTime>,
    _chgtime: Option<SystemTime>,
    _bkuptime: Option<SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    let Some(path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };

    if let Some(new_size) = size {
        if let Err(err) = fs.engine.block_on(fs.engine.truncate(&path, new_size as i64)) {
            reply.error((&err).into());
            return;
        }
    }

    match fs.engine.block_on(fs.engine.getattr(&path)) {
        Ok(attr) => reply.attr(&fs.attr_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid())),
        Err(err) => reply.error((&err).into()),
    }
}
