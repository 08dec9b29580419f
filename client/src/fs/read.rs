use super::prelude::*;

/// FUSE `lookup`: resolves (or mints) the inode for `parent/name` and
/// replies with its attributes, or `ENOENT` if the engine has no entry
/// there.
pub fn lookup(fs: &mut FsWrapper, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let Some(full_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };

    match fs.engine.block_on(fs.engine.getattr(&full_path)) {
        Ok(attr) => {
            let ino = fs.engine.ino_for_path(&full_path);
            reply.entry(&fs.entry_ttl, &to_file_attr(ino, &attr, req.uid(), req.gid()), 0);
        }
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `readdir`: `.`/`..` on the first call, then one entry per engine
/// `readdir` result. Inodes are minted for any child not seen before.
pub fn readdir(fs: &mut FsWrapper, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let Some(dir_path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };

    let children = match fs.engine.block_on(fs.engine.readdir(&dir_path)) {
        Ok(children) => children,
        Err(err) => {
            reply.error((&err).into());
            return;
        }
    };

    let mut entries: Vec<(u64, FileType, String)> = Vec::with_capacity(children.len() + 2);
    entries.push((ino, FileType::Directory, ".".to_string()));
    let parent_ino = if ino == 1 { 1 } else { fs.engine.ino_for_path(&crate::db::parent_of(&dir_path)) };
    entries.push((parent_ino, FileType::Directory, "..".to_string()));

    for (name, kind) in children {
        let child_path = Engine::child_path(&dir_path, &name);
        let ino = fs.engine.ino_for_path(&child_path);
        let file_type = if kind == EntryKind::Folder { FileType::Directory } else { FileType::RegularFile };
        entries.push((ino, file_type, name));
    }

    for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
        if reply.add(ino, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

/// FUSE `read`: delegates to the engine, which polls the background loader
/// until the requested range is ready (or gives up after `MAX_READ_RETRIES`).
pub fn read(fs: &mut FsWrapper, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
    let Some(path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.read(&path, offset, size)) {
        Ok(data) => reply.data(&data),
        Err(err) => reply.error((&err).into()),
    }
}

/// FUSE `open`: opens the path in the engine (spawning the chunk loader for
/// a first open) and hands back the shared opaque handle — the engine
/// tracks open state by path, not by `fh`.
pub fn open(fs: &mut FsWrapper, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.path_for(ino) else {
        reply.error(ENOENT);
        return;
    };
    match fs.engine.block_on(fs.engine.open(&path)) {
        Ok(()) => reply.opened(FH, 0),
        Err(err) => reply.error((&err).into()),
    }
}
