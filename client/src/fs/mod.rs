//! This module is the root of the FUSE filesystem implementation.
//!
//! `FsWrapper` owns no filesystem state of its own: it holds the shared
//! `Engine` and the two kernel-cache TTLs, and does nothing but translate
//! between FUSE's inode-and-handle vocabulary and the engine's path-keyed
//! one. The `impl Filesystem` block is a thin dispatcher: forward each
//! kernel call to the matching sub-module, which does the
//! `engine.block_on(...)` call and turns the result into a FUSE reply.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::config::Config;
use crate::engine::{Engine, EntryAttr, EntryKind};

pub mod prelude;
mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;
mod xattr;

/// FUSE file handles are meaningless in a path-keyed engine:
/// `open`/`create`/`read`/`write`/`release` all resolve the path from
/// `ino`, never from `fh`. Every handler hands the kernel this same opaque
/// constant back.
pub const FH: u64 = 0;

#[derive(Clone)]
pub struct FsWrapper {
    engine: Arc<Engine>,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl FsWrapper {
    pub fn new(engine: Arc<Engine>, config: &Config) -> Self {
        Self {
            engine,
            attr_ttl: Duration::from_secs(config.kernel_attr_timeout_seconds),
            entry_ttl: Duration::from_secs(config.kernel_entry_timeout_seconds),
        }
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.engine.path_for_ino(ino)
    }

    fn child_full_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent_path = self.path_for(parent)?;
        Some(Engine::child_path(&parent_path, &name.to_string_lossy()))
    }
}

fn system_time_from(t: DateTime<Utc>) -> SystemTime {
    let nanos = t.timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// Builds the kernel-facing `FileAttr` for one entry. UID/GID come from the
/// calling request since the engine itself is ownership-agnostic.
pub fn to_file_attr(ino: u64, attr: &EntryAttr, uid: u32, gid: u32) -> FileAttr {
    let kind = match attr.kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Folder => FileType::Directory,
    };
    let mtime = system_time_from(attr.mtim);
    let ctime = system_time_from(attr.ctim);
    FileAttr {
        ino,
        size: attr.size,
        blocks: (attr.size + 511) / 512,
        atime: mtime,
        mtime,
        ctime,
        crtime: ctime,
        kind,
        perm: if kind == FileType::Directory { 0o755 } else { 0o644 },
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

/// Main FUSE trait implementation: a thin dispatcher onto the sub-modules.
impl Filesystem for FsWrapper {
    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        attr::getattr(self, req, ino, reply);
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<SystemTime>,
        fh: Option<u64>,
        crtime: Option<SystemTime>,
        chgtime: Option<SystemTime>,
        bkuptime: Option<SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(self, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime, bkuptime, flags, reply);
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(self, req, parent, name, reply);
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        read::readdir(self, req, ino, fh, offset, reply);
    }

    fn read(&mut self, req: &Request<'_>, ino: u64, fh: u64, offset: i64, size: u32, flags: i32, lock_owner: Option<u64>, reply: ReplyData) {
        read::read(self, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(self, req, ino, flags, reply);
    }

    fn write(&mut self, req: &Request<'_>, ino: u64, fh: u64, offset: i64, data: &[u8], write_flags: u32, flags: i32, lock_owner: Option<u64>, reply: ReplyWrite) {
        write::write(self, req, ino, fh, offset, data, write_flags, flags, lock_owner, reply);
    }

    fn release(&mut self, req: &Request<'_>, ino: u64, fh: u64, flags: i32, lock_owner: Option<u64>, flush: bool, reply: ReplyEmpty) {
        write::release(self, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(self, req, ino, fh, lock_owner, reply);
    }

    fn create(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, flags: i32, reply: ReplyCreate) {
        create::create(self, req, parent, name, mode, umask, flags, reply);
    }

    fn mknod(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, rdev: u32, reply: ReplyEntry) {
        create::mknod(self, req, parent, name, mode, umask, rdev, reply);
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, umask: u32, reply: ReplyEntry) {
        create::mkdir(self, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(self, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(self, req, parent, name, reply);
    }

    fn rename(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, flags: u32, reply: ReplyEmpty) {
        rename::rename(self, req, parent, name, newparent, newname, flags, reply);
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let info = self.engine.block_on(self.engine.statfs());
        reply.statfs(info.blocks, info.bfree, info.bavail, info.files, info.ffree, info.bsize, info.namelen, info.frsize);
    }

    fn getxattr(&mut self, req: &Request, ino: u64, name: &OsStr, size: u32, reply: fuser::ReplyXattr) {
        xattr::getxattr(self, req, ino, name, size, reply);
    }

    fn setxattr(&mut self, req: &Request, ino: u64, name: &OsStr, value: &[u8], flags: i32, position: u32, reply: ReplyEmpty) {
        xattr::setxattr(self, req, ino, name, value, flags, position, reply);
    }

    fn listxattr(&mut self, req: &Request, ino: u64, size: u32, reply: fuser::ReplyXattr) {
        xattr::listxattr(self, req, ino, size, reply);
    }

    fn removexattr(&mut self, req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        xattr::removexattr(self, req, ino, name, reply);
    }
}
