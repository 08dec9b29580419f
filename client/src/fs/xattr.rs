use super::prelude::*;

/// Extended attributes aren't stored; every call replies with "this file
/// has none" rather than failing outright, so tools that probe xattrs
/// unconditionally (Finder, some backup tools) don't see errors.
pub fn getxattr(_fs: &mut FsWrapper, _req: &Request, _ino: u64, _name: &OsStr, _size: u32, reply: ReplyXattr) {
    #[cfg(target_os = "macos")]
    reply.error(ENOATTR);

    #[cfg(not(target_os = "macos"))]
    reply.error(ENODATA);
}

/// Accepted and discarded: Finder tags/quarantine writes should not surface
/// as user-visible errors.
pub fn setxattr(_fs: &mut FsWrapper, _req: &Request, _ino: u64, _name: &OsStr, _value: &[u8], _flags: i32, _position: u32, reply: ReplyEmpty) {
    reply.ok();
}

pub fn listxattr(_fs: &mut FsWrapper, _req: &Request, _ino: u64, size: u32, reply: ReplyXattr) {
    if size == 0 {
        reply.size(0);
    } else {
        reply.data(&[]);
    }
}

pub fn removexattr(_fs: &mut FsWrapper, _req: &Request, _ino: u64, _name: &OsStr, reply: ReplyEmpty) {
    reply.ok();
}
