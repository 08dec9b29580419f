use super::prelude::*;

/// FUSE `rename`: folder renames are refused (`ENOTEMPTY`) unless the
/// folder is empty. Recursive subtree rename is out of scope; this
/// matches the engine's single-level check.
pub fn rename(fs: &mut FsWrapper, _req: &Request<'_>, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, _flags: u32, reply: ReplyEmpty) {
    let Some(old_path) = fs.child_full_path(parent, name) else {
        reply.error(ENOENT);
        return;
    };
    let Some(new_path) = fs.child_full_path(newparent, newname) else {
        reply.error(ENOENT);
        return;
    };

    match fs.engine.block_on(fs.engine.rename(&old_path, &new_path)) {
        Ok(()) => reply.ok(),
        Err(err) => reply.error((&err).into()),
    }
}
