//! This prelude module re-exports all common types, traits, and functions
//! used across the `fs` module's sub-files (e.g., `read.rs`, `write.rs`).
//!
//! This avoids repetitive imports in every file and provides a single
//! location to manage shared dependencies for the FUSE implementation.

// --- FUSE Types ---
pub use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
    // --- MACOS ---
    ReplyXattr,
};

// --- LibC Error Codes ---
pub use libc::{EACCES, EBADF, EEXIST, EIO, EISDIR, ENOENT, ENOTDIR, ENOTEMPTY};
#[cfg(not(target_os = "macos"))]
pub use libc::ENODATA;
#[cfg(target_os = "macos")]
pub use libc::ENOATTR;

// --- Standard Library Types ---
pub use std::ffi::OsStr;
pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

// --- Internal `engine` Types ---
pub use crate::engine::{Engine, EntryAttr, EntryKind};
pub use crate::error::EngineError;

// --- Internal `fs` Module Types ---
pub use super::{to_file_attr, FsWrapper, FH};
