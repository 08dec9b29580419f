//! Typed engine errors and their mapping onto the errno categories the
//! FUSE dispatcher (`fs/*.rs`) replies with.

use thiserror::Error;

/// Errors the engine itself can raise. Every FUSE handler converts one of
/// these into an errno via `From<EngineError> for i32` at the reply site;
/// nothing in `engine.rs` or `fs/*.rs` constructs a raw `libc` constant
/// directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("already exists: {0}")]
    Exists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("is a directory: {0}")]
    IsDir(String),

    #[error("not a directory: {0}")]
    NotDir(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("access denied: {0}")]
    Denied(String),

    #[error("bad file descriptor: {0}")]
    BadFd(u64),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<&EngineError> for i32 {
    fn from(err: &EngineError) -> i32 {
        match err {
            EngineError::Exists(_) => libc::EEXIST,
            EngineError::NotFound(_) => libc::ENOENT,
            EngineError::IsDir(_) => libc::EISDIR,
            EngineError::NotDir(_) => libc::ENOTDIR,
            EngineError::NotEmpty(_) => libc::ENOTEMPTY,
            EngineError::Denied(_) => libc::EACCES,
            EngineError::BadFd(_) => libc::EBADF,
            EngineError::Io(_) => libc::EIO,
        }
    }
}

impl From<EngineError> for i32 {
    fn from(err: EngineError) -> i32 {
        (&err).into()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Boxed dynamic error used by the chat transport adapter.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;
pub type TransportResult<T> = Result<T, TransportError>;
