//! Error kinds shared by every layer of the filesystem.

use std::io;
use thiserror::Error;

/// An error produced by the on-disk layout engine or the operations built on top of it.
///
/// Variants map 1:1 onto the POSIX-style negative return codes the host filesystem interface
/// expects; see [`Error::to_errno`].
#[derive(Error, Debug)]
pub enum Error {
    /// A path component or directory entry does not exist.
    #[error("no such file or directory")]
    NotFound,
    /// A name collision on insert.
    #[error("file exists")]
    Exists,
    /// The inode or data bitmap is exhausted.
    #[error("no space left on device")]
    NoSpace,
    /// A directory is not empty.
    #[error("directory not empty")]
    NotEmpty,
    /// The logical offset is beyond the addressable range of direct + indirect pointers.
    #[error("file too large")]
    FileTooBig,
    /// A malformed path or a name too long for a directory entry slot.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// A short or failed block read/write. Fatal: the block layer does not retry.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Maps this error to the negative `errno` value the host interface returns to the caller.
    pub fn to_errno(&self) -> i32 {
        match self {
            Self::NotFound => -libc::ENOENT,
            Self::Exists => -libc::EEXIST,
            Self::NoSpace => -libc::ENOSPC,
            Self::NotEmpty => -libc::ENOTEMPTY,
            Self::FileTooBig => -libc::EFBIG,
            Self::Invalid(_) => -libc::EINVAL,
            Self::Io(_) => -libc::EIO,
        }
    }
}

/// Shorthand result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
