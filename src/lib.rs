//! TFS: a tiny user-space filesystem backed by a single flat disk image file.
//!
//! The core is the on-disk layout engine: superblock/bitmap/inode/directory format (C1–C5),
//! direct+indirect file data addressing (C6), path resolution (C7), and the filesystem
//! operations that compose them (C8). Host integration (the `fuser` adapter) and the `mkfs`/
//! `tfs-mount` binaries live on top, in `adapter` and `src/bin`.

pub mod adapter;
pub mod bitmap;
pub mod block;
pub mod dirent;
pub mod error;
pub mod fileio;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod path;
pub mod superblock;
pub mod util;

pub use error::Error;
pub use error::Result;
pub use fs::Fs;
pub use layout::Layout;
