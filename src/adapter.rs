//! Host integration (C10): a `fuser::Filesystem` front end over the [`crate::fs::Fs`] façade.
//!
//! `fuser`'s low-level API addresses everything by a 64-bit inode number handed out by us,
//! together with (parent inode, name) pairs for lookups — whereas every C8 operation in this
//! crate takes a `/`-separated path. This module's only job is bridging the two: it keeps a
//! small bidirectional inode-number/path cache and translates [`crate::error::Error`] into
//! `reply.error(errno)`. It contains no filesystem logic of its own.
//!
//! `fuser` dispatches requests to `&mut self` one at a time from its session loop, which already
//! gives us the exclusive access spec.md §5 requires; no additional locking is needed as long as
//! the session is run without the multi-threaded option.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::Duration;
use std::time::UNIX_EPOCH;

use fuser::FileAttr;
use fuser::FileType;
use fuser::Filesystem;
use fuser::ReplyAttr;
use fuser::ReplyCreate;
use fuser::ReplyData;
use fuser::ReplyDirectory;
use fuser::ReplyEmpty;
use fuser::ReplyEntry;
use fuser::ReplyOpen;
use fuser::ReplyWrite;
use fuser::Request;

use crate::block::FileBlockDevice;
use crate::fs::Fs;
use crate::inode::S_IFDIR;
use crate::inode::Vstat;

/// FUSE reserves inode 1 for the mount root; TFS's own root inode is index 0 internally.
const FUSE_ROOT_INO: u64 = 1;
/// Attribute cache validity handed back with every reply; TFS keeps no open-file state, so a
/// short TTL just bounds staleness after concurrent external mutation (there is none, in
/// practice, since the image is single-writer).
const ATTR_TTL: Duration = Duration::from_secs(1);

pub struct TfsAdapter {
    fs: Fs<FileBlockDevice>,
    ino_to_path: HashMap<u64, String>,
    path_to_ino: HashMap<String, u64>,
    next_ino: u64,
}

impl TfsAdapter {
    pub fn new(fs: Fs<FileBlockDevice>) -> Self {
        let mut ino_to_path = HashMap::new();
        let mut path_to_ino = HashMap::new();
        ino_to_path.insert(FUSE_ROOT_INO, "/".to_string());
        path_to_ino.insert("/".to_string(), FUSE_ROOT_INO);
        TfsAdapter {
            fs,
            ino_to_path,
            path_to_ino,
            next_ino: FUSE_ROOT_INO + 1,
        }
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.ino_to_path.get(&ino).map(|s| s.as_str())
    }

    fn ensure_ino(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_ino.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.ino_to_path.insert(ino, path.to_string());
        self.path_to_ino.insert(path.to_string(), ino);
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent_path = self.path_of(parent)?;
        let name = name.to_str()?;
        if parent_path == "/" {
            Some(format!("/{name}"))
        } else {
            Some(format!("{parent_path}/{name}"))
        }
    }
}

fn attr_from_vstat(ino: u64, v: &Vstat) -> FileAttr {
    let kind = if v.mode & S_IFDIR != 0 {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let mtime = UNIX_EPOCH + Duration::from_secs(v.mtime as u64);
    FileAttr {
        ino,
        size: v.size as u64,
        blocks: v.blocks as u64,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: (v.mode & 0o777) as u16,
        nlink: v.nlink,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: v.blksize,
        flags: 0,
    }
}

impl Filesystem for TfsAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(attr) => {
                let ino = self.ensure_ino(&path);
                reply.entry(&ATTR_TTL, &attr_from_vstat(ino, &attr), 0);
            }
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr_from_vstat(ino, &attr)),
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.open(&path) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&path, offset as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.write(&path, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.create(&path, mode) {
            Ok(attr) => {
                let ino = self.ensure_ino(&path);
                reply.created(&ATTR_TTL, &attr_from_vstat(ino, &attr), 0, 0, 0);
            }
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.mkdir(&path, mode) {
            Ok(attr) => {
                let ino = self.ensure_ino(&path);
                reply.entry(&ATTR_TTL, &attr_from_vstat(ino, &attr), 0);
            }
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.forget_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(-e.to_errno()),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let listing = match self.fs.readdir(&path) {
            Ok(l) => l,
            Err(e) => {
                reply.error(-e.to_errno());
                return;
            }
        };

        for (i, entry) in listing.into_iter().enumerate().skip(offset as usize) {
            let child_path = if path == "/" {
                format!("/{}", entry.name)
            } else {
                format!("{path}/{}", entry.name)
            };
            let kind = if entry.attr.mode & S_IFDIR != 0 {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let child_ino = match entry.name.as_str() {
                "." => ino,
                ".." => self.ensure_ino(&parent_of(&path)),
                _ => self.ensure_ino(&child_path),
            };
            let full = reply.add(child_ino, (i + 1) as i64, kind, &entry.name);
            if full {
                break;
            }
        }
        reply.ok();
    }
}

fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => "/".to_string(),
    }
}
