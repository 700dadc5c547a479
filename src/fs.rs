//! Filesystem operations (C8): the façade composing C3–C7 into the host-facing API.

use std::path::Path;

use crate::block::BlockDevice;
use crate::block::FileBlockDevice;
use crate::block::BLOCK_SIZE;
use crate::dirent::dir_delete;
use crate::dirent::dir_insert;
use crate::dirent::dir_is_empty;
use crate::dirent::dir_iter;
use crate::dirent::init_dir_block;
use crate::error::Error;
use crate::error::Result;
use crate::fileio;
use crate::inode::read_inode;
use crate::inode::write_inode;
use crate::inode::Inode;
use crate::inode::InodeType;
use crate::inode::Vstat;
use crate::inode::S_IFDIR;
use crate::inode::S_IFREG;
use crate::layout::Layout;
use crate::layout::ROOT_INO;
use crate::path::resolve;
use crate::path::resolve_parent;
use crate::superblock::Superblock;

/// One directory entry as surfaced by [`Fs::readdir`].
pub struct DirListing {
    pub name: String,
    pub attr: Vstat,
}

/// The mounted filesystem: block device, superblock state, and layout together.
///
/// Every mutating call runs to completion before returning, matching the single-threaded
/// cooperative model of spec.md §5 — callers that admit multiple threads are expected to
/// serialize access with their own mutex (see `TfsAdapter`, which does exactly that).
pub struct Fs<D: BlockDevice> {
    dev: D,
    sb: Superblock,
    layout: Layout,
}

impl Fs<FileBlockDevice> {
    /// Formats a new image file at `path` with the given layout and mounts it.
    pub fn format(path: &Path, layout: Layout) -> Result<Self> {
        let mut dev = FileBlockDevice::create(path, layout.total_bytes())?;
        let sb = Superblock::format(&mut dev, layout)?;
        Ok(Fs { dev, sb, layout })
    }

    /// Mounts an existing, already-formatted image file at `path`.
    pub fn mount(path: &Path) -> Result<Self> {
        let mut dev = FileBlockDevice::open(path)?;
        let (sb, layout) = Superblock::mount(&mut dev)?;
        Ok(Fs { dev, sb, layout })
    }

    /// `init()` per spec.md §6: format if the image does not yet exist, otherwise mount.
    pub fn init(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::mount(path)
        } else {
            Self::format(path, Layout::default())
        }
    }
}

impl<D: BlockDevice> Fs<D> {
    /// `getattr(path) -> stat`.
    pub fn getattr(&mut self, path: &str) -> Result<Vstat> {
        let inode = resolve(&mut self.dev, &self.layout, path)?;
        Ok(inode.vstat)
    }

    /// `open(path)`: succeeds iff `path` resolves to a valid inode.
    pub fn open(&mut self, path: &str) -> Result<Vstat> {
        self.getattr(path)
    }

    /// `mkdir(path, mode)`.
    pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<Vstat> {
        log::trace!("mkdir {path}");
        let (mut parent, name) = resolve_parent(&mut self.dev, &self.layout, path)?;
        if parent.kind() != InodeType::Directory {
            return Err(Error::NotFound);
        }

        let new_ino = self.sb.alloc_inode(&mut self.dev, &self.layout)?;
        if let Err(e) = dir_insert(&mut self.dev, &mut self.sb, &self.layout, &mut parent, new_ino, name) {
            log::debug!("mkdir {path}: dir_insert failed ({e}), rolling back inode {new_ino}");
            self.sb.free_inode(&mut self.dev, new_ino)?;
            return Err(e);
        }

        let dirent_size = std::mem::size_of::<crate::dirent::DirEntry>() as u32;
        let data_blk = self.sb.alloc_block(&mut self.dev, &self.layout)?;
        self.dev.write_block(data_blk, &vec![0u8; BLOCK_SIZE])?;
        init_dir_block(&mut self.dev, data_blk, new_ino, parent.ino)?;

        let mut new_dir = Inode::new(new_ino, InodeType::Directory, S_IFDIR | (mode & 0o777));
        new_dir.link = 1;
        new_dir.size = 2 * dirent_size;
        new_dir.vstat.size = new_dir.size;
        new_dir.vstat.blocks = 1;
        new_dir.direct[0] = data_blk;

        write_inode(&mut self.dev, &self.layout, &new_dir)?;
        write_inode(&mut self.dev, &self.layout, &parent)?;
        log::debug!("mkdir {path}: allocated inode {new_ino}, block {data_blk}");
        Ok(new_dir.vstat)
    }

    /// `rmdir(path)`. Refuses non-empty directories with `NotEmpty` (spec.md §9's resolved
    /// open question).
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        log::trace!("rmdir {path}");
        let mut target = resolve(&mut self.dev, &self.layout, path)?;
        if target.kind() != InodeType::Directory {
            return Err(Error::NotFound);
        }
        if !dir_is_empty(&mut self.dev, &target)? {
            log::debug!("rmdir {path}: directory not empty");
            return Err(Error::NotEmpty);
        }

        let (mut parent, name) = resolve_parent(&mut self.dev, &self.layout, path)?;

        for slot in target.direct.iter_mut().filter(|b| **b != 0) {
            self.sb.free_block(&mut self.dev, &self.layout, *slot)?;
            *slot = 0;
        }
        self.sb.free_inode(&mut self.dev, target.ino)?;
        target.valid = 0;
        write_inode(&mut self.dev, &self.layout, &target)?;

        dir_delete(&mut self.dev, &mut parent, name)?;
        write_inode(&mut self.dev, &self.layout, &parent)?;
        log::debug!("rmdir {path}: freed inode {}", target.ino);
        Ok(())
    }

    /// `create(path, mode)`.
    pub fn create(&mut self, path: &str, mode: u32) -> Result<Vstat> {
        log::trace!("create {path}");
        let (mut parent, name) = resolve_parent(&mut self.dev, &self.layout, path)?;
        if parent.kind() != InodeType::Directory {
            return Err(Error::NotFound);
        }

        let new_ino = self.sb.alloc_inode(&mut self.dev, &self.layout)?;
        if let Err(e) = dir_insert(&mut self.dev, &mut self.sb, &self.layout, &mut parent, new_ino, name) {
            log::debug!("create {path}: dir_insert failed ({e}), rolling back inode {new_ino}");
            self.sb.free_inode(&mut self.dev, new_ino)?;
            return Err(e);
        }

        let data_blk = self.sb.alloc_block(&mut self.dev, &self.layout)?;
        self.dev.write_block(data_blk, &vec![0u8; BLOCK_SIZE])?;

        let mut file = Inode::new(new_ino, InodeType::Regular, S_IFREG | (mode & 0o777));
        file.vstat.blocks = 1;
        file.direct[0] = data_blk;

        write_inode(&mut self.dev, &self.layout, &file)?;
        write_inode(&mut self.dev, &self.layout, &parent)?;
        log::debug!("create {path}: allocated inode {new_ino}, block {data_blk}");
        Ok(file.vstat)
    }

    /// `read(path, buf, offset)`, returning the number of bytes copied into `buf`.
    pub fn read(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let inode = resolve(&mut self.dev, &self.layout, path)?;
        if inode.kind() != InodeType::Regular {
            return Err(Error::Invalid(format!("{path} is not a regular file")));
        }
        fileio::read(&mut self.dev, &inode, offset, buf)
    }

    /// `write(path, buf, offset)`, returning the number of bytes written.
    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        log::trace!("write {path}: {} bytes at offset {offset}", data.len());
        let mut inode = resolve(&mut self.dev, &self.layout, path)?;
        if inode.kind() != InodeType::Regular {
            return Err(Error::Invalid(format!("{path} is not a regular file")));
        }
        let n = fileio::write(&mut self.dev, &mut self.sb, &self.layout, &mut inode, offset, data)?;
        write_inode(&mut self.dev, &self.layout, &inode)?;
        Ok(n)
    }

    /// `unlink(path)`.
    ///
    /// Frees direct blocks, then every indirect page — reading each page's contents *before*
    /// clearing anything, per the bug fix recorded in spec.md §9 (the original reads the page
    /// after the pointer and bitmap bit are already gone, operating on a stale buffer).
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        log::trace!("unlink {path}");
        let mut target = resolve(&mut self.dev, &self.layout, path)?;
        if target.kind() != InodeType::Regular {
            return Err(Error::Invalid(format!("{path} is not a regular file")));
        }

        for slot in target.direct.iter_mut().filter(|b| **b != 0) {
            self.sb.free_block(&mut self.dev, &self.layout, *slot)?;
            *slot = 0;
        }

        for page_slot in target.indirect.iter_mut().filter(|b| **b != 0) {
            let page_blk = *page_slot;
            let pointers = fileio::read_indirect_page(&mut self.dev, page_blk)?;
            for &data_blk in pointers.iter().filter(|&&b| b != 0) {
                self.sb.free_block(&mut self.dev, &self.layout, data_blk)?;
            }
            self.sb.free_block(&mut self.dev, &self.layout, page_blk)?;
            *page_slot = 0;
            log::trace!("unlink {path}: freed indirect page {page_blk}");
        }

        self.sb.free_inode(&mut self.dev, target.ino)?;
        target.valid = 0;
        write_inode(&mut self.dev, &self.layout, &target)?;

        let (mut parent, name) = resolve_parent(&mut self.dev, &self.layout, path)?;
        dir_delete(&mut self.dev, &mut parent, name)?;
        write_inode(&mut self.dev, &self.layout, &parent)?;
        log::debug!("unlink {path}: freed inode {}", target.ino);
        Ok(())
    }

    /// `readdir(path, emit)`.
    pub fn readdir(&mut self, path: &str) -> Result<Vec<DirListing>> {
        log::trace!("readdir {path}");
        let dir = resolve(&mut self.dev, &self.layout, path)?;
        if dir.kind() != InodeType::Directory {
            return Err(Error::NotFound);
        }

        let mut names = Vec::new();
        dir_iter(&mut self.dev, &dir, |entry| {
            names.push((entry.name_str().to_string(), entry.ino));
        })?;

        let mut out = Vec::with_capacity(names.len());
        for (name, ino) in names {
            let child = read_inode(&mut self.dev, &self.layout, ino)?;
            out.push(DirListing { name, attr: child.vstat });
        }
        Ok(out)
    }

    /// Exposes whether absolute data block `abs_block` is currently allocated, via
    /// [`Superblock::block_in_use`], for tests asserting bitmap side effects directly
    /// (spec.md §8 invariants 1-2).
    pub fn block_in_use(&self, abs_block: u32) -> bool {
        self.sb.block_in_use(&self.layout, abs_block)
    }

    /// Returns a copy of the mounted layout, for tests that need to enumerate the data region.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns whether the root directory is reachable, primarily for sanity checks in tests.
    pub fn root_exists(&mut self) -> bool {
        resolve(&mut self.dev, &self.layout, "/").map(|i| i.ino == ROOT_INO).unwrap_or(false)
    }
}
