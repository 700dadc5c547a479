//! On-disk inode format and the inode table (C4).
//!
//! An inode is a fixed-size, byte-exact record (see spec §3). It is represented here as a
//! `bytemuck`-derived `Pod` type so that reading/writing it is a plain slice cast rather than
//! unsafe pointer arithmetic over a raw block buffer.

use bytemuck::Pod;
use bytemuck::Zeroable;

use crate::block::BlockDevice;
use crate::block::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::layout::Layout;
use crate::layout::I_START_BLK;
use crate::util::get_timestamp;

/// Number of direct block pointers in an inode.
pub const DIRECT_PTRS: usize = 16;
/// Number of indirect block pointers in an inode.
pub const INDIRECT_PTRS: usize = 8;

/// Inode type discriminants, stored on disk as a plain `u32`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Regular = 0,
    Directory = 1,
}

impl InodeType {
    fn from_raw(v: u32) -> Self {
        match v {
            1 => Self::Directory,
            _ => Self::Regular,
        }
    }
}

/// Embedded `stat`-like attribute record. `size == Inode::size` and `ino == Inode::ino` are
/// kept in lockstep by every mutator.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vstat {
    pub ino: u32,
    pub mode: u32,
    pub nlink: u32,
    pub size: u32,
    pub blocks: u32,
    pub blksize: u32,
    pub mtime: u32,
}

/// Mode bit marking a directory, mirroring `S_IFDIR`.
pub const S_IFDIR: u32 = 0o040000;
/// Mode bit marking a regular file, mirroring `S_IFREG`.
pub const S_IFREG: u32 = 0o100000;

/// The on-disk inode record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Inode {
    pub ino: u32,
    /// Nonzero iff this inode is in use; must agree with the inode bitmap bit.
    pub valid: u32,
    /// An `InodeType` discriminant, stored raw because `Pod` cannot be derived for enums.
    pub kind: u32,
    /// Logical size of the file's content in bytes.
    pub size: u32,
    /// Reference count bookkeeping (not enforced beyond storage).
    pub link: u32,
    /// Absolute disk-block indices; 0 means unallocated. Compact from index 0.
    pub direct: [u32; DIRECT_PTRS],
    /// Absolute disk-block indices of indirect pages; 0 means unallocated.
    pub indirect: [u32; INDIRECT_PTRS],
    pub vstat: Vstat,
}

impl Inode {
    pub fn kind(&self) -> InodeType {
        InodeType::from_raw(self.kind)
    }

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// Builds a freshly allocated, empty inode of the given type.
    pub fn new(ino: u32, kind: InodeType, mode: u32) -> Self {
        let now = get_timestamp().as_secs() as u32;
        Inode {
            ino,
            valid: 1,
            kind: kind as u32,
            size: 0,
            link: 1,
            direct: [0; DIRECT_PTRS],
            indirect: [0; INDIRECT_PTRS],
            vstat: Vstat {
                ino,
                mode,
                nlink: 1,
                size: 0,
                blocks: 0,
                blksize: BLOCK_SIZE as u32,
                mtime: now,
            },
        }
    }

    /// Refreshes `vstat.mtime` to the current time.
    pub fn touch(&mut self) {
        self.vstat.mtime = get_timestamp().as_secs() as u32;
    }
}

/// Number of inodes packed into one disk block.
pub fn inodes_per_block() -> usize {
    BLOCK_SIZE / std::mem::size_of::<Inode>()
}

/// Reads the inode with index `ino` from the inode table (C4).
///
/// Out-of-range `ino` is a caller bug, not a recoverable error: the table only ever contains
/// `layout.max_inodes` slots and every caller first obtains `ino` from the bitmap or from a
/// directory entry that itself was only ever populated with valid indices.
pub fn read_inode<D: BlockDevice>(dev: &mut D, layout: &Layout, ino: u32) -> Result<Inode> {
    assert!(ino < layout.max_inodes, "read_inode: inode index out of range");
    let per_block = inodes_per_block();
    let block = I_START_BLK + ino / per_block as u32;
    let slot = ino as usize % per_block;

    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;

    let inode_size = std::mem::size_of::<Inode>();
    let off = slot * inode_size;
    Ok(*bytemuck::from_bytes::<Inode>(&buf[off..off + inode_size]))
}

/// Writes `inode` back into the inode table at its own `ino` index (C4).
///
/// Read-modify-write: only the target slot is overwritten, preserving the other inodes packed
/// into the same block.
pub fn write_inode<D: BlockDevice>(dev: &mut D, layout: &Layout, inode: &Inode) -> Result<()> {
    let ino = inode.ino;
    assert!(ino < layout.max_inodes, "write_inode: inode index out of range");
    let per_block = inodes_per_block();
    let block = I_START_BLK + ino / per_block as u32;
    let slot = ino as usize % per_block;

    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;

    let inode_size = std::mem::size_of::<Inode>();
    let off = slot * inode_size;
    buf[off..off + inode_size].copy_from_slice(bytemuck::bytes_of(inode));
    dev.write_block(block, &buf)?;
    Ok(())
}

/// Asserts `path`/`name` fit the directory-entry slot, surfacing `Error::Invalid` otherwise.
pub fn check_name_len(name: &str, max: usize) -> Result<()> {
    if name.as_bytes().len() >= max {
        return Err(Error::Invalid(format!(
            "name `{name}` does not fit in a {max}-byte directory entry slot"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_is_plain_old_data() {
        // No hidden padding: the struct must round-trip through raw bytes untouched.
        let inode = Inode::new(5, InodeType::Directory, S_IFDIR | 0o755);
        let bytes = bytemuck::bytes_of(&inode);
        let back: Inode = *bytemuck::from_bytes(bytes);
        assert_eq!(back.ino, 5);
        assert_eq!(back.kind(), InodeType::Directory);
        assert_eq!(back.vstat.mode, S_IFDIR | 0o755);
    }
}
