//! On-disk layout parameters.
//!
//! Mirrors the teacher's `Ext2Factory` builder: the concrete geometry of an image (how many
//! inodes, how many data blocks) is a runtime value rather than a baked-in literal, computed
//! once at `format`/`mount` time and carried alongside every operation that needs to translate
//! a logical index into a block offset.

use crate::block::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::inode::inodes_per_block;
use crate::util::ceil_division;

/// Magic number stamped into the superblock, identifying a TFS image.
pub const MAGIC: u32 = 0x7446_5321; // "tFS!"

/// Default inode count (`Ni` in spec.md §3).
pub const DEFAULT_MAX_INODES: u32 = 1024;
/// Default data block count (`Nd` in spec.md §3).
pub const DEFAULT_MAX_BLOCKS: u32 = 16384;

/// Block index of the superblock, fixed by spec.md §6.
pub const SUPERBLOCK_BLK: u32 = 0;
/// Block index of the inode bitmap, fixed by spec.md §4.3.
pub const INODE_BITMAP_BLK: u32 = 1;
/// Block index of the data bitmap, fixed by spec.md §4.3.
pub const DATA_BITMAP_BLK: u32 = 2;
/// First block of the inode table, fixed by spec.md §4.3.
pub const I_START_BLK: u32 = 3;
/// Inode index of the filesystem root directory.
pub const ROOT_INO: u32 = 0;

/// Geometry of a formatted TFS image, derived from the inode and data-block counts.
///
/// Block size itself (`B` in spec.md §3) is fixed at compile time to [`BLOCK_SIZE`]: every
/// on-disk record (superblock, inode, directory entry) is a fixed-size `Pod` type, so varying
/// it at runtime would mean varying the layout of those types too. Inode and data block counts
/// remain runtime parameters, as the teacher's own `Ext2Factory` treats block-group sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub max_inodes: u32,
    pub max_blocks: u32,
    /// Number of blocks occupied by the inode table, starting at [`I_START_BLK`].
    pub i_table_blks: u32,
    /// First block of the data region; everything from here on is addressed by inode
    /// direct/indirect pointers.
    pub d_start_blk: u32,
}

impl Layout {
    /// Computes a layout for the given inode/data-block counts, validating that both bitmaps
    /// fit in a single block each (true for any inode/block count up to `BLOCK_SIZE * 8`).
    pub fn new(max_inodes: u32, max_blocks: u32) -> Result<Self> {
        let bits_per_bitmap_block = (BLOCK_SIZE * 8) as u32;
        if max_inodes == 0 || max_inodes > bits_per_bitmap_block {
            return Err(Error::Invalid(format!(
                "max_inodes must be in 1..={bits_per_bitmap_block}, got {max_inodes}"
            )));
        }
        if max_blocks == 0 || max_blocks > bits_per_bitmap_block {
            return Err(Error::Invalid(format!(
                "max_blocks must be in 1..={bits_per_bitmap_block}, got {max_blocks}"
            )));
        }

        let i_table_blks = ceil_division(max_inodes, inodes_per_block() as u32).max(1);
        let d_start_blk = I_START_BLK + i_table_blks;

        Ok(Layout {
            max_inodes,
            max_blocks,
            i_table_blks,
            d_start_blk,
        })
    }

    /// Total number of blocks the backing image file must hold.
    pub fn total_blocks(&self) -> u32 {
        self.d_start_blk + self.max_blocks
    }

    /// Total byte size of the backing image file.
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks() as u64 * BLOCK_SIZE as u64
    }
}

impl Default for Layout {
    fn default() -> Self {
        Layout::new(DEFAULT_MAX_INODES, DEFAULT_MAX_BLOCKS)
            .expect("spec default inode/block counts are always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_well_ordered() {
        let layout = Layout::default();
        assert!(layout.d_start_blk > I_START_BLK);
        assert_eq!(layout.max_blocks, DEFAULT_MAX_BLOCKS);
    }

    #[test]
    fn rejects_oversized_counts() {
        let too_many = (BLOCK_SIZE * 8) as u32 + 1;
        assert!(Layout::new(too_many, DEFAULT_MAX_BLOCKS).is_err());
        assert!(Layout::new(DEFAULT_MAX_INODES, too_many).is_err());
    }
}
