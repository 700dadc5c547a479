//! Superblock and allocators (C3): mount-time layout and the inode/data-block bitmaps.

use bytemuck::Pod;
use bytemuck::Zeroable;

use crate::bitmap;
use crate::block::BlockDevice;
use crate::block::BLOCK_SIZE;
use crate::dirent::init_dir_block;
use crate::error::Error;
use crate::error::Result;
use crate::inode::write_inode;
use crate::inode::Inode;
use crate::inode::InodeType;
use crate::inode::S_IFDIR;
use crate::layout::Layout;
use crate::layout::DATA_BITMAP_BLK;
use crate::layout::INODE_BITMAP_BLK;
use crate::layout::MAGIC;
use crate::layout::ROOT_INO;
use crate::layout::SUPERBLOCK_BLK;

/// The on-disk superblock record (block 0). Immutable after `format`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SuperblockRecord {
    magic: u32,
    max_inodes: u32,
    max_blocks: u32,
    i_table_blks: u32,
    d_start_blk: u32,
}

impl SuperblockRecord {
    fn from_layout(layout: &Layout) -> Self {
        SuperblockRecord {
            magic: MAGIC,
            max_inodes: layout.max_inodes,
            max_blocks: layout.max_blocks,
            i_table_blks: layout.i_table_blks,
            d_start_blk: layout.d_start_blk,
        }
    }

    fn to_layout(self) -> Layout {
        Layout {
            max_inodes: self.max_inodes,
            max_blocks: self.max_blocks,
            i_table_blks: self.i_table_blks,
            d_start_blk: self.d_start_blk,
        }
    }
}

/// Mounted superblock state: the on-disk record plus the two in-memory bitmap copies that must
/// stay in lockstep with what's on disk (spec.md §4.3's consistency rule).
pub struct Superblock {
    inode_bitmap: Vec<u8>,
    data_bitmap: Vec<u8>,
}

impl Superblock {
    /// Formats a brand-new image: zeroes both bitmaps, reserves inode 0 and data block 0 for
    /// the root directory, and writes the root inode and its "." / ".." block.
    pub fn format<D: BlockDevice>(dev: &mut D, layout: Layout) -> Result<Self> {
        let mut inode_bitmap = vec![0u8; BLOCK_SIZE];
        let mut data_bitmap = vec![0u8; BLOCK_SIZE];
        bitmap::set(&mut inode_bitmap, ROOT_INO);
        bitmap::set(&mut data_bitmap, 0);

        let root_data_blk = layout.d_start_blk;
        let dirent_size = std::mem::size_of::<crate::dirent::DirEntry>() as u32;

        let mut root = Inode::new(ROOT_INO, InodeType::Directory, S_IFDIR | 0o755);
        root.link = 2;
        root.size = 2 * dirent_size;
        root.direct[0] = root_data_blk;
        root.vstat.nlink = 2;
        root.vstat.size = root.size;
        root.vstat.blocks = 1;

        let zero = vec![0u8; BLOCK_SIZE];
        dev.write_block(root_data_blk, &zero)?;
        init_dir_block(dev, root_data_blk, ROOT_INO, ROOT_INO)?;

        let record = SuperblockRecord::from_layout(&layout);
        let mut sb_block = vec![0u8; BLOCK_SIZE];
        sb_block[..std::mem::size_of::<SuperblockRecord>()].copy_from_slice(bytemuck::bytes_of(&record));
        dev.write_block(SUPERBLOCK_BLK, &sb_block)?;
        dev.write_block(INODE_BITMAP_BLK, &inode_bitmap)?;
        dev.write_block(DATA_BITMAP_BLK, &data_bitmap)?;
        write_inode(dev, &layout, &root)?;
        dev.sync()?;

        log::info!(
            "formatted image: {} inodes, {} data blocks, data region starts at block {}",
            layout.max_inodes,
            layout.max_blocks,
            layout.d_start_blk
        );

        Ok(Superblock {
            inode_bitmap,
            data_bitmap,
        })
    }

    /// Reads the superblock record and both bitmaps from an already-formatted image.
    pub fn mount<D: BlockDevice>(dev: &mut D) -> Result<(Self, Layout)> {
        let mut sb_block = vec![0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLK, &mut sb_block)?;
        let record_size = std::mem::size_of::<SuperblockRecord>();
        let record = *bytemuck::from_bytes::<SuperblockRecord>(&sb_block[..record_size]);
        if record.magic != MAGIC {
            return Err(Error::Invalid("bad superblock magic".to_string()));
        }
        let layout = record.to_layout();

        let mut inode_bitmap = vec![0u8; BLOCK_SIZE];
        dev.read_block(INODE_BITMAP_BLK, &mut inode_bitmap)?;
        let mut data_bitmap = vec![0u8; BLOCK_SIZE];
        dev.read_block(DATA_BITMAP_BLK, &mut data_bitmap)?;

        log::info!("mounted image: {} inodes, {} data blocks", layout.max_inodes, layout.max_blocks);

        Ok((
            Superblock {
                inode_bitmap,
                data_bitmap,
            },
            layout,
        ))
    }

    /// Scans the inode bitmap first-fit and marks the first free index in use.
    pub fn alloc_inode<D: BlockDevice>(&mut self, dev: &mut D, layout: &Layout) -> Result<u32> {
        let ino = bitmap::first_clear(&self.inode_bitmap, layout.max_inodes).ok_or(Error::NoSpace)?;
        bitmap::set(&mut self.inode_bitmap, ino);
        dev.write_block(INODE_BITMAP_BLK, &self.inode_bitmap)?;
        log::trace!("alloc_inode -> {ino}");
        Ok(ino)
    }

    /// Scans the data bitmap first-fit and returns the absolute block index.
    pub fn alloc_block<D: BlockDevice>(&mut self, dev: &mut D, layout: &Layout) -> Result<u32> {
        let j = bitmap::first_clear(&self.data_bitmap, layout.max_blocks).ok_or_else(|| {
            log::debug!("alloc_block: data bitmap exhausted ({} blocks)", layout.max_blocks);
            Error::NoSpace
        })?;
        bitmap::set(&mut self.data_bitmap, j);
        dev.write_block(DATA_BITMAP_BLK, &self.data_bitmap)?;
        let abs = layout.d_start_blk + j;
        log::trace!("alloc_block -> {abs} (bit {j})");
        Ok(abs)
    }

    /// Clears inode `ino`'s bitmap bit. Double-free is a caller bug, per spec.md §4.3.
    pub fn free_inode<D: BlockDevice>(&mut self, dev: &mut D, ino: u32) -> Result<()> {
        bitmap::clear(&mut self.inode_bitmap, ino);
        dev.write_block(INODE_BITMAP_BLK, &self.inode_bitmap)?;
        log::trace!("free_inode {ino}");
        Ok(())
    }

    /// Clears the bit for absolute data-block index `abs_idx`.
    pub fn free_block<D: BlockDevice>(&mut self, dev: &mut D, layout: &Layout, abs_idx: u32) -> Result<()> {
        let j = abs_idx - layout.d_start_blk;
        bitmap::clear(&mut self.data_bitmap, j);
        dev.write_block(DATA_BITMAP_BLK, &self.data_bitmap)?;
        log::trace!("free_block {abs_idx} (bit {j})");
        Ok(())
    }

    /// Returns whether inode `ino`'s bitmap bit is set, for tests asserting spec.md §8's
    /// invariant 1.
    pub fn inode_in_use(&self, ino: u32) -> bool {
        bitmap::get(&self.inode_bitmap, ino)
    }

    /// Returns whether absolute data-block index `abs_idx`'s bitmap bit is set, for tests
    /// asserting spec.md §8's invariant 2.
    pub fn block_in_use(&self, layout: &Layout, abs_idx: u32) -> bool {
        bitmap::get(&self.data_bitmap, abs_idx - layout.d_start_blk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FileBlockDevice;
    use tempfile::NamedTempFile;

    #[test]
    fn format_reserves_root_inode_and_block() {
        let tmp = NamedTempFile::new().unwrap();
        let layout = Layout::default();
        let mut dev = FileBlockDevice::create(tmp.path(), layout.total_bytes()).unwrap();
        let sb = Superblock::format(&mut dev, layout).unwrap();
        assert!(sb.inode_in_use(ROOT_INO));
        assert!(sb.block_in_use(&layout, layout.d_start_blk));
    }

    #[test]
    fn alloc_inode_is_first_fit() {
        let tmp = NamedTempFile::new().unwrap();
        let layout = Layout::default();
        let mut dev = FileBlockDevice::create(tmp.path(), layout.total_bytes()).unwrap();
        let mut sb = Superblock::format(&mut dev, layout).unwrap();
        let a = sb.alloc_inode(&mut dev, &layout).unwrap();
        assert_eq!(a, 1); // inode 0 is already taken by root
        sb.free_inode(&mut dev, a).unwrap();
        let b = sb.alloc_inode(&mut dev, &layout).unwrap();
        assert_eq!(b, 1);
    }

    #[test]
    fn mount_round_trips_format() {
        let tmp = NamedTempFile::new().unwrap();
        let layout = Layout::default();
        {
            let mut dev = FileBlockDevice::create(tmp.path(), layout.total_bytes()).unwrap();
            Superblock::format(&mut dev, layout).unwrap();
        }
        let mut dev = FileBlockDevice::open(tmp.path()).unwrap();
        let (sb, mounted_layout) = Superblock::mount(&mut dev).unwrap();
        assert_eq!(mounted_layout, layout);
        assert!(sb.inode_in_use(ROOT_INO));
    }
}
