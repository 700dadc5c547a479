//! Directory-entry table operations (C5).

use bytemuck::Pod;
use bytemuck::Zeroable;

use crate::block::BlockDevice;
use crate::block::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::inode::check_name_len;
use crate::inode::Inode;
use crate::inode::DIRECT_PTRS;
use crate::layout::Layout;
use crate::superblock::Superblock;

/// Maximum byte length of a name, including the NUL terminator.
pub const NAME_MAX: usize = 56;

/// The on-disk directory-entry record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirEntry {
    /// Nonzero iff this slot holds a live entry.
    pub valid: u32,
    pub ino: u32,
    /// NUL-terminated name, padded with zero bytes.
    pub name: [u8; NAME_MAX],
}

impl DirEntry {
    fn new(ino: u32, name: &str) -> Result<Self> {
        check_name_len(name, NAME_MAX)?;
        let mut buf = [0u8; NAME_MAX];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(DirEntry {
            valid: 1,
            ino,
            name: buf,
        })
    }

    fn empty() -> Self {
        DirEntry {
            valid: 0,
            ino: 0,
            name: [0u8; NAME_MAX],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// Returns the name up to its first NUL byte.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Number of directory entries packed into one disk block.
pub fn entries_per_block() -> usize {
    BLOCK_SIZE / std::mem::size_of::<DirEntry>()
}

fn entry_size() -> usize {
    std::mem::size_of::<DirEntry>()
}

fn read_entries<D: BlockDevice>(dev: &mut D, block: u32) -> Result<Vec<DirEntry>> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;
    let size = entry_size();
    Ok((0..entries_per_block())
        .map(|slot| {
            let off = slot * size;
            *bytemuck::from_bytes::<DirEntry>(&buf[off..off + size])
        })
        .collect())
}

fn write_entry<D: BlockDevice>(dev: &mut D, block: u32, slot: usize, entry: &DirEntry) -> Result<()> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(block, &mut buf)?;
    let size = entry_size();
    let off = slot * size;
    buf[off..off + size].copy_from_slice(bytemuck::bytes_of(entry));
    dev.write_block(block, &buf)
}

/// The direct pointers of a directory inode are "compact from the left": the first 0 pointer
/// ends the scan (spec.md §4.5). Returned as an owned vector so callers are free to mutate
/// `dir` while iterating over the result.
fn used_direct_blocks(dir: &Inode) -> Vec<u32> {
    dir.direct.iter().copied().take_while(|&blk| blk != 0).collect()
}

/// Writes the "." and ".." entries into a freshly allocated, zeroed directory block.
pub fn init_dir_block<D: BlockDevice>(
    dev: &mut D,
    block: u32,
    self_ino: u32,
    parent_ino: u32,
) -> Result<()> {
    write_entry(dev, block, 0, &DirEntry::new(self_ino, ".")?)?;
    write_entry(dev, block, 1, &DirEntry::new(parent_ino, "..")?)
}

/// Scans `dir`'s direct blocks for `name`, returning the matching entry if present.
pub fn dir_lookup<D: BlockDevice>(dev: &mut D, dir: &Inode, name: &str) -> Result<DirEntry> {
    for block in used_direct_blocks(dir) {
        let entries = read_entries(dev, block)?;
        if let Some(e) = entries.iter().find(|e| e.is_valid() && e.name_str() == name) {
            return Ok(*e);
        }
    }
    Err(Error::NotFound)
}

/// Inserts `(child_ino, name)` into `dir`, growing a new direct block if no free slot exists.
///
/// `dir` is mutated in place (size/vstat/direct pointers) but not persisted; the caller writes
/// it back, per the read-modify-write contract shared with [`crate::inode::write_inode`].
pub fn dir_insert<D: BlockDevice>(
    dev: &mut D,
    sb: &mut Superblock,
    layout: &Layout,
    dir: &mut Inode,
    child_ino: u32,
    name: &str,
) -> Result<()> {
    check_name_len(name, NAME_MAX)?;
    if dir_lookup(dev, dir, name).is_ok() {
        return Err(Error::Exists);
    }

    let entry = DirEntry::new(child_ino, name)?;

    for block in used_direct_blocks(dir) {
        let entries = read_entries(dev, block)?;
        if let Some(slot) = entries.iter().position(|e| !e.is_valid()) {
            write_entry(dev, block, slot, &entry)?;
            finish_insert(dir);
            return Ok(());
        }
    }

    let next_slot = used_direct_blocks(dir).len();
    if next_slot >= DIRECT_PTRS {
        log::debug!("dir_insert: directory inode {} has exhausted all {DIRECT_PTRS} direct blocks", dir.ino);
        return Err(Error::NoSpace);
    }

    let new_block = sb.alloc_block(dev, layout)?;
    let zero = vec![0u8; BLOCK_SIZE];
    dev.write_block(new_block, &zero)?;

    dir.direct[next_slot] = new_block;
    dir.vstat.blocks += 1;
    write_entry(dev, new_block, 0, &entry)?;
    finish_insert(dir);
    Ok(())
}

fn finish_insert(dir: &mut Inode) {
    dir.size += entry_size() as u32;
    dir.vstat.size = dir.size;
    dir.touch();
}

/// Removes the entry named `name` from `dir`. The freed slot is left in place, `valid=false`;
/// empty blocks are not reclaimed (spec.md §4.5).
pub fn dir_delete<D: BlockDevice>(dev: &mut D, dir: &mut Inode, name: &str) -> Result<()> {
    for block in used_direct_blocks(dir) {
        let entries = read_entries(dev, block)?;
        if let Some(slot) = entries.iter().position(|e| e.is_valid() && e.name_str() == name) {
            write_entry(dev, block, slot, &DirEntry::empty())?;
            dir.size -= entry_size() as u32;
            dir.vstat.size = dir.size;
            dir.touch();
            return Ok(());
        }
    }
    Err(Error::NotFound)
}

/// Invokes `emit` for every valid entry in `dir`, in on-disk order.
pub fn dir_iter<D: BlockDevice>(dev: &mut D, dir: &Inode, mut emit: impl FnMut(&DirEntry)) -> Result<()> {
    for block in used_direct_blocks(dir) {
        let entries = read_entries(dev, block)?;
        for e in entries.iter().filter(|e| e.is_valid()) {
            emit(e);
        }
    }
    Ok(())
}

/// Used by `rmdir`/`unlink` to confirm a directory holds only "." and "..".
pub fn dir_is_empty<D: BlockDevice>(dev: &mut D, dir: &Inode) -> Result<bool> {
    let mut count = 0usize;
    dir_iter(dev, dir, |_| count += 1)?;
    Ok(count <= 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FileBlockDevice;
    use crate::inode::InodeType;
    use crate::layout::ROOT_INO;
    use tempfile::NamedTempFile;

    fn fresh() -> (NamedTempFile, FileBlockDevice, Superblock, Layout) {
        let tmp = NamedTempFile::new().unwrap();
        let layout = Layout::default();
        let mut dev = FileBlockDevice::create(tmp.path(), layout.total_bytes()).unwrap();
        let sb = Superblock::format(&mut dev, layout).unwrap();
        (tmp, dev, sb, layout)
    }

    #[test]
    fn insert_lookup_delete_round_trip() {
        let (_tmp, mut dev, mut sb, layout) = fresh();
        let mut root = crate::inode::read_inode(&mut dev, &layout, ROOT_INO).unwrap();

        dir_insert(&mut dev, &mut sb, &layout, &mut root, 5, "a").unwrap();
        let found = dir_lookup(&mut dev, &root, "a").unwrap();
        assert_eq!(found.ino, 5);

        assert!(matches!(
            dir_insert(&mut dev, &mut sb, &layout, &mut root, 6, "a"),
            Err(Error::Exists)
        ));

        dir_delete(&mut dev, &mut root, "a").unwrap();
        assert!(matches!(dir_lookup(&mut dev, &root, "a"), Err(Error::NotFound)));
    }

    #[test]
    fn fills_entries_before_growing_a_block() {
        let (_tmp, mut dev, mut sb, layout) = fresh();
        let mut root = crate::inode::read_inode(&mut dev, &layout, ROOT_INO).unwrap();
        let before_blocks = root.vstat.blocks;

        for i in 0..(entries_per_block() - 2) {
            dir_insert(&mut dev, &mut sb, &layout, &mut root, 10 + i as u32, &format!("f{i}")).unwrap();
        }
        assert_eq!(root.vstat.blocks, before_blocks);

        dir_insert(&mut dev, &mut sb, &layout, &mut root, 999, "overflow").unwrap();
        assert_eq!(root.vstat.blocks, before_blocks + 1);
        let _ = InodeType::Directory;
    }
}
