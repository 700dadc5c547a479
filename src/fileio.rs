//! File data addressing (C6): direct + single-indirect block resolution and byte-range I/O.

use crate::block::BlockDevice;
use crate::block::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::inode::Inode;
use crate::inode::DIRECT_PTRS;
use crate::inode::INDIRECT_PTRS;
use crate::layout::Layout;
use crate::superblock::Superblock;

/// Indirect fan-out per page: how many absolute block indices fit in one block.
pub fn indirect_fanout() -> usize {
    BLOCK_SIZE / std::mem::size_of::<u32>()
}

/// Largest logical block index a file can address.
pub fn max_logical_block() -> usize {
    DIRECT_PTRS + INDIRECT_PTRS * indirect_fanout()
}

/// Largest byte size a file can hold, per spec.md §8 invariant 4.
pub fn max_file_size() -> u64 {
    max_logical_block() as u64 * BLOCK_SIZE as u64
}

/// Reads one indirect page as a vector of absolute block indices (0 = unallocated slot).
///
/// Exposed for `unlink`, which must read a page's contents before freeing anything it
/// references (spec.md §9's resolved page-read-before-free ordering).
pub fn read_indirect_page<D: BlockDevice>(dev: &mut D, page_blk: u32) -> Result<Vec<u32>> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(page_blk, &mut buf)?;
    Ok(buf
        .chunks_exact(std::mem::size_of::<u32>())
        .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
        .collect())
}

fn write_indirect_slot<D: BlockDevice>(dev: &mut D, page_blk: u32, slot: usize, value: u32) -> Result<()> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_block(page_blk, &mut buf)?;
    let off = slot * std::mem::size_of::<u32>();
    buf[off..off + 4].copy_from_slice(&value.to_ne_bytes());
    dev.write_block(page_blk, &buf)
}

/// Resolves logical block `l` of `inode` to an absolute disk-block index.
///
/// When `allocate` is true and a pointer along the way is unset, allocates and zeroes the
/// missing block(s) (direct slot, indirect page, or the data block within it), per spec.md
/// §4.6's `resolve_or_allocate`. Returns `Ok(0)` for a non-allocating lookup that hits an
/// unallocated direct slot (used by `read` at/past a hole).
pub fn resolve_or_allocate<D: BlockDevice>(
    dev: &mut D,
    sb: &mut Superblock,
    layout: &Layout,
    inode: &mut Inode,
    l: usize,
    allocate: bool,
) -> Result<u32> {
    if l >= max_logical_block() {
        log::debug!("resolve_or_allocate: logical block {l} exceeds max_logical_block() ({})", max_logical_block());
        return Err(Error::FileTooBig);
    }

    if l < DIRECT_PTRS {
        if inode.direct[l] != 0 {
            return Ok(inode.direct[l]);
        }
        if !allocate {
            return Ok(0);
        }
        let blk = sb.alloc_block(dev, layout)?;
        zero_block(dev, blk)?;
        inode.direct[l] = blk;
        inode.vstat.blocks += 1;
        return Ok(blk);
    }

    let l2 = l - DIRECT_PTRS;
    let pi = indirect_fanout();
    let page_idx = l2 / pi;
    let slot = l2 % pi;

    let page_blk = if inode.indirect[page_idx] != 0 {
        inode.indirect[page_idx]
    } else {
        if !allocate {
            return Ok(0);
        }
        let blk = sb.alloc_block(dev, layout)?;
        zero_block(dev, blk)?;
        inode.indirect[page_idx] = blk;
        blk
    };

    let page = read_indirect_page(dev, page_blk)?;
    if page[slot] != 0 {
        return Ok(page[slot]);
    }
    if !allocate {
        return Ok(0);
    }

    let data_blk = sb.alloc_block(dev, layout)?;
    zero_block(dev, data_blk)?;
    write_indirect_slot(dev, page_blk, slot, data_blk)?;
    inode.vstat.blocks += 1;
    Ok(data_blk)
}

fn zero_block<D: BlockDevice>(dev: &mut D, blk: u32) -> Result<()> {
    let zero = vec![0u8; BLOCK_SIZE];
    dev.write_block(blk, &zero)
}

/// Reads up to `out.len()` bytes of `inode`'s content starting at `offset`.
///
/// Returns the number of bytes copied: 0 at or past EOF, otherwise
/// `min(out.len(), inode.size - offset)`.
pub fn read<D: BlockDevice>(dev: &mut D, inode: &Inode, offset: u64, out: &mut [u8]) -> Result<usize> {
    if offset >= inode.size as u64 {
        return Ok(0);
    }
    let want = std::cmp::min(out.len() as u64, inode.size as u64 - offset) as usize;
    let mut done = 0usize;

    while done < want {
        let pos = offset + done as u64;
        let l = (pos / BLOCK_SIZE as u64) as usize;
        let in_block_off = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = std::cmp::min(want - done, BLOCK_SIZE - in_block_off);

        // `allocate = false`: a hole past EOF reads back as zero without materializing a block.
        let blk = resolve_non_allocating(dev, inode, l)?;
        if blk == 0 {
            out[done..done + chunk].fill(0);
        } else {
            let mut buf = vec![0u8; BLOCK_SIZE];
            dev.read_block(blk, &mut buf)?;
            out[done..done + chunk].copy_from_slice(&buf[in_block_off..in_block_off + chunk]);
        }
        done += chunk;
    }

    Ok(done)
}

fn resolve_non_allocating<D: BlockDevice>(dev: &mut D, inode: &Inode, l: usize) -> Result<u32> {
    if l >= max_logical_block() {
        return Ok(0);
    }
    if l < DIRECT_PTRS {
        return Ok(inode.direct[l]);
    }
    let l2 = l - DIRECT_PTRS;
    let pi = indirect_fanout();
    let page_idx = l2 / pi;
    let slot = l2 % pi;
    if inode.indirect[page_idx] == 0 {
        return Ok(0);
    }
    let page = read_indirect_page(dev, inode.indirect[page_idx])?;
    Ok(page[slot])
}

/// Writes `data` into `inode`'s content at `offset`, growing direct/indirect pointers as
/// needed. Extends `inode.size`/`vstat.size` past the old EOF and refreshes `mtime`; the caller
/// is responsible for persisting `inode` afterward (spec.md §4.6).
pub fn write<D: BlockDevice>(
    dev: &mut D,
    sb: &mut Superblock,
    layout: &Layout,
    inode: &mut Inode,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    let mut done = 0usize;

    while done < data.len() {
        let pos = offset + done as u64;
        let l = (pos / BLOCK_SIZE as u64) as usize;
        let in_block_off = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = std::cmp::min(data.len() - done, BLOCK_SIZE - in_block_off);

        let blk = resolve_or_allocate(dev, sb, layout, inode, l, true)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        dev.read_block(blk, &mut buf)?;
        buf[in_block_off..in_block_off + chunk].copy_from_slice(&data[done..done + chunk]);
        dev.write_block(blk, &buf)?;
        done += chunk;
    }

    let new_end = offset + done as u64;
    if new_end > inode.size as u64 {
        inode.size = new_end as u32;
        inode.vstat.size = inode.size;
    }
    inode.touch();
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FileBlockDevice;
    use crate::inode::InodeType;
    use tempfile::NamedTempFile;

    fn fresh_file_inode() -> (NamedTempFile, FileBlockDevice, Superblock, Layout, Inode) {
        let tmp = NamedTempFile::new().unwrap();
        let layout = Layout::default();
        let mut dev = FileBlockDevice::create(tmp.path(), layout.total_bytes()).unwrap();
        let mut sb = Superblock::format(&mut dev, layout).unwrap();
        let ino = sb.alloc_inode(&mut dev, &layout).unwrap();
        let inode = Inode::new(ino, InodeType::Regular, crate::inode::S_IFREG | 0o644);
        (tmp, dev, sb, layout, inode)
    }

    #[test]
    fn write_then_read_small_buffer() {
        let (_tmp, mut dev, mut sb, layout, mut inode) = fresh_file_inode();
        let n = write(&mut dev, &mut sb, &layout, &mut inode, 0, b"hello").unwrap();
        assert_eq!(n, 5);
        assert_eq!(inode.size, 5);

        let mut buf = [0u8; 5];
        let read_n = read(&mut dev, &inode, 0, &mut buf).unwrap();
        assert_eq!(read_n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_spans_multiple_direct_blocks() {
        let (_tmp, mut dev, mut sb, layout, mut inode) = fresh_file_inode();
        let pattern: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let n = write(&mut dev, &mut sb, &layout, &mut inode, 0, &pattern).unwrap();
        assert_eq!(n, pattern.len());
        assert_eq!(inode.size as usize, pattern.len());

        let mut back = vec![0u8; pattern.len()];
        let read_n = read(&mut dev, &inode, 0, &mut back).unwrap();
        assert_eq!(read_n, pattern.len());
        assert_eq!(back, pattern);
    }

    #[test]
    fn write_past_direct_range_uses_indirect_and_zero_fills_hole() {
        let (_tmp, mut dev, mut sb, layout, mut inode) = fresh_file_inode();
        let offset = (DIRECT_PTRS as u64) * BLOCK_SIZE as u64 + 10;
        write(&mut dev, &mut sb, &layout, &mut inode, offset, &[0x42]).unwrap();
        assert_eq!(inode.size as u64, offset + 1);

        let total = offset as usize + 1;
        let mut back = vec![0xFFu8; total];
        let n = read(&mut dev, &inode, 0, &mut back).unwrap();
        assert_eq!(n, total);
        assert!(back[..total - 1].iter().all(|&b| b == 0));
        assert_eq!(back[total - 1], 0x42);
    }

    #[test]
    fn offset_beyond_max_file_size_fails() {
        let (_tmp, mut dev, mut sb, layout, mut inode) = fresh_file_inode();
        let offset = max_file_size();
        let err = write(&mut dev, &mut sb, &layout, &mut inode, offset, &[1]).unwrap_err();
        assert!(matches!(err, Error::FileTooBig));
    }
}
