//! Block device abstraction (C1): fixed-size block I/O over the flat image file.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;

use crate::error::Error;
use crate::error::Result;

/// Fixed block size (`B` in spec.md §3). Every on-disk record is sized against this constant.
pub const BLOCK_SIZE: usize = 4096;

/// A device that reads and writes fixed-size blocks by absolute index.
///
/// Implementations are expected to treat any short read/write as fatal: the layout engine above
/// never issues partial-block I/O, so a short transfer means the backing image is truncated or
/// otherwise corrupt, not a transient condition worth retrying.
pub trait BlockDevice {
    /// Reads exactly `BLOCK_SIZE` bytes from block `idx` into `buf`.
    fn read_block(&mut self, idx: u32, buf: &mut [u8]) -> Result<()>;
    /// Writes exactly `BLOCK_SIZE` bytes from `buf` to block `idx`.
    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<()>;
    /// Flushes any buffered writes to the backing store.
    fn sync(&mut self) -> Result<()>;
}

/// A [`BlockDevice`] backed by a single flat file, opened once at mount/format time.
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    /// Opens an existing image file for block I/O.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileBlockDevice { file })
    }

    /// Creates a new image file of exactly `total_bytes`, zero-filled, for `format()`.
    pub fn create(path: &Path, total_bytes: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_bytes)?;
        Ok(FileBlockDevice { file })
    }

    fn check_len(buf: &[u8]) -> Result<()> {
        if buf.len() != BLOCK_SIZE {
            return Err(Error::Invalid(format!(
                "block buffer must be exactly {BLOCK_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        Ok(())
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&mut self, idx: u32, buf: &mut [u8]) -> Result<()> {
        Self::check_len(buf)?;
        let offset = idx as u64 * BLOCK_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|e| {
            log::error!("short read at block {idx}: {e}");
            Error::Io(e)
        })
    }

    fn write_block(&mut self, idx: u32, buf: &[u8]) -> Result<()> {
        Self::check_len(buf)?;
        let offset = idx as u64 * BLOCK_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf).map_err(|e| {
            log::error!("short write at block {idx}: {e}");
            Error::Io(e)
        })
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn round_trips_a_block() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = FileBlockDevice::create(tmp.path(), BLOCK_SIZE as u64 * 4).unwrap();
        let mut write_buf = vec![0u8; BLOCK_SIZE];
        write_buf[0] = 0xAB;
        write_buf[BLOCK_SIZE - 1] = 0xCD;
        dev.write_block(2, &write_buf).unwrap();

        let mut read_buf = vec![0u8; BLOCK_SIZE];
        dev.read_block(2, &mut read_buf).unwrap();
        assert_eq!(write_buf, read_buf);
    }

    #[test]
    fn rejects_mis_sized_buffers() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = FileBlockDevice::create(tmp.path(), BLOCK_SIZE as u64).unwrap();
        let bad = vec![0u8; BLOCK_SIZE - 1];
        assert!(dev.write_block(0, &bad).is_err());
    }
}
