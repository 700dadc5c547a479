//! Black-box scenarios from spec.md §8, driving the C8 façade directly against a scratch image
//! file. No FUSE mount is needed since `Fs` is a plain library API.

use tempfile::NamedTempFile;
use tfs::inode::S_IFDIR;
use tfs::Fs;
use tfs::Layout;

fn fresh_fs() -> (NamedTempFile, Fs<tfs::block::FileBlockDevice>) {
    let tmp = NamedTempFile::new().unwrap();
    let fs = Fs::format(tmp.path(), Layout::default()).unwrap();
    (tmp, fs)
}

/// Counts data blocks currently marked in-use across the whole data region, via
/// `Fs::block_in_use` (backed by `Superblock::block_in_use`).
fn count_used_blocks(fs: &Fs<tfs::block::FileBlockDevice>, layout: &Layout) -> usize {
    (layout.d_start_blk..layout.d_start_blk + layout.max_blocks)
        .filter(|&b| fs.block_in_use(b))
        .count()
}

/// S1: format -> mount -> getattr("/") returns a directory, nlink=2, size=2*sizeof(dirent).
#[test]
fn s1_root_attributes_after_format() {
    let (_tmp, mut fs) = fresh_fs();
    let attr = fs.getattr("/").unwrap();
    assert_ne!(attr.mode & S_IFDIR, 0);
    assert_eq!(attr.nlink, 2);
    assert_eq!(attr.size as usize, 2 * std::mem::size_of::<tfs::dirent::DirEntry>());
}

/// S2: mkdir("/a"), mkdir("/a/b"), readdir("/a") emits exactly {".", "..", "b"}.
#[test]
fn s2_mkdir_and_readdir() {
    let (_tmp, mut fs) = fresh_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/a/b", 0o755).unwrap();

    let names: Vec<String> = fs.readdir("/a").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec![".", "..", "b"]);
}

/// S3: create, write 5 bytes, getattr size == 5, read returns "hello".
#[test]
fn s3_small_file_round_trip() {
    let (_tmp, mut fs) = fresh_fs();
    fs.create("/f", 0o644).unwrap();
    let n = fs.write("/f", 0, b"hello").unwrap();
    assert_eq!(n, 5);
    assert_eq!(fs.getattr("/f").unwrap().size, 5);

    let mut buf = [0u8; 5];
    let read_n = fs.read("/f", 0, &mut buf).unwrap();
    assert_eq!(read_n, 5);
    assert_eq!(&buf, b"hello");
}

/// S4: a 100,000-byte write/read spanning multiple direct blocks.
#[test]
fn s4_large_file_spans_direct_blocks() {
    let (_tmp, mut fs) = fresh_fs();
    fs.create("/big", 0o644).unwrap();
    let pattern: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();
    fs.write("/big", 0, &pattern).unwrap();
    assert_eq!(fs.getattr("/big").unwrap().size as usize, pattern.len());

    let mut back = vec![0u8; pattern.len()];
    fs.read("/big", 0, &mut back).unwrap();
    assert_eq!(back, pattern);
}

/// S5: a single byte at offset Dd*B + 10 forces indirect allocation; the prefix reads back
/// zero-filled, and exactly one indirect page plus one data block become newly allocated.
#[test]
fn s5_indirect_allocation_zero_fills_hole() {
    const B: u64 = 4096;
    const DD: u64 = 16;

    let (_tmp, mut fs) = fresh_fs();
    fs.create("/huge", 0o644).unwrap();
    let layout = fs.layout();
    let used_before = count_used_blocks(&fs, &layout);

    let offset = DD * B + 10;
    fs.write("/huge", offset, &[0xAB]).unwrap();
    assert_eq!(fs.getattr("/huge").unwrap().size as u64, offset + 1);
    assert_eq!(
        count_used_blocks(&fs, &layout),
        used_before + 2,
        "indirect write should mark exactly one page block and one data block in use"
    );

    let total = (offset + 1) as usize;
    let mut back = vec![0xFFu8; total];
    fs.read("/huge", 0, &mut back).unwrap();
    assert!(back[..total - 1].iter().all(|&b| b == 0));
    assert_eq!(back[total - 1], 0xAB);
}

/// S6: unlink frees the inode and bitmap bit, and the index is reused by the next create.
#[test]
fn s6_unlink_frees_and_reuses_inode() {
    let (_tmp, mut fs) = fresh_fs();
    let created = fs.create("/x", 0o644).unwrap();
    fs.unlink("/x").unwrap();

    assert!(fs.open("/x").is_err());

    let recreated = fs.create("/x", 0o644).unwrap();
    assert_eq!(recreated.ino, created.ino);
}

/// `unlink` on a file with indirect-block data frees the indirect page and the data block it
/// points to, not just the direct blocks — the exact scenario spec.md §9 calls out as the
/// original source's stale-buffer bug (freeing the pointer/bitmap bit before reading the page).
#[test]
fn unlink_frees_indirect_blocks() {
    const B: u64 = 4096;
    const DD: u64 = 16;

    let (_tmp, mut fs) = fresh_fs();
    let layout = fs.layout();
    let baseline = count_used_blocks(&fs, &layout);

    fs.create("/spread", 0o644).unwrap();
    let offset = DD * B + 10;
    fs.write("/spread", offset, &[0xAB]).unwrap();
    assert_eq!(count_used_blocks(&fs, &layout), baseline + 3);

    fs.unlink("/spread").unwrap();
    assert!(fs.open("/spread").is_err());
    assert_eq!(
        count_used_blocks(&fs, &layout),
        baseline,
        "unlink must free the file's direct block, its indirect page, and the data block it references"
    );
}

/// Invariant 6: a second `dir_insert` of the same name fails `Exists` and leaves the directory
/// size unchanged.
#[test]
fn dir_insert_is_idempotent_on_failure() {
    let (_tmp, mut fs) = fresh_fs();
    fs.mkdir("/a", 0o755).unwrap();
    let size_before = fs.getattr("/a").unwrap().size;

    let err = fs.mkdir("/a", 0o755).unwrap_err();
    assert!(matches!(err, tfs::Error::Exists));
    assert_eq!(fs.getattr("/a").unwrap().size, size_before);
}

/// `rmdir` on a non-empty directory fails `NotEmpty` (spec.md §9's resolved open question).
#[test]
fn rmdir_refuses_non_empty_directory() {
    let (_tmp, mut fs) = fresh_fs();
    fs.mkdir("/a", 0o755).unwrap();
    fs.mkdir("/a/b", 0o755).unwrap();

    let err = fs.rmdir("/a").unwrap_err();
    assert!(matches!(err, tfs::Error::NotEmpty));

    fs.rmdir("/a/b").unwrap();
    fs.rmdir("/a").unwrap();
    assert!(fs.open("/a").is_err());
}

/// A format/mount round trip through the actual image file preserves the namespace.
#[test]
fn mount_after_format_sees_prior_writes() {
    let tmp = NamedTempFile::new().unwrap();
    {
        let mut fs = Fs::format(tmp.path(), Layout::default()).unwrap();
        fs.create("/persisted", 0o644).unwrap();
        fs.write("/persisted", 0, b"data").unwrap();
    }

    let mut fs = Fs::mount(tmp.path()).unwrap();
    let mut buf = [0u8; 4];
    fs.read("/persisted", 0, &mut buf).unwrap();
    assert_eq!(&buf, b"data");
}
