//! Path resolver / namei (C7).

use crate::block::BlockDevice;
use crate::dirent::dir_lookup;
use crate::error::Error;
use crate::error::Result;
use crate::inode::read_inode;
use crate::inode::Inode;
use crate::inode::InodeType;
use crate::layout::Layout;
use crate::layout::ROOT_INO;

/// Splits `path` into its non-empty `/`-separated components without mutating or copying the
/// input beyond the returned borrowed slices, per spec.md §9's non-mutating tokenization note.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Resolves `path` to its inode, starting from the root. Empty path, `"/"`, and a trailing
/// slash all resolve to root.
pub fn resolve<D: BlockDevice>(dev: &mut D, layout: &Layout, path: &str) -> Result<Inode> {
    let mut current = read_inode(dev, layout, ROOT_INO)?;
    for token in components(path) {
        if current.kind() != InodeType::Directory {
            return Err(Error::NotFound);
        }
        let entry = dir_lookup(dev, &current, token)?;
        current = read_inode(dev, layout, entry.ino)?;
    }
    Ok(current)
}

/// Resolves all but the last component of `path`, returning the parent inode and the basename.
/// Fails `Invalid` if `path` names the root (which has no parent or basename), or `NotFound` if
/// an intermediate component along the way is missing.
pub fn resolve_parent<'a, D: BlockDevice>(
    dev: &mut D,
    layout: &Layout,
    path: &'a str,
) -> Result<(Inode, &'a str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Invalid("path has no parent".to_string()));
    }
    let (parent_path, basename) = match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    };
    let parent = resolve(dev, layout, parent_path)?;
    Ok((parent, basename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skips_empties_and_trailing_slash() {
        let parts: Vec<&str> = components("/a/b/c/").collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
        let root: Vec<&str> = components("/").collect();
        assert!(root.is_empty());
        let empty: Vec<&str> = components("").collect();
        assert!(empty.is_empty());
    }

    #[test]
    fn resolve_parent_splits_on_last_slash() {
        let trimmed = "/a/b/c".trim_end_matches('/');
        let (parent, base) = match trimmed.rfind('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };
        assert_eq!(parent, "/a/b");
        assert_eq!(base, "c");
    }
}
