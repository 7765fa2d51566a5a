// Filesystem operations table
// The one polymorphic seam exposed to the host: open the volume, resolve
// path components to inodes, enumerate entries and stream file contents.

use keel_core::{DirEntry, KeelError, MAX_FILE_NAME_LEN};

/// A contiguous span of sectors belonging to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First physical sector.
    pub pstart: u64,
    /// Length in sectors.
    pub len: u64,
}

/// An open file: a resolved inode plus the streaming position in bytes.
#[derive(Debug, Clone)]
pub struct FileHandle<I> {
    pub inode: I,
    pub offset: u64,
}

impl<I> FileHandle<I> {
    pub fn new(inode: I) -> Self {
        Self { inode, offset: 0 }
    }
}

/// Operations a mounted filesystem offers the host. Construction is the
/// `init` step: a driver's constructor validates the volume and settles the
/// block geometry reported by `block_shift`.
pub trait FilesystemOps {
    type Inode;

    fn fs_name(&self) -> &'static str;

    /// log2 of the block size the driver registered its cache with.
    fn block_shift(&self) -> u32;

    fn iget_root(&mut self) -> Result<Self::Inode, KeelError>;

    /// Resolve one path component inside `parent`.
    fn iget(&mut self, name: &str, parent: &Self::Inode) -> Result<Self::Inode, KeelError>;

    /// Fill a directory entry describing the open file.
    fn readdir(&mut self, file: &mut FileHandle<Self::Inode>) -> Result<DirEntry, KeelError>;

    /// Stream up to `sectors` sectors' worth of file contents into `buf`,
    /// returning the bytes transferred and whether more remain.
    fn getfssec(
        &mut self,
        file: &mut FileHandle<Self::Inode>,
        buf: &mut [u8],
        sectors: usize,
    ) -> Result<(u32, bool), KeelError>;

    /// Report the extent holding the sector at logical sector `lstart`,
    /// or `None` past end of file.
    fn next_extent(&mut self, inode: &Self::Inode, lstart: u64) -> Result<Option<Extent>, KeelError>;

    fn close_file(&mut self, _file: FileHandle<Self::Inode>) {}

    fn mangle_name(&self, src: &str) -> String {
        generic_mangle_name(src)
    }
}

/// Normalise a path the way the generic layer does: strip surrounding
/// whitespace and leading slashes, collapse duplicate separators, drop a
/// trailing separator and clamp to the host's name limit.
pub fn generic_mangle_name(src: &str) -> String {
    let src = src.trim().trim_start_matches('/');
    let mut out = String::with_capacity(src.len());
    let mut prev_slash = false;
    for ch in src.chars() {
        if ch == '/' {
            if !prev_slash {
                out.push(ch);
            }
            prev_slash = true;
        } else {
            out.push(ch);
            prev_slash = false;
        }
    }
    if out.ends_with('/') {
        out.pop();
    }
    while out.len() > MAX_FILE_NAME_LEN {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_collapses_separators() {
        assert_eq!(generic_mangle_name("/boot//grub/"), "boot/grub");
        assert_eq!(generic_mangle_name("  config.sys "), "config.sys");
        assert_eq!(generic_mangle_name("a/b"), "a/b");
    }

    #[test]
    fn mangle_clamps_length() {
        let long = "x".repeat(400);
        assert_eq!(generic_mangle_name(&long).len(), MAX_FILE_NAME_LEN);
    }
}
