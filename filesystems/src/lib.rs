pub mod cache;
pub mod ntfs;
pub mod ops;

pub use cache::BlockCache;
pub use ntfs::NtfsReader;
pub use ops::{Extent, FileHandle, FilesystemOps};
