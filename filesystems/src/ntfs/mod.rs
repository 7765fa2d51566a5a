// NTFS read-only driver
// Boot-path subset: boot sector, MFT records with fixups, resident and
// non-resident attributes, runlists, and the directory index.

pub mod attributes;
pub mod boot_sector;
pub mod data_runs;
pub mod fixup;
pub mod index;
pub mod inode;
pub mod mft;
pub mod names;
pub mod reader;
pub mod structures;

pub use boot_sector::NtfsSuperblock;
pub use inode::{InodeData, NtfsInode};
pub use reader::NtfsReader;
