pub mod codepage;
pub mod device;
pub mod dirent;
pub mod error;
pub mod test_utils;

pub use codepage::Codepage;
pub use device::{BlockDevice, DiskImage};
pub use dirent::{DirEntry, DirentType, DIRENT_HEADER_LEN, MAX_FILE_NAME_LEN};
pub use error::KeelError;
