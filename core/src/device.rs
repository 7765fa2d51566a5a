// Block device abstraction
// The host hands the filesystem driver a sector-granular read primitive;
// everything above it works in whole sectors.

use crate::error::KeelError;
use log::trace;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only block device: a sector size (as a shift) and a way to read
/// whole sectors. `buf` must be a multiple of the sector size; a read past
/// the end of the device is an error, not a short read.
pub trait BlockDevice {
    fn sector_shift(&self) -> u32;

    fn sector_size(&self) -> usize {
        1 << self.sector_shift()
    }

    fn read_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), KeelError>;
}

/// File-backed block device, used for volume images.
pub struct DiskImage {
    file: File,
    sector_shift: u32,
}

impl DiskImage {
    /// Open an image with the conventional 512-byte sectors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KeelError> {
        Self::with_sector_shift(path, 9)
    }

    pub fn with_sector_shift<P: AsRef<Path>>(path: P, sector_shift: u32) -> Result<Self, KeelError> {
        let file = File::open(path)?;
        Ok(Self { file, sector_shift })
    }
}

impl BlockDevice for DiskImage {
    fn sector_shift(&self) -> u32 {
        self.sector_shift
    }

    fn read_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), KeelError> {
        debug_assert_eq!(buf.len() % self.sector_size(), 0);
        let offset = sector << self.sector_shift;
        trace!("reading {} bytes at sector {}", buf.len(), sector);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}
