// Test helpers shared by the workspace's test suites

use crate::device::BlockDevice;
use crate::error::KeelError;

/// In-memory block device over a byte buffer.
pub struct MemDisk {
    data: Vec<u8>,
    sector_shift: u32,
}

impl MemDisk {
    pub fn new(data: Vec<u8>, sector_shift: u32) -> Self {
        Self { data, sector_shift }
    }
}

impl BlockDevice for MemDisk {
    fn sector_shift(&self) -> u32 {
        self.sector_shift
    }

    fn read_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), KeelError> {
        let start = (sector << self.sector_shift) as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            return Err(KeelError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of device",
            )));
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}
