// Read-through block cache
// Maps block indices to cached block contents on top of a sector-granular
// device. Filesystem drivers borrow a block's bytes for the duration of one
// operation step; the borrow ends at the next fetch, which may evict it.

use keel_core::{BlockDevice, KeelError};
use log::trace;
use std::collections::HashMap;

const DEFAULT_MAX_SLOTS: usize = 64;

pub struct BlockCache<D> {
    device: D,
    block_shift: u32,
    slots: HashMap<u64, Vec<u8>>,
    max_slots: usize,
    hits: u64,
    misses: u64,
}

impl<D: BlockDevice> BlockCache<D> {
    /// Initialise the cache for a driver-chosen block size.
    /// `block_shift` must be at least the device's sector shift.
    pub fn new(device: D, block_shift: u32) -> Self {
        Self::with_slot_limit(device, block_shift, DEFAULT_MAX_SLOTS)
    }

    pub fn with_slot_limit(device: D, block_shift: u32, max_slots: usize) -> Self {
        assert!(block_shift >= device.sector_shift());
        Self {
            device,
            block_shift,
            slots: HashMap::new(),
            max_slots,
            hits: 0,
            misses: 0,
        }
    }

    pub fn block_shift(&self) -> u32 {
        self.block_shift
    }

    pub fn block_size(&self) -> usize {
        1 << self.block_shift
    }

    pub fn sector_shift(&self) -> u32 {
        self.device.sector_shift()
    }

    /// Fetch a block, reading through to the device on a miss. The returned
    /// view is only valid until the next call on this cache.
    pub fn get(&mut self, block: u64) -> Result<&[u8], KeelError> {
        if self.slots.contains_key(&block) {
            self.hits += 1;
        } else {
            self.misses += 1;
            if self.slots.len() >= self.max_slots {
                trace!("cache full, dropping {} slots", self.slots.len());
                self.slots.clear();
            }
            let mut buf = vec![0u8; self.block_size()];
            let sector = block << (self.block_shift - self.device.sector_shift());
            self.device.read_sectors(sector, &mut buf)?;
            self.slots.insert(block, buf);
        }
        Ok(self.slots[&block].as_slice())
    }

    /// Copy whole sectors through the cache into `buf`.
    pub fn copy_sectors(&mut self, sector: u64, buf: &mut [u8]) -> Result<(), KeelError> {
        let sector_shift = self.device.sector_shift();
        let sectors_per_block = 1u64 << (self.block_shift - sector_shift);
        let sector_size = 1usize << sector_shift;
        debug_assert_eq!(buf.len() % sector_size, 0);

        let mut sector = sector;
        let mut done = 0usize;
        while done < buf.len() {
            let block = sector / sectors_per_block;
            let within = (sector % sectors_per_block) as usize * sector_size;
            let avail = self.block_size() - within;
            let want = (buf.len() - done).min(avail);
            let view = self.get(block)?;
            buf[done..done + want].copy_from_slice(&view[within..within + want]);
            done += want;
            sector += (want / sector_size) as u64;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
