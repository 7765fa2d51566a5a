// Reader-side inode
// What path resolution captures about a record so later reads can avoid
// re-walking the directory tree. Inodes own no disk memory; every byte they
// describe is re-fetched through the block cache.

use keel_core::DirentType;

/// Where a file's unnamed $DATA lives, or a directory's index geometry.
#[derive(Debug, Clone)]
pub enum InodeData {
    /// $DATA inline in the MFT record, at `value_offset` bytes into the
    /// record.
    Resident { value_offset: u32 },
    /// First allocated extent of a non-resident $DATA.
    NonResident {
        start_vcn: u64,
        next_vcn: u64,
        /// Run length in clusters
        run_len: u64,
        start_lcn: u64,
    },
    /// Directory: geometry of its filename index.
    Index {
        collation_rule: u32,
        block_size: u32,
        block_size_shift: u32,
        /// Bytes one index VCN covers
        vcn_size: u32,
        vcn_size_shift: u32,
    },
}

#[derive(Debug, Clone)]
pub struct NtfsInode {
    pub mft_no: u64,
    pub seq_no: u16,
    /// MFT-relative block holding this record; both a shortcut for
    /// re-reading it and the scan origin for lookups inside it.
    pub here: u64,
    pub d_type: DirentType,
    /// Logical size in bytes (0 for directories)
    pub size: u64,
    pub data: InodeData,
}

impl NtfsInode {
    pub fn is_dir(&self) -> bool {
        matches!(self.data, InodeData::Index { .. })
    }
}
