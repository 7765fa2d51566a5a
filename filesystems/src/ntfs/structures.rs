// NTFS on-disk structures
// All multi-byte fields are little-endian. Structs are packed to mirror the
// disk layout; copy fields out before using them to avoid unaligned access.

use static_assertions::assert_eq_size;

// OEM names accepted in the boot sector
pub const NTFS_OEM_IDS: [&[u8; 8]; 3] = [b"NTFS    ", b"MSWIN4.0", b"MSWIN4.1"];

pub const MAGIC_FILE: [u8; 4] = *b"FILE";
pub const MAGIC_INDX: [u8; 4] = *b"INDX";

// Well-known MFT records
pub const MFT_RECORD_MFT: u64 = 0;
pub const MFT_RECORD_ROOT: u64 = 5;

// Attribute type codes
pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_INDEX_ROOT: u32 = 0x90;
pub const ATTR_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_BITMAP: u32 = 0xB0;
pub const ATTR_END: u32 = 0xFFFF_FFFF;

// MFT record flags
pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;

// FILE_NAME file_attrs bits
pub const FILE_ATTR_READONLY: u32 = 0x0000_0001;
pub const FILE_ATTR_HIDDEN: u32 = 0x0000_0002;
pub const FILE_ATTR_SYSTEM: u32 = 0x0000_0004;
pub const FILE_ATTR_ARCHIVE: u32 = 0x0000_0020;
pub const FILE_ATTR_DUP_FILE_NAME_INDEX_PRESENT: u32 = 0x1000_0000;

// Index entry flags
pub const INDEX_ENTRY_NODE: u16 = 0x01;
pub const INDEX_ENTRY_END: u16 = 0x02;

/// An MFT reference keeps the record number in its low 48 bits; the high 16
/// are the expected sequence number.
pub const MFT_REF_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Byte offset of the embedded `IndexHeader` inside an INDX block.
pub const INDEX_BLOCK_HEADER_LEN: usize = 24;

/// Byte offset of the embedded `IndexHeader` inside an `INDEX_ROOT` value.
pub const INDEX_ROOT_HEADER_LEN: usize = 16;

/// Read a packed struct out of `buf` at `offset`, or `None` if it does not
/// fit. The only unsafe in the driver lives here.
pub(crate) fn read_struct<T: Copy>(buf: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(std::mem::size_of::<T>())?;
    if end > buf.len() {
        return None;
    }
    Some(unsafe { std::ptr::read_unaligned(buf[offset..].as_ptr() as *const T) })
}

/// NTFS boot sector (512 bytes). The `zero_*` regions double as the
/// volume sanity check: NTFS leaves every one of them zero.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct NtfsBootSector {
    pub jump: [u8; 3],                // 0x00
    pub oem_id: [u8; 8],              // 0x03
    pub bytes_per_sector: u16,        // 0x0B
    pub sectors_per_cluster: u8,      // 0x0D
    pub reserved_sectors: u16,        // 0x0E: always 0
    pub zero_0: [u8; 3],              // 0x10: always 0
    pub zero_1: u16,                  // 0x13: always 0
    pub media_descriptor: u8,         // 0x15
    pub zero_2: u16,                  // 0x16: always 0
    pub sectors_per_track: u16,       // 0x18
    pub num_heads: u16,               // 0x1A
    pub hidden_sectors: u32,          // 0x1C
    pub zero_3: u32,                  // 0x20: always 0
    pub unused_0: u32,                // 0x24
    pub total_sectors: u64,           // 0x28
    pub mft_lclust: u64,              // 0x30: MFT starting cluster
    pub mft_mirr_lclust: u64,         // 0x38
    pub clust_per_mft_record: i8,     // 0x40: negative means 2^|v| bytes
    pub unused_1: [u8; 3],            // 0x41
    pub clust_per_index_block: i8,    // 0x44
    pub unused_2: [u8; 3],            // 0x45
    pub volume_serial: u64,           // 0x48
    pub checksum: u32,                // 0x50
    pub bootstrap: [u8; 426],         // 0x54
    pub signature: u16,               // 0x1FE: 0xAA55
}

assert_eq_size!(NtfsBootSector, [u8; 512]);

/// Common header of every multi-sector record (`FILE` and `INDX`).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct NtfsRecordHeader {
    pub magic: [u8; 4],
    pub usa_ofs: u16,
    pub usa_count: u16,
}

assert_eq_size!(NtfsRecordHeader, [u8; 8]);

/// MFT record header.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct MftRecordHeader {
    pub magic: [u8; 4],               // 0x00: "FILE"
    pub usa_ofs: u16,                 // 0x04
    pub usa_count: u16,               // 0x06
    pub lsn: u64,                     // 0x08
    pub seq_no: u16,                  // 0x10
    pub link_count: u16,              // 0x12
    pub attrs_offset: u16,            // 0x14
    pub flags: u16,                   // 0x16
    pub bytes_in_use: u32,            // 0x18
    pub bytes_allocated: u32,         // 0x1C
    pub base_record: u64,             // 0x20
    pub next_attr_id: u16,            // 0x28
    pub reserved: u16,                // 0x2A
    pub mft_record_no: u32,           // 0x2C
}

assert_eq_size!(MftRecordHeader, [u8; 48]);

/// Common attribute record header.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AttrHeader {
    pub type_code: u32,               // 0x00
    pub len: u32,                     // 0x04: advances the walker
    pub non_resident: u8,             // 0x08
    pub name_len: u8,                 // 0x09
    pub name_offset: u16,             // 0x0A
    pub flags: u16,                   // 0x0C
    pub attr_id: u16,                 // 0x0E
}

assert_eq_size!(AttrHeader, [u8; 16]);

/// Resident attribute form.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct ResidentAttrHeader {
    pub common: AttrHeader,
    pub value_len: u32,               // 0x10
    pub value_offset: u16,            // 0x14
    pub indexed: u8,                  // 0x16
    pub padding: u8,                  // 0x17
}

assert_eq_size!(ResidentAttrHeader, [u8; 24]);

/// Non-resident attribute form.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct NonResidentAttrHeader {
    pub common: AttrHeader,
    pub lowest_vcn: u64,              // 0x10
    pub highest_vcn: u64,             // 0x18
    pub mapping_pairs_offset: u16,    // 0x20
    pub compression_unit: u16,        // 0x22
    pub padding: [u8; 4],             // 0x24
    pub allocated_size: u64,          // 0x28
    pub data_size: u64,               // 0x30
    pub initialized_size: u64,        // 0x38
}

assert_eq_size!(NonResidentAttrHeader, [u8; 64]);

/// FILE_NAME attribute value; the UTF-16LE name follows immediately.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct FileNameAttr {
    pub parent_ref: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    pub mft_modification_time: u64,
    pub access_time: u64,
    pub allocated_size: u64,
    pub data_size: u64,
    pub file_attrs: u32,
    pub ea_size: u32,
    pub file_name_len: u8,            // in UTF-16 code units
    pub file_name_type: u8,
}

assert_eq_size!(FileNameAttr, [u8; 66]);

/// Header shared by the entry lists of `INDEX_ROOT` and INDX blocks.
/// Offsets inside it are relative to its own first byte.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IndexHeader {
    pub entries_offset: u32,
    pub index_len: u32,
    pub allocated_size: u32,
    pub flags: u32,
}

assert_eq_size!(IndexHeader, [u8; 16]);

/// `INDEX_ROOT` attribute value (always resident).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IndexRoot {
    pub indexed_attr_type: u32,
    pub collation_rule: u32,
    pub index_block_size: u32,
    pub clust_per_index_block: u8,
    pub reserved: [u8; 3],
    pub index: IndexHeader,
}

assert_eq_size!(IndexRoot, [u8; 32]);

/// On-disk header of one `INDEX_ALLOCATION` block.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IndexBlockHeader {
    pub magic: [u8; 4],               // "INDX"
    pub usa_ofs: u16,
    pub usa_count: u16,
    pub lsn: u64,
    pub index_block_vcn: u64,
    pub index: IndexHeader,
}

assert_eq_size!(IndexBlockHeader, [u8; 40]);

/// Header of one index entry; the FILE_NAME key follows.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IndexEntryHeader {
    pub indexed_file: u64,
    pub len: u16,
    pub key_len: u16,
    pub flags: u16,
    pub reserved: u16,
}

assert_eq_size!(IndexEntryHeader, [u8; 16]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_struct_bounds() {
        let buf = [0u8; 47];
        assert!(read_struct::<MftRecordHeader>(&buf, 0).is_none());
        let buf = [0u8; 48];
        assert!(read_struct::<MftRecordHeader>(&buf, 0).is_some());
        assert!(read_struct::<MftRecordHeader>(&buf, 1).is_none());
    }
}
