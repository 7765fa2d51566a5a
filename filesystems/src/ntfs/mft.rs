// MFT record location
// The MFT is walked block by block from a caller-held cursor; each record
// encountered is fixed up, then matched by number. The cursor lets callers
// that already know roughly where a record lives skip the leading blocks.

use crate::cache::BlockCache;
use crate::ntfs::boot_sector::NtfsSuperblock;
use crate::ntfs::fixup::apply_fixups;
use crate::ntfs::structures::{read_struct, MftRecordHeader};
use keel_core::{BlockDevice, KeelError};
use log::{debug, trace};

/// Find MFT record `mft_no`, scanning forward from `*block` (in cache
/// blocks relative to the start of the MFT). On success the staging buffer
/// holds the block containing the record, already fixed up, and the return
/// value is the record's byte offset inside it; `*block` points at that
/// block. A block that cannot be fetched or fails its fixups ends the scan
/// with `NotFound`.
pub fn mft_record_lookup<D: BlockDevice>(
    sb: &NtfsSuperblock,
    cache: &mut BlockCache<D>,
    mft_no: u64,
    block: &mut u64,
    data: &mut [u8],
) -> Result<usize, KeelError> {
    let block_size = sb.block_size as usize;
    let record_size = sb.mft_record_size as usize;
    debug_assert_eq!(data.len(), block_size);

    trace!("looking up MFT record {} from block {}", mft_no, *block);

    let mut offset = 0usize;
    let mut need_fill = true;
    loop {
        if need_fill {
            let view = match cache.get(sb.mft_block + *block) {
                Ok(view) => view,
                Err(err) => {
                    debug!("MFT block {} unavailable: {}", *block, err);
                    return Err(KeelError::NotFound);
                }
            };
            data.copy_from_slice(view);
            need_fill = false;
        }

        let end = (offset + record_size).min(block_size);
        if apply_fixups(&mut data[offset..end], sb.sector_size as usize).is_err() {
            debug!("record at block {} offset {} failed fixups", *block, offset);
            return Err(KeelError::NotFound);
        }

        let hdr: MftRecordHeader =
            read_struct(data, offset).ok_or(KeelError::NotFound)?;
        if u64::from(hdr.mft_record_no) == mft_no {
            return Ok(offset);
        }

        let advance = hdr.bytes_allocated as usize;
        if advance == 0 || advance > block_size {
            return Err(KeelError::CorruptRecord(format!(
                "record advance {} at block {} offset {}",
                advance, *block, offset
            )));
        }

        offset += advance;
        if offset >= block_size {
            *block += 1;
            offset -= block_size;
            need_fill = true;
        }
    }
}
