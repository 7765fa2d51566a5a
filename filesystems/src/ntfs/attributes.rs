// Attribute records
// An MFT record is a header followed by a list of attribute records, each
// tagged with a type code and a length, terminated by the END sentinel.

use crate::ntfs::structures::{
    read_struct, AttrHeader, MftRecordHeader, NonResidentAttrHeader, ResidentAttrHeader, ATTR_END,
};
use keel_core::KeelError;

/// Walk a fixed-up MFT record and return the byte offset of the first
/// attribute of `type_code`, or `None` when the END sentinel is reached
/// first. Every step is checked against the record's allocated bytes.
pub fn attr_lookup(record: &[u8], type_code: u32) -> Result<Option<usize>, KeelError> {
    debug_assert_ne!(type_code, ATTR_END);

    let hdr: MftRecordHeader = read_struct(record, 0)
        .ok_or_else(|| KeelError::CorruptRecord("record shorter than its header".into()))?;
    let allocated = (hdr.bytes_allocated as usize).min(record.len());

    let mut offset = hdr.attrs_offset as usize;
    loop {
        if offset + 4 > allocated {
            return Err(KeelError::CorruptRecord(
                "attribute list overruns the record".into(),
            ));
        }
        let attr_type = u32::from_le_bytes([
            record[offset],
            record[offset + 1],
            record[offset + 2],
            record[offset + 3],
        ]);
        if attr_type == ATTR_END {
            return Ok(None);
        }

        let ahdr: AttrHeader = read_struct(record, offset).ok_or_else(|| {
            KeelError::CorruptRecord("attribute header overruns the record".into())
        })?;
        let len = ahdr.len as usize;
        if len == 0 || offset + len > allocated {
            return Err(KeelError::CorruptRecord(format!(
                "attribute 0x{:x} has length {}",
                attr_type, len
            )));
        }

        if attr_type == type_code {
            return Ok(Some(offset));
        }
        offset += len;
    }
}

/// Borrow the value of a resident attribute at `attr_offset`.
pub fn resident_value(record: &[u8], attr_offset: usize) -> Result<&[u8], KeelError> {
    let rh: ResidentAttrHeader = read_struct(record, attr_offset)
        .ok_or_else(|| KeelError::CorruptRecord("resident header overruns the record".into()))?;
    if rh.common.non_resident != 0 {
        return Err(KeelError::CorruptRecord(
            "attribute unexpectedly non-resident".into(),
        ));
    }
    let start = attr_offset + rh.value_offset as usize;
    let end = start + rh.value_len as usize;
    if end > record.len() {
        return Err(KeelError::CorruptRecord(
            "resident value overruns the record".into(),
        ));
    }
    Ok(&record[start..end])
}

/// Read the non-resident form of the attribute at `attr_offset`.
pub fn non_resident_header(
    record: &[u8],
    attr_offset: usize,
) -> Result<NonResidentAttrHeader, KeelError> {
    let nr: NonResidentAttrHeader = read_struct(record, attr_offset).ok_or_else(|| {
        KeelError::CorruptRecord("non-resident header overruns the record".into())
    })?;
    if nr.common.non_resident == 0 {
        return Err(KeelError::CorruptRecord(
            "attribute unexpectedly resident".into(),
        ));
    }
    Ok(nr)
}

/// Borrow the mapping-pairs byte stream of a non-resident attribute. The
/// stream ends where the attribute record does.
pub fn mapping_pairs<'a>(
    record: &'a [u8],
    attr_offset: usize,
    nr: &NonResidentAttrHeader,
) -> Result<&'a [u8], KeelError> {
    let len = nr.common.len as usize;
    let start = attr_offset + nr.mapping_pairs_offset as usize;
    let end = attr_offset + len;
    if start > end || end > record.len() {
        return Err(KeelError::CorruptRunlist(
            "mapping pairs outside the attribute".into(),
        ));
    }
    Ok(&record[start..end])
}
