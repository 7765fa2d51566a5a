// Multi-sector record fixups
// NTFS stamps the update sequence number over the last two bytes of every
// sector of a FILE or INDX record and keeps the originals in the Update
// Sequence Array. Restoring them validates that no torn write happened.

use crate::ntfs::structures::{read_struct, NtfsRecordHeader, MAGIC_FILE, MAGIC_INDX};
use keel_core::KeelError;
use log::trace;

/// Apply fixups to one freshly read record. `record` spans the whole
/// multi-sector record; must run exactly once per fetch, before any field
/// of the record is interpreted.
pub fn apply_fixups(record: &mut [u8], sector_size: usize) -> Result<(), KeelError> {
    let hdr: NtfsRecordHeader = read_struct(record, 0).ok_or(KeelError::NotARecord)?;
    if hdr.magic != MAGIC_FILE && hdr.magic != MAGIC_INDX {
        return Err(KeelError::NotARecord);
    }

    let usa_ofs = hdr.usa_ofs as usize;
    let usa_count = hdr.usa_count as usize;
    if usa_count == 0 || usa_ofs + usa_count * 2 > record.len() {
        return Err(KeelError::NotARecord);
    }

    let usn = u16::from_le_bytes([record[usa_ofs], record[usa_ofs + 1]]);
    trace!("applying fixups, usn {:#06x}", usn);

    // entry i protects sector i-1
    for i in 1..usa_count {
        let tail = i * sector_size - 2;
        if tail + 2 > record.len() {
            return Err(KeelError::NotARecord);
        }
        let val = u16::from_le_bytes([record[tail], record[tail + 1]]);
        if val != usn {
            return Err(KeelError::UsaMismatch { sector: i - 1 });
        }
        let orig = [record[usa_ofs + i * 2], record[usa_ofs + i * 2 + 1]];
        record[tail] = orig[0];
        record[tail + 1] = orig[1];
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 KiB FILE record covering two 512-byte sectors, with the USN
    /// stamped over both sector tails.
    fn fixed_up_record() -> Vec<u8> {
        let mut data = vec![0u8; 1024];
        data[0..4].copy_from_slice(b"FILE");
        data[4..6].copy_from_slice(&0x30u16.to_le_bytes()); // usa_ofs
        data[6..8].copy_from_slice(&3u16.to_le_bytes()); // usa_count

        // USN plus the two saved originals
        data[0x30..0x32].copy_from_slice(&0x0001u16.to_le_bytes());
        data[0x32] = 0xAA;
        data[0x33] = 0xBB;
        data[0x34] = 0xCC;
        data[0x35] = 0xDD;

        // sector tails carry the USN
        data[510..512].copy_from_slice(&0x0001u16.to_le_bytes());
        data[1022..1024].copy_from_slice(&0x0001u16.to_le_bytes());
        data
    }

    #[test]
    fn restores_sector_tails() {
        let mut data = fixed_up_record();
        apply_fixups(&mut data, 512).unwrap();
        assert_eq!(&data[510..512], &[0xAA, 0xBB]);
        assert_eq!(&data[1022..1024], &[0xCC, 0xDD]);
    }

    #[test]
    fn accepts_indx_magic() {
        let mut data = fixed_up_record();
        data[0..4].copy_from_slice(b"INDX");
        apply_fixups(&mut data, 512).unwrap();
        assert_eq!(&data[510..512], &[0xAA, 0xBB]);
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut data = fixed_up_record();
        data[0..4].copy_from_slice(b"BAAD");
        assert!(matches!(apply_fixups(&mut data, 512), Err(KeelError::NotARecord)));
    }

    #[test]
    fn rejects_torn_sector() {
        let mut data = fixed_up_record();
        data[1022] = 0x99; // second sector tail no longer matches the USN
        assert!(matches!(
            apply_fixups(&mut data, 512),
            Err(KeelError::UsaMismatch { sector: 1 })
        ));
    }

    #[test]
    fn rejects_usa_outside_record() {
        let mut data = fixed_up_record();
        data[4..6].copy_from_slice(&1020u16.to_le_bytes());
        data[6..8].copy_from_slice(&4u16.to_le_bytes());
        assert!(matches!(apply_fixups(&mut data, 512), Err(KeelError::NotARecord)));
    }
}
