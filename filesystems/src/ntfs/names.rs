// Filename matching and conversion through the system codepage
// Stored names are UTF-16LE; the host speaks codepage bytes. A lookup
// matches when every stored code unit equals either fold of the next input
// byte, which gives case-insensitive matching within the codepage.

use crate::cache::BlockCache;
use crate::ntfs::attributes::{attr_lookup, resident_value};
use crate::ntfs::boot_sector::NtfsSuperblock;
use crate::ntfs::mft::mft_record_lookup;
use crate::ntfs::structures::{read_struct, FileNameAttr, ATTR_FILE_NAME};
use keel_core::{BlockDevice, Codepage};
use log::trace;

/// Does the record `mft_no` carry `name`? Any failure to reach the
/// candidate's FILE_NAME is "no match", never an error.
pub fn match_longname<D: BlockDevice>(
    sb: &NtfsSuperblock,
    cache: &mut BlockCache<D>,
    name: &str,
    mft_no: u64,
) -> bool {
    trace!("matching {:?} against MFT record {}", name, mft_no);

    let mut data = vec![0u8; sb.block_size as usize];
    let mut block = 0u64;
    let Ok(offset) = mft_record_lookup(sb, cache, mft_no, &mut block, &mut data) else {
        return false;
    };
    let record = &data[offset..(offset + sb.mft_record_size as usize).min(data.len())];

    let Ok(Some(attr)) = attr_lookup(record, ATTR_FILE_NAME) else {
        return false;
    };
    let Ok(value) = resident_value(record, attr) else {
        return false;
    };

    compare_name(&sb.codepage, name.as_bytes(), value)
}

/// Compare codepage `input` against a FILE_NAME attribute value.
pub(crate) fn compare_name(cp: &Codepage, input: &[u8], fn_value: &[u8]) -> bool {
    let Some(fa) = read_struct::<FileNameAttr>(fn_value, 0) else {
        return false;
    };
    let len = fa.file_name_len as usize;
    let name_off = std::mem::size_of::<FileNameAttr>();
    if name_off + len * 2 > fn_value.len() {
        return false;
    }

    let mut input = input.iter();
    for i in 0..len {
        let unit = u16::from_le_bytes([fn_value[name_off + 2 * i], fn_value[name_off + 2 * i + 1]]);
        let Some(&c) = input.next() else {
            return false;
        };
        let c = c as usize;
        if unit != cp.uni[0][c] && unit != cp.uni[1][c] {
            return false;
        }
    }

    // the stored name must account for the whole input
    input.next().is_none()
}

/// Convert a stored UTF-16LE name to codepage bytes for readdir. Prefers
/// the identity byte when the unit folds to itself, so ASCII names keep
/// their case. `None` when a unit has no codepage equivalent.
pub fn cvt_longname(cp: &Codepage, units: &[u16]) -> Option<String> {
    let mut out = String::with_capacity(units.len());
    for &unit in units {
        out.push(byte_for_unit(cp, unit)? as char);
    }
    Some(out)
}

fn byte_for_unit(cp: &Codepage, unit: u16) -> Option<u8> {
    let c = unit as usize;
    if unit < 0x100 && (cp.uni[0][c] == unit || cp.uni[1][c] == unit) {
        return Some(unit as u8);
    }
    (0..0x100)
        .find(|&c| cp.uni[0][c] == unit || cp.uni[1][c] == unit)
        .map(|c| c as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntfs::structures::FILE_ATTR_ARCHIVE;

    /// Assemble a FILE_NAME value for `name`.
    pub(crate) fn file_name_value(name: &str, file_attrs: u32) -> Vec<u8> {
        let mut value = vec![0u8; 66 + name.len() * 2];
        value[0..8].copy_from_slice(&5u64.to_le_bytes()); // parent: root
        value[56..60].copy_from_slice(&file_attrs.to_le_bytes());
        value[64] = name.len() as u8;
        value[65] = 1; // Win32 namespace
        for (i, unit) in name.encode_utf16().enumerate() {
            value[66 + 2 * i..68 + 2 * i].copy_from_slice(&unit.to_le_bytes());
        }
        value
    }

    #[test]
    fn matches_ignoring_case() {
        let cp = Codepage::default();
        let value = file_name_value("CONFIG.SYS", FILE_ATTR_ARCHIVE);
        assert!(compare_name(&cp, b"config.sys", &value));
        assert!(compare_name(&cp, b"CONFIG.SYS", &value));
        assert!(compare_name(&cp, b"Config.Sys", &value));
    }

    #[test]
    fn length_must_agree() {
        let cp = Codepage::default();
        let value = file_name_value("CONFIG.SYS", FILE_ATTR_ARCHIVE);
        assert!(!compare_name(&cp, b"config.sy", &value));
        assert!(!compare_name(&cp, b"config.syst", &value));
        assert!(!compare_name(&cp, b"", &value));
    }

    #[test]
    fn different_names_do_not_match() {
        let cp = Codepage::default();
        let value = file_name_value("AUTOEXEC.BAT", FILE_ATTR_ARCHIVE);
        assert!(!compare_name(&cp, b"autoexec.bak", &value));
    }

    #[test]
    fn conversion_preserves_ascii_case() {
        let cp = Codepage::default();
        let units: Vec<u16> = "Hello.TXT".encode_utf16().collect();
        assert_eq!(cvt_longname(&cp, &units).unwrap(), "Hello.TXT");
    }

    #[test]
    fn conversion_fails_outside_codepage() {
        let cp = Codepage::default();
        let units: Vec<u16> = "日記".encode_utf16().collect();
        assert!(cvt_longname(&cp, &units).is_none());
    }
}
