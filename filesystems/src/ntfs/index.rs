// Index entry lists
// INDEX_ROOT and INDX blocks share the same entry-list shape: an
// IndexHeader followed by variable-length entries, the last of which has
// the END flag, no key, and optionally a pointer into a child subtree.

use crate::ntfs::structures::{
    read_struct, IndexEntryHeader, IndexHeader, INDEX_ENTRY_END, INDEX_ENTRY_NODE, MFT_REF_MASK,
};
use keel_core::KeelError;

/// Outcome of walking one entry list.
#[derive(Debug, Clone, Copy)]
pub struct IndexScan {
    /// MFT record number of the matched entry, low 48 bits.
    pub matched: Option<u64>,
    /// The terminal entry points into a child subtree.
    pub has_subnode: bool,
}

/// Walk the entry list whose `IndexHeader` starts at `index[0]`, applying
/// `matches` to each keyed entry in on-disk order until it accepts one or
/// the END entry stops the walk. Entries are bounds-checked against the
/// header's `index_len`; a violation is `CorruptIndex`.
pub fn scan_entries(
    index: &[u8],
    hdr: &IndexHeader,
    mut matches: impl FnMut(u64) -> bool,
) -> Result<IndexScan, KeelError> {
    let index_len = hdr.index_len as usize;
    if index_len > index.len() {
        return Err(KeelError::CorruptIndex(
            "entry list overruns its container".into(),
        ));
    }

    let mut offset = hdr.entries_offset as usize;
    loop {
        if offset + std::mem::size_of::<IndexEntryHeader>() > index_len {
            return Err(KeelError::CorruptIndex(
                "entry header overruns the list".into(),
            ));
        }
        let eh: IndexEntryHeader = read_struct(index, offset)
            .ok_or_else(|| KeelError::CorruptIndex("entry header overruns the list".into()))?;

        let len = eh.len as usize;
        if len < std::mem::size_of::<IndexEntryHeader>() || offset + len > index_len {
            return Err(KeelError::CorruptIndex(format!(
                "entry length {} at offset {}",
                len, offset
            )));
        }

        let flags = eh.flags;
        if flags & INDEX_ENTRY_END != 0 {
            return Ok(IndexScan {
                matched: None,
                has_subnode: flags & INDEX_ENTRY_NODE != 0,
            });
        }

        let mft_ref = eh.indexed_file & MFT_REF_MASK;
        if matches(mft_ref) {
            return Ok(IndexScan {
                matched: Some(mft_ref),
                has_subnode: false,
            });
        }

        offset += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mft_ref: u64, len: u16, flags: u16) -> Vec<u8> {
        let mut e = vec![0u8; len as usize];
        e[0..8].copy_from_slice(&mft_ref.to_le_bytes());
        e[8..10].copy_from_slice(&len.to_le_bytes());
        e[12..14].copy_from_slice(&flags.to_le_bytes());
        e
    }

    fn header(entries_offset: u32, index_len: u32) -> IndexHeader {
        IndexHeader {
            entries_offset,
            index_len,
            allocated_size: index_len,
            flags: 0,
        }
    }

    fn list(entries: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = vec![0u8; 16];
        for e in entries {
            buf.extend_from_slice(e);
        }
        buf
    }

    #[test]
    fn one_real_entry_before_the_sentinel() {
        let buf = list(&[entry(40, 32, 0), entry(0, 16, INDEX_ENTRY_END)]);
        let hdr = header(16, buf.len() as u32);

        let mut seen = Vec::new();
        let scan = scan_entries(&buf, &hdr, |r| {
            seen.push(r);
            false
        })
        .unwrap();
        assert_eq!(seen, vec![40]);
        assert!(scan.matched.is_none());
        assert!(!scan.has_subnode);
    }

    #[test]
    fn match_stops_the_walk() {
        let buf = list(&[
            entry(40, 32, 0),
            entry(41, 32, 0),
            entry(0, 16, INDEX_ENTRY_END),
        ]);
        let hdr = header(16, buf.len() as u32);

        let mut seen = 0;
        let scan = scan_entries(&buf, &hdr, |r| {
            seen += 1;
            r == 41
        })
        .unwrap();
        assert_eq!(scan.matched, Some(41));
        assert_eq!(seen, 2);
    }

    #[test]
    fn terminal_entry_reports_subnode() {
        let buf = list(&[entry(0, 24, INDEX_ENTRY_END | INDEX_ENTRY_NODE)]);
        let hdr = header(16, buf.len() as u32);
        let scan = scan_entries(&buf, &hdr, |_| false).unwrap();
        assert!(scan.has_subnode);
    }

    #[test]
    fn reference_sequence_bits_are_masked() {
        let raw_ref = (7u64 << 48) | 41;
        let buf = list(&[entry(raw_ref, 32, 0), entry(0, 16, INDEX_ENTRY_END)]);
        let hdr = header(16, buf.len() as u32);
        let scan = scan_entries(&buf, &hdr, |r| r == 41).unwrap();
        assert_eq!(scan.matched, Some(41));
    }

    #[test]
    fn entry_overrunning_the_list_is_corrupt() {
        let buf = list(&[entry(40, 64, 0)]);
        let hdr = header(16, 32); // declared list ends inside the entry
        assert!(matches!(
            scan_entries(&buf, &hdr, |_| false),
            Err(KeelError::CorruptIndex(_))
        ));
    }

    #[test]
    fn missing_sentinel_is_corrupt() {
        let buf = list(&[entry(40, 32, 0)]);
        let hdr = header(16, buf.len() as u32);
        assert!(matches!(
            scan_entries(&buf, &hdr, |_| false),
            Err(KeelError::CorruptIndex(_))
        ));
    }
}
