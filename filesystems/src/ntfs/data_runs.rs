// Runlist (mapping pairs) decoding
// A non-resident attribute maps VCNs to LCNs as a byte stream of runs. Each
// run starts with a header byte whose low nibble gives the width of the run
// length and whose high nibble gives the width of the LCN delta; the delta
// is signed and relative to the previous run's start. A zero-width delta
// encodes a sparse hole.

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use keel_core::KeelError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MappingFlags: u32 {
        /// First run of the stream
        const START = 1 << 0;
        /// Stream exhausted; the chunk carries no run
        const END = 1 << 1;
        const ALLOCATED = 1 << 2;
        /// Sparse hole over [cur_vcn, next_vcn)
        const UNALLOCATED = 1 << 3;
    }
}

/// Decoder state and, after each step, the run just decoded. The chunk
/// describes `[cur_vcn, next_vcn)` mapped at `cur_lcn` unless the run is a
/// hole. Whether a run is a hole is decided by the delta width alone;
/// `cur_lcn` is left untouched across holes so later deltas still apply to
/// the last allocated position.
#[derive(Debug, Clone)]
pub struct MappingChunk {
    pub cur_vcn: u64,
    pub next_vcn: u64,
    pub cur_lcn: i64,
    pub flags: MappingFlags,
}

impl MappingChunk {
    /// Seed the accumulator for an attribute's stream.
    pub fn new(lowest_vcn: u64) -> Self {
        Self {
            cur_vcn: lowest_vcn,
            next_vcn: lowest_vcn,
            cur_lcn: 0,
            flags: MappingFlags::empty(),
        }
    }

    /// Run length in clusters.
    pub fn run_len(&self) -> u64 {
        self.next_vcn - self.cur_vcn
    }
}

/// Decode one run at `*offset`, advancing the offset past it.
pub fn parse_data_run(
    stream: &[u8],
    offset: &mut usize,
    chunk: &mut MappingChunk,
) -> Result<(), KeelError> {
    chunk.flags = MappingFlags::empty();

    if *offset >= stream.len() || stream[*offset] == 0 {
        chunk.flags |= MappingFlags::END;
        return Ok(());
    }

    if *offset == 0 {
        chunk.flags |= MappingFlags::START;
    }
    chunk.cur_vcn = chunk.next_vcn;

    let header = stream[*offset];
    let v = (header & 0x0F) as usize;
    let l = (header >> 4) as usize;
    if v == 0 || v > 8 || l > 8 {
        return Err(KeelError::CorruptRunlist(format!(
            "field widths v={} l={}",
            v, l
        )));
    }

    let end = *offset + 1 + v + l;
    if end > stream.len() {
        return Err(KeelError::CorruptRunlist(
            "run overruns the mapping pairs stream".into(),
        ));
    }

    let run_len = LittleEndian::read_uint(&stream[*offset + 1..], v);
    chunk.next_vcn += run_len;

    if l == 0 {
        chunk.flags |= MappingFlags::UNALLOCATED;
    } else {
        let delta = LittleEndian::read_int(&stream[*offset + 1 + v..], l);
        chunk.cur_lcn += delta;
        chunk.flags |= MappingFlags::ALLOCATED;
    }

    *offset = end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(stream: &[u8], lowest_vcn: u64) -> Vec<MappingChunk> {
        let mut chunks = Vec::new();
        let mut chunk = MappingChunk::new(lowest_vcn);
        let mut offset = 0;
        loop {
            parse_data_run(stream, &mut offset, &mut chunk).unwrap();
            chunks.push(chunk.clone());
            if chunk.flags.contains(MappingFlags::END) {
                break;
            }
        }
        chunks
    }

    #[test]
    fn single_run_then_terminator() {
        // 0x18 clusters at LCN 0x5634
        let stream = [0x21, 0x18, 0x34, 0x56, 0x00];
        let chunks = decode_all(&stream, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].cur_vcn, 0);
        assert_eq!(chunks[0].next_vcn, 0x18);
        assert_eq!(chunks[0].cur_lcn, 0x5634);
        assert_eq!(
            chunks[0].flags,
            MappingFlags::START | MappingFlags::ALLOCATED
        );
        assert!(chunks[1].flags.contains(MappingFlags::END));
    }

    #[test]
    fn sparse_hole() {
        // hole over VCNs 0..4, then end
        let stream = [0x01, 0x05, 0x00];
        let chunks = decode_all(&stream, 0);
        assert_eq!(
            chunks[0].flags,
            MappingFlags::START | MappingFlags::UNALLOCATED
        );
        assert_eq!(chunks[0].cur_vcn, 0);
        assert_eq!(chunks[0].next_vcn, 5);
        assert_eq!(chunks[0].cur_lcn, 0);
        assert!(chunks[1].flags.contains(MappingFlags::END));
    }

    #[test]
    fn deltas_accumulate_and_chunks_abut() {
        // 10 clusters at 100, then 20 clusters at 100 + 100 = 200
        let stream = [0x21, 0x0A, 0x64, 0x00, 0x21, 0x14, 0x64, 0x00, 0x00];
        let chunks = decode_all(&stream, 0);
        assert_eq!(chunks[0].cur_lcn, 100);
        assert_eq!(chunks[1].cur_lcn, 200);
        assert_eq!(chunks[1].cur_vcn, chunks[0].next_vcn);
        assert!(!chunks[1].flags.contains(MappingFlags::START));
    }

    #[test]
    fn negative_delta_moves_backwards() {
        // 10 clusters at 1000, then 5 clusters at 1000 - 100 = 900
        let stream = [0x22, 0x0A, 0x00, 0xE8, 0x03, 0x11, 0x05, 0x9C, 0x00];
        let chunks = decode_all(&stream, 0);
        assert_eq!(chunks[0].cur_lcn, 1000);
        assert_eq!(chunks[1].cur_lcn, 900);
    }

    #[test]
    fn allocated_run_landing_on_lcn_zero_stays_allocated() {
        // 1 cluster at 5, then a run whose delta brings the LCN back to 0;
        // classification follows the delta width, not the accumulator.
        let stream = [0x11, 0x01, 0x05, 0x11, 0x01, 0xFB, 0x00];
        let chunks = decode_all(&stream, 0);
        assert_eq!(chunks[1].cur_lcn, 0);
        assert!(chunks[1].flags.contains(MappingFlags::ALLOCATED));
    }

    #[test]
    fn lowest_vcn_seeds_the_accumulator() {
        let stream = [0x11, 0x04, 0x10, 0x00];
        let chunks = decode_all(&stream, 7);
        assert_eq!(chunks[0].cur_vcn, 7);
        assert_eq!(chunks[0].next_vcn, 11);
    }

    #[test]
    fn oversized_width_nibble_is_corrupt() {
        let stream = [0x19, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut chunk = MappingChunk::new(0);
        let mut offset = 0;
        assert!(matches!(
            parse_data_run(&stream, &mut offset, &mut chunk),
            Err(KeelError::CorruptRunlist(_))
        ));
    }

    #[test]
    fn truncated_run_is_corrupt() {
        let stream = [0x21, 0x18];
        let mut chunk = MappingChunk::new(0);
        let mut offset = 0;
        assert!(matches!(
            parse_data_run(&stream, &mut offset, &mut chunk),
            Err(KeelError::CorruptRunlist(_))
        ));
    }

    #[test]
    fn empty_stream_ends_without_start() {
        let mut chunk = MappingChunk::new(0);
        let mut offset = 0;
        parse_data_run(&[], &mut offset, &mut chunk).unwrap();
        assert_eq!(chunk.flags, MappingFlags::END);
    }

    #[test]
    fn decoding_is_pure() {
        let stream = [0x21, 0x0A, 0x64, 0x00, 0x01, 0x03, 0x21, 0x14, 0x9C, 0xFF, 0x00];
        let a = decode_all(&stream, 2);
        let b = decode_all(&stream, 2);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.cur_vcn, y.cur_vcn);
            assert_eq!(x.next_vcn, y.next_vcn);
            assert_eq!(x.cur_lcn, y.cur_lcn);
            assert_eq!(x.flags, y.flags);
        }
    }
}
