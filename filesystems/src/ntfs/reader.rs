// NTFS reader
// Ties the pieces together: mount, path-component lookup through the
// directory index, inode materialisation and the streaming read path.

use crate::cache::BlockCache;
use crate::ntfs::attributes::{attr_lookup, mapping_pairs, non_resident_header, resident_value};
use crate::ntfs::boot_sector::NtfsSuperblock;
use crate::ntfs::data_runs::{parse_data_run, MappingChunk, MappingFlags};
use crate::ntfs::fixup::apply_fixups;
use crate::ntfs::index::scan_entries;
use crate::ntfs::inode::{InodeData, NtfsInode};
use crate::ntfs::mft::mft_record_lookup;
use crate::ntfs::names::{cvt_longname, match_longname};
use crate::ntfs::structures::{
    read_struct, AttrHeader, FileNameAttr, IndexBlockHeader, IndexRoot, MftRecordHeader,
    ResidentAttrHeader, ATTR_DATA, ATTR_FILE_NAME, ATTR_INDEX_ALLOCATION, ATTR_INDEX_ROOT,
    FILE_ATTR_ARCHIVE, INDEX_BLOCK_HEADER_LEN, INDEX_ROOT_HEADER_LEN, MAGIC_INDX, MFT_RECORD_ROOT,
};
use crate::ops::{Extent, FileHandle, FilesystemOps};
use keel_core::{BlockDevice, Codepage, DirEntry, DirentType, KeelError};
use log::{debug, info, trace};

pub struct NtfsReader<D> {
    sb: NtfsSuperblock,
    cache: BlockCache<D>,
}

impl<D: BlockDevice> NtfsReader<D> {
    /// Mount: validate the boot sector, settle the block geometry and
    /// initialise the cache with it.
    pub fn new(mut device: D, codepage: Codepage) -> Result<Self, KeelError> {
        let sector_shift = device.sector_shift();
        let mut boot = vec![0u8; device.sector_size()];
        device.read_sectors(0, &mut boot)?;

        let sb = NtfsSuperblock::parse(&boot, sector_shift, codepage)?;
        info!(
            "mounted ntfs volume: {} clusters of {} bytes",
            sb.clusters, sb.clust_size
        );

        let cache = BlockCache::new(device, sb.block_shift);
        Ok(Self { sb, cache })
    }

    pub fn superblock(&self) -> &NtfsSuperblock {
        &self.sb
    }

    fn locate_record(
        &mut self,
        mft_no: u64,
        block: &mut u64,
        data: &mut [u8],
    ) -> Result<usize, KeelError> {
        mft_record_lookup(&self.sb, &mut self.cache, mft_no, block, data)
    }

    /// Materialise an inode for MFT record `mft_no`.
    fn index_inode_setup(&mut self, mft_no: u64) -> Result<NtfsInode, KeelError> {
        let mut data = vec![0u8; self.sb.block_size as usize];
        let mut block = 0u64;
        let offset = self.locate_record(mft_no, &mut block, &mut data)?;
        let record = record_slice(&data, offset, self.sb.mft_record_size as usize);

        let hdr: MftRecordHeader = read_struct(record, 0)
            .ok_or_else(|| KeelError::CorruptRecord("record shorter than its header".into()))?;
        let seq_no = hdr.seq_no;

        let d_type = classify_record(record);
        if d_type == DirentType::Unknown {
            debug!("cannot classify MFT record {}", mft_no);
            return Err(KeelError::NotFound);
        }

        let (size, inode_data) = if d_type == DirentType::Dir {
            let attr = attr_lookup(record, ATTR_INDEX_ROOT)?.ok_or(KeelError::NotFound)?;
            let value = resident_value(record, attr)?;
            let ir: IndexRoot = read_struct(value, 0)
                .ok_or_else(|| KeelError::CorruptIndex("index root too small".into()))?;

            let block_size = ir.index_block_size;
            if block_size == 0 || !block_size.is_power_of_two() {
                return Err(KeelError::CorruptIndex(format!(
                    "index block size {}",
                    block_size
                )));
            }

            // one index VCN covers a cluster, unless clusters outgrow the
            // index blocks; then it covers a cache block
            let (vcn_size, vcn_size_shift) = if self.sb.clust_size <= block_size {
                (self.sb.clust_size, self.sb.clust_byte_shift)
            } else {
                (self.sb.block_size, self.sb.block_shift)
            };

            (
                0,
                InodeData::Index {
                    collation_rule: ir.collation_rule,
                    block_size,
                    block_size_shift: block_size.ilog2(),
                    vcn_size,
                    vcn_size_shift,
                },
            )
        } else {
            let attr = attr_lookup(record, ATTR_DATA)?.ok_or(KeelError::NotFound)?;
            let ahdr: AttrHeader = read_struct(record, attr)
                .ok_or_else(|| KeelError::CorruptRecord("attribute header truncated".into()))?;

            if ahdr.non_resident == 0 {
                let value = resident_value(record, attr)?;
                let rh: ResidentAttrHeader = read_struct(record, attr)
                    .ok_or_else(|| KeelError::CorruptRecord("resident header truncated".into()))?;
                (
                    value.len() as u64,
                    InodeData::Resident {
                        value_offset: attr as u32 + rh.value_offset as u32,
                    },
                )
            } else {
                let nr = non_resident_header(record, attr)?;
                let stream = mapping_pairs(record, attr, &nr)?;

                let mut chunk = MappingChunk::new(nr.lowest_vcn);
                let mut droffset = 0usize;
                loop {
                    parse_data_run(stream, &mut droffset, &mut chunk)?;
                    if chunk.flags.contains(MappingFlags::UNALLOCATED) {
                        continue;
                    }
                    break;
                }
                if chunk.flags.contains(MappingFlags::END) {
                    debug!("$DATA of record {} maps no allocated run", mft_no);
                    return Err(KeelError::NotFound);
                }
                if chunk.cur_lcn < 0 {
                    return Err(KeelError::CorruptRunlist(format!(
                        "negative LCN {}",
                        chunk.cur_lcn
                    )));
                }

                (
                    nr.initialized_size,
                    InodeData::NonResident {
                        start_vcn: chunk.cur_vcn,
                        next_vcn: chunk.next_vcn,
                        run_len: chunk.run_len(),
                        start_lcn: chunk.cur_lcn as u64,
                    },
                )
            }
        };

        Ok(NtfsInode {
            mft_no,
            seq_no,
            here: block,
            d_type,
            size,
            data: inode_data,
        })
    }

    /// Search directory `dir` for the component `name`: the resident
    /// INDEX_ROOT list first, then every INDX block reachable through the
    /// INDEX_ALLOCATION runlist.
    fn index_lookup(&mut self, name: &str, dir: &NtfsInode) -> Result<NtfsInode, KeelError> {
        if !dir.is_dir() {
            return Err(KeelError::NotFound);
        }
        debug!("looking up {:?} in MFT record {}", name, dir.mft_no);

        let mut data = vec![0u8; self.sb.block_size as usize];
        let mut block = dir.here;
        let offset = self.locate_record(dir.mft_no, &mut block, &mut data)?;
        let record = record_slice(&data, offset, self.sb.mft_record_size as usize);

        let attr = attr_lookup(record, ATTR_INDEX_ROOT)?.ok_or(KeelError::NotFound)?;
        let value = resident_value(record, attr)?;
        let ir: IndexRoot = read_struct(value, 0)
            .ok_or_else(|| KeelError::CorruptIndex("index root too small".into()))?;
        let root_hdr = ir.index;

        let scan = scan_entries(&value[INDEX_ROOT_HEADER_LEN..], &root_hdr, |mft_ref| {
            match_longname(&self.sb, &mut self.cache, name, mft_ref)
        })?;
        if let Some(mft_ref) = scan.matched {
            trace!("{:?} found in the index root, record {}", name, mft_ref);
            return self.index_inode_setup(mft_ref);
        }
        if !scan.has_subnode {
            debug!("{:?} not in the index root, no subtree", name);
            return Err(KeelError::NotFound);
        }

        // descend: walk every INDX block the allocation runlist reaches
        let attr = attr_lookup(record, ATTR_INDEX_ALLOCATION)?.ok_or(KeelError::NotFound)?;
        let ahdr: AttrHeader = read_struct(record, attr)
            .ok_or_else(|| KeelError::CorruptRecord("attribute header truncated".into()))?;
        if ahdr.non_resident == 0 {
            return Err(KeelError::CorruptIndex(
                "$INDEX_ALLOCATION is resident".into(),
            ));
        }
        let nr = non_resident_header(record, attr)?;
        let stream = mapping_pairs(record, attr, &nr)?;

        let mut chunk = MappingChunk::new(nr.lowest_vcn);
        let mut droffset = 0usize;
        let mut iblock = vec![0u8; self.sb.block_size as usize];
        loop {
            parse_data_run(stream, &mut droffset, &mut chunk)?;
            if chunk.flags.contains(MappingFlags::UNALLOCATED) {
                continue;
            }
            if chunk.flags.contains(MappingFlags::END) {
                break;
            }
            if chunk.cur_lcn < 0 {
                return Err(KeelError::CorruptRunlist(format!(
                    "negative LCN {}",
                    chunk.cur_lcn
                )));
            }
            trace!(
                "index run: {} clusters at LCN {:#x}",
                chunk.run_len(),
                chunk.cur_lcn
            );

            for vcn in 0..chunk.run_len() {
                let lcn = chunk.cur_lcn as u64 + vcn;
                let abs_block = (lcn << self.sb.clust_byte_shift) >> self.sb.block_shift;
                let view = self.cache.get(abs_block)?;
                iblock.copy_from_slice(view);

                apply_fixups(&mut iblock, self.sb.sector_size as usize)?;
                let ibh: IndexBlockHeader = read_struct(&iblock, 0)
                    .ok_or_else(|| KeelError::CorruptIndex("INDX header truncated".into()))?;
                if ibh.magic != MAGIC_INDX {
                    return Err(KeelError::CorruptIndex("expected an INDX block".into()));
                }
                let ihdr = ibh.index;

                let scan = scan_entries(&iblock[INDEX_BLOCK_HEADER_LEN..], &ihdr, |mft_ref| {
                    match_longname(&self.sb, &mut self.cache, name, mft_ref)
                })?;
                if let Some(mft_ref) = scan.matched {
                    trace!("{:?} found in INDX block at LCN {:#x}", name, lcn);
                    return self.index_inode_setup(mft_ref);
                }
            }
        }

        debug!("{:?} not found", name);
        Err(KeelError::NotFound)
    }

    /// Extent covering the logical sector `lstart`, or `None` past EOF.
    fn extent_for(&self, inode: &NtfsInode, lstart: u64) -> Result<Option<Extent>, KeelError> {
        let sb = &self.sb;
        let mcluster = lstart >> sb.clust_shift;
        let tcluster = (inode.size + sb.clust_size as u64 - 1) >> sb.clust_byte_shift;
        if mcluster >= tcluster {
            return Ok(None);
        }
        let total_sectors = (inode.size + sb.sector_size as u64 - 1) >> sb.sector_shift;
        if lstart >= total_sectors {
            return Ok(None);
        }

        let pstart = match inode.data {
            // resident bytes live in the MFT block that holds the record
            InodeData::Resident { .. } => {
                ((sb.mft_block + inode.here) << (sb.block_shift - sb.sector_shift)) + lstart
            }
            InodeData::NonResident { start_lcn, .. } => (start_lcn << sb.clust_shift) + lstart,
            InodeData::Index { .. } => return Ok(None),
        };

        Ok(Some(Extent {
            pstart,
            len: total_sectors - lstart,
        }))
    }

    /// Resident read path: copy the in-record $DATA value, bounded by the
    /// file size. Fixups were applied when the record was located.
    fn read_resident(
        &mut self,
        file: &mut FileHandle<NtfsInode>,
        buf: &mut [u8],
        sectors: usize,
    ) -> Result<(u32, bool), KeelError> {
        let cap = buf.len().min(sectors << self.sb.sector_shift);

        let mut data = vec![0u8; self.sb.block_size as usize];
        let mut block = file.inode.here;
        let offset = self.locate_record(file.inode.mft_no, &mut block, &mut data)?;
        let record = record_slice(&data, offset, self.sb.mft_record_size as usize);

        let attr = attr_lookup(record, ATTR_DATA)?.ok_or(KeelError::NotFound)?;
        let value = resident_value(record, attr)?;

        let n = (file.inode.size as usize).min(value.len()).min(cap);
        buf[..n].copy_from_slice(&value[..n]);
        file.offset = n as u64;
        Ok((n as u32, false))
    }

    /// Non-resident read path: stream sectors of the reported extent
    /// through the block cache.
    fn read_extents(
        &mut self,
        file: &mut FileHandle<NtfsInode>,
        buf: &mut [u8],
        sectors: usize,
    ) -> Result<(u32, bool), KeelError> {
        let sec_size = self.sb.sector_size as usize;
        let size = file.inode.size;
        if file.offset >= size {
            return Ok((0, false));
        }

        let lsector = file.offset >> self.sb.sector_shift;
        let Some(extent) = self.extent_for(&file.inode, lsector)? else {
            return Ok((0, false));
        };

        let want = (sectors as u64).min(extent.len) as usize;
        let cap = buf.len().min(want * sec_size);
        let mut n_bytes = cap.min((size - file.offset) as usize);
        // stay sector-aligned until the final partial sector
        if file.offset + n_bytes as u64 != size {
            n_bytes &= !(sec_size - 1);
            if n_bytes == 0 {
                return Ok((0, true));
            }
        }

        let full = n_bytes / sec_size;
        let mut done = 0usize;
        if full > 0 {
            self.cache
                .copy_sectors(extent.pstart, &mut buf[..full * sec_size])?;
            done = full * sec_size;
        }
        let tail = n_bytes - done;
        if tail > 0 {
            let mut sector = vec![0u8; sec_size];
            self.cache
                .copy_sectors(extent.pstart + full as u64, &mut sector)?;
            buf[done..done + tail].copy_from_slice(&sector[..tail]);
            done += tail;
        }

        file.offset += done as u64;
        Ok((done as u32, file.offset < size))
    }
}

impl<D: BlockDevice> FilesystemOps for NtfsReader<D> {
    type Inode = NtfsInode;

    fn fs_name(&self) -> &'static str {
        "ntfs"
    }

    fn block_shift(&self) -> u32 {
        self.sb.block_shift
    }

    fn iget_root(&mut self) -> Result<NtfsInode, KeelError> {
        self.index_inode_setup(MFT_RECORD_ROOT)
    }

    fn iget(&mut self, name: &str, parent: &NtfsInode) -> Result<NtfsInode, KeelError> {
        self.index_lookup(name, parent)
    }

    /// Fill a dirent describing the open file's own record.
    fn readdir(&mut self, file: &mut FileHandle<NtfsInode>) -> Result<DirEntry, KeelError> {
        let mut data = vec![0u8; self.sb.block_size as usize];
        let mut block = file.inode.here;
        let offset = self.locate_record(file.inode.mft_no, &mut block, &mut data)?;
        let record = record_slice(&data, offset, self.sb.mft_record_size as usize);

        let attr = attr_lookup(record, ATTR_FILE_NAME)?.ok_or(KeelError::NotFound)?;
        let value = resident_value(record, attr)?;
        let fa: FileNameAttr = read_struct(value, 0)
            .ok_or_else(|| KeelError::CorruptRecord("FILE_NAME truncated".into()))?;

        let len = fa.file_name_len as usize;
        let name_off = std::mem::size_of::<FileNameAttr>();
        if name_off + 2 * len > value.len() {
            return Err(KeelError::CorruptRecord("file name overruns its value".into()));
        }
        let units: Vec<u16> = (0..len)
            .map(|i| u16::from_le_bytes([value[name_off + 2 * i], value[name_off + 2 * i + 1]]))
            .collect();
        let name = cvt_longname(&self.sb.codepage, &units).ok_or_else(|| {
            debug!("record {} has a name outside the codepage", file.inode.mft_no);
            KeelError::NotFound
        })?;

        Ok(DirEntry::new(
            file.inode.mft_no,
            file.offset,
            classify_record(record),
            name,
        ))
    }

    fn getfssec(
        &mut self,
        file: &mut FileHandle<NtfsInode>,
        buf: &mut [u8],
        sectors: usize,
    ) -> Result<(u32, bool), KeelError> {
        match file.inode.data {
            InodeData::Resident { .. } => self.read_resident(file, buf, sectors),
            InodeData::NonResident { .. } => self.read_extents(file, buf, sectors),
            InodeData::Index { .. } => Err(KeelError::NotFound),
        }
    }

    fn next_extent(&mut self, inode: &NtfsInode, lstart: u64) -> Result<Option<Extent>, KeelError> {
        self.extent_for(inode, lstart)
    }
}

fn record_slice(data: &[u8], offset: usize, record_size: usize) -> &[u8] {
    &data[offset..(offset + record_size).min(data.len())]
}

/// File or directory, per the FILE_NAME attribute bits: anything beyond
/// ARCHIVE marks a directory, ARCHIVE alone (or nothing) a regular file.
fn classify_record(record: &[u8]) -> DirentType {
    let Ok(Some(attr)) = attr_lookup(record, ATTR_FILE_NAME) else {
        return DirentType::Unknown;
    };
    let Ok(value) = resident_value(record, attr) else {
        return DirentType::Unknown;
    };
    let Some(fa) = read_struct::<FileNameAttr>(value, 0) else {
        return DirentType::Unknown;
    };

    let file_attrs = fa.file_attrs;
    if file_attrs & !FILE_ATTR_ARCHIVE == 0 {
        DirentType::Reg
    } else {
        DirentType::Dir
    }
}
