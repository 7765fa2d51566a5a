// NTFS boot sector validation and superblock derivation

use crate::ntfs::structures::{read_struct, NtfsBootSector, NTFS_OEM_IDS};
use keel_core::{Codepage, KeelError};
use log::debug;

/// NTFS caps the cluster count; everything above is reserved.
pub const MAX_CLUSTERS: u64 = 0xFFFF_FFFF_FFF4;

impl NtfsBootSector {
    /// BPB sanity: signature, sane sector/cluster geometry, the reserved
    /// and zero regions actually zero, and a recognised OEM name.
    pub fn validate(&self) -> Result<(), KeelError> {
        let signature = self.signature;
        if signature != 0xAA55 {
            return Err(KeelError::BadVolume("bad boot sector signature".into()));
        }

        let bytes_per_sector = self.bytes_per_sector;
        if !bytes_per_sector.is_power_of_two() || !(512..=4096).contains(&bytes_per_sector) {
            return Err(KeelError::BadVolume(format!(
                "bad sector size {}",
                bytes_per_sector
            )));
        }

        let sectors_per_cluster = self.sectors_per_cluster;
        if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
            return Err(KeelError::BadVolume(format!(
                "bad sectors per cluster {}",
                sectors_per_cluster
            )));
        }

        let reserved_sectors = self.reserved_sectors;
        let zero_1 = self.zero_1;
        let zero_2 = self.zero_2;
        let zero_3 = self.zero_3;
        if reserved_sectors != 0 || self.zero_0 != [0; 3] || zero_1 != 0 || zero_2 != 0 || zero_3 != 0 {
            return Err(KeelError::BadVolume("reserved fields not zero".into()));
        }

        if !NTFS_OEM_IDS.iter().any(|id| **id == self.oem_id) {
            return Err(KeelError::BadVolume("unrecognised OEM name".into()));
        }

        Ok(())
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        let bytes_per_sector = self.bytes_per_sector;
        bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    /// `clust_per_mft_record` holds either a cluster count or, when
    /// negative, the record size as a power of two.
    pub fn mft_record_size(&self) -> u32 {
        let v = self.clust_per_mft_record;
        if v >= 0 {
            v as u32 * self.bytes_per_cluster()
        } else {
            1u32 << (-v as u32)
        }
    }
}

/// Per-mount volume geometry, shared read-only by every inode.
#[derive(Clone)]
pub struct NtfsSuperblock {
    pub sector_shift: u32,
    pub sector_size: u32,
    /// log2 of sectors per cluster
    pub clust_shift: u32,
    /// log2 of bytes per cluster
    pub clust_byte_shift: u32,
    pub clust_size: u32,
    pub mft_record_size: u32,
    pub mft_record_shift: u32,
    /// log2 of the cache block size this mount settled on
    pub block_shift: u32,
    pub block_size: u32,
    /// First MFT block, in cache block units
    pub mft_block: u64,
    /// Total clusters, clamped to `MAX_CLUSTERS`
    pub clusters: u64,
    pub codepage: Codepage,
}

impl NtfsSuperblock {
    /// Derive the mount geometry from the raw boot sector. The block size
    /// is the larger of the cluster and the MFT record, and never below
    /// 1 KiB so a whole record always fits in one block.
    pub fn parse(boot: &[u8], sector_shift: u32, codepage: Codepage) -> Result<Self, KeelError> {
        let bs: NtfsBootSector = read_struct(boot, 0)
            .ok_or_else(|| KeelError::BadVolume("boot sector too short".into()))?;
        bs.validate()?;

        let bytes_per_sector = bs.bytes_per_sector;
        if u32::from(bytes_per_sector) != 1u32 << sector_shift {
            return Err(KeelError::BadVolume(format!(
                "device sector size {} does not match BPB {}",
                1u32 << sector_shift,
                bytes_per_sector
            )));
        }

        let sectors_per_cluster = bs.sectors_per_cluster as u32;
        let clust_shift = sectors_per_cluster.ilog2();
        let clust_byte_shift = clust_shift + sector_shift;
        let clust_size = sectors_per_cluster << sector_shift;

        let mft_record_size = bs.mft_record_size();
        if !mft_record_size.is_power_of_two() {
            return Err(KeelError::BadVolume(format!(
                "bad MFT record size {}",
                mft_record_size
            )));
        }
        let mft_record_shift = mft_record_size.ilog2();

        let block_shift = clust_byte_shift.max(mft_record_shift).max(10);

        let mft_lclust = bs.mft_lclust;
        let mft_block = (mft_lclust << clust_byte_shift) >> block_shift;

        let total_sectors = bs.total_sectors;
        let clusters = (total_sectors >> clust_shift).min(MAX_CLUSTERS);

        debug!(
            "ntfs geometry: cluster {} bytes, mft record {} bytes, block shift {}, mft block {}",
            clust_size, mft_record_size, block_shift, mft_block
        );

        Ok(Self {
            sector_shift,
            sector_size: 1 << sector_shift,
            clust_shift,
            clust_byte_shift,
            clust_size,
            mft_record_size,
            mft_record_shift,
            block_shift,
            block_size: 1 << block_shift,
            mft_block,
            clusters,
            codepage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal valid boot sector: 512-byte sectors, 8 sectors per cluster,
    /// 1 KiB MFT records, MFT at cluster 4.
    pub(crate) fn sample_boot_sector() -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[0] = 0xEB;
        data[1] = 0x52;
        data[2] = 0x90;
        data[3..11].copy_from_slice(b"NTFS    ");
        data[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        data[0x0D] = 8;
        data[0x15] = 0xF8;
        data[0x28..0x30].copy_from_slice(&1_000_000u64.to_le_bytes());
        data[0x30..0x38].copy_from_slice(&4u64.to_le_bytes());
        data[0x38..0x40].copy_from_slice(&1000u64.to_le_bytes());
        data[0x40] = 0xF6; // -10: 1024-byte records
        data[0x44] = 0xF4; // -12: 4096-byte index blocks
        data[0x1FE] = 0x55;
        data[0x1FF] = 0xAA;
        data
    }

    #[test]
    fn derives_geometry() {
        let sb = NtfsSuperblock::parse(&sample_boot_sector(), 9, Codepage::default()).unwrap();
        assert_eq!(sb.clust_shift, 3);
        assert_eq!(sb.clust_byte_shift, 12);
        assert_eq!(sb.clust_size, 4096);
        assert_eq!(sb.mft_record_size, 1024);
        // block shift is max(cluster byte shift 12, record shift 10)
        assert_eq!(sb.block_shift, 12);
        assert_eq!(sb.mft_block, 4);
        assert_eq!(sb.clusters, 125_000);
    }

    #[test]
    fn accepts_all_oem_names() {
        for oem in [b"NTFS    ", b"MSWIN4.0", b"MSWIN4.1"] {
            let mut data = sample_boot_sector();
            data[3..11].copy_from_slice(oem);
            assert!(NtfsSuperblock::parse(&data, 9, Codepage::default()).is_ok());
        }
    }

    #[test]
    fn rejects_bad_oem() {
        let mut data = sample_boot_sector();
        data[3..11].copy_from_slice(b"MSDOS5.0");
        assert!(matches!(
            NtfsSuperblock::parse(&data, 9, Codepage::default()),
            Err(KeelError::BadVolume(_))
        ));
    }

    #[test]
    fn rejects_nonzero_reserved_fields() {
        let mut data = sample_boot_sector();
        data[0x0E] = 1; // reserved sectors
        assert!(matches!(
            NtfsSuperblock::parse(&data, 9, Codepage::default()),
            Err(KeelError::BadVolume(_))
        ));

        let mut data = sample_boot_sector();
        data[0x20] = 0x10; // zero_3 region
        assert!(NtfsSuperblock::parse(&data, 9, Codepage::default()).is_err());
    }

    #[test]
    fn positive_clusters_per_record() {
        let mut data = sample_boot_sector();
        data[0x40] = 1; // one cluster per record: 4096 bytes
        let sb = NtfsSuperblock::parse(&data, 9, Codepage::default()).unwrap();
        assert_eq!(sb.mft_record_size, 4096);
        assert_eq!(sb.block_shift, 12);
    }

    #[test]
    fn cluster_count_is_clamped() {
        let mut data = sample_boot_sector();
        data[0x28..0x30].copy_from_slice(&u64::MAX.to_le_bytes());
        let sb = NtfsSuperblock::parse(&data, 9, Codepage::default()).unwrap();
        assert_eq!(sb.clusters, MAX_CLUSTERS);
    }
}
