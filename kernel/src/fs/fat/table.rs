//! File Allocation Table access
//!
//! Entries are read through a small window of FAT sectors cached per volume.
//! The window is reloaded whenever an entry (including both bytes of a
//! straddling FAT12 entry) falls outside it.

use alloc::vec;
use alloc::vec::Vec;

use super::bpb::{FatType, Geometry};
use super::read_u16;
use super::read_u32;
use crate::fs::vfs::FsStatus;
use crate::io::BlockDevice;

/// Number of FAT sectors held in the cache window
pub const FAT_CACHE_SECTORS: u32 = 5;

/// Mask applied to FAT32 entries (upper 4 bits are reserved)
pub const FAT32_ENTRY_MASK: u32 = 0x0FFF_FFFF;

/// Decoded meaning of a FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    /// Cluster is unallocated
    Free,
    /// Chain continues at the given cluster
    Next(u32),
    /// Reserved value (cluster 1 or the reserved range)
    Reserved,
    /// Cluster is marked bad
    Bad,
    /// Last cluster of the chain
    EndOfChain,
}

impl ClusterLink {
    /// Classify a raw (already masked) entry value
    pub fn classify(fat_type: FatType, value: u32) -> Self {
        let (bad, eoc) = match fat_type {
            FatType::Fat12 => (0xFF7, 0xFF8),
            FatType::Fat16 => (0xFFF7, 0xFFF8),
            FatType::Fat32 => (0x0FFF_FFF7, 0x0FFF_FFF8),
        };

        match value {
            0 => ClusterLink::Free,
            1 => ClusterLink::Reserved,
            v if v >= eoc => ClusterLink::EndOfChain,
            v if v == bad => ClusterLink::Bad,
            v if v > bad => ClusterLink::Reserved,
            v => ClusterLink::Next(v),
        }
    }
}

/// Extract the raw entry value for `cluster` from FAT bytes at `offset`
pub fn decode_entry(fat_type: FatType, cluster: u32, bytes: &[u8], offset: usize) -> u32 {
    match fat_type {
        FatType::Fat12 => {
            let pair = read_u16(bytes, offset) as u32;
            if cluster & 1 == 0 {
                pair & 0x0FFF
            } else {
                pair >> 4
            }
        }
        FatType::Fat16 => read_u16(bytes, offset) as u32,
        FatType::Fat32 => read_u32(bytes, offset) & FAT32_ENTRY_MASK,
    }
}

/// Cached view of the first FAT copy
pub struct FatTable {
    fat_type: FatType,
    fat_start: u32,
    fat_size: u32,
    bytes_per_sector: u32,
    cluster_count: u32,
    window: Vec<u8>,
    /// FAT-relative sector of the first cached sector
    position: Option<u32>,
    /// Number of sectors currently held
    loaded: u32,
}

impl FatTable {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            fat_type: geometry.fat_type,
            fat_start: geometry.fat_start,
            fat_size: geometry.fat_size,
            bytes_per_sector: geometry.bytes_per_sector,
            cluster_count: geometry.cluster_count,
            window: vec![0u8; (FAT_CACHE_SECTORS * geometry.bytes_per_sector) as usize],
            position: None,
            loaded: 0,
        }
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    /// Chain terminator threshold for this volume's FAT type
    pub fn end_of_chain_sentinel(&self) -> u32 {
        self.fat_type.end_of_chain_sentinel()
    }

    /// FAT-relative sector where the cache window starts, if loaded
    pub fn window_start(&self) -> Option<u32> {
        self.position
    }

    /// Drop the cached window
    pub fn invalidate(&mut self) {
        self.position = None;
        self.loaded = 0;
    }

    fn covers(&self, first: u32, last: u32) -> bool {
        match self.position {
            Some(start) => first >= start && last < start + self.loaded,
            None => false,
        }
    }

    /// Load the window so that it starts at FAT-relative sector `sector`
    fn load(&mut self, dev: &mut dyn BlockDevice, sector: u32) -> Result<(), FsStatus> {
        let count = FAT_CACHE_SECTORS.min(self.fat_size - sector);
        let bytes = (count * self.bytes_per_sector) as usize;

        let lba = self.fat_start + sector;
        if let Err(e) = dev.read_sectors(lba as u64, count, &mut self.window[..bytes]) {
            log::error!("[FAT] Failed to read FAT sector {}: {}", lba, e);
            self.invalidate();
            return Err(FsStatus::IoError);
        }

        self.position = Some(sector);
        self.loaded = count;
        Ok(())
    }

    /// Read the raw entry for `cluster`
    pub fn entry(&mut self, dev: &mut dyn BlockDevice, cluster: u32) -> Result<u32, FsStatus> {
        if cluster >= self.cluster_count + 2 {
            log::warn!("[FAT] Cluster {} beyond end of volume", cluster);
            return Err(FsStatus::InvalidFileSystem);
        }

        let offset = self.fat_type.entry_offset(cluster);
        let first = offset / self.bytes_per_sector;
        let last = (offset + self.fat_type.entry_width() - 1) / self.bytes_per_sector;
        if last >= self.fat_size {
            return Err(FsStatus::InvalidFileSystem);
        }

        if !self.covers(first, last) {
            // Start the window at the entry's sector, pulling it back if the
            // tail would run past the end of the FAT
            let start = first.min(self.fat_size.saturating_sub(FAT_CACHE_SECTORS));
            self.load(dev, start)?;
        }

        let start = self.position.ok_or(FsStatus::IoError)?;
        let at = (offset - start * self.bytes_per_sector) as usize;
        Ok(decode_entry(self.fat_type, cluster, &self.window, at))
    }

    /// Follow one link of a cluster chain
    pub fn next_cluster(&mut self, dev: &mut dyn BlockDevice, cluster: u32) -> Result<ClusterLink, FsStatus> {
        let value = self.entry(dev, cluster)?;
        Ok(ClusterLink::classify(self.fat_type, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat::bpb::BootSector;
    use crate::fs::fat::testutil::ImageSpec;
    use crate::io::{BlockCaps, BlockStatus, RamDisk};

    #[test]
    fn test_classify_links() {
        assert_eq!(ClusterLink::classify(FatType::Fat12, 0), ClusterLink::Free);
        assert_eq!(ClusterLink::classify(FatType::Fat12, 3), ClusterLink::Next(3));
        assert_eq!(ClusterLink::classify(FatType::Fat12, 0xFF7), ClusterLink::Bad);
        assert_eq!(ClusterLink::classify(FatType::Fat12, 0xFF8), ClusterLink::EndOfChain);
        assert_eq!(ClusterLink::classify(FatType::Fat12, 0xFFF), ClusterLink::EndOfChain);

        assert_eq!(ClusterLink::classify(FatType::Fat16, 0xFF8), ClusterLink::Next(0xFF8));
        assert_eq!(ClusterLink::classify(FatType::Fat16, 0xFFF8), ClusterLink::EndOfChain);
        assert_eq!(ClusterLink::classify(FatType::Fat16, 0xFFFF), ClusterLink::EndOfChain);

        assert_eq!(ClusterLink::classify(FatType::Fat32, 0xFFF8), ClusterLink::Next(0xFFF8));
        assert_eq!(ClusterLink::classify(FatType::Fat32, 0x0FFF_FFF8), ClusterLink::EndOfChain);
        assert_eq!(ClusterLink::classify(FatType::Fat32, 0x0FFF_FFF7), ClusterLink::Bad);
        assert_eq!(ClusterLink::classify(FatType::Fat32, 1), ClusterLink::Reserved);
    }

    #[test]
    fn test_decode_fat12_pairs() {
        // Entries 2 = 0x003, 3 = 0xFFF packed as 03 F0 FF
        let bytes = [0x03, 0xF0, 0xFF];
        assert_eq!(decode_entry(FatType::Fat12, 2, &bytes, 0), 0x003);
        assert_eq!(decode_entry(FatType::Fat12, 3, &bytes, 1), 0xFFF);
    }

    #[test]
    fn test_decode_fat32_masks_high_bits() {
        let bytes = 0xF000_0005u32.to_le_bytes();
        assert_eq!(decode_entry(FatType::Fat32, 9, &bytes, 0), 5);
        let eoc = 0xFFFF_FFFFu32.to_le_bytes();
        assert_eq!(
            ClusterLink::classify(FatType::Fat32, decode_entry(FatType::Fat32, 9, &eoc, 0)),
            ClusterLink::EndOfChain
        );
    }

    fn table_for(spec: &ImageSpec) -> (FatTable, RamDisk) {
        let image = spec.build();
        let geo = BootSector::parse(&image[..512]).unwrap().geometry().unwrap();
        (FatTable::new(&geo), RamDisk::from_image("img", image))
    }

    #[test]
    fn test_chain_walk_fat16() {
        let mut spec = ImageSpec::fat16();
        spec.set_chain(&[2, 3, 9]);
        let (mut fat, mut disk) = table_for(&spec);

        assert_eq!(fat.next_cluster(&mut disk, 2), Ok(ClusterLink::Next(3)));
        assert_eq!(fat.next_cluster(&mut disk, 3), Ok(ClusterLink::Next(9)));
        assert_eq!(fat.next_cluster(&mut disk, 9), Ok(ClusterLink::EndOfChain));
        assert_eq!(fat.next_cluster(&mut disk, 10), Ok(ClusterLink::Free));
        assert_eq!(fat.window_start(), Some(0));
    }

    #[test]
    fn test_chain_walk_fat12_straddles_sector() {
        // Cluster 341 sits at byte 511, so its entry crosses into sector 1
        let mut spec = ImageSpec::fat12();
        spec.set_chain(&[340, 341, 342]);
        let (mut fat, mut disk) = table_for(&spec);

        assert_eq!(fat.next_cluster(&mut disk, 340), Ok(ClusterLink::Next(341)));
        assert_eq!(fat.next_cluster(&mut disk, 341), Ok(ClusterLink::Next(342)));
        assert_eq!(fat.next_cluster(&mut disk, 342), Ok(ClusterLink::EndOfChain));
    }

    #[test]
    fn test_cache_window_moves() {
        let mut spec = ImageSpec::fat16();
        // Cluster 2000 lives in FAT sector 7, outside the first window
        spec.set_chain(&[2000, 2001]);
        let (mut fat, mut disk) = table_for(&spec);

        assert_eq!(fat.next_cluster(&mut disk, 2), Ok(ClusterLink::Free));
        assert_eq!(fat.window_start(), Some(0));
        assert_eq!(fat.next_cluster(&mut disk, 2000), Ok(ClusterLink::Next(2001)));
        assert_eq!(fat.window_start(), Some(7));
    }

    #[test]
    fn test_cluster_out_of_range() {
        let (mut fat, mut disk) = table_for(&ImageSpec::fat12());
        assert_eq!(fat.next_cluster(&mut disk, 100_000), Err(FsStatus::InvalidFileSystem));
    }

    #[test]
    fn test_read_failure_maps_to_io_error() {
        let spec = ImageSpec::fat16();
        let image = spec.build();
        let geo = BootSector::parse(&image[..512]).unwrap().geometry().unwrap();
        let mut fat = FatTable::new(&geo);
        let mut disk = RamDisk::from_image("img", image).with_capabilities(BlockCaps::WRITE);
        assert_eq!(disk.read_sectors(0, 1, &mut [0u8; 512]), Err(BlockStatus::IoError));
        assert_eq!(fat.next_cluster(&mut disk, 2), Err(FsStatus::IoError));
        assert_eq!(fat.window_start(), None);
    }
}
