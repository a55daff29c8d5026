//! FAT BIOS Parameter Block (BPB)
//!
//! The BPB is located in the boot sector (sector 0) and contains
//! essential file system parameters.
//!
//! # Boot Sector Layout (512 bytes, little-endian)
//! - Bytes 0-2: Jump instruction
//! - Bytes 3-10: OEM name
//! - Bytes 11-35: BPB (common to FAT12/16/32)
//! - Bytes 36-61: FAT12/16 extended boot record, or
//! - Bytes 36-89: FAT32 extended BPB followed by its extended boot record
//! - Bytes 510-511: Signature (0x55, 0xAA)
//!
//! Fields are decoded at fixed offsets from a byte buffer; nothing here
//! reinterprets memory in place.

use alloc::string::String;

use super::{put_u16, put_u32, read_u16, read_u32};
use crate::fs::vfs::FsStatus;

/// Size of the boot sector record
pub const BOOT_SECTOR_SIZE: usize = 512;

/// Boot signature at offset 510
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Volumes with fewer clusters than this are FAT12
pub const FAT12_MAX_CLUSTERS: u32 = 4085;

/// Volumes with fewer clusters than this (and not FAT12) are FAT16
pub const FAT16_MAX_CLUSTERS: u32 = 65525;

/// Directory entry size used for the legacy root region
const ROOT_ENTRY_SIZE: u32 = 32;

/// FAT type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// Classify a volume by its data cluster count
    pub fn from_cluster_count(count: u32) -> Self {
        if count < FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if count < FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// Minimum "reserved" entry value; anything at or above it ends a chain
    pub fn end_of_chain_sentinel(self) -> u32 {
        match self {
            FatType::Fat12 => 0xFF8,
            FatType::Fat16 => 0xFFF8,
            FatType::Fat32 => 0xFFFF_FFF8,
        }
    }

    /// Byte offset of a cluster's entry from the start of the FAT
    pub fn entry_offset(self, cluster: u32) -> u32 {
        match self {
            FatType::Fat12 => cluster + cluster / 2,
            FatType::Fat16 => cluster * 2,
            FatType::Fat32 => cluster * 4,
        }
    }

    /// Number of bytes an entry touches (FAT12 entries straddle two bytes)
    pub fn entry_width(self) -> u32 {
        match self {
            FatType::Fat12 | FatType::Fat16 => 2,
            FatType::Fat32 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        }
    }
}

/// BIOS Parameter Block (common to FAT12/16/32)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BiosParameterBlock {
    /// Bytes per sector (usually 512)
    pub bytes_per_sector: u16,
    /// Sectors per cluster (power of 2: 1, 2, 4, 8, 16, 32, 64, 128)
    pub sectors_per_cluster: u8,
    /// Reserved sectors (including boot sector)
    pub reserved_sectors: u16,
    /// Number of FATs (usually 2)
    pub num_fats: u8,
    /// Root directory entries (0 for FAT32)
    pub root_entry_count: u16,
    /// Total sectors (16-bit, 0 when the 32-bit field is used)
    pub total_sectors_16: u16,
    /// Media type (0xF8 for fixed disk)
    pub media_type: u8,
    /// Sectors per FAT (16-bit, 0 for FAT32)
    pub sectors_per_fat_16: u16,
    /// Sectors per track
    pub sectors_per_track: u16,
    /// Number of heads
    pub num_heads: u16,
    /// Hidden sectors
    pub hidden_sectors: u32,
    /// Total sectors (32-bit)
    pub total_sectors_32: u32,
}

impl BiosParameterBlock {
    fn parse(buf: &[u8]) -> Self {
        Self {
            bytes_per_sector: read_u16(buf, 11),
            sectors_per_cluster: buf[13],
            reserved_sectors: read_u16(buf, 14),
            num_fats: buf[16],
            root_entry_count: read_u16(buf, 17),
            total_sectors_16: read_u16(buf, 19),
            media_type: buf[21],
            sectors_per_fat_16: read_u16(buf, 22),
            sectors_per_track: read_u16(buf, 24),
            num_heads: read_u16(buf, 26),
            hidden_sectors: read_u32(buf, 28),
            total_sectors_32: read_u32(buf, 32),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        put_u16(buf, 11, self.bytes_per_sector);
        buf[13] = self.sectors_per_cluster;
        put_u16(buf, 14, self.reserved_sectors);
        buf[16] = self.num_fats;
        put_u16(buf, 17, self.root_entry_count);
        put_u16(buf, 19, self.total_sectors_16);
        buf[21] = self.media_type;
        put_u16(buf, 22, self.sectors_per_fat_16);
        put_u16(buf, 24, self.sectors_per_track);
        put_u16(buf, 26, self.num_heads);
        put_u32(buf, 28, self.hidden_sectors);
        put_u32(buf, 32, self.total_sectors_32);
    }

    /// Get total sectors
    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    /// Get cluster size in bytes
    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }
}

/// Extended boot record (shared tail of the FAT12/16 and FAT32 layouts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedBootRecord {
    pub drive_number: u8,
    pub reserved: u8,
    /// Extended boot signature (0x28 or 0x29)
    pub signature: u8,
    /// Volume serial number
    pub volume_id: u32,
    /// Volume label (11 bytes, space-padded)
    pub volume_label: [u8; 11],
    /// File system type string ("FAT16   ")
    pub system_id: [u8; 8],
}

impl ExtendedBootRecord {
    /// Record length in bytes
    pub const SIZE: usize = 26;

    fn parse(buf: &[u8], at: usize) -> Self {
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&buf[at + 7..at + 18]);
        let mut system_id = [0u8; 8];
        system_id.copy_from_slice(&buf[at + 18..at + 26]);
        Self {
            drive_number: buf[at],
            reserved: buf[at + 1],
            signature: buf[at + 2],
            volume_id: read_u32(buf, at + 3),
            volume_label,
            system_id,
        }
    }

    fn encode(&self, buf: &mut [u8], at: usize) {
        buf[at] = self.drive_number;
        buf[at + 1] = self.reserved;
        buf[at + 2] = self.signature;
        put_u32(buf, at + 3, self.volume_id);
        buf[at + 7..at + 18].copy_from_slice(&self.volume_label);
        buf[at + 18..at + 26].copy_from_slice(&self.system_id);
    }

    /// Check for a valid extended boot signature
    pub fn has_signature(&self) -> bool {
        matches!(self.signature, 0x28 | 0x29)
    }

    /// Get volume label as string
    pub fn volume_label_str(&self) -> String {
        let len = self
            .volume_label
            .iter()
            .rposition(|&b| b != b' ' && b != 0)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.volume_label[..len].iter().map(|&b| b as char).collect()
    }
}

/// FAT32 Extended BIOS Parameter Block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fat32ExtendedBpb {
    /// Sectors per FAT (32-bit)
    pub sectors_per_fat_32: u32,
    /// Extended flags
    pub ext_flags: u16,
    /// File system version
    pub fs_version: u16,
    /// Root directory cluster
    pub root_cluster: u32,
    /// FSInfo sector number
    pub fs_info_sector: u16,
    /// Backup boot sector
    pub backup_boot_sector: u16,
    /// Extended boot record at offset 64
    pub ebr: ExtendedBootRecord,
}

impl Fat32ExtendedBpb {
    fn parse(buf: &[u8]) -> Self {
        Self {
            sectors_per_fat_32: read_u32(buf, 36),
            ext_flags: read_u16(buf, 40),
            fs_version: read_u16(buf, 42),
            root_cluster: read_u32(buf, 44),
            fs_info_sector: read_u16(buf, 48),
            backup_boot_sector: read_u16(buf, 50),
            ebr: ExtendedBootRecord::parse(buf, 64),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 36, self.sectors_per_fat_32);
        put_u16(buf, 40, self.ext_flags);
        put_u16(buf, 42, self.fs_version);
        put_u32(buf, 44, self.root_cluster);
        put_u16(buf, 48, self.fs_info_sector);
        put_u16(buf, 50, self.backup_boot_sector);
        buf[52..64].fill(0);
        self.ebr.encode(buf, 64);
    }
}

/// Decoded boot sector.
///
/// Bytes 36.. are decoded both as a FAT12/16 extended record and as a FAT32
/// extended BPB; which one is meaningful depends on the FAT type the
/// geometry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootSector {
    /// Jump instruction (EB xx 90 or E9 xx xx)
    pub jump: [u8; 3],
    /// OEM name (8 bytes)
    pub oem_name: [u8; 8],
    /// BIOS Parameter Block
    pub bpb: BiosParameterBlock,
    /// FAT12/16 extended boot record at offset 36
    pub ebr16: ExtendedBootRecord,
    /// FAT32 extended BPB at offset 36
    pub ext32: Fat32ExtendedBpb,
    /// Boot signature (0x55, 0xAA)
    pub signature: [u8; 2],
}

impl BootSector {
    /// Decode a boot sector from the first 512 bytes of `buf`
    pub fn parse(buf: &[u8]) -> Result<Self, FsStatus> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(FsStatus::InvalidParameter);
        }

        let mut jump = [0u8; 3];
        jump.copy_from_slice(&buf[0..3]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&buf[3..11]);

        Ok(Self {
            jump,
            oem_name,
            bpb: BiosParameterBlock::parse(buf),
            ebr16: ExtendedBootRecord::parse(buf, 36),
            ext32: Fat32ExtendedBpb::parse(buf),
            signature: [buf[510], buf[511]],
        })
    }

    /// Encode into a 512-byte buffer.
    ///
    /// The FAT32 extended BPB is written when `sectors_per_fat_16` is zero,
    /// otherwise the FAT12/16 extended record.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), FsStatus> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(FsStatus::InvalidParameter);
        }
        buf[0..3].copy_from_slice(&self.jump);
        buf[3..11].copy_from_slice(&self.oem_name);
        self.bpb.encode(buf);
        if self.bpb.sectors_per_fat_16 == 0 {
            self.ext32.encode(buf);
        } else {
            self.ebr16.encode(buf, 36);
        }
        buf[510..512].copy_from_slice(&self.signature);
        Ok(())
    }

    /// Check the 0x55AA trailer
    pub fn has_boot_signature(&self) -> bool {
        self.signature == BOOT_SIGNATURE
    }

    /// Get sectors per FAT: legacy field if non-zero, else the FAT32 field
    pub fn sectors_per_fat(&self) -> u32 {
        if self.bpb.sectors_per_fat_16 != 0 {
            self.bpb.sectors_per_fat_16 as u32
        } else {
            self.ext32.sectors_per_fat_32
        }
    }

    /// Sectors occupied by the legacy (FAT12/16) root directory region
    pub fn root_dir_sectors(&self) -> u32 {
        let bps = self.bpb.bytes_per_sector as u32;
        if bps == 0 {
            return 0;
        }
        (self.bpb.root_entry_count as u32 * ROOT_ENTRY_SIZE).div_ceil(bps)
    }

    /// Validate the BPB and derive the volume geometry
    pub fn geometry(&self) -> Result<Geometry, FsStatus> {
        let bpb = &self.bpb;

        if !matches!(bpb.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            log::warn!("[FAT] Bad bytes per sector {}", bpb.bytes_per_sector);
            return Err(FsStatus::InvalidFileSystem);
        }
        if bpb.sectors_per_cluster == 0 || !bpb.sectors_per_cluster.is_power_of_two() {
            log::warn!("[FAT] Bad sectors per cluster {}", bpb.sectors_per_cluster);
            return Err(FsStatus::InvalidFileSystem);
        }
        if bpb.reserved_sectors == 0 || bpb.num_fats == 0 {
            log::warn!("[FAT] No reserved sectors or no FAT copies");
            return Err(FsStatus::InvalidFileSystem);
        }

        let fat_size = self.sectors_per_fat();
        if fat_size == 0 {
            log::warn!("[FAT] Sectors per FAT is zero");
            return Err(FsStatus::InvalidFileSystem);
        }

        let fat_start = bpb.reserved_sectors as u32;
        let fat_area = (bpb.num_fats as u32)
            .checked_mul(fat_size)
            .ok_or(FsStatus::InvalidFileSystem)?;
        let root_dir_sector = fat_start
            .checked_add(fat_area)
            .ok_or(FsStatus::InvalidFileSystem)?;
        let root_dir_sectors = self.root_dir_sectors();
        let first_data_sector = root_dir_sector + root_dir_sectors;

        let total_sectors = bpb.total_sectors();
        if total_sectors <= first_data_sector {
            log::warn!(
                "[FAT] Total sectors {} do not reach past metadata ({})",
                total_sectors,
                first_data_sector
            );
            return Err(FsStatus::InvalidFileSystem);
        }

        let cluster_count = (total_sectors - first_data_sector) / bpb.sectors_per_cluster as u32;
        let fat_type = FatType::from_cluster_count(cluster_count);

        let root_cluster = if fat_type == FatType::Fat32 {
            if self.ext32.root_cluster < 2 {
                log::warn!("[FAT] FAT32 root cluster {} is invalid", self.ext32.root_cluster);
                return Err(FsStatus::InvalidFileSystem);
            }
            self.ext32.root_cluster
        } else {
            0
        };

        // The FAT must be large enough to hold an entry for every cluster
        let entries = cluster_count as u64 + 2;
        let fat_bytes_needed = match fat_type {
            FatType::Fat12 => entries + entries / 2,
            FatType::Fat16 => entries * 2,
            FatType::Fat32 => entries * 4,
        };
        if (fat_size as u64) * (bpb.bytes_per_sector as u64) < fat_bytes_needed {
            log::warn!("[FAT] FAT too small for {} clusters", cluster_count);
            return Err(FsStatus::InvalidFileSystem);
        }

        Ok(Geometry {
            fat_type,
            bytes_per_sector: bpb.bytes_per_sector as u32,
            sectors_per_cluster: bpb.sectors_per_cluster as u32,
            bytes_per_cluster: bpb.cluster_size(),
            fat_start,
            fat_size,
            fat_count: bpb.num_fats as u32,
            root_dir_sector,
            root_dir_sectors,
            first_data_sector,
            total_sectors,
            cluster_count,
            root_cluster,
        })
    }

    /// Extended boot record that applies to the given FAT type
    pub fn extended_record(&self, fat_type: FatType) -> &ExtendedBootRecord {
        match fat_type {
            FatType::Fat32 => &self.ext32.ebr,
            FatType::Fat12 | FatType::Fat16 => &self.ebr16,
        }
    }
}

/// Volume layout derived from a validated boot sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub fat_type: FatType,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,
    /// First sector of the first FAT copy
    pub fat_start: u32,
    /// Sectors per FAT copy
    pub fat_size: u32,
    pub fat_count: u32,
    /// First sector of the FAT12/16 root region
    pub root_dir_sector: u32,
    /// Length of the FAT12/16 root region (0 on FAT32)
    pub root_dir_sectors: u32,
    pub first_data_sector: u32,
    pub total_sectors: u32,
    /// Number of data clusters (clusters 2 ..= cluster_count + 1)
    pub cluster_count: u32,
    /// FAT32 root directory cluster (0 on FAT12/16)
    pub root_cluster: u32,
}

impl Geometry {
    /// Get the first sector of a data cluster
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.first_data_sector + (cluster - 2) * self.sectors_per_cluster
    }

    /// Check that a cluster number addresses the data area
    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster - 2 < self.cluster_count
    }
}
