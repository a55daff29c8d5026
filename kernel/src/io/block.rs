//! Block Device Abstraction Layer
//!
//! Provides the sector-addressed device contract the file system layer is
//! built on, plus the device table that hands out device handles.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 VFS / FAT driver                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  DeviceId
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DeviceTable                             │
//! │        slot 0 .. MAX_BLOCK_DEVICES  ->  dyn BlockDevice     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │    ATA/IDE      │ │    RAM disk     │ │     Floppy      │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! Transfers are whole sectors only. A buffer handed to `read_sectors` or
//! `write_sectors` must be exactly `count * sector_size()` bytes long.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Maximum number of block devices
pub const MAX_BLOCK_DEVICES: usize = 16;

/// Default sector size
pub const SECTOR_SIZE: usize = 512;

/// Block device status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockStatus {
    /// Device not found
    NotFound = 1,
    /// I/O error
    IoError = 2,
    /// Invalid parameter (buffer length, zero count)
    InvalidParameter = 3,
    /// Media not present
    NoMedia = 5,
    /// Write protected
    WriteProtected = 6,
    /// Transfer runs past the end of the device
    OutOfRange = 9,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BlockStatus::NotFound => "device not found",
            BlockStatus::IoError => "device I/O error",
            BlockStatus::InvalidParameter => "invalid transfer parameters",
            BlockStatus::NoMedia => "no media",
            BlockStatus::WriteProtected => "device is write protected",
            BlockStatus::OutOfRange => "sector out of range",
        };
        f.write_str(msg)
    }
}

/// Block device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BlockDeviceType {
    /// Unknown device
    #[default]
    Unknown = 0,
    /// Hard disk drive
    HardDisk = 1,
    /// Floppy disk
    Floppy = 4,
    /// RAM disk
    RamDisk = 6,
}

bitflags::bitflags! {
    /// Transfer directions a device supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockCaps: u32 {
        /// Device can be read
        const READ = 0x0001;
        /// Device can be written
        const WRITE = 0x0002;
    }
}

/// Sector-granular storage device.
///
/// Implementations block until the transfer completes.
pub trait BlockDevice: Send {
    /// Short device name ("hda", "ram0")
    fn name(&self) -> &str;

    /// Device type
    fn device_type(&self) -> BlockDeviceType {
        BlockDeviceType::Unknown
    }

    /// Supported transfer directions
    fn capabilities(&self) -> BlockCaps;

    /// Bytes per sector
    fn sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// Number of addressable sectors
    fn sector_count(&self) -> u64;

    /// Read `count` sectors starting at `lba` into `buf`
    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<(), BlockStatus>;

    /// Write `count` sectors starting at `lba` from `buf`
    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<(), BlockStatus>;

    /// Check if the device can be read
    fn is_readable(&self) -> bool {
        self.capabilities().contains(BlockCaps::READ)
    }

    /// Check if the device can be written
    fn is_writable(&self) -> bool {
        self.capabilities().contains(BlockCaps::WRITE)
    }
}

/// Validate a transfer request against a device's geometry.
///
/// Returns the byte length the buffer must have.
pub fn check_transfer(
    sector_size: usize,
    sector_count: u64,
    lba: u64,
    count: u32,
    buf_len: usize,
) -> Result<usize, BlockStatus> {
    if count == 0 {
        return Err(BlockStatus::InvalidParameter);
    }

    let end = lba.checked_add(count as u64).ok_or(BlockStatus::OutOfRange)?;
    if end > sector_count {
        return Err(BlockStatus::OutOfRange);
    }

    let bytes = count as usize * sector_size;
    if buf_len != bytes {
        return Err(BlockStatus::InvalidParameter);
    }

    Ok(bytes)
}

// ============================================================================
// Device Table
// ============================================================================

/// Handle of a registered block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u8);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Fixed-capacity table of registered block devices
pub struct DeviceTable {
    slots: Vec<Option<Box<dyn BlockDevice>>>,
}

impl DeviceTable {
    /// Create an empty table
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_BLOCK_DEVICES);
        slots.resize_with(MAX_BLOCK_DEVICES, || None);
        Self { slots }
    }

    /// Register a block device, returning its handle
    pub fn add_device(&mut self, device: Box<dyn BlockDevice>) -> Option<DeviceId> {
        let index = self.slots.iter().position(|s| s.is_none())?;

        log::info!(
            "[BLOCK] Registered {} as {} ({} sectors)",
            device.name(),
            DeviceId(index as u8),
            device.sector_count()
        );

        self.slots[index] = Some(device);
        Some(DeviceId(index as u8))
    }

    /// Unregister a block device, handing it back to the caller
    pub fn remove(&mut self, id: DeviceId) -> Option<Box<dyn BlockDevice>> {
        let device = self.slots.get_mut(id.0 as usize)?.take()?;
        log::info!("[BLOCK] Unregistered {}", id);
        Some(device)
    }

    /// Get block device by handle
    pub fn get(&self, id: DeviceId) -> Option<&dyn BlockDevice> {
        self.slots.get(id.0 as usize)?.as_deref()
    }

    /// Get mutable block device by handle
    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut (dyn BlockDevice + 'static)> {
        self.slots.get_mut(id.0 as usize)?.as_deref_mut()
    }

    /// Number of registered devices
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Iterate over registered devices
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &dyn BlockDevice)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|d| (DeviceId(i as u8), d)))
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}
