//! RAM Disk Driver
//!
//! Provides an in-memory block device for testing and temporary storage.
//! The backing store is a heap buffer whose length is always a whole number
//! of sectors. No persistence: data is lost when the disk is dropped.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::block::{check_transfer, BlockCaps, BlockDevice, BlockDeviceType, BlockStatus, SECTOR_SIZE};

/// Memory-backed block device
pub struct RamDisk {
    name: String,
    data: Vec<u8>,
    caps: BlockCaps,
}

impl RamDisk {
    /// Create a zero-filled RAM disk of `sectors` sectors
    pub fn new(name: &str, sectors: usize) -> Self {
        Self {
            name: String::from(name),
            data: vec![0u8; sectors * SECTOR_SIZE],
            caps: BlockCaps::READ | BlockCaps::WRITE,
        }
    }

    /// Wrap an existing disk image, padding it to a sector boundary
    pub fn from_image(name: &str, mut image: Vec<u8>) -> Self {
        let rem = image.len() % SECTOR_SIZE;
        if rem != 0 {
            image.resize(image.len() + SECTOR_SIZE - rem, 0);
        }
        Self {
            name: String::from(name),
            data: image,
            caps: BlockCaps::READ | BlockCaps::WRITE,
        }
    }

    /// Restrict the transfer directions the disk reports
    pub fn with_capabilities(mut self, caps: BlockCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Drop write support
    pub fn read_only(self) -> Self {
        self.with_capabilities(BlockCaps::READ)
    }

    /// Raw image contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the disk and return its image
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for RamDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> BlockDeviceType {
        BlockDeviceType::RamDisk
    }

    fn capabilities(&self) -> BlockCaps {
        self.caps
    }

    fn sector_count(&self) -> u64 {
        (self.data.len() / SECTOR_SIZE) as u64
    }

    fn read_sectors(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<(), BlockStatus> {
        if !self.caps.contains(BlockCaps::READ) {
            return Err(BlockStatus::IoError);
        }
        let bytes = check_transfer(SECTOR_SIZE, self.sector_count(), lba, count, buf.len())?;
        let offset = lba as usize * SECTOR_SIZE;
        buf.copy_from_slice(&self.data[offset..offset + bytes]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<(), BlockStatus> {
        if !self.caps.contains(BlockCaps::WRITE) {
            return Err(BlockStatus::WriteProtected);
        }
        let bytes = check_transfer(SECTOR_SIZE, self.sector_count(), lba, count, buf.len())?;
        let offset = lba as usize * SECTOR_SIZE;
        self.data[offset..offset + bytes].copy_from_slice(buf);
        Ok(())
    }
}
