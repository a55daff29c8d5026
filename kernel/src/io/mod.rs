//! I/O layer (io)
//!
//! Device-facing half of the storage stack:
//!
//! - **block**: sector-addressed device contract and the device table
//! - **ramdisk**: memory-backed block device
//! - **console**: character sinks wired to the reserved descriptors

pub mod block;
pub mod console;
pub mod ramdisk;

pub use block::{
    BlockCaps, BlockDevice, BlockDeviceType, BlockStatus, DeviceId, DeviceTable,
    MAX_BLOCK_DEVICES, SECTOR_SIZE,
};
pub use console::{CaptureDevice, CharDevice, NullDevice};
pub use ramdisk::RamDisk;
