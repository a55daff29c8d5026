//! File System Subsystem
//!
//! Provides file system support for the kernel:
//! - Virtual File System (VFS) dispatcher over mounted volumes
//! - FAT12/16/32 file system driver
//! - Mount point management
//! - File descriptor table
//! - Path utilities
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             fs::open / read / write / readdir ...           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Virtual File System (Vfs)                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐            │
//! │  │    Node     │ │  FileHandle │ │  Mount Pts  │            │
//! │  └─────────────┘ └─────────────┘ └─────────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 FAT12 / FAT16 / FAT32 driver                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Block I/O Layer                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Paths
//! Every path is absolute and starts with a mount location:
//! `/dev0/dir/file.txt` names `/dir/file.txt` on the volume mounted at
//! `dev0`.
//!
//! The free functions below operate on one process-wide [`Vfs`] created by
//! [`init`]. Code that wants its own instance (tests, tools) can build a
//! `Vfs` directly.

pub mod fat;
pub mod handle;
pub mod mount;
pub mod path;
pub mod vfs;

use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

// Re-export common types
pub use handle::{Fd, FD_DEBUG, FD_STDERR, FD_STDIN, FD_STDOUT, MAX_OPEN_FILES, RESERVED_HANDLES};
pub use mount::{MountFlags, MountInfo, MAX_MOUNT_POINTS};
pub use path::{ParsedPath, MAX_COMPONENT, MAX_PATH};
pub use vfs::{DirEntry, FileInfo, FileSystem, FileType, FsDriver, FsInfo, FsStatus, FsType, Vfs};

use crate::io::{BlockDevice, CharDevice, DeviceId};

/// Process-wide VFS instance
static VFS: Mutex<Option<Vfs>> = Mutex::new(None);

/// Initialize the file system layer.
///
/// Descriptors 1 and 2 write to `console`, descriptor 3 to `debug`.
/// Calling it again replaces the previous instance, dropping its mounts.
pub fn init(console: Box<dyn CharDevice>, debug: Box<dyn CharDevice>) {
    let vfs = Vfs::new(console, debug);
    let drivers = vfs.drivers().len();

    if VFS.lock().replace(vfs).is_some() {
        log::warn!("[VFS] Re-initialized; previous mounts dropped");
    }
    log::info!("[VFS] File system layer initialized ({} drivers)", drivers);
}

/// Tear down the process-wide instance, returning it
pub fn shutdown() -> Option<Vfs> {
    let vfs = VFS.lock().take();
    if vfs.is_some() {
        log::info!("[VFS] File system layer shut down");
    }
    vfs
}

/// Check whether [`init`] has run
pub fn is_initialized() -> bool {
    VFS.lock().is_some()
}

/// Run `f` against the process-wide instance
pub fn with_vfs<R>(f: impl FnOnce(&mut Vfs) -> Result<R, FsStatus>) -> Result<R, FsStatus> {
    let mut guard = VFS.lock();
    let vfs = guard.as_mut().ok_or(FsStatus::NotInitialized)?;
    f(vfs)
}

// ============================================================================
// Devices and mounts
// ============================================================================

/// Register a block device
pub fn add_device(device: Box<dyn BlockDevice>) -> Result<DeviceId, FsStatus> {
    with_vfs(|vfs| vfs.add_device(device))
}

/// Mount a registered device at `location`
pub fn mount_device(device: DeviceId, location: &str) -> Result<u32, FsStatus> {
    with_vfs(|vfs| vfs.mount_device(device, location))
}

/// Unmount `location`
pub fn umount_device(location: &str) -> Result<(), FsStatus> {
    with_vfs(|vfs| vfs.umount_device(location))
}

pub fn list_mounts() -> Result<Vec<MountInfo>, FsStatus> {
    with_vfs(|vfs| Ok(vfs.list_mounts()))
}

pub fn statfs(location: &str) -> Result<FsInfo, FsStatus> {
    with_vfs(|vfs| vfs.statfs(location))
}

// ============================================================================
// High-Level File Operations
// ============================================================================

/// Open a file or directory by path
pub fn open(path: &str) -> Result<Fd, FsStatus> {
    with_vfs(|vfs| vfs.open(path))
}

/// Close a file descriptor
pub fn close(fd: Fd) -> Result<(), FsStatus> {
    with_vfs(|vfs| vfs.close(fd))
}

/// Read from a file
pub fn read(fd: Fd, buf: &mut [u8]) -> Result<usize, FsStatus> {
    with_vfs(|vfs| vfs.read(fd, buf))
}

/// Write to a file or standard stream
pub fn write(fd: Fd, buf: &[u8]) -> Result<usize, FsStatus> {
    with_vfs(|vfs| vfs.write(fd, buf))
}

/// Seek to an absolute offset
pub fn seek(fd: Fd, offset: u64) -> Result<(), FsStatus> {
    with_vfs(|vfs| vfs.seek(fd, offset))
}

/// List an open directory
pub fn readdir(fd: Fd) -> Result<Vec<DirEntry>, FsStatus> {
    with_vfs(|vfs| vfs.readdir(fd))
}

pub fn get_size(fd: Fd) -> Result<u64, FsStatus> {
    with_vfs(|vfs| vfs.get_size(fd))
}

pub fn get_offset(fd: Fd) -> Result<u64, FsStatus> {
    with_vfs(|vfs| vfs.get_offset(fd))
}

/// Get file information by path
pub fn stat(path: &str) -> Result<FileInfo, FsStatus> {
    with_vfs(|vfs| vfs.stat(path))
}

/// Check if a path exists; false when uninitialized
pub fn exists(path: &str) -> bool {
    with_vfs(|vfs| Ok(vfs.exists(path))).unwrap_or(false)
}
