//! Virtual File System (VFS) Abstraction
//!
//! Provides a unified interface for different file system implementations.
//! File system drivers register a probe function; mounting a device tries
//! each driver in registration order and binds the first one that
//! recognizes the volume.
//!
//! # Key Concepts
//! - **FileSystem**: A mounted file system instance (FAT12/16/32 today)
//! - **Node**: A resolved path, carrying its mount id and pseudo-inode
//! - **FileHandle**: Open file descriptor with a byte cursor
//! - **DirEntry**: Directory entry for enumeration
//!
//! # Path resolution
//! `/dev0/dir/file.txt` is split into the mount location `dev0` and the
//! remaining components. The mount's file system is asked for `/dir`, then
//! `/dir/file.txt`; each step yields a node one level deeper than its
//! parent. Resolution stops at the first component that is not a directory.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use super::handle::{Fd, HandleTable, StdStream};
use super::mount::{normalize_location, MountFlags, MountInfo, MountTable};
use super::path::{self, ParsedPath};
use crate::io::{BlockDevice, BlockDeviceType, BlockStatus, CharDevice, DeviceId, DeviceTable, NullDevice};

/// Maximum number of registered file system drivers
pub const MAX_FILE_SYSTEMS: usize = 8;

/// File system status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FsStatus {
    /// File not found
    NotFound = -1,
    /// Access denied
    AccessDenied = -2,
    /// File already exists
    AlreadyExists = -3,
    /// Not a directory
    NotDirectory = -4,
    /// Is a directory
    IsDirectory = -5,
    /// Invalid parameter
    InvalidParameter = -8,
    /// Read-only file system
    ReadOnly = -12,
    /// I/O error
    IoError = -13,
    /// Invalid file system
    InvalidFileSystem = -14,
    /// Not mounted
    NotMounted = -15,
    /// Too many open files
    TooManyFiles = -16,
    /// Not supported
    NotSupported = -19,
    /// Invalid path
    InvalidPath = -20,
    /// Invalid handle
    InvalidHandle = -22,
    /// Mount table full
    TooManyMounts = -23,
    /// File system layer not initialized
    NotInitialized = -24,
}

impl FsStatus {
    /// Integer form for a syscall boundary
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for FsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsStatus::NotFound => "not found",
            FsStatus::AccessDenied => "access denied",
            FsStatus::AlreadyExists => "already exists",
            FsStatus::NotDirectory => "not a directory",
            FsStatus::IsDirectory => "is a directory",
            FsStatus::InvalidParameter => "invalid parameter",
            FsStatus::ReadOnly => "read-only file system",
            FsStatus::IoError => "I/O error",
            FsStatus::InvalidFileSystem => "invalid file system",
            FsStatus::NotMounted => "not mounted",
            FsStatus::TooManyFiles => "too many open files",
            FsStatus::NotSupported => "not supported",
            FsStatus::InvalidPath => "invalid path",
            FsStatus::InvalidHandle => "invalid handle",
            FsStatus::TooManyMounts => "mount table full",
            FsStatus::NotInitialized => "file system layer not initialized",
        };
        f.write_str(msg)
    }
}

impl From<BlockStatus> for FsStatus {
    fn from(_: BlockStatus) -> Self {
        FsStatus::IoError
    }
}

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FileType {
    /// Regular file
    #[default]
    Regular = 0,
    /// Directory
    Directory = 1,
}

/// File attributes
pub mod file_attrs {
    pub const ATTR_READONLY: u32 = 0x0001;
    pub const ATTR_HIDDEN: u32 = 0x0002;
    pub const ATTR_SYSTEM: u32 = 0x0004;
    pub const ATTR_DIRECTORY: u32 = 0x0010;
    pub const ATTR_ARCHIVE: u32 = 0x0020;
}

/// File information
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// Entry name
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// File type
    pub file_type: FileType,
    /// File attributes
    pub attributes: u32,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory || (self.attributes & file_attrs::ATTR_DIRECTORY) != 0
    }

    pub fn is_regular(&self) -> bool {
        !self.is_directory()
    }

    pub fn is_readonly(&self) -> bool {
        (self.attributes & file_attrs::ATTR_READONLY) != 0
    }
}

/// Directory entry
pub type DirEntry = FileInfo;

/// File system type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FsType {
    #[default]
    Unknown = 0,
    Fat12 = 1,
    Fat16 = 2,
    Fat32 = 3,
}

/// File system info
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FsInfo {
    /// File system type
    pub fs_type: FsType,
    /// Allocation unit in bytes
    pub block_size: u32,
    /// Total allocation units
    pub total_blocks: u64,
    /// Volume label
    pub label: String,
    /// Volume serial number
    pub serial: u32,
}

impl FsInfo {
    pub fn total_bytes(&self) -> u64 {
        self.total_blocks * self.block_size as u64
    }
}

/// Operations a mounted file system provides.
///
/// Paths are absolute within the volume ("/" is its root directory). The
/// device is lent for the duration of each call; the instance keeps its
/// own per-volume state between calls.
pub trait FileSystem: Send {
    /// Driver name ("fat")
    fn name(&self) -> &'static str;

    fn fs_type(&self) -> FsType;

    /// Finish mounting (reads whatever the volume needs up front)
    fn mount(&mut self, dev: &mut dyn BlockDevice) -> Result<(), FsStatus>;

    /// Volume statistics
    fn statfs(&self) -> FsInfo;

    /// Look up a single entry
    fn find_entry(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<FileInfo, FsStatus>;

    /// Read file bytes starting at `offset`
    fn read(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FsStatus>;

    /// Overwrite file bytes starting at `offset`
    fn write(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, buf: &[u8]) -> Result<usize, FsStatus>;

    /// List a directory
    fn read_dir(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<Vec<DirEntry>, FsStatus>;
}

/// Probe entry point: recognize a volume and build a file system for it
pub type ProbeFn = fn(&mut dyn BlockDevice) -> Result<Box<dyn FileSystem>, FsStatus>;

/// Registered file system driver
#[derive(Clone, Copy)]
pub struct FsDriver {
    pub name: &'static str,
    pub probe: ProbeFn,
}

impl fmt::Debug for FsDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsDriver").field("name", &self.name).finish()
    }
}

bitflags::bitflags! {
    /// Node permission bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u32 {
        const DIRECTORY = 0x0001;
        const FILE = 0x0002;
        const READABLE = 0x0004;
        const WRITABLE = 0x0008;
    }
}

/// Resolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Last path component (the mount location for a root node)
    pub name: String,
    /// Path inside the mount ("/" for the root)
    pub path: String,
    pub flags: NodeFlags,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// File attributes
    pub attributes: u32,
    /// Pseudo-inode: depth below the mount root
    pub inode: u32,
    /// Owning mount
    pub mount_id: u32,
}

impl Node {
    /// Root node of a mount
    pub fn root(location: &str, mount_id: u32, flags: NodeFlags) -> Self {
        Self {
            name: location.to_string(),
            path: path::PATH_SEPARATOR.to_string(),
            flags,
            size: 0,
            attributes: file_attrs::ATTR_DIRECTORY,
            inode: 0,
            mount_id,
        }
    }

    /// Node for an entry found below `self`
    pub fn child(&self, info: &FileInfo, path: String, mount_writable: bool) -> Self {
        let mut flags = NodeFlags::READABLE;
        if info.is_directory() {
            flags |= NodeFlags::DIRECTORY;
        } else {
            flags |= NodeFlags::FILE;
            if mount_writable && !info.is_readonly() {
                flags |= NodeFlags::WRITABLE;
            }
        }

        Self {
            name: info.name.clone(),
            path,
            flags,
            size: info.size,
            attributes: info.attributes,
            inode: self.inode + 1,
            mount_id: self.mount_id,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(NodeFlags::DIRECTORY)
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            file_type: if self.is_directory() {
                FileType::Directory
            } else {
                FileType::Regular
            },
            attributes: self.attributes,
        }
    }
}

/// Run `f` against a mount's file system and backing device
fn with_mount<R>(
    mounts: &mut MountTable,
    devices: &mut DeviceTable,
    mount_id: u32,
    f: impl FnOnce(&mut dyn FileSystem, &mut dyn BlockDevice) -> Result<R, FsStatus>,
) -> Result<R, FsStatus> {
    let mount = mounts.by_id_mut(mount_id).ok_or(FsStatus::NotMounted)?;
    let dev = devices.get_mut(mount.device).ok_or(FsStatus::NotFound)?;
    f(mount.fs.as_mut(), dev)
}

/// The file system layer: devices, drivers, mounts and descriptors
pub struct Vfs {
    devices: DeviceTable,
    drivers: Vec<FsDriver>,
    mounts: MountTable,
    handles: HandleTable,
    console: Box<dyn CharDevice>,
    debug: Box<dyn CharDevice>,
}

impl Vfs {
    /// Create a VFS writing descriptors 1/2 to `console` and 3 to `debug`.
    ///
    /// The FAT driver is registered by default.
    pub fn new(console: Box<dyn CharDevice>, debug: Box<dyn CharDevice>) -> Self {
        let mut vfs = Self {
            devices: DeviceTable::new(),
            drivers: Vec::with_capacity(MAX_FILE_SYSTEMS),
            mounts: MountTable::new(),
            handles: HandleTable::new(),
            console,
            debug,
        };
        vfs.drivers.push(super::fat::driver());
        vfs
    }

    /// VFS whose standard streams discard output
    pub fn headless() -> Self {
        Self::new(Box::new(NullDevice), Box::new(NullDevice))
    }

    // ------------------------------------------------------------------
    // Drivers and devices
    // ------------------------------------------------------------------

    /// Register an additional file system driver
    pub fn register_driver(&mut self, driver: FsDriver) -> Result<(), FsStatus> {
        if self.drivers.iter().any(|d| d.name == driver.name) {
            return Err(FsStatus::AlreadyExists);
        }
        if self.drivers.len() >= MAX_FILE_SYSTEMS {
            return Err(FsStatus::InvalidParameter);
        }
        log::info!("[VFS] Registered file system driver '{}'", driver.name);
        self.drivers.push(driver);
        Ok(())
    }

    /// Registered drivers, in probe order
    pub fn drivers(&self) -> &[FsDriver] {
        &self.drivers
    }

    /// Register a block device
    pub fn add_device(&mut self, device: Box<dyn BlockDevice>) -> Result<DeviceId, FsStatus> {
        self.devices.add_device(device).ok_or(FsStatus::InvalidParameter)
    }

    /// Unregister a block device that is not mounted
    pub fn remove_device(&mut self, id: DeviceId) -> Result<Box<dyn BlockDevice>, FsStatus> {
        if self.mounts.is_device_mounted(id) {
            log::warn!("[VFS] {} is still mounted", id);
            return Err(FsStatus::AccessDenied);
        }
        self.devices.remove(id).ok_or(FsStatus::NotFound)
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    // ------------------------------------------------------------------
    // Mounts
    // ------------------------------------------------------------------

    /// Mount a device at `location` ("dev0" or "/dev0"), returning the mount id
    pub fn mount_device(&mut self, device: DeviceId, location: &str) -> Result<u32, FsStatus> {
        let location = normalize_location(location)?;

        if self.mounts.contains(location) {
            log::warn!("[MOUNT] /{} is already mounted", location);
            return Err(FsStatus::AlreadyExists);
        }
        if self.mounts.is_full() {
            log::warn!("[MOUNT] Mount table full");
            return Err(FsStatus::TooManyMounts);
        }

        let dev = self.devices.get_mut(device).ok_or(FsStatus::NotFound)?;
        if !dev.is_readable() {
            log::warn!("[MOUNT] {} cannot be read", device);
            return Err(FsStatus::AccessDenied);
        }

        let mut recognized = None;
        for driver in &self.drivers {
            match (driver.probe)(dev) {
                Ok(fs) => {
                    recognized = Some(fs);
                    break;
                }
                Err(e) => log::debug!("[MOUNT] {} rejected {}: {}", driver.name, device, e),
            }
        }

        let mut fs = recognized.ok_or_else(|| {
            log::warn!("[MOUNT] No file system recognized on {}", device);
            FsStatus::InvalidFileSystem
        })?;
        fs.mount(dev)?;

        let mut flags = MountFlags::empty();
        if !dev.is_writable() {
            flags |= MountFlags::READONLY;
        }
        if dev.device_type() == BlockDeviceType::RamDisk {
            flags |= MountFlags::RAMDISK;
        }

        let fs_name = fs.name();
        let id = self.mounts.insert(location, device, flags, fs, |mount_id| {
            Node::root(location, mount_id, NodeFlags::DIRECTORY | NodeFlags::READABLE)
        })?;

        log::info!("[MOUNT] Mounted {} ({}) at /{} as mount {}", device, fs_name, location, id);
        Ok(id)
    }

    /// Unmount `location`; fails while any descriptor still refers to it
    pub fn umount_device(&mut self, location: &str) -> Result<(), FsStatus> {
        let location = normalize_location(location)?;
        let mount = self.mounts.find(location).ok_or(FsStatus::NotMounted)?;

        if self.handles.references_mount(mount.id) {
            log::warn!("[MOUNT] /{} has open descriptors", location);
            return Err(FsStatus::AccessDenied);
        }

        let removed = self.mounts.remove(location)?;
        log::info!("[MOUNT] Unmounted /{} (mount {})", location, removed.id);
        Ok(())
    }

    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts.iter().map(|m| m.info()).collect()
    }

    /// Volume statistics of a mount
    pub fn statfs(&self, location: &str) -> Result<FsInfo, FsStatus> {
        let location = normalize_location(location)?;
        let mount = self.mounts.find(location).ok_or(FsStatus::NotMounted)?;
        Ok(mount.fs.statfs())
    }

    // ------------------------------------------------------------------
    // Path resolution
    // ------------------------------------------------------------------

    /// Resolve an absolute path to a node
    pub fn resolve(&mut self, path: &str) -> Result<Node, FsStatus> {
        let parsed = ParsedPath::parse(path).map_err(|e| {
            log::warn!("[VFS] Rejected path {:?}", path);
            e
        })?;
        let location = parsed.mount_location().ok_or(FsStatus::InvalidPath)?;

        let mount = self.mounts.find(location).ok_or_else(|| {
            log::warn!("[VFS] No mount at /{}", location);
            FsStatus::NotMounted
        })?;
        let mount_id = mount.id;
        let writable = !mount.is_readonly();
        let mut node = mount.root.clone();

        let mut walked: Vec<&str> = Vec::new();
        for component in parsed.within_mount() {
            if !node.is_directory() {
                log::warn!("[VFS] {} is not a directory", node.name);
                return Err(FsStatus::NotDirectory);
            }

            walked.push(component);
            let inner = path::join(walked.iter().copied());
            let info = with_mount(&mut self.mounts, &mut self.devices, mount_id, |fs, dev| {
                fs.find_entry(dev, &inner)
            })?;

            log::debug!("[VFS] {} -> inode {}", inner, node.inode + 1);
            node = node.child(&info, inner, writable);
        }

        Ok(node)
    }

    /// Check whether a path resolves
    pub fn exists(&mut self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Describe the entry at `path`
    pub fn stat(&mut self, path: &str) -> Result<FileInfo, FsStatus> {
        self.resolve(path).map(|node| node.info())
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    /// Open a file or directory
    pub fn open(&mut self, path: &str) -> Result<Fd, FsStatus> {
        let node = self.resolve(path)?;
        let fd = self.handles.alloc(node).map_err(|e| {
            log::warn!("[VFS] No free descriptor for {}", path);
            e
        })?;
        log::debug!("[VFS] Opened {} as fd {}", path, fd);
        Ok(fd)
    }

    /// Read from the cursor, advancing it by the bytes read
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsStatus> {
        if StdStream::of(fd).is_some() {
            return Ok(0);
        }

        let handle = self.handles.get_mut(fd)?;
        if handle.node.is_directory() {
            return Err(FsStatus::IsDirectory);
        }

        let position = handle.position;
        let path = &handle.node.path;
        let n = with_mount(&mut self.mounts, &mut self.devices, handle.node.mount_id, |fs, dev| {
            fs.read(dev, path, position, buf)
        })?;

        handle.position += n as u64;
        Ok(n)
    }

    /// Write at the cursor, advancing it by the bytes written
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize, FsStatus> {
        match StdStream::of(fd) {
            Some(StdStream::Input) => return Ok(0),
            Some(StdStream::Console) => return Ok(self.console.write_bytes(data)),
            Some(StdStream::Debug) => return Ok(self.debug.write_bytes(data)),
            None => {}
        }

        let handle = self.handles.get_mut(fd)?;
        if handle.node.is_directory() {
            return Err(FsStatus::IsDirectory);
        }
        if !handle.node.flags.contains(NodeFlags::WRITABLE) {
            return Err(FsStatus::ReadOnly);
        }

        let position = handle.position;
        let path = &handle.node.path;
        let n = with_mount(&mut self.mounts, &mut self.devices, handle.node.mount_id, |fs, dev| {
            fs.write(dev, path, position, data)
        })?;

        handle.position += n as u64;
        Ok(n)
    }

    /// Move the cursor to an absolute offset within the file
    pub fn seek(&mut self, fd: Fd, offset: u64) -> Result<(), FsStatus> {
        let handle = self.handles.get_mut(fd)?;
        if offset > handle.node.size {
            return Err(FsStatus::InvalidParameter);
        }
        handle.position = offset;
        Ok(())
    }

    /// List the directory open on `fd`
    pub fn readdir(&mut self, fd: Fd) -> Result<Vec<DirEntry>, FsStatus> {
        let handle = self.handles.get(fd)?;
        if !handle.node.is_directory() {
            return Err(FsStatus::NotDirectory);
        }

        let path = &handle.node.path;
        with_mount(&mut self.mounts, &mut self.devices, handle.node.mount_id, |fs, dev| {
            fs.read_dir(dev, path)
        })
    }

    /// Close a descriptor, dropping its node
    pub fn close(&mut self, fd: Fd) -> Result<(), FsStatus> {
        let handle = self.handles.free(fd)?;
        log::debug!("[VFS] Closed fd {} ({})", fd, handle.node.name);
        Ok(())
    }

    /// Size of the node open on `fd`
    pub fn get_size(&self, fd: Fd) -> Result<u64, FsStatus> {
        self.handles.get(fd).map(|h| h.node.size)
    }

    /// Cursor of `fd`
    pub fn get_offset(&self, fd: Fd) -> Result<u64, FsStatus> {
        self.handles.get(fd).map(|h| h.position)
    }

    /// Number of open descriptors
    pub fn open_count(&self) -> usize {
        self.handles.count()
    }
}
