//! Mount Point Management
//!
//! Binds a mount location (a single path component such as `dev0`) to a
//! block device and the file system recognized on it.
//!
//! # Mount Table
//! A bounded list of active mounts. Locations are unique and matched
//! exactly; every mount gets a fresh id from a monotonically increasing
//! counter, so a remounted location never reuses a stale id.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::vfs::{FileSystem, FsStatus, FsType, Node};
use crate::io::DeviceId;

/// Maximum mount points
pub const MAX_MOUNT_POINTS: usize = 16;

bitflags::bitflags! {
    /// Mount flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MountFlags: u32 {
        /// Backing device cannot be written
        const READONLY = 0x0001;
        /// RAM disk
        const RAMDISK = 0x0020;
    }
}

/// Active mount
pub struct MountPoint {
    /// Mount id
    pub id: u32,
    /// Location, without slashes
    pub location: String,
    /// Backing device
    pub device: DeviceId,
    pub flags: MountFlags,
    /// Synthesized root node
    pub root: Node,
    /// File system instance bound to the device
    pub fs: Box<dyn FileSystem>,
}

impl MountPoint {
    /// Check if read-only
    pub fn is_readonly(&self) -> bool {
        self.flags.contains(MountFlags::READONLY)
    }

    /// Summary for listings
    pub fn info(&self) -> MountInfo {
        MountInfo {
            id: self.id,
            location: self.location.clone(),
            device: self.device,
            fs_name: self.fs.name(),
            fs_type: self.fs.fs_type(),
            flags: self.flags,
        }
    }
}

/// Snapshot of a mount table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub id: u32,
    pub location: String,
    pub device: DeviceId,
    pub fs_name: &'static str,
    pub fs_type: FsType,
    pub flags: MountFlags,
}

/// Strip slashes from a mount location; it must be a single component
pub fn normalize_location(location: &str) -> Result<&str, FsStatus> {
    let trimmed = location.trim_matches('/');
    if trimmed.is_empty() || trimmed.contains('/') {
        log::warn!("[MOUNT] Invalid mount location {:?}", location);
        return Err(FsStatus::InvalidPath);
    }
    Ok(trimmed)
}

/// Mount table
pub struct MountTable {
    mounts: Vec<MountPoint>,
    next_id: u32,
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            mounts: Vec::with_capacity(MAX_MOUNT_POINTS),
            next_id: 0,
        }
    }

    /// Check whether a location is taken
    pub fn contains(&self, location: &str) -> bool {
        self.find(location).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.mounts.len() >= MAX_MOUNT_POINTS
    }

    /// Check whether a device backs any mount
    pub fn is_device_mounted(&self, device: DeviceId) -> bool {
        self.mounts.iter().any(|m| m.device == device)
    }

    /// Add a mount, returning its id.
    ///
    /// `make_root` receives the new id so the root node can carry it.
    pub fn insert(
        &mut self,
        location: &str,
        device: DeviceId,
        flags: MountFlags,
        fs: Box<dyn FileSystem>,
        make_root: impl FnOnce(u32) -> Node,
    ) -> Result<u32, FsStatus> {
        if self.contains(location) {
            return Err(FsStatus::AlreadyExists);
        }
        if self.is_full() {
            return Err(FsStatus::TooManyMounts);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        self.mounts.push(MountPoint {
            id,
            location: location.to_string(),
            device,
            flags,
            root: make_root(id),
            fs,
        });
        Ok(id)
    }

    /// Remove a mount by location
    pub fn remove(&mut self, location: &str) -> Result<MountPoint, FsStatus> {
        let index = self
            .mounts
            .iter()
            .position(|m| m.location == location)
            .ok_or(FsStatus::NotMounted)?;
        Ok(self.mounts.remove(index))
    }

    /// Find a mount by location
    pub fn find(&self, location: &str) -> Option<&MountPoint> {
        self.mounts.iter().find(|m| m.location == location)
    }

    /// Find a mount by id
    pub fn by_id(&self, id: u32) -> Option<&MountPoint> {
        self.mounts.iter().find(|m| m.id == id)
    }

    /// Find a mount by id, mutably
    pub fn by_id_mut(&mut self, id: u32) -> Option<&mut MountPoint> {
        self.mounts.iter_mut().find(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MountPoint> {
        self.mounts.iter()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::vfs::{DirEntry, FileInfo, FsInfo, NodeFlags};
    use crate::io::BlockDevice;

    struct DummyFs;

    impl FileSystem for DummyFs {
        fn name(&self) -> &'static str {
            "dummy"
        }
        fn fs_type(&self) -> FsType {
            FsType::Unknown
        }
        fn mount(&mut self, _dev: &mut dyn BlockDevice) -> Result<(), FsStatus> {
            Ok(())
        }
        fn statfs(&self) -> FsInfo {
            FsInfo::default()
        }
        fn find_entry(&mut self, _dev: &mut dyn BlockDevice, _path: &str) -> Result<FileInfo, FsStatus> {
            Err(FsStatus::NotFound)
        }
        fn read(&mut self, _dev: &mut dyn BlockDevice, _path: &str, _offset: u64, _buf: &mut [u8]) -> Result<usize, FsStatus> {
            Ok(0)
        }
        fn write(&mut self, _dev: &mut dyn BlockDevice, _path: &str, _offset: u64, _buf: &[u8]) -> Result<usize, FsStatus> {
            Ok(0)
        }
        fn read_dir(&mut self, _dev: &mut dyn BlockDevice, _path: &str) -> Result<Vec<DirEntry>, FsStatus> {
            Ok(Vec::new())
        }
    }

    fn insert(table: &mut MountTable, location: &str) -> Result<u32, FsStatus> {
        table.insert(location, DeviceId(0), MountFlags::empty(), Box::new(DummyFs), |id| {
            Node::root(location, id, NodeFlags::DIRECTORY | NodeFlags::READABLE)
        })
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("dev0"), Ok("dev0"));
        assert_eq!(normalize_location("/dev0/"), Ok("dev0"));
        assert_eq!(normalize_location("/"), Err(FsStatus::InvalidPath));
        assert_eq!(normalize_location("/a/b"), Err(FsStatus::InvalidPath));
    }

    #[test]
    fn test_duplicate_location_rejected() {
        let mut table = MountTable::new();
        let first = insert(&mut table, "dev0").unwrap();
        assert_eq!(insert(&mut table, "dev0"), Err(FsStatus::AlreadyExists));

        let removed = table.remove("dev0").unwrap();
        assert_eq!(removed.id, first);
        assert_eq!(table.remove("dev0").err(), Some(FsStatus::NotMounted));

        let second = insert(&mut table, "dev0").unwrap();
        assert_ne!(first, second);
        assert_eq!(table.find("dev0").unwrap().root.mount_id, second);
    }

    #[test]
    fn test_capacity() {
        let mut table = MountTable::new();
        for i in 0..MAX_MOUNT_POINTS {
            insert(&mut table, &alloc::format!("dev{}", i)).unwrap();
        }
        assert!(table.is_full());
        assert_eq!(insert(&mut table, "extra"), Err(FsStatus::TooManyMounts));
    }

    #[test]
    fn test_exact_match() {
        let mut table = MountTable::new();
        insert(&mut table, "dev0").unwrap();
        assert!(table.find("DEV0").is_none());
        assert!(table.find("dev").is_none());
        assert!(table.is_device_mounted(DeviceId(0)));
        assert!(!table.is_device_mounted(DeviceId(1)));
    }
}
