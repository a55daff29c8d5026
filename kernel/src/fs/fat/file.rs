//! FAT volume state, traversal and cluster I/O
//!
//! `VolumeState` is everything one mounted FAT volume needs between calls:
//! the boot sector, the derived geometry, the FAT cache and the decoded root
//! directory. Every path-based operation goes through [`VolumeState::locate`],
//! which walks the path one component at a time from the root directory.

use alloc::vec;
use alloc::vec::Vec;

use super::bpb::{BootSector, FatType, Geometry, BOOT_SECTOR_SIZE};
use super::dir::{decode_directory, has_end_marker, DirRecord};
use super::table::{ClusterLink, FatTable};
use crate::fs::path;
use crate::fs::vfs::{FileInfo, FileType, FsStatus};
use crate::io::BlockDevice;

/// Result of a path lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// The volume's root directory
    Root,
    /// A directory entry
    Entry(DirRecord),
}

impl Located {
    pub fn is_directory(&self) -> bool {
        match self {
            Located::Root => true,
            Located::Entry(record) => record.entry.is_directory(),
        }
    }

    /// Describe the located entry
    pub fn info(&self) -> FileInfo {
        match self {
            Located::Root => FileInfo {
                name: path::PATH_SEPARATOR.into(),
                size: 0,
                file_type: FileType::Directory,
                attributes: crate::fs::vfs::file_attrs::ATTR_DIRECTORY,
            },
            Located::Entry(record) => record_info(record),
        }
    }
}

/// Convert a directory record to VFS file info
pub fn record_info(record: &DirRecord) -> FileInfo {
    let is_dir = record.entry.is_directory();
    FileInfo {
        name: record.name(),
        size: if is_dir { 0 } else { record.entry.file_size as u64 },
        file_type: if is_dir {
            FileType::Directory
        } else {
            FileType::Regular
        },
        // FAT attribute bits line up with the VFS attribute constants
        attributes: record.entry.attributes.bits() as u32,
    }
}

/// Per-volume state of a mounted FAT file system
pub struct VolumeState {
    pub boot: BootSector,
    pub geometry: Geometry,
    fat: FatTable,
    root: Option<Vec<DirRecord>>,
}

impl VolumeState {
    /// Read and validate the boot sector of `dev`
    pub fn probe(dev: &mut dyn BlockDevice) -> Result<Self, FsStatus> {
        if !dev.is_readable() {
            log::warn!("[FAT] {} cannot be read", dev.name());
            return Err(FsStatus::AccessDenied);
        }

        let sector_size = dev.sector_size();
        if sector_size < BOOT_SECTOR_SIZE {
            return Err(FsStatus::InvalidFileSystem);
        }

        let mut sector = vec![0u8; sector_size];
        dev.read_sectors(0, 1, &mut sector).map_err(|e| {
            log::error!("[FAT] Failed to read boot sector of {}: {}", dev.name(), e);
            FsStatus::IoError
        })?;

        let boot = BootSector::parse(&sector)?;
        let geometry = boot.geometry()?;

        if geometry.bytes_per_sector as usize != sector_size {
            log::warn!(
                "[FAT] Volume sector size {} does not match device sector size {}",
                geometry.bytes_per_sector,
                sector_size
            );
            return Err(FsStatus::InvalidFileSystem);
        }
        if geometry.total_sectors as u64 > dev.sector_count() {
            log::warn!(
                "[FAT] Volume claims {} sectors, device has {}",
                geometry.total_sectors,
                dev.sector_count()
            );
            return Err(FsStatus::InvalidFileSystem);
        }
        if !boot.has_boot_signature() {
            log::warn!("[FAT] Boot sector of {} lacks the 0x55AA signature", dev.name());
        }

        log::debug!(
            "[FAT] {} on {}: {} clusters of {} bytes, FAT at {} ({} sectors x{}), data at {}",
            geometry.fat_type.name(),
            dev.name(),
            geometry.cluster_count,
            geometry.bytes_per_cluster,
            geometry.fat_start,
            geometry.fat_size,
            geometry.fat_count,
            geometry.first_data_sector
        );

        Ok(Self {
            boot,
            fat: FatTable::new(&geometry),
            geometry,
            root: None,
        })
    }

    pub fn fat_type(&self) -> FatType {
        self.geometry.fat_type
    }

    /// Chain terminator threshold for this volume
    pub fn end_of_chain_sentinel(&self) -> u32 {
        self.fat.end_of_chain_sentinel()
    }

    /// Decode the FAT entry of `cluster`
    pub fn next_cluster(&mut self, dev: &mut dyn BlockDevice, cluster: u32) -> Result<ClusterLink, FsStatus> {
        self.fat.next_cluster(dev, cluster)
    }

    /// Follow one link; `None` at end of chain, corrupt links are errors
    fn follow(&mut self, dev: &mut dyn BlockDevice, cluster: u32) -> Result<Option<u32>, FsStatus> {
        match self.fat.next_cluster(dev, cluster)? {
            ClusterLink::Next(next) if self.geometry.is_data_cluster(next) => {
                log::trace!("[FAT] {} -> {}", cluster, next);
                Ok(Some(next))
            }
            ClusterLink::EndOfChain => Ok(None),
            link => {
                log::error!("[FAT] Broken chain at cluster {}: {:?}", cluster, link);
                Err(FsStatus::InvalidFileSystem)
            }
        }
    }

    /// Guard against cyclic chains
    fn check_steps(&self, steps: u32) -> Result<(), FsStatus> {
        if steps > self.geometry.cluster_count {
            log::error!("[FAT] Cluster chain longer than the volume");
            return Err(FsStatus::InvalidFileSystem);
        }
        Ok(())
    }

    fn read_sectors(&self, dev: &mut dyn BlockDevice, lba: u32, count: u32, buf: &mut [u8]) -> Result<(), FsStatus> {
        dev.read_sectors(lba as u64, count, buf).map_err(|e| {
            log::error!("[FAT] Read of {} sectors at {} failed: {}", count, lba, e);
            FsStatus::from(e)
        })
    }

    fn read_cluster(&self, dev: &mut dyn BlockDevice, cluster: u32, buf: &mut [u8]) -> Result<(), FsStatus> {
        if !self.geometry.is_data_cluster(cluster) {
            log::error!("[FAT] Cluster {} outside the data area", cluster);
            return Err(FsStatus::InvalidFileSystem);
        }
        let lba = self.geometry.cluster_to_sector(cluster);
        self.read_sectors(dev, lba, self.geometry.sectors_per_cluster, buf)
    }

    fn write_cluster(&self, dev: &mut dyn BlockDevice, cluster: u32, buf: &[u8]) -> Result<(), FsStatus> {
        if !self.geometry.is_data_cluster(cluster) {
            log::error!("[FAT] Cluster {} outside the data area", cluster);
            return Err(FsStatus::InvalidFileSystem);
        }
        let lba = self.geometry.cluster_to_sector(cluster);
        dev.write_sectors(lba as u64, self.geometry.sectors_per_cluster, buf)
            .map_err(|e| {
                log::error!("[FAT] Write of cluster {} failed: {}", cluster, e);
                FsStatus::from(e)
            })
    }

    /// Advance `skip` links from `first`; `None` if the chain is shorter
    fn seek_chain(&mut self, dev: &mut dyn BlockDevice, first: u32, skip: usize) -> Result<Option<u32>, FsStatus> {
        let mut cluster = first;
        for step in 0..skip {
            self.check_steps(step as u32)?;
            match self.follow(dev, cluster)? {
                Some(next) => cluster = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cluster))
    }

    /// Read from a chain starting `offset` bytes in, until `buf` is full or
    /// the chain ends
    fn read_chain(&mut self, dev: &mut dyn BlockDevice, first: u32, offset: usize, buf: &mut [u8]) -> Result<usize, FsStatus> {
        let cluster_bytes = self.geometry.bytes_per_cluster as usize;
        let mut within = offset % cluster_bytes;
        let Some(mut cluster) = self.seek_chain(dev, first, offset / cluster_bytes)? else {
            return Ok(0);
        };

        let mut scratch = vec![0u8; cluster_bytes];
        let mut done = 0;
        let mut steps = 0;

        while done < buf.len() {
            self.read_cluster(dev, cluster, &mut scratch)?;
            let take = (cluster_bytes - within).min(buf.len() - done);
            buf[done..done + take].copy_from_slice(&scratch[within..within + take]);
            done += take;
            within = 0;

            if done == buf.len() {
                break;
            }
            match self.follow(dev, cluster)? {
                Some(next) => cluster = next,
                None => break,
            }
            steps += 1;
            self.check_steps(steps)?;
        }

        Ok(done)
    }

    /// Overwrite a chain starting `offset` bytes in. Partial clusters are
    /// read first so the bytes around the written range survive.
    fn write_chain(&mut self, dev: &mut dyn BlockDevice, first: u32, offset: usize, data: &[u8]) -> Result<usize, FsStatus> {
        if !dev.is_writable() {
            return Err(FsStatus::ReadOnly);
        }

        let cluster_bytes = self.geometry.bytes_per_cluster as usize;
        let mut within = offset % cluster_bytes;
        let Some(mut cluster) = self.seek_chain(dev, first, offset / cluster_bytes)? else {
            return Ok(0);
        };

        let mut scratch = vec![0u8; cluster_bytes];
        let mut done = 0;
        let mut steps = 0;

        while done < data.len() {
            let take = (cluster_bytes - within).min(data.len() - done);
            if take < cluster_bytes {
                self.read_cluster(dev, cluster, &mut scratch)?;
            }
            scratch[within..within + take].copy_from_slice(&data[done..done + take]);
            self.write_cluster(dev, cluster, &scratch)?;
            done += take;
            within = 0;

            if done == data.len() {
                break;
            }
            match self.follow(dev, cluster)? {
                Some(next) => cluster = next,
                None => break,
            }
            steps += 1;
            self.check_steps(steps)?;
        }

        Ok(done)
    }

    /// Read up to `size` bytes of the chain at `first_cluster` into `buf`
    pub fn read_clusters(&mut self, dev: &mut dyn BlockDevice, buf: &mut [u8], first_cluster: u32, size: usize) -> Result<usize, FsStatus> {
        let len = size.min(buf.len());
        self.read_chain(dev, first_cluster, 0, &mut buf[..len])
    }

    /// Write up to `size` bytes of `data` over the chain at `first_cluster`
    pub fn write_clusters(&mut self, dev: &mut dyn BlockDevice, data: &[u8], first_cluster: u32, size: usize) -> Result<usize, FsStatus> {
        let len = size.min(data.len());
        self.write_chain(dev, first_cluster, 0, &data[..len])
    }

    /// Read a directory stored in a cluster chain
    fn read_directory_chain(&mut self, dev: &mut dyn BlockDevice, first: u32) -> Result<Vec<DirRecord>, FsStatus> {
        let cluster_bytes = self.geometry.bytes_per_cluster as usize;
        let mut raw = Vec::new();
        let mut scratch = vec![0u8; cluster_bytes];
        let mut cluster = first;
        let mut steps = 0;

        loop {
            self.read_cluster(dev, cluster, &mut scratch)?;
            raw.extend_from_slice(&scratch);
            if has_end_marker(&scratch) {
                break;
            }
            match self.follow(dev, cluster)? {
                Some(next) => cluster = next,
                None => break,
            }
            steps += 1;
            self.check_steps(steps)?;
        }

        Ok(decode_directory(&raw))
    }

    fn load_root(&mut self, dev: &mut dyn BlockDevice) -> Result<Vec<DirRecord>, FsStatus> {
        if self.geometry.fat_type == FatType::Fat32 {
            return self.read_directory_chain(dev, self.geometry.root_cluster);
        }

        let count = self.geometry.root_dir_sectors;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut raw = vec![0u8; (count * self.geometry.bytes_per_sector) as usize];
        self.read_sectors(dev, self.geometry.root_dir_sector, count, &mut raw)?;
        Ok(decode_directory(&raw))
    }

    /// Decoded root directory, read on first use
    pub fn root_entries(&mut self, dev: &mut dyn BlockDevice) -> Result<&[DirRecord], FsStatus> {
        if self.root.is_none() {
            let records = self.load_root(dev)?;
            log::debug!("[FAT] Root directory holds {} entries", records.len());
            self.root = Some(records);
        }
        Ok(self.root.as_deref().unwrap_or(&[]))
    }

    /// Entries of the directory starting at `first_cluster` (0 is the root)
    fn directory_at(&mut self, dev: &mut dyn BlockDevice, first_cluster: u32) -> Result<Vec<DirRecord>, FsStatus> {
        if first_cluster == 0 {
            return Ok(self.root_entries(dev)?.to_vec());
        }
        self.read_directory_chain(dev, first_cluster)
    }

    /// Walk an absolute in-volume path
    pub fn locate(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<Located, FsStatus> {
        if !path::is_absolute(path) {
            log::warn!("[FAT] Path {:?} is not absolute", path);
            return Err(FsStatus::InvalidPath);
        }

        let components = path::split(path);
        let Some((last, parents)) = components.split_last() else {
            return Ok(Located::Root);
        };

        let mut current = self.root_entries(dev)?.to_vec();
        for component in parents {
            let record = find(&current, component)?;
            if !record.entry.is_directory() {
                log::warn!("[FAT] {} in {} is not a directory", component, path);
                return Err(FsStatus::NotDirectory);
            }
            log::debug!("[FAT] Descending into {} (cluster {})", component, record.entry.first_cluster());
            current = self.directory_at(dev, record.entry.first_cluster())?;
        }

        let record = find(&current, last)?;
        Ok(Located::Entry(record.clone()))
    }

    /// Look up the entry at `path`
    pub fn find_entry(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<Located, FsStatus> {
        self.locate(dev, path)
    }

    /// Read file bytes at `offset`, clamped to the stored size
    pub fn read_file(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FsStatus> {
        let (first, size) = self.file_extent(dev, path)?;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let len = (size - offset).min(buf.len() as u64) as usize;
        self.read_chain(dev, first, offset as usize, &mut buf[..len])
    }

    /// Overwrite file bytes at `offset`; the file never grows
    pub fn write_file(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, data: &[u8]) -> Result<usize, FsStatus> {
        let (first, size) = self.file_extent(dev, path)?;
        if offset >= size || data.is_empty() {
            return Ok(0);
        }
        let len = (size - offset).min(data.len() as u64) as usize;
        self.write_chain(dev, first, offset as usize, &data[..len])
    }

    /// List a directory, leaving out "." and ".."
    pub fn read_directory(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<Vec<DirRecord>, FsStatus> {
        let records = match self.locate(dev, path)? {
            Located::Root => self.root_entries(dev)?.to_vec(),
            Located::Entry(record) if record.entry.is_directory() => {
                self.directory_at(dev, record.entry.first_cluster())?
            }
            Located::Entry(_) => return Err(FsStatus::NotDirectory),
        };
        Ok(records.into_iter().filter(|r| !r.entry.is_dot_entry()).collect())
    }

    /// First cluster and size of the regular file at `path`
    fn file_extent(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<(u32, u64), FsStatus> {
        let record = match self.locate(dev, path)? {
            Located::Entry(record) if !record.entry.is_directory() => record,
            _ => return Err(FsStatus::IsDirectory),
        };

        let size = record.entry.file_size as u64;
        let first = record.entry.first_cluster();
        if size > 0 && !self.geometry.is_data_cluster(first) {
            log::error!("[FAT] {} has size {} but starts at cluster {}", path, size, first);
            return Err(FsStatus::InvalidFileSystem);
        }
        Ok((first, size))
    }
}

/// Find a component in a decoded directory
fn find<'a>(records: &'a [DirRecord], component: &str) -> Result<&'a DirRecord, FsStatus> {
    records.iter().find(|r| r.matches(component)).ok_or_else(|| {
        log::warn!("[FAT] {} not found", component);
        FsStatus::NotFound
    })
}
