//! FAT12/16/32 File System Driver
//!
//! Read-oriented driver with in-place overwrite of existing file data.
//!
//! # Structure
//! - **bpb**: boot sector decoding, geometry and FAT type classification
//! - **table**: FAT sector cache and cluster chain decoding
//! - **dir**: short and long directory entries, name conversion
//! - **file**: per-volume state, path traversal and cluster I/O
//!
//! # On-disk layout
//! ```text
//! | boot | reserved | FAT 1 | FAT 2 .. | root dir (FAT12/16) | data clusters 2.. |
//! ```
//! On FAT32 the root directory is an ordinary cluster chain starting at the
//! cluster named in the extended BPB.
//!
//! Files cannot be created, removed or grown; writes overwrite bytes that
//! the existing cluster chain already holds.

pub mod bpb;
pub mod dir;
pub mod file;
pub mod table;

#[cfg(test)]
pub(crate) mod testutil;

use alloc::boxed::Box;
use alloc::vec::Vec;

pub use bpb::{BootSector, FatType, Geometry};
pub use dir::{long_name_of, reassemble_long_name, short_name_of, DirRecord};
pub use file::{Located, VolumeState};
pub use table::{ClusterLink, FAT_CACHE_SECTORS};

use super::vfs::{DirEntry, FileInfo, FileSystem, FsDriver, FsInfo, FsStatus, FsType};
use crate::io::BlockDevice;

pub(crate) fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

impl From<FatType> for FsType {
    fn from(fat_type: FatType) -> Self {
        match fat_type {
            FatType::Fat12 => FsType::Fat12,
            FatType::Fat16 => FsType::Fat16,
            FatType::Fat32 => FsType::Fat32,
        }
    }
}

/// Mounted FAT volume
pub struct FatFileSystem {
    volume: VolumeState,
}

impl FatFileSystem {
    /// Recognize a FAT volume on `dev`
    pub fn probe(dev: &mut dyn BlockDevice) -> Result<Self, FsStatus> {
        Ok(Self {
            volume: VolumeState::probe(dev)?,
        })
    }

    pub fn volume(&self) -> &VolumeState {
        &self.volume
    }
}

impl FileSystem for FatFileSystem {
    fn name(&self) -> &'static str {
        "fat"
    }

    fn fs_type(&self) -> FsType {
        self.volume.fat_type().into()
    }

    fn mount(&mut self, dev: &mut dyn BlockDevice) -> Result<(), FsStatus> {
        // Reading the root directory up front catches a bad layout at mount time
        let entries = self.volume.root_entries(dev)?.len();
        log::info!(
            "[FAT] Mounted {} volume on {} ({} root entries)",
            self.volume.fat_type().name(),
            dev.name(),
            entries
        );
        Ok(())
    }

    fn statfs(&self) -> FsInfo {
        let geo = &self.volume.geometry;
        let ebr = self.volume.boot.extended_record(geo.fat_type);
        FsInfo {
            fs_type: geo.fat_type.into(),
            block_size: geo.bytes_per_cluster,
            total_blocks: geo.cluster_count as u64,
            label: if ebr.has_signature() {
                ebr.volume_label_str()
            } else {
                Default::default()
            },
            serial: if ebr.has_signature() { ebr.volume_id } else { 0 },
        }
    }

    fn find_entry(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<FileInfo, FsStatus> {
        self.volume.find_entry(dev, path).map(|found| found.info())
    }

    fn read(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FsStatus> {
        self.volume.read_file(dev, path, offset, buf)
    }

    fn write(&mut self, dev: &mut dyn BlockDevice, path: &str, offset: u64, buf: &[u8]) -> Result<usize, FsStatus> {
        self.volume.write_file(dev, path, offset, buf)
    }

    fn read_dir(&mut self, dev: &mut dyn BlockDevice, path: &str) -> Result<Vec<DirEntry>, FsStatus> {
        let records = self.volume.read_directory(dev, path)?;
        Ok(records.iter().map(file::record_info).collect())
    }
}

fn probe(dev: &mut dyn BlockDevice) -> Result<Box<dyn FileSystem>, FsStatus> {
    Ok(Box::new(FatFileSystem::probe(dev)?))
}

/// Driver entry for the VFS driver list
pub fn driver() -> FsDriver {
    FsDriver { name: "fat", probe }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat::testutil::ImageSpec;
    use crate::io::RamDisk;
    use std::io::{Cursor, Write};

    fn mounted(image: Vec<u8>) -> (FatFileSystem, RamDisk) {
        let mut disk = RamDisk::from_image("img", image);
        let mut fs = FatFileSystem::probe(&mut disk).unwrap();
        fs.mount(&mut disk).unwrap();
        (fs, disk)
    }

    /// Blank image formatted by fatfs
    fn fatfs_disk(size: usize, options: fatfs::FormatVolumeOptions) -> Cursor<Vec<u8>> {
        let mut cursor = Cursor::new(vec![0u8; size]);
        fatfs::format_volume(&mut cursor, options).expect("format_volume failed");
        cursor
    }

    fn same_type(ours: FsType, theirs: fatfs::FatType) -> bool {
        matches!(
            (ours, theirs),
            (FsType::Fat12, fatfs::FatType::Fat12)
                | (FsType::Fat16, fatfs::FatType::Fat16)
                | (FsType::Fat32, fatfs::FatType::Fat32)
        )
    }

    #[test]
    fn test_driver_probe() {
        let mut disk = RamDisk::from_image("img", ImageSpec::fat12().build());
        let fs = (driver().probe)(&mut disk).unwrap();
        assert_eq!(fs.name(), "fat");
        assert_eq!(fs.fs_type(), FsType::Fat12);

        let mut blank = RamDisk::new("blank", 8);
        assert!((driver().probe)(&mut blank).is_err());
    }

    #[test]
    fn test_statfs_reports_label() {
        let (fs, _disk) = mounted(ImageSpec::fat16().build());
        let info = fs.statfs();
        assert_eq!(info.fs_type, FsType::Fat16);
        assert_eq!(info.label, "TESTVOL");
        assert_eq!(info.serial, 0x1234_5678);
        assert_eq!(info.block_size, 512);
        assert_eq!(info.total_bytes(), info.total_blocks * 512);
    }

    #[test]
    fn test_trait_surface() {
        let mut spec = ImageSpec::fat16();
        spec.add_dir("/DOCS");
        spec.add_file("/DOCS/Read me first.txt", b"hello there");
        let (mut fs, mut disk) = mounted(spec.build());

        let info = fs.find_entry(&mut disk, "/docs/read me first.txt").unwrap();
        assert!(info.is_regular());
        assert_eq!(info.size, 11);

        let mut buf = [0u8; 5];
        assert_eq!(fs.read(&mut disk, "/DOCS/Read me first.txt", 6, &mut buf), Ok(5));
        assert_eq!(&buf, b"there");

        let listing = fs.read_dir(&mut disk, "/DOCS").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "Read me first.txt");
        assert!(fs.find_entry(&mut disk, "/").unwrap().is_directory());
    }

    #[test]
    fn test_fatfs_small_volume() {
        let mut cursor = fatfs_disk(4 * 1024 * 1024, fatfs::FormatVolumeOptions::new());
        let theirs = {
            let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
                .expect("FileSystem::new failed");
            let root = fs.root_dir();
            let mut f = root.create_file("hello.txt").unwrap();
            f.write_all(b"Hello from fatfs").unwrap();
            let sub = root.create_dir("nested").unwrap();
            let mut g = sub.create_file("A rather long file name.data").unwrap();
            g.write_all(&[0x5A; 3000]).unwrap();
            fs.fat_type()
        };
        let image = cursor.into_inner();

        let (mut fs, mut disk) = mounted(image);
        assert!(same_type(fs.fs_type(), theirs));

        let mut buf = [0u8; 64];
        let n = fs.read(&mut disk, "/HELLO.TXT", 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hello from fatfs");

        let info = fs.find_entry(&mut disk, "/nested/a rather long file name.DATA").unwrap();
        assert_eq!(info.size, 3000);
        let mut big = vec![0u8; 3000];
        assert_eq!(fs.read(&mut disk, "/nested/A rather long file name.data", 0, &mut big), Ok(3000));
        assert!(big.iter().all(|&b| b == 0x5A));

        let names: Vec<_> = fs.read_dir(&mut disk, "/nested").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["A rather long file name.data"]);
    }

    #[test]
    fn test_fatfs_fat32_volume() {
        let options = fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32);
        let mut cursor = fatfs_disk(40 * 1024 * 1024, options);
        {
            let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
                .expect("FileSystem::new failed");
            assert!(matches!(fs.fat_type(), fatfs::FatType::Fat32));
            let root = fs.root_dir();
            for i in 0..5 {
                let mut f = root.create_file(&format!("file{}.txt", i)).unwrap();
                f.write_all(format!("contents of file {}", i).as_bytes()).unwrap();
            }
            let dir = root.create_dir("Program Files").unwrap();
            let mut f = dir.create_file("app.cfg").unwrap();
            f.write_all(&[b'c'; 1024]).unwrap();
        }
        let image = cursor.into_inner();

        let (mut fs, mut disk) = mounted(image);
        assert_eq!(fs.fs_type(), FsType::Fat32);

        let mut buf = [0u8; 32];
        let n = fs.read(&mut disk, "/FILE3.TXT", 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"contents of file 3");

        let root: Vec<_> = fs.read_dir(&mut disk, "/").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(root.len(), 6);
        assert!(root.iter().any(|n| n == "Program Files"));

        assert_eq!(fs.find_entry(&mut disk, "/program files/APP.CFG").unwrap().size, 1024);

        // Overwrite through our driver and read back through fatfs
        assert_eq!(fs.write(&mut disk, "/file0.txt", 0, b"CONTENTS"), Ok(8));
        let mut image = disk.into_inner();
        let mut cursor = Cursor::new(&mut image);
        let check = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
        let mut text = String::new();
        std::io::Read::read_to_string(&mut check.root_dir().open_file("file0.txt").unwrap(), &mut text).unwrap();
        assert_eq!(text, "CONTENTS of file 0");
    }
}
