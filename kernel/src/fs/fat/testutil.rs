//! In-memory FAT image builder for tests
//!
//! Lays out a volume the way a formatter would: boot sector, FAT copies,
//! the fixed root region on FAT12/16 and contiguous cluster chains for
//! every directory and file added. Entries appear in insertion order.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use super::bpb::{
    BiosParameterBlock, BootSector, ExtendedBootRecord, Fat32ExtendedBpb, BOOT_SECTOR_SIZE,
    BOOT_SIGNATURE,
};
use super::dir::{
    fits_short_name, lfn_checksum, long_name_of, short_name_of, FileAttributes, LongNameEntry,
    ShortEntry, DIR_ENTRY_SIZE, LFN_CHARS_PER_ENTRY,
};
use super::put_u16;

enum Content {
    File(Vec<u8>),
    Dir,
}

struct Item {
    path: String,
    content: Content,
}

/// Directory tree node resolved during `build`
struct Node {
    name: String,
    short: [u8; 11],
    parent: usize,
    children: Vec<usize>,
    content: Content,
    cluster: u32,
}

impl Node {
    fn units(&self) -> Vec<u16> {
        self.name.encode_utf16().collect()
    }

    fn needs_long_name(&self) -> bool {
        long_name_of(&self.short) != self.name
    }

    fn lfn_entries(&self) -> usize {
        if self.needs_long_name() {
            self.units().len().div_ceil(LFN_CHARS_PER_ENTRY)
        } else {
            0
        }
    }
}

/// Volume description that `build` turns into a raw image
pub struct ImageSpec {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors: u32,
    pub fat_size: u32,
    pub media_type: u8,
    pub fat32: bool,
    chains: Vec<Vec<u32>>,
    items: Vec<Item>,
}

impl ImageSpec {
    /// 1.44 MB floppy layout
    pub fn fat12() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 2,
            root_entry_count: 224,
            total_sectors: 2880,
            fat_size: 9,
            media_type: 0xF0,
            fat32: false,
            chains: Vec::new(),
            items: Vec::new(),
        }
    }

    /// Small FAT16 volume (4349 clusters)
    pub fn fat16() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            num_fats: 1,
            root_entry_count: 512,
            total_sectors: 4400,
            fat_size: 18,
            media_type: 0xF8,
            fat32: false,
            chains: Vec::new(),
            items: Vec::new(),
        }
    }

    /// Smallest FAT32 volume with one-sector clusters (65600 clusters)
    pub fn fat32() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            num_fats: 1,
            root_entry_count: 0,
            total_sectors: 66152,
            fat_size: 520,
            media_type: 0xF8,
            fat32: true,
            chains: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn boot_sector(&self) -> BootSector {
        let ebr = ExtendedBootRecord {
            drive_number: 0x80,
            reserved: 0,
            signature: 0x29,
            volume_id: 0x1234_5678,
            volume_label: *b"TESTVOL    ",
            system_id: if self.fat32 { *b"FAT32   " } else { *b"FAT16   " },
        };
        let small = self.total_sectors < 0x10000;

        BootSector {
            jump: [0xEB, 0x3C, 0x90],
            oem_name: *b"MSWIN4.1",
            bpb: BiosParameterBlock {
                bytes_per_sector: self.bytes_per_sector,
                sectors_per_cluster: self.sectors_per_cluster,
                reserved_sectors: self.reserved_sectors,
                num_fats: self.num_fats,
                root_entry_count: self.root_entry_count,
                total_sectors_16: if small { self.total_sectors as u16 } else { 0 },
                media_type: self.media_type,
                sectors_per_fat_16: if self.fat32 { 0 } else { self.fat_size as u16 },
                sectors_per_track: 63,
                num_heads: 16,
                hidden_sectors: 0,
                total_sectors_32: if small { 0 } else { self.total_sectors },
            },
            ebr16: if self.fat32 { ExtendedBootRecord::default() } else { ebr },
            ext32: if self.fat32 {
                Fat32ExtendedBpb {
                    sectors_per_fat_32: self.fat_size,
                    ext_flags: 0,
                    fs_version: 0,
                    root_cluster: 2,
                    fs_info_sector: 1,
                    backup_boot_sector: 6,
                    ebr,
                }
            } else {
                Fat32ExtendedBpb::default()
            },
            signature: BOOT_SIGNATURE,
        }
    }

    /// Link `clusters` into one chain, terminated after the last element
    pub fn set_chain(&mut self, clusters: &[u32]) {
        self.chains.push(clusters.to_vec());
    }

    pub fn add_file(&mut self, path: &str, data: &[u8]) {
        self.items.push(Item {
            path: path.to_string(),
            content: Content::File(data.to_vec()),
        });
    }

    pub fn add_dir(&mut self, path: &str) {
        self.items.push(Item {
            path: path.to_string(),
            content: Content::Dir,
        });
    }

    fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    fn end_of_chain(&self) -> u32 {
        let geo = self.boot_sector().geometry().expect("preset geometry");
        match geo.fat_type {
            super::FatType::Fat12 => 0xFFF,
            super::FatType::Fat16 => 0xFFFF,
            super::FatType::Fat32 => 0x0FFF_FFFF,
        }
    }

    fn set_entry(&self, fat: &mut [u8], cluster: u32, value: u32) {
        let geo = self.boot_sector().geometry().expect("preset geometry");
        let at = geo.fat_type.entry_offset(cluster) as usize;
        match geo.fat_type {
            super::FatType::Fat12 => {
                if cluster % 2 == 0 {
                    fat[at] = value as u8;
                    fat[at + 1] = (fat[at + 1] & 0xF0) | ((value >> 8) as u8 & 0x0F);
                } else {
                    fat[at] = (fat[at] & 0x0F) | ((value as u8 & 0x0F) << 4);
                    fat[at + 1] = (value >> 4) as u8;
                }
            }
            super::FatType::Fat16 => put_u16(fat, at, value as u16),
            super::FatType::Fat32 => super::put_u32(fat, at, value),
        }
    }

    fn link(&self, fat: &mut [u8], clusters: &[u32]) {
        let eoc = self.end_of_chain();
        for pair in clusters.windows(2) {
            self.set_entry(fat, pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_entry(fat, last, eoc);
        }
    }

    /// Resolve the items into a tree with short names assigned
    fn tree(&self) -> Vec<Node> {
        let mut nodes = vec![Node {
            name: String::new(),
            short: [b' '; 11],
            parent: 0,
            children: Vec::new(),
            content: Content::Dir,
            cluster: 0,
        }];
        let mut paths: Vec<String> = vec![String::new()];

        for item in &self.items {
            let trimmed = item.path.trim_end_matches('/');
            let (parent_path, name) = trimmed.rsplit_once('/').expect("absolute path");
            let parent = paths
                .iter()
                .position(|p| p == parent_path)
                .expect("parent directory added first");
            assert!(
                matches!(nodes[parent].content, Content::Dir),
                "parent of {} is a file",
                item.path
            );

            let taken: Vec<[u8; 11]> = nodes[parent].children.iter().map(|&c| nodes[c].short).collect();
            let short = if fits_short_name(name) {
                short_name_of(name)
            } else {
                alias_for(name, &taken)
            };
            assert!(!taken.contains(&short), "duplicate name {}", item.path);

            let index = nodes.len();
            nodes.push(Node {
                name: name.to_string(),
                short,
                parent,
                children: Vec::new(),
                content: match &item.content {
                    Content::File(data) => Content::File(data.clone()),
                    Content::Dir => Content::Dir,
                },
                cluster: 0,
            });
            nodes[parent].children.push(index);
            paths.push(trimmed.to_string());
        }
        nodes
    }

    fn directory_bytes(nodes: &[Node], index: usize) -> usize {
        let node = &nodes[index];
        let dots = if index == 0 { 0 } else { 2 };
        let entries: usize = node.children.iter().map(|&c| 1 + nodes[c].lfn_entries()).sum();
        (dots + entries) * DIR_ENTRY_SIZE
    }

    fn encode_directory(nodes: &[Node], index: usize) -> Vec<u8> {
        let mut slots: Vec<[u8; DIR_ENTRY_SIZE]> = Vec::new();
        let node = &nodes[index];

        if index != 0 {
            let parent_cluster = if node.parent == 0 { 0 } else { nodes[node.parent].cluster };
            for (name, cluster) in [(".", node.cluster), ("..", parent_cluster)] {
                let entry = ShortEntry {
                    name: short_name_of(name),
                    attributes: FileAttributes::DIRECTORY,
                    cluster_high: (cluster >> 16) as u16,
                    cluster_low: cluster as u16,
                    ..ShortEntry::default()
                };
                let mut raw = [0u8; DIR_ENTRY_SIZE];
                entry.encode(&mut raw);
                slots.push(raw);
            }
        }

        for &c in &node.children {
            let child = &nodes[c];
            if child.needs_long_name() {
                let units = child.units();
                let count = child.lfn_entries();
                let checksum = lfn_checksum(&child.short);
                for seq in (1..=count).rev() {
                    let mut raw = [0u8; DIR_ENTRY_SIZE];
                    LongNameEntry::for_units(&units, seq as u8, seq == count, checksum).encode(&mut raw);
                    slots.push(raw);
                }
            }
            let (attributes, size) = match &child.content {
                Content::File(data) => (FileAttributes::ARCHIVE, data.len() as u32),
                Content::Dir => (FileAttributes::DIRECTORY, 0),
            };
            let entry = ShortEntry {
                name: child.short,
                attributes,
                cluster_high: (child.cluster >> 16) as u16,
                cluster_low: child.cluster as u16,
                file_size: size,
                ..ShortEntry::default()
            };
            let mut raw = [0u8; DIR_ENTRY_SIZE];
            entry.encode(&mut raw);
            slots.push(raw);
        }
        slots.concat()
    }

    /// Produce the raw volume image
    pub fn build(&self) -> Vec<u8> {
        let bs = self.boot_sector();
        let geo = bs.geometry().expect("preset geometry");
        let bps = self.bytes_per_sector as usize;
        let cb = self.bytes_per_cluster();

        let mut image = vec![0u8; self.total_sectors as usize * bps];
        bs.encode(&mut image[..BOOT_SECTOR_SIZE]).expect("boot sector");

        let mut fat = vec![0u8; geo.fat_size as usize * bps];
        let eoc = self.end_of_chain();
        self.set_entry(&mut fat, 0, (eoc & !0xFF) | self.media_type as u32);
        self.set_entry(&mut fat, 1, eoc);
        for chain in &self.chains {
            self.link(&mut fat, chain);
        }

        let mut nodes = self.tree();
        let mut next_free = self
            .chains
            .iter()
            .flatten()
            .max()
            .map(|&c| c + 1)
            .unwrap_or(2);

        let mut allocate = |count: usize, fat: &mut Vec<u8>| -> u32 {
            let first = next_free;
            let clusters: Vec<u32> = (first..first + count as u32).collect();
            assert!(
                clusters.iter().all(|&c| geo.is_data_cluster(c)),
                "image is full"
            );
            self.link(fat, &clusters);
            next_free += count as u32;
            first
        };

        if self.fat32 {
            assert!(self.chains.is_empty(), "explicit chains are FAT12/16 only");
            let count = Self::directory_bytes(&nodes, 0).div_ceil(cb).max(1);
            nodes[0].cluster = allocate(count, &mut fat);
            assert_eq!(nodes[0].cluster, geo.root_cluster);
        } else {
            assert!(
                Self::directory_bytes(&nodes, 0) <= self.root_entry_count as usize * DIR_ENTRY_SIZE,
                "root directory overflows its region"
            );
        }

        for index in 1..nodes.len() {
            let count = match &nodes[index].content {
                Content::File(data) => data.len().div_ceil(cb),
                Content::Dir => Self::directory_bytes(&nodes, index).div_ceil(cb).max(1),
            };
            if count > 0 {
                nodes[index].cluster = allocate(count, &mut fat);
            }
        }

        let cluster_at = |cluster: u32| geo.cluster_to_sector(cluster) as usize * bps;
        for (index, node) in nodes.iter().enumerate() {
            let (at, bytes) = match &node.content {
                Content::Dir => {
                    let at = if index == 0 && !self.fat32 {
                        geo.root_dir_sector as usize * bps
                    } else {
                        cluster_at(node.cluster)
                    };
                    (at, Self::encode_directory(&nodes, index))
                }
                Content::File(data) if !data.is_empty() => (cluster_at(node.cluster), data.clone()),
                Content::File(_) => continue,
            };
            image[at..at + bytes.len()].copy_from_slice(&bytes);
        }

        for copy in 0..geo.fat_count as usize {
            let at = (geo.fat_start as usize + copy * geo.fat_size as usize) * bps;
            image[at..at + fat.len()].copy_from_slice(&fat);
        }
        image
    }
}

/// Numeric-tail alias ("TWOWIT~1TXT") for a name that is not valid 8.3
fn alias_for(name: &str, taken: &[[u8; 11]]) -> [u8; 11] {
    let (base, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot + 1..]),
        _ => (name, ""),
    };
    let clean = |s: &str, max: usize| -> Vec<u8> {
        s.bytes()
            .filter(|b| b.is_ascii_alphanumeric())
            .map(|b| b.to_ascii_uppercase())
            .take(max)
            .collect()
    };
    let mut base = clean(base, 6);
    if base.is_empty() {
        base = b"FILE".to_vec();
    }
    let ext = clean(ext, 3);

    for n in 1..10u8 {
        let mut short = [b' '; 11];
        short[..base.len()].copy_from_slice(&base);
        short[base.len()] = b'~';
        short[base.len() + 1] = b'0' + n;
        short[8..8 + ext.len()].copy_from_slice(&ext);
        if !taken.contains(&short) {
            return short;
        }
    }
    panic!("too many aliases for {}", name);
}
