//! FAT Directory Entries
//!
//! Directory entries are 32 bytes each. There are two types:
//! - Short (8.3) entries: Standard file/directory entries
//! - Long File Name (LFN) entries: Store Unicode long filenames
//!
//! # Short Entry Layout
//! - Bytes 0-10: Short name (8.3 format, space-padded)
//! - Byte 11: Attributes
//! - Byte 12: Reserved (NT)
//! - Byte 13: Creation time (tenths of second)
//! - Bytes 14-15: Creation time
//! - Bytes 16-17: Creation date
//! - Bytes 18-19: Last access date
//! - Bytes 20-21: High 16 bits of first cluster (FAT32)
//! - Bytes 22-23: Modification time
//! - Bytes 24-25: Modification date
//! - Bytes 26-27: Low 16 bits of first cluster
//! - Bytes 28-31: File size
//!
//! # LFN Entry Layout
//! - Byte 0: Sequence number (0x40 flag set on the last entry)
//! - Bytes 1-10: Characters 1-5 (UTF-16LE)
//! - Byte 11: Attributes (always 0x0F)
//! - Byte 12: Type (always 0)
//! - Byte 13: Checksum of the short name
//! - Bytes 14-25: Characters 6-11 (UTF-16LE)
//! - Bytes 26-27: First cluster (always 0)
//! - Bytes 28-31: Characters 12-13 (UTF-16LE)

use alloc::string::String;
use alloc::vec::Vec;

use super::{put_u16, put_u32, read_u16, read_u32};

/// Directory entry size
pub const DIR_ENTRY_SIZE: usize = 32;

/// Characters per LFN entry
pub const LFN_CHARS_PER_ENTRY: usize = 13;

/// Sequence flag marking the last (first stored) LFN entry
pub const LFN_LAST_ENTRY: u8 = 0x40;

/// Mask extracting the sequence number
pub const LFN_SEQUENCE_MASK: u8 = 0x1F;

/// First-byte markers of a short entry
pub mod entry_status {
    /// Entry is free and so is every entry after it
    pub const END: u8 = 0x00;
    /// Entry was deleted
    pub const DELETED: u8 = 0xE5;
    /// Stored in place of a leading 0xE5 name byte
    pub const KANJI: u8 = 0x05;
    /// "." or ".." entry
    pub const DOT: u8 = 0x2E;
}

bitflags::bitflags! {
    /// Short entry attribute byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        /// Combination marking an LFN entry
        const LONG_NAME = Self::READ_ONLY.bits()
            | Self::HIDDEN.bits()
            | Self::SYSTEM.bits()
            | Self::VOLUME_ID.bits();
    }
}

/// Check whether a raw attribute byte marks an LFN entry
pub fn is_long_name_record(attr: u8) -> bool {
    attr == FileAttributes::LONG_NAME.bits()
}

/// Short (8.3) directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortEntry {
    /// Short name: 8 bytes base + 3 bytes extension, space-padded
    pub name: [u8; 11],
    pub attributes: FileAttributes,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub access_date: u16,
    pub cluster_high: u16,
    pub modify_time: u16,
    pub modify_date: u16,
    pub cluster_low: u16,
    pub file_size: u32,
}

impl ShortEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[0..11]);
        Self {
            name,
            attributes: FileAttributes::from_bits_retain(raw[11]),
            nt_reserved: raw[12],
            create_time_tenth: raw[13],
            create_time: read_u16(raw, 14),
            create_date: read_u16(raw, 16),
            access_date: read_u16(raw, 18),
            cluster_high: read_u16(raw, 20),
            modify_time: read_u16(raw, 22),
            modify_date: read_u16(raw, 24),
            cluster_low: read_u16(raw, 26),
            file_size: read_u32(raw, 28),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attributes.bits();
        raw[12] = self.nt_reserved;
        raw[13] = self.create_time_tenth;
        put_u16(raw, 14, self.create_time);
        put_u16(raw, 16, self.create_date);
        put_u16(raw, 18, self.access_date);
        put_u16(raw, 20, self.cluster_high);
        put_u16(raw, 22, self.modify_time);
        put_u16(raw, 24, self.modify_date);
        put_u16(raw, 26, self.cluster_low);
        put_u32(raw, 28, self.file_size);
    }

    /// Get the first cluster number
    pub fn first_cluster(&self) -> u32 {
        ((self.cluster_high as u32) << 16) | (self.cluster_low as u32)
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_volume_label(&self) -> bool {
        self.attributes.contains(FileAttributes::VOLUME_ID)
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes.contains(FileAttributes::READ_ONLY)
    }

    /// Check for "." or ".."
    pub fn is_dot_entry(&self) -> bool {
        self.name == *b".          " || self.name == *b"..         "
    }

    /// Display form of the short name ("README.TXT")
    pub fn display_name(&self) -> String {
        long_name_of(&self.name)
    }
}

/// Long file name entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LongNameEntry {
    /// Sequence number, 0x40 set on the last entry
    pub order: u8,
    pub name1: [u16; 5],
    pub attributes: u8,
    pub entry_type: u8,
    /// Checksum of the short name this entry belongs to
    pub checksum: u8,
    pub name2: [u16; 6],
    pub first_cluster: u16,
    pub name3: [u16; 2],
}

impl LongNameEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let mut entry = Self {
            order: raw[0],
            attributes: raw[11],
            entry_type: raw[12],
            checksum: raw[13],
            first_cluster: read_u16(raw, 26),
            ..Self::default()
        };
        for (i, c) in entry.name1.iter_mut().enumerate() {
            *c = read_u16(raw, 1 + i * 2);
        }
        for (i, c) in entry.name2.iter_mut().enumerate() {
            *c = read_u16(raw, 14 + i * 2);
        }
        for (i, c) in entry.name3.iter_mut().enumerate() {
            *c = read_u16(raw, 28 + i * 2);
        }
        entry
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0] = self.order;
        for (i, &c) in self.name1.iter().enumerate() {
            put_u16(raw, 1 + i * 2, c);
        }
        raw[11] = self.attributes;
        raw[12] = self.entry_type;
        raw[13] = self.checksum;
        for (i, &c) in self.name2.iter().enumerate() {
            put_u16(raw, 14 + i * 2, c);
        }
        put_u16(raw, 26, self.first_cluster);
        for (i, &c) in self.name3.iter().enumerate() {
            put_u16(raw, 28 + i * 2, c);
        }
    }

    /// Sequence number (1-based)
    pub fn sequence(&self) -> u8 {
        self.order & LFN_SEQUENCE_MASK
    }

    pub fn is_last(&self) -> bool {
        self.order & LFN_LAST_ENTRY != 0
    }

    /// The 13 UTF-16 code units carried by this entry, in order
    pub fn chars(&self) -> [u16; LFN_CHARS_PER_ENTRY] {
        let mut out = [0u16; LFN_CHARS_PER_ENTRY];
        out[..5].copy_from_slice(&self.name1);
        out[5..11].copy_from_slice(&self.name2);
        out[11..].copy_from_slice(&self.name3);
        out
    }

    /// Build the entry carrying units `[13 * (seq - 1) ..]` of `units`
    pub fn for_units(units: &[u16], seq: u8, last: bool, checksum: u8) -> Self {
        let start = (seq as usize - 1) * LFN_CHARS_PER_ENTRY;
        let mut chunk = [0xFFFFu16; LFN_CHARS_PER_ENTRY];
        for (i, slot) in chunk.iter_mut().enumerate() {
            match units.get(start + i) {
                Some(&u) => *slot = u,
                None if start + i == units.len() => *slot = 0x0000,
                None => break,
            }
        }

        let mut entry = Self {
            order: seq | if last { LFN_LAST_ENTRY } else { 0 },
            attributes: FileAttributes::LONG_NAME.bits(),
            checksum,
            ..Self::default()
        };
        entry.name1.copy_from_slice(&chunk[..5]);
        entry.name2.copy_from_slice(&chunk[5..11]);
        entry.name3.copy_from_slice(&chunk[11..]);
        entry
    }
}

/// Calculate the LFN checksum of an 11-byte short name
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in short_name.iter() {
        sum = sum.rotate_right(1).wrapping_add(b);
    }
    sum
}

/// Stitch a long name together from its LFN entries.
///
/// Entries may be given in any order; they are sorted by sequence number.
/// Assembly stops at the first 0x0000 terminator or 0xFFFF pad.
pub fn reassemble_long_name(entries: &[LongNameEntry]) -> String {
    let mut sorted: Vec<&LongNameEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.sequence());

    let mut units: Vec<u16> = Vec::with_capacity(sorted.len() * LFN_CHARS_PER_ENTRY);
    'entries: for entry in sorted {
        for c in entry.chars() {
            if c == 0x0000 || c == 0xFFFF {
                break 'entries;
            }
            units.push(c);
        }
    }

    core::char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Convert a path segment to its 11-byte short name.
///
/// The base is everything before the first period and the extension up to
/// three characters after it; both are uppercased and space-padded.
pub fn short_name_of(segment: &str) -> [u8; 11] {
    let mut name = [b' '; 11];

    if segment == "." || segment == ".." {
        name[..segment.len()].copy_from_slice(segment.as_bytes());
        return name;
    }

    let (base, ext) = match segment.find('.') {
        Some(dot) => (&segment[..dot], &segment[dot + 1..]),
        None => (segment, ""),
    };

    for (slot, b) in name[..8].iter_mut().zip(base.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    for (slot, b) in name[8..].iter_mut().zip(ext.bytes()) {
        *slot = b.to_ascii_uppercase();
    }

    if name[0] == entry_status::DELETED {
        name[0] = entry_status::KANJI;
    }
    name
}

/// Convert an 11-byte short name to display form ("README.TXT")
pub fn long_name_of(short: &[u8; 11]) -> String {
    let trim = |field: &[u8]| -> usize {
        field.iter().rposition(|&b| b != b' ').map(|p| p + 1).unwrap_or(0)
    };

    let base_len = trim(&short[..8]);
    let ext_len = trim(&short[8..]);

    let mut out = String::with_capacity(12);
    for (i, &b) in short[..base_len].iter().enumerate() {
        let b = if i == 0 && b == entry_status::KANJI {
            entry_status::DELETED
        } else {
            b
        };
        out.push(b as char);
    }
    if ext_len > 0 {
        out.push('.');
        out.extend(short[8..8 + ext_len].iter().map(|&b| b as char));
    }
    out
}

/// Check whether a segment can be matched against a short name
pub fn fits_short_name(segment: &str) -> bool {
    if segment == "." || segment == ".." {
        return true;
    }
    if !segment.is_ascii() {
        return false;
    }
    let (base, ext) = match segment.find('.') {
        Some(dot) => (&segment[..dot], &segment[dot + 1..]),
        None => (segment, ""),
    };
    !base.is_empty() && base.len() <= 8 && ext.len() <= 3 && !ext.contains('.')
}

/// Decoded directory record: a short entry plus its long name, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub entry: ShortEntry,
    pub long_name: Option<String>,
}

impl DirRecord {
    /// Preferred display name
    pub fn name(&self) -> String {
        match &self.long_name {
            Some(name) => name.clone(),
            None => self.entry.display_name(),
        }
    }

    /// Case-insensitive match of a path segment against this record
    pub fn matches(&self, segment: &str) -> bool {
        if let Some(long) = &self.long_name {
            if long.eq_ignore_ascii_case(segment) {
                return true;
            }
        }
        fits_short_name(segment) && short_name_of(segment) == self.entry.name
    }
}

/// Take the pending LFN run for `entry`, if it is well formed
fn take_long_name(pending: &mut Vec<LongNameEntry>, entry: &ShortEntry) -> Option<String> {
    if pending.is_empty() {
        return None;
    }

    let run = core::mem::take(pending);
    let head = run[0];
    let expected = head.sequence() as usize;
    let checksum = lfn_checksum(&entry.name);

    let contiguous = run.len() == expected
        && run
            .iter()
            .enumerate()
            .all(|(i, e)| e.sequence() as usize == expected - i);

    if !head.is_last() || !contiguous {
        log::debug!("[FAT] Discarding broken LFN run before {:?}", entry.display_name());
        return None;
    }
    if run.iter().any(|e| e.checksum != checksum) {
        log::debug!("[FAT] LFN checksum mismatch for {:?}", entry.display_name());
        return None;
    }

    Some(reassemble_long_name(&run))
}

/// Decode a raw directory buffer into records.
///
/// Deleted entries and volume labels are skipped; decoding stops at the
/// first end marker. "." and ".." are kept so that they stay resolvable.
pub fn decode_directory(buf: &[u8]) -> Vec<DirRecord> {
    let mut records = Vec::new();
    let mut pending: Vec<LongNameEntry> = Vec::new();

    for raw in buf.chunks_exact(DIR_ENTRY_SIZE) {
        match raw[0] {
            entry_status::END => break,
            entry_status::DELETED => {
                pending.clear();
                continue;
            }
            _ => {}
        }

        if is_long_name_record(raw[11]) {
            let lfn = LongNameEntry::parse(raw);
            if lfn.is_last() {
                pending.clear();
            }
            pending.push(lfn);
            continue;
        }

        let entry = ShortEntry::parse(raw);
        if entry.is_volume_label() {
            pending.clear();
            continue;
        }

        let long_name = take_long_name(&mut pending, &entry);
        records.push(DirRecord { entry, long_name });
    }

    records
}

/// Check whether a buffer contains the end-of-directory marker
pub fn has_end_marker(buf: &[u8]) -> bool {
    buf.chunks_exact(DIR_ENTRY_SIZE)
        .any(|raw| raw[0] == entry_status::END)
}
