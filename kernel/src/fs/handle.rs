//! File descriptor table
//!
//! A fixed-size array of slots mapping descriptor numbers to an open node
//! and its cursor. The low `RESERVED_HANDLES` numbers belong to the
//! standard streams and are never handed out by `alloc`:
//!
//! | fd | stream                      |
//! |----|-----------------------------|
//! | 0  | input (always empty)        |
//! | 1  | console output              |
//! | 2  | console output (errors)     |
//! | 3  | debug port                  |

use alloc::vec::Vec;

use super::vfs::{FsStatus, Node};

/// Maximum number of open files, reserved slots included
pub const MAX_OPEN_FILES: usize = 32;

/// Descriptors below this number are standard streams
pub const RESERVED_HANDLES: usize = 4;

/// File descriptor
pub type Fd = usize;

pub const FD_STDIN: Fd = 0;
pub const FD_STDOUT: Fd = 1;
pub const FD_STDERR: Fd = 2;
pub const FD_DEBUG: Fd = 3;

/// Stream behind a reserved descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStream {
    Input,
    Console,
    Debug,
}

impl StdStream {
    /// Map a descriptor to its stream, if it is reserved
    pub fn of(fd: Fd) -> Option<Self> {
        match fd {
            FD_STDIN => Some(StdStream::Input),
            FD_STDOUT | FD_STDERR => Some(StdStream::Console),
            FD_DEBUG => Some(StdStream::Debug),
            _ => None,
        }
    }
}

/// Open file handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Node this descriptor was opened on
    pub node: Node,
    /// Current byte offset
    pub position: u64,
}

/// Descriptor table
pub struct HandleTable {
    slots: Vec<Option<FileHandle>>,
}

impl HandleTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_OPEN_FILES);
        slots.resize_with(MAX_OPEN_FILES, || None);
        Self { slots }
    }

    /// Bind a node to the lowest free descriptor
    pub fn alloc(&mut self, node: Node) -> Result<Fd, FsStatus> {
        let fd = self.slots[RESERVED_HANDLES..]
            .iter()
            .position(|s| s.is_none())
            .map(|i| i + RESERVED_HANDLES)
            .ok_or(FsStatus::TooManyFiles)?;

        self.slots[fd] = Some(FileHandle { node, position: 0 });
        Ok(fd)
    }

    /// Get an open, non-reserved descriptor
    pub fn get(&self, fd: Fd) -> Result<&FileHandle, FsStatus> {
        if fd < RESERVED_HANDLES {
            return Err(FsStatus::InvalidHandle);
        }
        self.slots
            .get(fd)
            .and_then(|s| s.as_ref())
            .ok_or(FsStatus::InvalidHandle)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut FileHandle, FsStatus> {
        if fd < RESERVED_HANDLES {
            return Err(FsStatus::InvalidHandle);
        }
        self.slots
            .get_mut(fd)
            .and_then(|s| s.as_mut())
            .ok_or(FsStatus::InvalidHandle)
    }

    /// Close a descriptor, releasing its node
    pub fn free(&mut self, fd: Fd) -> Result<FileHandle, FsStatus> {
        if fd < RESERVED_HANDLES {
            return Err(FsStatus::InvalidHandle);
        }
        self.slots
            .get_mut(fd)
            .and_then(|s| s.take())
            .ok_or(FsStatus::InvalidHandle)
    }

    /// Number of open descriptors
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Check whether any open descriptor belongs to a mount
    pub fn references_mount(&self, mount_id: u32) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|h| h.node.mount_id == mount_id)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
