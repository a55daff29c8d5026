//! File System Path Utilities
//!
//! Paths are absolute and `/`-separated. The first component names a mount
//! location and the rest is interpreted by the file system mounted there:
//!
//! - `/dev0` - root directory of the volume mounted at `dev0`
//! - `/dev0/dir/file.txt` - `dir/file.txt` inside that volume
//!
//! Parsing is pure: every call returns an owned list of components and keeps
//! no state between calls. Empty components (`//`) are ignored.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::vfs::FsStatus;

/// Maximum path length
pub const MAX_PATH: usize = 260;

/// Maximum path component length
pub const MAX_COMPONENT: usize = 255;

/// Path separator
pub const PATH_SEPARATOR: char = '/';

/// Parsed absolute path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPath {
    /// Path components, in order
    pub components: Vec<String>,
}

impl ParsedPath {
    /// Parse and validate an absolute path
    pub fn parse(path: &str) -> Result<Self, FsStatus> {
        if path.is_empty() || !path.starts_with(PATH_SEPARATOR) {
            return Err(FsStatus::InvalidPath);
        }
        if path.len() > MAX_PATH {
            return Err(FsStatus::InvalidPath);
        }

        let components: Vec<String> = split(path).into_iter().map(|s| s.to_string()).collect();
        if components.iter().any(|c| !is_valid_filename(c)) {
            return Err(FsStatus::InvalidPath);
        }

        Ok(Self { components })
    }

    /// Check for the bare root ("/")
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Leading component (the mount location)
    pub fn mount_location(&self) -> Option<&str> {
        self.components.first().map(|s| s.as_str())
    }

    /// Components below the mount location
    pub fn within_mount(&self) -> &[String] {
        self.components.get(1..).unwrap_or(&[])
    }

    /// Get the last component
    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Get the parent path
    pub fn parent(&self) -> Self {
        let mut components = self.components.clone();
        components.pop();
        Self { components }
    }

    /// Render back to "/a/b" form
    pub fn to_path_string(&self) -> String {
        join(self.components.iter().map(|s| s.as_str()))
    }
}

/// Split a path into its non-empty components
pub fn split(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Check whether a path is absolute
pub fn is_absolute(path: &str) -> bool {
    path.starts_with(PATH_SEPARATOR)
}

/// Join components into an absolute path ("/" when empty)
pub fn join<'a>(components: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for c in components {
        out.push(PATH_SEPARATOR);
        out.push_str(c);
    }
    if out.is_empty() {
        out.push(PATH_SEPARATOR);
    }
    out
}

/// Check if a single path component is acceptable
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_COMPONENT {
        return false;
    }
    !name.chars().any(|c| c == '\0' || c == PATH_SEPARATOR)
}
