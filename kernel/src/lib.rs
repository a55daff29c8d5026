//! Storage stack
//!
//! Virtual file system and FAT12/16/32 driver for the kernel, layered over a
//! sector-addressed block device contract.
//!
//! # Architecture Overview
//!
//! - **io** - block devices, the device table, RAM disks and character sinks
//! - **fs** - VFS dispatcher, mount table, descriptors, paths and the FAT driver
//!
//! # Initialization
//!
//! The kernel installs a `log` backend, calls [`fs::init`] with its console
//! and debug sinks, registers block devices with [`fs::add_device`] and mounts
//! them with [`fs::mount_device`].
//!
//! Outside of `cargo test` the crate is `no_std` and only needs `alloc`.

#![cfg_attr(not(test), no_std)]
// Kernel-specific lint configurations:
// - new_without_default: Kernel structs often have specific initialization requirements
// - len_without_is_empty: Fixed-capacity tables report occupancy, not emptiness
#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

extern crate alloc;

pub mod fs;
pub mod io;
