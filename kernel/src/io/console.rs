//! Character sinks for the reserved descriptors
//!
//! Descriptors 1 and 2 write to the console text driver and descriptor 3
//! writes to the debug port. The drivers themselves live outside this crate;
//! they plug in by implementing [`CharDevice`].

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Byte-oriented output device
pub trait CharDevice: Send {
    /// Emit a single byte
    fn put_byte(&mut self, byte: u8);

    /// Emit a run of bytes, returning how many were consumed
    fn write_bytes(&mut self, data: &[u8]) -> usize {
        for &b in data {
            self.put_byte(b);
        }
        data.len()
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDevice;

impl CharDevice for NullDevice {
    fn put_byte(&mut self, _byte: u8) {}
}

/// Sink that records output in a shared buffer.
///
/// Clones share the same buffer, so a caller can keep one handle and give
/// the other to the VFS.
#[derive(Debug, Default, Clone)]
pub struct CaptureDevice {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Discard recorded output
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl CharDevice for CaptureDevice {
    fn put_byte(&mut self, byte: u8) {
        self.buffer.lock().push(byte);
    }

    fn write_bytes(&mut self, data: &[u8]) -> usize {
        self.buffer.lock().extend_from_slice(data);
        data.len()
    }
}
