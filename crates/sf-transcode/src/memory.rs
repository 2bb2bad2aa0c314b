//! Bump-allocated linear memory for engines that run natively.
//!
//! Addresses are offsets into a growable byte buffer. Address 0 is never
//! handed out so it can keep meaning "null". Individual allocations are not
//! freed; the whole arena is [`reset`](LinearMemory::reset) once an
//! invocation no longer needs its arguments.

use parking_lot::Mutex;

use crate::engine::EngineMemory;

/// First address handed out; everything below is reserved.
const BASE: usize = 8;

/// Allocation alignment.
const ALIGN: usize = 4;

/// Default upper bound on arena size.
pub const DEFAULT_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct LinearMemory {
    bytes: Mutex<Vec<u8>>,
    limit: usize,
}

impl LinearMemory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; BASE]),
            limit,
        }
    }

    /// Bytes currently in use, including the reserved prefix.
    pub fn used(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Release every allocation.
    pub fn reset(&self) {
        let mut bytes = self.bytes.lock();
        bytes.truncate(BASE);
        bytes.iter_mut().for_each(|b| *b = 0);
    }

    fn check_range(len: usize, ptr: u32, n: usize) -> sf_core::Result<usize> {
        let start = ptr as usize;
        if start < BASE || start.checked_add(n).map_or(true, |end| end > len) {
            return Err(sf_core::Error::Engine(format!(
                "memory access out of bounds: 0x{ptr:08x}+{n}"
            )));
        }
        Ok(start)
    }
}

impl Default for LinearMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMemory for LinearMemory {
    fn malloc(&self, size: usize) -> sf_core::Result<u32> {
        let mut bytes = self.bytes.lock();
        let start = bytes.len().next_multiple_of(ALIGN);
        let end = start + size.max(1);
        if end > self.limit || end > u32::MAX as usize {
            return Err(sf_core::Error::Engine(format!(
                "out of memory: cannot allocate {size} bytes ({} in use, limit {})",
                bytes.len(),
                self.limit
            )));
        }
        bytes.resize(end, 0);
        Ok(start as u32)
    }

    fn write(&self, ptr: u32, data: &[u8]) -> sf_core::Result<()> {
        let mut bytes = self.bytes.lock();
        let start = Self::check_range(bytes.len(), ptr, data.len())?;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, ptr: u32, len: usize) -> sf_core::Result<Vec<u8>> {
        let bytes = self.bytes.lock();
        let start = Self::check_range(bytes.len(), ptr, len)?;
        Ok(bytes[start..start + len].to_vec())
    }
}
