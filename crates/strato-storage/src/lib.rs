//! Fixed-geometry block storage used by strato's emulated disk controller.
//!
//! The disk controller needs a *block-oriented* backend: it stages exactly one
//! 512-byte block at a time and asks the store to move it by index. This crate
//! provides:
//!
//! - [`BlockStore`]: the block read/write contract the controller programs against
//! - [`FileStore`]: a raw, headerless, file-backed store (block `i` at byte
//!   offset `i * 512`)
//! - [`MemStore`]: an in-memory store with access counters, used as a test
//!   double by the device models
//!
//! There is no caching layer: every call is a single positioned file transfer.
//! Guest disks targeted here are small enough that durability wins over
//! throughput.

mod error;
mod file;
mod mem;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use mem::MemStore;

/// Block (sector) size in bytes. The controller's data-register protocol and
/// the on-disk layout both assume this value.
pub const BLOCK_SIZE: usize = 512;

/// Block count used when a store is created without an explicit geometry.
pub const DEFAULT_BLOCK_COUNT: u64 = 4096;

/// Read/write-by-index contract implemented by every block backend.
///
/// Implementations must reject out-of-bounds indices with
/// [`StoreError::OutOfBounds`] before performing any I/O.
pub trait BlockStore: Send {
    /// Total number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Total store size in bytes (`block_count * BLOCK_SIZE`).
    fn size_bytes(&self) -> u64 {
        self.block_count() * BLOCK_SIZE as u64
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<()>;
    fn write_block(&mut self, block: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()>;

    /// Flush any buffered state to durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn check_bounds(block: u64, block_count: u64) -> Result<()> {
    if block >= block_count {
        return Err(StoreError::OutOfBounds { block, block_count });
    }
    Ok(())
}
