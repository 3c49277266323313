use crate::{check_bounds, Result, BLOCK_SIZE};

/// In-memory block store.
///
/// Primarily a test double for the device models: it tracks how many read and
/// write calls reached it, so protocol tests can assert that a given register
/// sequence performed (or avoided) backend I/O.
pub struct MemStore {
    data: Vec<u8>,
    block_count: u64,
    reads: u64,
    writes: u64,
}

impl MemStore {
    pub fn new(block_count: u64) -> Self {
        Self {
            data: vec![0; block_count as usize * BLOCK_SIZE],
            block_count,
            reads: 0,
            writes: 0,
        }
    }

    /// Number of `read_block` calls that passed the bounds check.
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    /// Number of `write_block` calls that passed the bounds check.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Raw view of a block's current content.
    pub fn block(&self, block: u64) -> &[u8] {
        let start = block as usize * BLOCK_SIZE;
        &self.data[start..start + BLOCK_SIZE]
    }
}

impl crate::BlockStore for MemStore {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_bounds(block, self.block_count)?;
        self.reads += 1;
        let start = block as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, block: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        check_bounds(block, self.block_count)?;
        self.writes += 1;
        let start = block as usize * BLOCK_SIZE;
        self.data[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockStore, StoreError};

    #[test]
    fn round_trip_and_counters() {
        let mut store = MemStore::new(4);
        let pattern = [0x42u8; BLOCK_SIZE];

        store.write_block(2, &pattern).unwrap();
        let mut out = [0u8; BLOCK_SIZE];
        store.read_block(2, &mut out).unwrap();

        assert_eq!(out, pattern);
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn out_of_bounds_does_not_count_as_io() {
        let mut store = MemStore::new(1);
        let buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            store.write_block(1, &buf).unwrap_err(),
            StoreError::OutOfBounds { .. }
        ));
        assert_eq!(store.write_count(), 0);
    }
}
