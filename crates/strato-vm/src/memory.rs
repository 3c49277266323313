//! Guest-physical memory arena.

use core::fmt;

/// Errors returned by [`GuestMemory`] accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemoryError {
    /// The requested range is outside the guest physical memory size.
    OutOfRange { paddr: u64, len: usize, size: u64 },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfRange { paddr, len, size } => write!(
                f,
                "guest memory access out of range: paddr=0x{paddr:x} len={len} size=0x{size:x}"
            ),
        }
    }
}

impl std::error::Error for GuestMemoryError {}

/// Owned, zero-initialized guest physical memory.
///
/// The hypervisor-API layer registers the arena's backing bytes as the
/// guest's memory region; the loader and device code go through the checked
/// slice views instead of raw pointer offsets, so a guest-supplied address
/// can never read or write outside the arena.
pub struct GuestMemory {
    bytes: Vec<u8>,
}

impl GuestMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn check(&self, paddr: u64, len: usize) -> Result<usize, GuestMemoryError> {
        let start = usize::try_from(paddr).map_err(|_| GuestMemoryError::OutOfRange {
            paddr,
            len,
            size: self.size(),
        })?;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(GuestMemoryError::OutOfRange {
                paddr,
                len,
                size: self.size(),
            })?;
        Ok(end)
    }

    /// Bounds-checked read-only view of `[paddr, paddr + len)`.
    pub fn slice(&self, paddr: u64, len: usize) -> Result<&[u8], GuestMemoryError> {
        let end = self.check(paddr, len)?;
        Ok(&self.bytes[paddr as usize..end])
    }

    /// Bounds-checked mutable view of `[paddr, paddr + len)`.
    pub fn slice_mut(&mut self, paddr: u64, len: usize) -> Result<&mut [u8], GuestMemoryError> {
        let end = self.check(paddr, len)?;
        Ok(&mut self.bytes[paddr as usize..end])
    }

    pub fn read_into(&self, paddr: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        dst.copy_from_slice(self.slice(paddr, dst.len())?);
        Ok(())
    }

    pub fn write_from(&mut self, paddr: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        self.slice_mut(paddr, src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// The whole arena, for handing to the hypervisor-API layer as the
    /// guest's memory region.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
