use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for block-store operations.
///
/// Only [`StoreError::OutOfBounds`] is expected during normal operation (a
/// guest can program any 28-bit LBA it likes); the remaining variants are
/// host-side configuration or consistency failures and are fatal to the VM.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("block index out of bounds: block={block} block_count={block_count}")]
    OutOfBounds { block: u64, block_count: u64 },

    #[error("cannot open backing file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A positioned transfer moved fewer bytes than one block.
    ///
    /// The backing file's size is validated at open time, so a short transfer
    /// means the file changed underneath us and the store is no longer
    /// trustworthy.
    #[error("short transfer at block {block}: moved {moved} of {expected} bytes")]
    Truncated {
        block: u64,
        moved: usize,
        expected: usize,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
