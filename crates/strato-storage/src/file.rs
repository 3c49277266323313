use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::{check_bounds, Result, StoreError, BLOCK_SIZE};

/// Raw file-backed block store.
///
/// The backing file is a headerless block array; block `i` lives at byte
/// offset `i * BLOCK_SIZE`. The file's length must equal
/// `block_count * BLOCK_SIZE` at all times: if it does not at open time, the
/// store is considered corrupt and is rebuilt zero-filled to the expected
/// size before the first read or write.
pub struct FileStore {
    file: File,
    path: PathBuf,
    block_count: u64,
}

impl FileStore {
    /// Opens (or creates) the backing file for `block_count` blocks.
    ///
    /// A missing file, or an existing file whose length does not match the
    /// requested geometry, is truncated and re-extended so that its content
    /// is exactly `block_count * BLOCK_SIZE` zero bytes.
    pub fn open(path: impl AsRef<Path>, block_count: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;

        let expected = block_count * BLOCK_SIZE as u64;
        if file.metadata()?.len() != expected {
            // Rebuild rather than salvage: a partially-sized image has no
            // trustworthy content. Shrinking to zero first guarantees the
            // re-extended region reads back as zeros.
            file.set_len(0)?;
            file.set_len(expected)?;
        }

        Ok(Self {
            file,
            path,
            block_count,
        })
    }

    /// Opens the backing file with the default geometry
    /// ([`crate::DEFAULT_BLOCK_COUNT`] blocks).
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, crate::DEFAULT_BLOCK_COUNT)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn byte_offset(block: u64) -> u64 {
        block * BLOCK_SIZE as u64
    }
}

impl crate::BlockStore for FileStore {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, block: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        check_bounds(block, self.block_count)?;
        let moved = self.file.read_at(buf, Self::byte_offset(block))?;
        if moved != BLOCK_SIZE {
            return Err(StoreError::Truncated {
                block,
                moved,
                expected: BLOCK_SIZE,
            });
        }
        Ok(())
    }

    fn write_block(&mut self, block: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        check_bounds(block, self.block_count)?;
        let moved = self.file.write_at(buf, Self::byte_offset(block))?;
        if moved != BLOCK_SIZE {
            return Err(StoreError::Truncated {
                block,
                moved,
                expected: BLOCK_SIZE,
            });
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
