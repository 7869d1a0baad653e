//! In-place chunk patching of the local file.
//!
//! Writes go straight to their final offset; a crash mid-patch leaves a mix of
//! old and new chunks.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, SyncError};

/// Overwrites whole chunks of an existing file at `index * chunk_size`.
#[derive(Debug)]
pub struct PatchWriter {
    file: File,
    path: PathBuf,
    chunk_size: usize,
    chunks_written: usize,
    bytes_written: u64,
}

impl PatchWriter {
    /// Open an existing file for in-place patching.
    ///
    /// # Errors
    ///
    /// Returns `IoOpen` if the file cannot be opened read/write.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SyncError::open(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            chunk_size,
            chunks_written: 0,
            bytes_written: 0,
        })
    }

    /// Overwrite chunk `index` with `data`.
    ///
    /// Applying the same bytes to the same index again leaves the file unchanged.
    ///
    /// # Errors
    ///
    /// Returns `IoWrite` if seeking or writing fails.
    pub fn apply(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let offset = (index as u64)
            .checked_mul(self.chunk_size as u64)
            .ok_or_else(|| {
                SyncError::write(
                    &self.path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("chunk {index} offset overflows"),
                    ),
                )
            })?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| SyncError::write(&self.path, e))?;
        self.file
            .write_all(data)
            .map_err(|e| SyncError::write(&self.path, e))?;

        self.chunks_written += 1;
        self.bytes_written += data.len() as u64;
        trace!(index, offset, len = data.len(), "chunk patched");
        Ok(())
    }

    /// Flush buffered writes and report `(chunks, bytes)` written.
    ///
    /// # Errors
    ///
    /// Returns `IoWrite` if the flush fails.
    pub fn finish(mut self) -> Result<(usize, u64)> {
        self.file
            .flush()
            .map_err(|e| SyncError::write(&self.path, e))?;
        Ok((self.chunks_written, self.bytes_written))
    }
}
