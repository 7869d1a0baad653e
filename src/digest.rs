//! Per-chunk MD5 digests.
//!
//! The digest table is the client's summary of its local copy: one 16-byte
//! fingerprint per fixed-size chunk, concatenated in chunk order. The peer
//! compares it against its reference copy to decide which chunks to resend.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{Result, SyncError};

/// Length of a single chunk digest in bytes.
pub const DIGEST_LEN: usize = 16;

/// 128-bit fingerprint of one chunk.
///
/// # Example
///
/// ```rust
/// use chunksync::ChunkDigest;
///
/// let a = ChunkDigest::compute(b"chunk");
/// let b = ChunkDigest::compute(b"chunk");
/// assert_eq!(a, b);
/// assert_ne!(a, ChunkDigest::compute(b"other"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDigest([u8; DIGEST_LEN]);

impl ChunkDigest {
    /// Digest a block of bytes.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Md5::digest(data));
        Self(out)
    }

    /// Digest of a zero-length block.
    #[must_use]
    pub fn empty() -> Self {
        Self::compute(&[])
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkDigest({})", self.to_hex())
    }
}

/// Ordered digests for every chunk of a file, stored contiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestTable {
    chunk_size: usize,
    bytes: Vec<u8>,
}

impl DigestTable {
    /// Create an empty table.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            bytes: Vec::new(),
        }
    }

    /// Digest a reader chunk by chunk.
    ///
    /// Each chunk is filled completely before it is hashed so that short reads
    /// never split a chunk; only the final chunk may be shorter.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if a read fails.
    pub fn compute<R: Read>(reader: &mut R, chunk_size: usize) -> io::Result<Self> {
        let mut table = Self::new(chunk_size);
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let filled = fill(reader, &mut buffer)?;
            if filled == 0 {
                break;
            }
            table.push(ChunkDigest::compute(&buffer[..filled]));
            if filled < chunk_size {
                break;
            }
        }

        Ok(table)
    }

    /// Digest a file on disk.
    ///
    /// # Errors
    ///
    /// Returns `IoOpen` if the file cannot be opened and `IoRead` if a read
    /// fails partway; no partial table is returned.
    pub fn compute_file(path: &Path, chunk_size: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| SyncError::open(path, e))?;
        Self::compute(&mut file, chunk_size).map_err(|e| SyncError::read(path, e))
    }

    /// Append a digest.
    pub fn push(&mut self, digest: ChunkDigest) {
        self.bytes.extend_from_slice(digest.as_bytes());
    }

    /// Extend the table with empty-block digests up to `count` entries.
    ///
    /// Tables already at or beyond `count` are left unchanged.
    pub fn pad_to(&mut self, count: usize) {
        let empty = ChunkDigest::empty();
        while self.len() < count {
            self.push(empty);
        }
    }

    /// Digest of chunk `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ChunkDigest> {
        let start = index.checked_mul(DIGEST_LEN)?;
        let slice = self.bytes.get(start..start + DIGEST_LEN)?;
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(slice);
        Some(ChunkDigest(out))
    }

    /// Iterate digests in chunk order.
    pub fn iter(&self) -> impl Iterator<Item = ChunkDigest> + '_ {
        self.bytes.chunks_exact(DIGEST_LEN).map(|c| {
            let mut out = [0u8; DIGEST_LEN];
            out.copy_from_slice(c);
            ChunkDigest(out)
        })
    }

    /// Number of digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len() / DIGEST_LEN
    }

    /// Whether the table has no digests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Chunk size the table was computed with.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Concatenated digest bytes, `len() * 16` long.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
