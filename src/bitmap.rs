//! Packed change bitmap.
//!
//! Bit `j` (MSB = 7) of byte `i` marks chunk `i * 8 + (7 - j)`. Padding bits past
//! the real chunk count carry no meaning and are never inspected.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Bit-per-chunk record of which chunks differ from the reference copy.
///
/// # Example
///
/// ```rust
/// use chunksync::Bitmap;
///
/// let bitmap = Bitmap::encode(&[true, false, false, true]);
/// assert_eq!(bitmap.as_bytes(), &[0b1001_0000]);
/// assert!(bitmap.is_chunk_changed(3));
/// assert!(!bitmap.is_chunk_changed(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// Wrap raw bitmap bytes as received from the peer.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Bytes needed to cover `total_chunks` chunks.
    #[must_use]
    pub const fn required_len(total_chunks: usize) -> usize {
        total_chunks.div_ceil(8)
    }

    /// Pack one flag per chunk, MSB first. Padding bits are zero.
    #[must_use]
    pub fn encode(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; Self::required_len(bits.len())];
        for (index, &changed) in bits.iter().enumerate() {
            if changed {
                let (byte, bit) = chunk_position(index);
                bytes[byte] |= 1 << bit;
            }
        }
        Self { bytes }
    }

    /// Unpack `total_chunks` flags.
    ///
    /// Chunks past the end of the bitmap decode as unchanged.
    #[must_use]
    pub fn decode(&self, total_chunks: usize) -> Vec<bool> {
        (0..total_chunks).map(|i| self.is_chunk_changed(i)).collect()
    }

    /// Whether chunk `index` is marked as changed.
    #[must_use]
    pub fn is_chunk_changed(&self, index: usize) -> bool {
        let (byte, bit) = chunk_position(index);
        self.bytes.get(byte).is_some_and(|b| (b >> bit) & 1 == 1)
    }

    /// Changed chunk indices below `limit`, in wire order (byte 0.., bit 7..0).
    pub fn changed_chunks(&self, limit: usize) -> impl Iterator<Item = usize> + '_ {
        let covered = limit.min(self.bytes.len() * 8);
        (0..covered).filter(move |&i| self.is_chunk_changed(i))
    }

    /// Number of changed chunks below `limit`.
    #[must_use]
    pub fn count_changed(&self, limit: usize) -> usize {
        self.changed_chunks(limit).count()
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the bitmap has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Persist to a transient artifact, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `IoWrite` if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes).map_err(|e| SyncError::write(path, e))
    }

    /// Reload `len` bytes from an artifact written by [`Bitmap::save`].
    ///
    /// # Errors
    ///
    /// Returns `IoOpen` if the artifact is missing and `IoRead` if it holds
    /// fewer than `len` bytes.
    pub fn load(path: &Path, len: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| SyncError::open(path, e))?;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)
            .map_err(|e| SyncError::read(path, e))?;
        Ok(Self { bytes })
    }
}

/// Byte index and bit position (7 = MSB) of a chunk.
#[must_use]
pub const fn chunk_position(index: usize) -> (usize, u8) {
    #[allow(clippy::cast_possible_truncation)] // index % 8 < 8
    let bit = 7 - (index % 8) as u8;
    (index / 8, bit)
}

/// Chunk index for a byte index and bit position (7 = MSB).
#[must_use]
pub const fn chunk_index(byte: usize, bit: u8) -> usize {
    byte * 8 + (7 - bit as usize)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// decode(encode(bits)) recovers every real chunk flag.
        #[test]
        fn encode_decode_roundtrip(bits in prop::collection::vec(any::<bool>(), 0..600)) {
            let bitmap = Bitmap::encode(&bits);
            prop_assert_eq!(bitmap.len(), Bitmap::required_len(bits.len()));
            prop_assert_eq!(bitmap.decode(bits.len()), bits);
        }

        /// Chunk index <-> (byte, bit) is a bijection over the bitmap's range.
        #[test]
        fn position_bijection(len in 1usize..64) {
            let mut seen = vec![false; len * 8];
            for byte in 0..len {
                for bit in 0..8u8 {
                    let index = chunk_index(byte, bit);
                    prop_assert!(index < len * 8);
                    prop_assert!(!seen[index]);
                    seen[index] = true;
                    prop_assert_eq!(chunk_position(index), (byte, bit));
                }
            }
            prop_assert!(seen.iter().all(|&s| s));
        }

        /// Iteration yields exactly the set flags, ascending.
        #[test]
        fn changed_chunks_match_flags(bits in prop::collection::vec(any::<bool>(), 0..300)) {
            let bitmap = Bitmap::encode(&bits);
            let expected: Vec<usize> = bits
                .iter()
                .enumerate()
                .filter_map(|(i, &b)| b.then_some(i))
                .collect();
            let actual: Vec<usize> = bitmap.changed_chunks(bits.len()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
