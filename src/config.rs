//! Session configuration.
//!
//! Everything that used to be a process-wide constant (chunk size, artifact
//! paths) lives here and is handed to each session explicitly.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::DIGEST_LEN;
use crate::error::{Result, SyncError};

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest accepted chunk size (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Default per-operation channel timeout in milliseconds.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 30_000;

/// Suffix appended to the local path for the compressed full-transfer blob.
pub const COMPRESSED_SUFFIX: &str = ".gz.part";

/// Suffix appended to the local path for the persisted bitmap.
pub const BITMAP_SUFFIX: &str = ".bitmap";

/// Encoding used for control messages on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// NUL-terminated sentinel strings and a raw bitmap-length byte.
    #[default]
    Legacy,
    /// Magic/length/type header followed by a bincode payload.
    Framed,
}

/// How the announced digest-table length is derived from the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestLength {
    /// `(size / chunk + 1)` digests; one extra empty-block digest on exact multiples.
    #[default]
    Legacy,
    /// `ceil(size / chunk)` digests.
    Exact,
}

impl DigestLength {
    /// Number of digests announced to the peer for a file of `file_size` bytes.
    #[must_use]
    pub const fn chunk_count(self, file_size: u64, chunk_size: usize) -> u64 {
        let chunk = chunk_size as u64;
        match self {
            Self::Legacy => file_size / chunk + 1,
            Self::Exact => file_size.div_ceil(chunk),
        }
    }

    /// Announced digest-table length in bytes.
    #[must_use]
    pub const fn table_len(self, file_size: u64, chunk_size: usize) -> u64 {
        self.chunk_count(file_size, chunk_size) * DIGEST_LEN as u64
    }
}

/// Configuration for a synchronization client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chunk size for digests, patches and receive buffers.
    pub chunk_size: usize,
    /// Control-message encoding.
    pub wire_format: WireFormat,
    /// Digest-table length policy.
    pub digest_length: DigestLength,
    /// Per-operation channel timeout; `None` waits forever.
    pub io_timeout_ms: Option<u64>,
    /// Compressed full-transfer artifact; derived from the local path if unset.
    pub compressed_path: Option<PathBuf>,
    /// Persisted bitmap artifact; derived from the local path if unset.
    pub bitmap_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            wire_format: WireFormat::default(),
            digest_length: DigestLength::default(),
            io_timeout_ms: Some(DEFAULT_IO_TIMEOUT_MS),
            compressed_path: None,
            bitmap_path: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns `IoOpen` if the file cannot be read and `Config` if it does not
    /// parse or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::open(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text does not parse or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(SyncError::Config(format!(
                "chunk_size must be 1-{MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.io_timeout_ms == Some(0) {
            return Err(SyncError::Config(
                "io_timeout_ms must be positive; omit it to wait forever".to_string(),
            ));
        }
        Ok(())
    }

    /// Channel timeout as a `Duration`.
    #[must_use]
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }

    /// Compressed artifact path for a given local file.
    #[must_use]
    pub fn compressed_path_for(&self, local: &Path) -> PathBuf {
        self.compressed_path
            .clone()
            .unwrap_or_else(|| with_suffix(local, COMPRESSED_SUFFIX))
    }

    /// Bitmap artifact path for a given local file.
    #[must_use]
    pub fn bitmap_path_for(&self, local: &Path) -> PathBuf {
        self.bitmap_path
            .clone()
            .unwrap_or_else(|| with_suffix(local, BITMAP_SUFFIX))
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
