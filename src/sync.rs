//! Client entry point for chunk-level file synchronization.
//!
//! This module provides the `Synchronize` trait and the `SyncClient`
//! implementation that runs one [`SyncSession`] per call.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DigestLength, SyncConfig, WireFormat, MAX_CHUNK_SIZE};
use crate::error::Result;
use crate::session::{SyncOutcome, SyncSession};

/// Bring a local file up to date over a byte channel.
pub trait Synchronize {
    /// Synchronize `local_path` with the reference copy held by the peer at
    /// the other end of `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel, the local file, or an artifact fails.
    fn synchronize<C: Read + Write + ?Sized>(
        &self,
        channel: &mut C,
        local_path: &Path,
    ) -> Result<SyncOutcome>;
}

/// Builder for creating sync clients with custom configuration.
///
/// # Example
///
/// ```rust
/// use chunksync::{SyncBuilder, WireFormat};
///
/// let client = SyncBuilder::new()
///     .chunk_size(8192)
///     .wire_format(WireFormat::Framed)
///     .build();
/// assert_eq!(client.chunk_size(), 8192);
/// ```
#[derive(Debug, Clone)]
pub struct SyncBuilder {
    config: SyncConfig,
}

impl SyncBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    /// Set the chunk size used for digests and patches.
    ///
    /// Both ends must agree on this value.
    ///
    /// # Panics
    ///
    /// Panics if the size is zero or above 16 MiB.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        assert!(
            (1..=MAX_CHUNK_SIZE).contains(&size),
            "Chunk size must be 1-{MAX_CHUNK_SIZE}"
        );
        self.config.chunk_size = size;
        self
    }

    /// Set the control-message encoding.
    #[must_use]
    pub const fn wire_format(mut self, format: WireFormat) -> Self {
        self.config.wire_format = format;
        self
    }

    /// Set the digest-table length policy.
    #[must_use]
    pub const fn digest_length(mut self, policy: DigestLength) -> Self {
        self.config.digest_length = policy;
        self
    }

    /// Set the channel timeout; `None` waits forever.
    ///
    /// # Panics
    ///
    /// Panics if the timeout is zero.
    #[must_use]
    pub fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        let millis = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        assert!(millis != Some(0), "Timeout must be at least 1ms");
        self.config.io_timeout_ms = millis;
        self
    }

    /// Override where the compressed full-transfer stream is spooled.
    #[must_use]
    pub fn compressed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.compressed_path = Some(path.into());
        self
    }

    /// Override where the received bitmap is persisted.
    #[must_use]
    pub fn bitmap_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.bitmap_path = Some(path.into());
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> SyncClient {
        SyncClient {
            config: self.config,
        }
    }
}

impl Default for SyncBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Synchronization client.
///
/// Holds only configuration; each call to [`Synchronize::synchronize`] runs
/// an independent session, so one client may serve many connections.
#[derive(Debug, Clone)]
pub struct SyncClient {
    config: SyncConfig,
}

impl SyncClient {
    /// Create a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        SyncBuilder::new().build()
    }

    /// Create a client from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configured chunk size.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Synchronize for SyncClient {
    fn synchronize<C: Read + Write + ?Sized>(
        &self,
        channel: &mut C,
        local_path: &Path,
    ) -> Result<SyncOutcome> {
        SyncSession::new(channel, &self.config).synchronize(local_path)
    }
}
