//! Error types for chunksync operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a synchronization session.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A local file could not be opened or created.
    #[error("Failed to open {}: {source}", path.display())]
    IoOpen {
        /// File that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Reading a local file failed partway.
    #[error("Failed to read {}: {source}", path.display())]
    IoRead {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Writing, seeking or removing a local file failed.
    #[error("Failed to write {}: {source}", path.display())]
    IoWrite {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Receiving from the channel failed, timed out, or hit end-of-stream early.
    #[error("Channel receive failed: {0}")]
    ChannelReceive(#[source] io::Error),

    /// Sending on the channel failed or timed out.
    #[error("Channel send failed: {0}")]
    ChannelSend(#[source] io::Error),

    /// Control message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Invalid or unparsable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Channel could not be established or prepared.
    #[error("Connection setup failed: {0}")]
    Connect(#[source] io::Error),

    /// Background worker running the session was cancelled or panicked.
    #[error("Session task aborted: {0}")]
    Task(String),
}

impl SyncError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoOpen {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Classify the error for state reporting.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::IoOpen { .. } => ErrorKind::IoOpen,
            Self::IoRead { .. } => ErrorKind::IoRead,
            Self::IoWrite { .. } => ErrorKind::IoWrite,
            Self::ChannelReceive(_) => ErrorKind::ChannelReceive,
            Self::ChannelSend(_) => ErrorKind::ChannelSend,
            Self::ProtocolError(_) => ErrorKind::Protocol,
            Self::Config(_) => ErrorKind::Config,
            Self::Connect(_) => ErrorKind::Connect,
            Self::Task(_) => ErrorKind::Task,
        }
    }
}

/// Coarse failure classification carried by a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Local file open/create failure.
    IoOpen,
    /// Local file read failure.
    IoRead,
    /// Local file write failure.
    IoWrite,
    /// Channel receive failure or premature closure.
    ChannelReceive,
    /// Channel send failure.
    ChannelSend,
    /// Malformed control message.
    Protocol,
    /// Invalid configuration.
    Config,
    /// Channel setup failure.
    Connect,
    /// Worker task aborted.
    Task,
}

/// Result type for chunksync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
