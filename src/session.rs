//! One synchronization of one file over one channel.
//!
//! ```text
//! Init ─► StatusSent ─┬─► AwaitingFullTransfer ─────────────────────────────► Done
//!                     └─► DigestsSent ─► BitmapReceived ─► PatchApplied ─► Done
//! any I/O failure ─► Failed(kind)
//! ```

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bitmap::Bitmap;
use crate::channel::{recv_exact, send_all};
use crate::config::SyncConfig;
use crate::digest::{DigestTable, DIGEST_LEN};
use crate::error::{ErrorKind, Result, SyncError};
use crate::fallback::FullTransfer;
use crate::patch::PatchWriter;
use crate::protocol::{Codec, Message};

/// How the local file is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Receive and decompress the whole file.
    FullTransfer,
    /// Exchange digests and patch changed chunks in place.
    IncrementalTransfer,
}

impl TransferMode {
    /// Pick the mode for a local file of `local_size` bytes (`None` if absent).
    ///
    /// Files no larger than one chunk are not worth diffing.
    #[must_use]
    pub const fn select(local_size: Option<u64>, chunk_size: usize) -> Self {
        match local_size {
            Some(size) if size > chunk_size as u64 => Self::IncrementalTransfer,
            _ => Self::FullTransfer,
        }
    }
}

/// Session progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet.
    Init,
    /// Local status (sentinel or digest length) sent.
    StatusSent,
    /// Waiting for the compressed full copy.
    AwaitingFullTransfer,
    /// Digest table sent.
    DigestsSent,
    /// Bitmap received, persisted and acknowledged.
    BitmapReceived,
    /// All changed chunks written.
    PatchApplied,
    /// Finished successfully.
    Done,
    /// Aborted by an error of this kind.
    Failed(ErrorKind),
}

impl SessionState {
    /// Whether the session can make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// Summary of a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Mode that was used.
    pub mode: TransferMode,
    /// Local file size before the session, `None` if it was absent.
    pub local_size: Option<u64>,
    /// Payload bytes received (compressed bytes or chunk bytes).
    pub bytes_received: u64,
    /// Bytes written to the local file.
    pub bytes_written: u64,
    /// Chunks overwritten by an incremental transfer.
    pub chunks_patched: usize,
}

/// Drives one file synchronization over a borrowed channel.
///
/// The session owns no shared state; run one per connection on whatever
/// thread or task the caller likes.
#[derive(Debug)]
pub struct SyncSession<'a, C: ?Sized> {
    channel: &'a mut C,
    config: &'a SyncConfig,
    codec: Codec,
    state: SessionState,
}

impl<'a, C: Read + Write + ?Sized> SyncSession<'a, C> {
    /// Create a session over `channel`.
    #[must_use]
    pub fn new(channel: &'a mut C, config: &'a SyncConfig) -> Self {
        let codec = Codec::new(config.wire_format).with_timeout(config.io_timeout());
        Self {
            channel,
            config,
            codec,
            state: SessionState::Init,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Bring `local_path` in line with the peer's reference copy.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the session is then in
    /// [`SessionState::Failed`]. A session runs once: calling this again
    /// returns `ProtocolError` and leaves the finished state untouched.
    pub fn synchronize(&mut self, local_path: &Path) -> Result<SyncOutcome> {
        if self.state != SessionState::Init {
            return Err(SyncError::ProtocolError(format!(
                "Session already used (state {:?})",
                self.state
            )));
        }

        let result = self.run(local_path);
        match &result {
            Ok(outcome) => info!(
                path = %local_path.display(),
                mode = ?outcome.mode,
                received = outcome.bytes_received,
                written = outcome.bytes_written,
                chunks = outcome.chunks_patched,
                "sync complete"
            ),
            Err(e) => {
                self.state = SessionState::Failed(e.kind());
                warn!(path = %local_path.display(), error = %e, "sync failed");
            }
        }
        result
    }

    fn run(&mut self, local_path: &Path) -> Result<SyncOutcome> {
        self.config.validate()?;
        let local_size = fs::metadata(local_path)
            .ok()
            .filter(fs::Metadata::is_file)
            .map(|m| m.len());
        let mode = TransferMode::select(local_size, self.config.chunk_size);
        info!(path = %local_path.display(), ?local_size, ?mode, "sync started");

        match mode {
            TransferMode::FullTransfer => self.full_transfer(local_path, local_size),
            TransferMode::IncrementalTransfer => {
                // select() only yields incremental for an existing file.
                let size = local_size.unwrap_or_default();
                self.incremental_transfer(local_path, size)
            }
        }
    }

    fn full_transfer(&mut self, local_path: &Path, local_size: Option<u64>) -> Result<SyncOutcome> {
        self.codec.write_message(self.channel, &Message::NoLocalFile)?;
        self.state = SessionState::StatusSent;
        debug!("requested full transfer");
        self.state = SessionState::AwaitingFullTransfer;

        let transfer = FullTransfer::new(
            self.config.chunk_size,
            self.config.compressed_path_for(local_path),
        )
        .with_timeout(self.timeout());
        let (bytes_received, bytes_written) = transfer.run(self.channel, local_path)?;

        self.state = SessionState::Done;
        Ok(SyncOutcome {
            mode: TransferMode::FullTransfer,
            local_size,
            bytes_received,
            bytes_written,
            chunks_patched: 0,
        })
    }

    fn incremental_transfer(&mut self, local_path: &Path, size: u64) -> Result<SyncOutcome> {
        let chunk_size = self.config.chunk_size;
        let policy = self.config.digest_length;
        let wire_len = policy.table_len(size, chunk_size);
        let table_len = usize::try_from(wire_len).map_err(|_| {
            SyncError::ProtocolError(format!(
                "Digest table of {wire_len} bytes exceeds address space"
            ))
        })?;
        let announced = table_len / DIGEST_LEN;
        let timeout = self.timeout();

        self.codec
            .write_message(self.channel, &Message::DigestLength { len: wire_len })?;
        self.state = SessionState::StatusSent;
        debug!(table_len, chunks = announced, "announced digest table");

        let bitmap_len = self.codec.read_bitmap_length(self.channel, chunk_size)?;
        debug!(bitmap_len, "peer announced bitmap length");
        let max_bitmap_len = Bitmap::required_len(announced);
        if bitmap_len > max_bitmap_len {
            return Err(SyncError::ProtocolError(format!(
                "Bitmap length {bitmap_len} exceeds {max_bitmap_len} bytes for {announced} chunks"
            )));
        }

        {
            let mut table = DigestTable::compute_file(local_path, chunk_size)?;
            table.pad_to(announced);
            send_all(self.channel, &table.as_bytes()[..table_len], timeout)?;
        }
        self.state = SessionState::DigestsSent;
        debug!("sent digest table");

        let bitmap_path = self.config.bitmap_path_for(local_path);
        let mut raw = vec![0u8; bitmap_len];
        recv_exact(self.channel, &mut raw, timeout)?;
        let received = Bitmap::from_bytes(raw);
        debug!(bitmap = %hex::encode(received.as_bytes()), "received bitmap");
        received.save(&bitmap_path)?;
        self.codec.write_message(self.channel, &Message::Ack)?;
        self.state = SessionState::BitmapReceived;

        let bitmap = Bitmap::load(&bitmap_path, bitmap_len)?;
        let (chunks_patched, bytes_written) = self.apply_patch(local_path, &bitmap, announced)?;
        self.state = SessionState::PatchApplied;

        fs::remove_file(&bitmap_path).map_err(|e| SyncError::write(&bitmap_path, e))?;
        self.state = SessionState::Done;

        Ok(SyncOutcome {
            mode: TransferMode::IncrementalTransfer,
            local_size: Some(size),
            bytes_received: bytes_written,
            bytes_written,
            chunks_patched,
        })
    }

    fn apply_patch(
        &mut self,
        local_path: &Path,
        bitmap: &Bitmap,
        chunk_count: usize,
    ) -> Result<(usize, u64)> {
        let chunk_size = self.config.chunk_size;
        let timeout = self.timeout();
        let mut writer = PatchWriter::open(local_path, chunk_size)?;
        let mut buf = vec![0u8; chunk_size];
        let changed = bitmap.count_changed(chunk_count);
        debug!(changed, "receiving changed chunks");

        for index in bitmap.changed_chunks(chunk_count) {
            recv_exact(self.channel, &mut buf, timeout)?;
            writer.apply(index, &buf)?;
        }
        writer.finish()
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.io_timeout()
    }
}
