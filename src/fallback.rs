//! Whole-file transfer used when there is no usable local baseline.
//!
//! The peer streams a gzip-compressed copy of the reference file and closes the
//! channel. The stream is spooled to a local artifact first and decompressed
//! into the target afterwards, so a dropped connection never leaves a
//! half-decompressed target behind.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use tracing::{debug, trace};

use crate::channel::recv_some;
use crate::error::{Result, SyncError};

/// Compressed stream spooled to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlob {
    /// Artifact location.
    pub path: PathBuf,
    /// Compressed size in bytes.
    pub len: u64,
}

/// Receives and unpacks a full compressed copy.
#[derive(Debug, Clone)]
pub struct FullTransfer {
    chunk_size: usize,
    compressed_path: PathBuf,
    timeout: Option<Duration>,
}

impl FullTransfer {
    /// Create a full transfer spooling to `compressed_path`.
    #[must_use]
    pub fn new(chunk_size: usize, compressed_path: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size,
            compressed_path: compressed_path.into(),
            timeout: None,
        }
    }

    /// Set the per-receive channel timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spool the compressed stream until the peer closes the channel.
    ///
    /// Any previous artifact at the same path is truncated.
    ///
    /// # Errors
    ///
    /// Returns `IoOpen`/`IoWrite` for artifact failures and `ChannelReceive`
    /// if the channel fails or stalls past the timeout.
    pub fn receive_and_store<C: Read + ?Sized>(&self, channel: &mut C) -> Result<CompressedBlob> {
        let path = &self.compressed_path;
        let mut file = File::create(path).map_err(|e| SyncError::open(path, e))?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut len = 0u64;

        loop {
            let n = recv_some(channel, &mut buf, self.timeout)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| SyncError::write(path, e))?;
            len += n as u64;
            trace!(received = n, total = len, "compressed piece stored");
        }
        file.flush().map_err(|e| SyncError::write(path, e))?;

        debug!(path = %path.display(), len, "compressed stream complete");
        Ok(CompressedBlob {
            path: path.clone(),
            len,
        })
    }

    /// Decompress a spooled blob into `target`, replacing its contents.
    ///
    /// Returns the number of decompressed bytes written.
    ///
    /// # Errors
    ///
    /// Returns `IoOpen` if either file cannot be opened, `IoRead` if the blob
    /// is not valid gzip, and `IoWrite` if writing the target fails.
    pub fn decompress(&self, blob: &CompressedBlob, target: &Path) -> Result<u64> {
        let source = File::open(&blob.path).map_err(|e| SyncError::open(&blob.path, e))?;
        let mut output = File::create(target).map_err(|e| SyncError::open(target, e))?;
        let mut decoder = MultiGzDecoder::new(source);
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0u64;

        loop {
            let n = match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SyncError::read(&blob.path, e)),
            };
            output
                .write_all(&buf[..n])
                .map_err(|e| SyncError::write(target, e))?;
            written += n as u64;
        }
        output.flush().map_err(|e| SyncError::write(target, e))?;

        debug!(target = %target.display(), written, "decompressed full copy");
        Ok(written)
    }

    /// Receive, decompress into `target`, then delete the artifact.
    ///
    /// Returns `(compressed bytes received, bytes written)`. On failure the
    /// artifact is left in place.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`FullTransfer::receive_and_store`] and
    /// [`FullTransfer::decompress`]; returns `IoWrite` if the artifact cannot
    /// be removed.
    pub fn run<C: Read + ?Sized>(&self, channel: &mut C, target: &Path) -> Result<(u64, u64)> {
        let blob = self.receive_and_store(channel)?;
        let written = self.decompress(&blob, target)?;
        fs::remove_file(&blob.path).map_err(|e| SyncError::write(&blob.path, e))?;
        Ok((blob.len, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::scripted::{Event, ScriptedChannel};
    use crate::error::ErrorKind;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample() -> Vec<u8> {
        (0..20_000u32).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn three_uneven_pieces_reconstruct_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = sample();
        let compressed = gzip(&original);
        let (a, rest) = compressed.split_at(5);
        let (b, c) = rest.split_at(rest.len() / 3);

        let mut channel = ScriptedChannel::new([
            Event::Data(a.to_vec()),
            Event::Data(b.to_vec()),
            Event::WouldBlock,
            Event::Data(c.to_vec()),
        ]);
        let transfer = FullTransfer::new(512, dir.path().join("blob.gz"));
        let target = dir.path().join("target");

        let blob = transfer.receive_and_store(&mut channel).unwrap();
        assert_eq!(blob.len, compressed.len() as u64);

        let written = transfer.decompress(&blob, &target).unwrap();
        assert_eq!(written, original.len() as u64);
        assert_eq!(fs::read(&target).unwrap(), original);
    }

    #[test]
    fn run_replaces_longer_target_and_removes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::write(&target, vec![b'z'; 100]).unwrap();

        let blob_path = dir.path().join("blob.gz");
        let mut channel = ScriptedChannel::new([Event::Data(gzip(b"short"))]);
        let (received, written) = FullTransfer::new(64, &blob_path)
            .run(&mut channel, &target)
            .unwrap();

        assert!(received > 0);
        assert_eq!(written, 5);
        assert_eq!(fs::read(&target).unwrap(), b"short");
        assert!(!blob_path.exists());
    }

    #[test]
    fn concatenated_members_are_all_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream = gzip(b"first ");
        stream.extend(gzip(b"second"));

        let target = dir.path().join("target");
        FullTransfer::new(4, dir.path().join("blob.gz"))
            .run(&mut ScriptedChannel::new([Event::Data(stream)]), &target)
            .unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first second");
    }

    #[test]
    fn receive_failure_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("blob.gz");
        let mut channel = ScriptedChannel::new([Event::Data(vec![0x1f, 0x8b]), Event::Fail]);

        let err = FullTransfer::new(64, &blob_path)
            .run(&mut channel, &dir.path().join("target"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelReceive);
        assert!(blob_path.exists());
    }

    #[test]
    fn corrupt_stream_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = ScriptedChannel::new([Event::Data(b"not gzip at all".to_vec())]);

        let err = FullTransfer::new(64, dir.path().join("blob.gz"))
            .run(&mut channel, &dir.path().join("target"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoRead);
    }

    #[test]
    fn unwritable_artifact_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FullTransfer::new(64, dir.path().join("missing/dir/blob.gz"))
            .receive_and_store(&mut ScriptedChannel::new([]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoOpen);
    }
}
