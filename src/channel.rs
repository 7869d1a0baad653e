//! Blocking channel helpers with short-read/short-write handling.
//!
//! A channel is any `Read + Write` byte stream. `Ok(0)` from a read is the
//! channel's own end-of-stream signal and is the only thing treated as closure.
//! `Interrupted` is retried at once; `WouldBlock` and `TimedOut` mean "no data
//! yet" and are retried until nothing has moved for the configured timeout.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{Result, SyncError};

/// Pause between polls while a channel reports no data.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Tracks how long a channel operation has gone without progress.
struct Stall {
    timeout: Option<Duration>,
    since: Instant,
}

impl Stall {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            since: Instant::now(),
        }
    }

    fn progressed(&mut self) {
        self.since = Instant::now();
    }

    /// Back off once, or fail if the stall outlasted the timeout.
    fn wait(&self, what: &str) -> io::Result<()> {
        if let Some(timeout) = self.timeout {
            if self.since.elapsed() >= timeout {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{what} stalled for {timeout:?}"),
                ));
            }
        }
        thread::sleep(IDLE_BACKOFF);
        Ok(())
    }
}

const fn is_idle(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Receive up to `buf.len()` bytes.
///
/// Returns `Ok(0)` only when the channel reached end-of-stream.
///
/// # Errors
///
/// Returns `ChannelReceive` on a read error or when no data arrives within
/// `timeout`.
pub fn recv_some<C: Read + ?Sized>(
    channel: &mut C,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let stall = Stall::new(timeout);
    loop {
        match channel.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => {
                stall.wait("receive").map_err(SyncError::ChannelReceive)?;
            }
            Err(e) => return Err(SyncError::ChannelReceive(e)),
        }
    }
}

/// Receive exactly `buf.len()` bytes, accumulating short reads.
///
/// # Errors
///
/// Returns `ChannelReceive` on a read error, a stall longer than `timeout`, or
/// if the channel closes before the buffer is full.
pub fn recv_exact<C: Read + ?Sized>(
    channel: &mut C,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<()> {
    let mut stall = Stall::new(timeout);
    let mut filled = 0;
    while filled < buf.len() {
        match channel.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(SyncError::ChannelReceive(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("channel closed after {filled} of {} bytes", buf.len()),
                )));
            }
            Ok(n) => {
                filled += n;
                stall.progressed();
                trace!(received = n, filled, wanted = buf.len(), "partial receive");
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => {
                stall.wait("receive").map_err(SyncError::ChannelReceive)?;
            }
            Err(e) => return Err(SyncError::ChannelReceive(e)),
        }
    }
    Ok(())
}

/// Send all of `data`, accumulating short writes, then flush.
///
/// # Errors
///
/// Returns `ChannelSend` on a write error, a zero-length write, or a stall
/// longer than `timeout`.
pub fn send_all<C: Write + ?Sized>(
    channel: &mut C,
    data: &[u8],
    timeout: Option<Duration>,
) -> Result<()> {
    let mut stall = Stall::new(timeout);
    let mut sent = 0;
    while sent < data.len() {
        match channel.write(&data[sent..]) {
            Ok(0) => {
                return Err(SyncError::ChannelSend(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("channel accepted no data after {sent} of {} bytes", data.len()),
                )));
            }
            Ok(n) => {
                sent += n;
                stall.progressed();
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => {
                stall.wait("send").map_err(SyncError::ChannelSend)?;
            }
            Err(e) => return Err(SyncError::ChannelSend(e)),
        }
    }
    loop {
        match channel.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_idle(e.kind()) => {
                stall.wait("flush").map_err(SyncError::ChannelSend)?;
            }
            Err(e) => return Err(SyncError::ChannelSend(e)),
        }
    }
}

/// Put a TCP channel in blocking mode with per-operation timeouts.
///
/// # Errors
///
/// Returns `Connect` if the socket options cannot be applied.
pub fn configure_tcp(stream: &TcpStream, timeout: Option<Duration>) -> Result<()> {
    stream.set_nonblocking(false).map_err(SyncError::Connect)?;
    stream.set_nodelay(true).map_err(SyncError::Connect)?;
    stream.set_read_timeout(timeout).map_err(SyncError::Connect)?;
    stream.set_write_timeout(timeout).map_err(SyncError::Connect)?;
    Ok(())
}
