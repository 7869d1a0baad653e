//! Async front end using tokio.
//!
//! The session itself is blocking and strictly sequential, so the adapter
//! hands the socket to a blocking worker rather than reimplementing the state
//! machine on async I/O. Many files can be synchronized concurrently by
//! running one session per connection.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::channel::configure_tcp;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::session::SyncOutcome;
use crate::sync::{SyncClient, Synchronize};

/// Async synchronization client.
///
/// Cheap to clone; every call runs an independent session.
#[derive(Debug, Clone, Default)]
pub struct AsyncSyncClient {
    inner: SyncClient,
}

impl AsyncSyncClient {
    /// Create a client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing blocking client.
    #[must_use]
    pub const fn from_client(inner: SyncClient) -> Self {
        Self { inner }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        self.inner.config()
    }

    /// Connect to a peer and synchronize `local_path` with its reference copy.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the connection cannot be established, otherwise
    /// whatever [`AsyncSyncClient::synchronize`] returns.
    pub async fn connect_and_sync<A>(&self, addr: A, local_path: PathBuf) -> Result<SyncOutcome>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr).await.map_err(SyncError::Connect)?;
        let peer: Option<SocketAddr> = stream.peer_addr().ok();
        debug!(?peer, "connected");
        self.synchronize(stream, local_path).await
    }

    /// Synchronize `local_path` over an established connection.
    ///
    /// The stream is switched to blocking mode with the configured timeouts
    /// and driven on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns `Connect` if the socket cannot be reconfigured, `Task` if the
    /// worker panics or is cancelled, and any session error otherwise.
    pub async fn synchronize(&self, stream: TcpStream, local_path: PathBuf) -> Result<SyncOutcome> {
        let mut stream = stream.into_std().map_err(SyncError::Connect)?;
        configure_tcp(&stream, self.inner.config().io_timeout())?;

        let client = self.inner.clone();
        tokio::task::spawn_blocking(move || client.synchronize(&mut stream, &local_path))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }
}
