//! # Chunksync
//!
//! Client side of a chunk-level file synchronization protocol.
//!
//! A client holding a possibly stale copy of a file talks to a peer holding
//! the reference copy over any reliable byte channel:
//!
//! - **Incremental transfer**: the client sends one MD5 digest per fixed-size
//!   chunk, the peer answers with a bitmap of changed chunks followed by their
//!   contents, and the client patches those chunks in place.
//! - **Full transfer**: when the local copy is missing or no larger than one
//!   chunk, the peer streams a gzip-compressed copy which the client spools
//!   and decompresses.
//!
//! ## Example
//!
//! ```rust
//! use chunksync::{Bitmap, DigestTable, SyncBuilder};
//! use std::io::Cursor;
//!
//! let client = SyncBuilder::new().chunk_size(4).build();
//!
//! // Digests the client would send for "abcdefghij".
//! let table = DigestTable::compute(&mut Cursor::new(b"abcdefghij"), client.chunk_size()).unwrap();
//! assert_eq!(table.len(), 3);
//!
//! // A peer reply marking chunks 0 and 2 as changed.
//! let bitmap = Bitmap::from_bytes(vec![0b1010_0000]);
//! assert_eq!(bitmap.changed_chunks(3).collect::<Vec<_>>(), vec![0, 2]);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

#[cfg(feature = "async")]
pub mod async_sync;
mod bitmap;
pub mod channel;
mod config;
mod digest;
mod error;
mod fallback;
pub mod logging;
mod patch;
mod protocol;
mod session;
mod sync;

pub use bitmap::{chunk_index, chunk_position, Bitmap};
pub use config::{
    DigestLength, SyncConfig, WireFormat, DEFAULT_CHUNK_SIZE, DEFAULT_IO_TIMEOUT_MS,
    MAX_CHUNK_SIZE,
};
pub use digest::{ChunkDigest, DigestTable, DIGEST_LEN};
pub use error::{ErrorKind, Result, SyncError};
pub use fallback::{CompressedBlob, FullTransfer};
pub use patch::PatchWriter;
pub use protocol::{
    Codec, FrameHeader, Message, MessageType, ACK, NO_LOCAL_FILE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION,
};
pub use session::{SessionState, SyncOutcome, SyncSession, TransferMode};
pub use sync::{SyncBuilder, SyncClient, Synchronize};
