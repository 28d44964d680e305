//! Blob storage abstraction for large binary objects
//!
//! Blobs live outside the block store and follow their own lifecycle:
//! staged under a temporary key, made permanent under their CID, optionally
//! quarantined pending a trust decision, then unquarantined or deleted.
//! Quarantined blobs are invisible to every read operation.

use crate::error::{BlobError, Result};
use bytes::Bytes;
use cid::Cid;
use n0_future::StreamExt;
use std::fmt;
use std::pin::Pin;

/// A lazy sequence of byte chunks.
///
/// Finite and single-pass: a stream handed to a write operation is consumed
/// exactly once and cannot be restarted. Read operations return a fresh
/// stream on every call instead.
pub type BlobStream =
    Pin<Box<dyn n0_future::Stream<Item = std::io::Result<Bytes>> + Send + 'static>>;

/// Write-side blob payload: a complete buffer or a single-pass chunk stream
pub enum BlobInput {
    /// The whole payload up front
    Bytes(Bytes),
    /// Chunked payload of unknown total size
    Stream(BlobStream),
}

impl BlobInput {
    /// Wrap a chunk stream as blob input
    pub fn stream(
        stream: impl n0_future::Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    ) -> Self {
        Self::Stream(Box::pin(stream))
    }

    /// Drain the input into a single buffer
    pub(crate) async fn collect(self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| BlobError::Io(Box::new(e)))?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for BlobInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

impl From<Bytes> for BlobInput {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlobInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for BlobInput {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

/// Async blob storage trait
///
/// Lifecycle per blob: `put_temp` stages content under a temporary key
/// before it is content-addressed; `make_permanent` moves it under its CID;
/// `quarantine` hides it from reads until `unquarantine` or `delete`.
///
/// `get_bytes` and `get_stream` fail with a blob-not-found error for
/// content that is absent **or** quarantined. `get_stream` returns a fresh
/// stream each call; write-side streams are consumed exactly once.
#[trait_variant::make(Send)]
pub trait BlobStore: Clone {
    /// Stage content under a temporary key, returning the key
    async fn put_temp(&self, bytes: BlobInput) -> Result<String>;

    /// Promote staged content to permanent, content-addressed storage
    async fn make_permanent(&self, key: &str, cid: Cid) -> Result<()>;

    /// Store content directly under its CID
    async fn put_permanent(&self, cid: Cid, bytes: BlobInput) -> Result<()>;

    /// Exclude a stored blob from reads pending a trust decision
    async fn quarantine(&self, cid: &Cid) -> Result<()>;

    /// Restore a quarantined blob to normal visibility
    async fn unquarantine(&self, cid: &Cid) -> Result<()>;

    /// Read a whole blob; fails for absent or quarantined content
    async fn get_bytes(&self, cid: &Cid) -> Result<Bytes>;

    /// Read a blob as a fresh chunk stream; fails for absent or
    /// quarantined content
    async fn get_stream(&self, cid: &Cid) -> Result<BlobStream>;

    /// Check whether a temporary key exists
    async fn has_temp(&self, key: &str) -> Result<bool>;

    /// Check whether a blob is stored and readable (quarantined blobs
    /// report false)
    async fn has_stored(&self, cid: &Cid) -> Result<bool>;

    /// Delete a blob in any state
    async fn delete(&self, cid: &Cid) -> Result<()>;

    /// Delete many blobs
    async fn delete_many(&self, cids: &[Cid]) -> Result<()>;
}

pub mod disk;
pub mod memory;

pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;
