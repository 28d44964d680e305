//! Integrity and addressing layer for versioned, content-addressed record repositories
//!
//! This crate provides the trust primitives underneath a signed record repository:
//!
//! - **Content addressing**: canonical DAG-CBOR encoding and CID derivation,
//!   so equal values always hash to equal addresses
//! - **Commits**: signed commit structures (versions 2 and 3) with signature
//!   creation and verification over multiple key types
//! - **Write descriptors**: translation of tree-level diffs into typed
//!   create/update/delete operations keyed by `collection/rkey` paths
//! - **Storage**: pluggable block storage abstraction with in-memory and
//!   disk-backed implementations, including atomic commit application
//! - **Blobs**: large-object storage with a staged/permanent/quarantined
//!   lifecycle kept separate from the block store
//!
//! # Design Philosophy
//!
//! - Core primitives are always available (encoding, commits, storage)
//! - Storage backends are interchangeable behind one async trait
//! - Every persisted object round-trips through the same canonical codec
//! - Signature verification distinguishes "invalid signature" from
//!   "malformed input"
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_repo::{MemoryStorage, RepoStorage, UnsignedCommit};
//! use weft_repo::types::{Did, Ticker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new();
//! let rev = Ticker::new().next(None);
//! let unsigned = UnsignedCommit::new(Did::new("did:example:alice")?, root_cid, rev, None);
//! let commit = unsigned.sign(&signing_key)?;
//!
//! storage.apply_commit(commit_data).await?;
//! let root = storage.get_root().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

/// Blob storage abstraction
pub mod blob;
/// Canonical DAG-CBOR encoding and CID derivation
pub mod cbor;
/// Commit structures and signature verification
pub mod commit;
pub mod error;
/// Diff-to-write-descriptor translation and record path keys
pub mod ops;
/// Block storage abstraction
pub mod storage;
/// Identifier and key types
pub mod types;

pub use blob::{BlobInput, BlobStore, BlobStream, DiskBlobStore, MemoryBlobStore};
pub use cbor::{RepoRecord, compute_cid};
pub use commit::{Commit, LegacyCommit, SigningKey, UnsignedCommit, meta_equal};
pub use error::{RepoError, RepoErrorKind, Result};
pub use ops::{
    DataDiff, RecordPath, RecordWriteDescript, ensure_creates, format_data_key, parse_data_key,
    to_write_descripts,
};
pub use storage::{BlockMap, CommitData, DiskStorage, MemoryStorage, RepoStorage, RootDetail};
pub use types::{Did, PublicKey, Tid, Ticker};

/// DAG-CBOR codec identifier for CIDs (0x71)
pub const DAG_CBOR_CID_CODEC: u64 = cbor::DAG_CBOR;
