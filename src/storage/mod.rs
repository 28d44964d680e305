//! Repository storage abstraction: commits and content-addressed blocks
//!
//! [`RepoStorage`] is the entire surface a concrete backend must satisfy.
//! Block storage is append-mostly: updates only add new blocks, never
//! mutate existing ones. The single mutable cell is the root pointer, which
//! advances atomically together with its revision; backends must reject a
//! root update whose revision does not sort strictly after the stored one.

use crate::cbor::{self, RepoRecord};
use crate::error::{Result, StorageError};
use crate::types::Tid;
use bytes::Bytes;
use cid::Cid;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Mapping from content hash to raw block bytes
pub type BlockMap = BTreeMap<Cid, Bytes>;

/// The committed root pointer and its revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDetail {
    /// CID of the commit block at the root
    pub cid: Cid,
    /// Revision that committed it
    pub rev: Tid,
}

/// Commit data for repository updates
///
/// Contains everything a backend needs to persist one commit: the new
/// blocks, the root to advance to, and blocks made unreachable.
#[derive(Debug, Clone)]
pub struct CommitData {
    /// Commit block CID (the new root)
    pub cid: Cid,

    /// New revision
    pub rev: Tid,

    /// Revision of the commit being replaced (None for initial commit)
    pub since: Option<Tid>,

    /// Previous commit CID (None for initial commit)
    pub prev: Option<Cid>,

    /// New blocks to persist (tree nodes + records + the commit block)
    pub blocks: BlockMap,

    /// CIDs of blocks no longer reachable after this commit
    pub removed_cids: Vec<Cid>,
}

/// A decoded block together with its raw bytes
#[derive(Debug, Clone)]
pub struct ObjAndBytes<T> {
    /// The decoded value
    pub obj: T,
    /// The block bytes the value was decoded from
    pub bytes: Bytes,
}

/// Result of a batch block lookup, partitioned into found and not-found
#[derive(Debug, Clone, Default)]
pub struct GetBlocksResult {
    /// Blocks that were present
    pub blocks: BlockMap,
    /// Requested CIDs with no stored block
    pub missing: Vec<Cid>,
}

/// Async repository storage trait
///
/// CID-keyed block storage plus the committed root pointer. Implementations
/// might use an in-memory map ([`MemoryStorage`]), a directory of block
/// files ([`DiskStorage`]), or a database (user-provided).
///
/// Semantics every backend must honor:
/// - Re-writing an existing CID is a no-op; content addressing guarantees
///   identical bytes. Retries of `put_block`/`put_many`/`update_root` with
///   the same arguments are safe.
/// - `update_root` and `apply_commit` serialize against each other for one
///   repository and fail with a stale-revision error when the supplied
///   revision does not sort strictly after the stored one.
/// - `apply_commit` writes blocks before advancing the root, so a failure
///   part-way leaves the previous root valid and new blocks merely
///   orphaned, never a dangling root.
/// - Point lookups return `None`/`false` for missing data, never an error.
///   Blocks not yet reachable from any committed root may still be read by
///   explicit CID; content addressing makes that benign.
///
/// Clone is required so callers can share storage references cheaply.
#[trait_variant::make(Send)]
pub trait RepoStorage: Clone {
    /// Get the current committed root, or `None` for an empty repository
    async fn get_root(&self) -> Result<Option<Cid>>;

    /// Get the current committed root together with its revision
    async fn get_root_detailed(&self) -> Result<Option<RootDetail>>;

    /// Persist one content-addressed block, tagged with the revision that
    /// introduced it
    async fn put_block(&self, cid: Cid, bytes: Bytes, rev: &Tid) -> Result<()>;

    /// Persist many blocks for one revision
    async fn put_many(&self, blocks: BlockMap, rev: &Tid) -> Result<()>;

    /// Atomically advance the root pointer and revision.
    ///
    /// Fails with a stale-revision error if `rev` does not sort strictly
    /// after the stored revision, leaving the stored root untouched.
    async fn update_root(&self, cid: Cid, rev: &Tid) -> Result<()>;

    /// Apply a commit: persist its blocks, advance the root, then drop
    /// blocks the commit made unreachable
    async fn apply_commit(&self, commit: CommitData) -> Result<()>;

    /// Get a block's bytes, or `None` if absent
    async fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>>;

    /// Check if a block exists without retrieving it
    async fn has(&self, cid: &Cid) -> Result<bool>;

    /// Batch lookup, partitioning the request into found and missing.
    /// Partial misses are not an error.
    async fn get_blocks(&self, cids: &[Cid]) -> Result<GetBlocksResult>;

    /// Read and decode a block against an expected shape, `None` if absent
    async fn attempt_read<T: DeserializeOwned + Send>(
        &self,
        cid: &Cid,
    ) -> Result<Option<ObjAndBytes<T>>>;

    /// Read and decode a block against an expected shape, failing if absent
    async fn read_obj_and_bytes<T: DeserializeOwned + Send>(
        &self,
        cid: &Cid,
    ) -> Result<ObjAndBytes<T>>;

    /// Read and decode a block, discarding the raw bytes
    async fn read_obj<T: DeserializeOwned + Send>(&self, cid: &Cid) -> Result<T>;

    /// Read a block as a repository record, `None` if absent
    async fn attempt_read_record(&self, cid: &Cid) -> Result<Option<RepoRecord>>;

    /// Read a block as a repository record, failing if absent
    async fn read_record(&self, cid: &Cid) -> Result<RepoRecord>;
}

/// Decode block bytes against an expected shape.
///
/// Malformed CBOR surfaces as a serialization error; well-formed CBOR that
/// does not match `T` surfaces as a schema error for `cid`. Shared by every
/// backend's read path.
pub(crate) fn parse_obj<T: DeserializeOwned>(cid: &Cid, bytes: &[u8]) -> Result<T> {
    let ipld = cbor::decode_ipld(bytes)?;
    ipld_core::serde::from_ipld(ipld).map_err(|e| {
        StorageError::Schema {
            cid: *cid,
            source: Box::new(e),
        }
        .into()
    })
}

/// Error for a block that a non-attempt read requires
pub(crate) fn missing_block(cid: &Cid) -> crate::error::RepoError {
    StorageError::NotFound { cid: *cid }.into()
}

pub mod disk;
pub mod memory;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
