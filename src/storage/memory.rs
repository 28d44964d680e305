//! In-memory repository storage

use crate::cbor::RepoRecord;
use crate::error::{Result, StorageError};
use crate::storage::{
    BlockMap, CommitData, GetBlocksResult, ObjAndBytes, RepoStorage, RootDetail, missing_block,
    parse_obj,
};
use crate::types::Tid;
use bytes::Bytes;
use cid::Cid;
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

/// In-memory repository storage backed by a BTreeMap
///
/// Useful for testing, temporary operations, and small repositories that
/// fit in memory. Uses `Bytes` for reference-counted block payloads with
/// cheap cloning. The root cell is guarded by the same lock as the block
/// map, which serializes root advancement against concurrent committers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    blocks: BlockMap,
    root: Option<RootDetail>,
}

impl Inner {
    fn advance_root(&mut self, cid: Cid, rev: &Tid) -> Result<()> {
        if let Some(current) = &self.root {
            if *rev <= current.rev {
                return Err(StorageError::StaleRevision {
                    attempted: rev.to_string(),
                    current: current.rev.to_string(),
                }
                .into());
            }
        }
        self.root = Some(RootDetail {
            cid,
            rev: rev.clone(),
        });
        Ok(())
    }
}

impl MemoryStorage {
    /// Create new empty memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create memory storage pre-loaded with blocks (no committed root)
    pub fn new_from_blocks(blocks: BlockMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner { blocks, root: None })),
        }
    }

    /// Get number of blocks stored
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().blocks.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().blocks.is_empty()
    }
}

impl RepoStorage for MemoryStorage {
    async fn get_root(&self) -> Result<Option<Cid>> {
        Ok(self.inner.read().unwrap().root.as_ref().map(|r| r.cid))
    }

    async fn get_root_detailed(&self) -> Result<Option<RootDetail>> {
        Ok(self.inner.read().unwrap().root.clone())
    }

    async fn put_block(&self, cid: Cid, bytes: Bytes, rev: &Tid) -> Result<()> {
        tracing::trace!(%cid, %rev, len = bytes.len(), "put block");
        self.inner.write().unwrap().blocks.entry(cid).or_insert(bytes);
        Ok(())
    }

    async fn put_many(&self, blocks: BlockMap, rev: &Tid) -> Result<()> {
        tracing::trace!(%rev, count = blocks.len(), "put blocks");
        let mut inner = self.inner.write().unwrap();
        for (cid, bytes) in blocks {
            inner.blocks.entry(cid).or_insert(bytes);
        }
        Ok(())
    }

    async fn update_root(&self, cid: Cid, rev: &Tid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.advance_root(cid, rev)?;
        tracing::debug!(%cid, %rev, "advanced repo root");
        Ok(())
    }

    async fn apply_commit(&self, commit: CommitData) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        // Blocks land before the root moves; a stale-revision failure below
        // leaves them as benign orphans.
        for (cid, bytes) in commit.blocks {
            inner.blocks.entry(cid).or_insert(bytes);
        }
        inner.advance_root(commit.cid, &commit.rev)?;
        for cid in &commit.removed_cids {
            inner.blocks.remove(cid);
        }
        tracing::debug!(cid = %commit.cid, rev = %commit.rev, "applied commit");
        Ok(())
    }

    async fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>> {
        Ok(self.inner.read().unwrap().blocks.get(cid).cloned())
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.inner.read().unwrap().blocks.contains_key(cid))
    }

    async fn get_blocks(&self, cids: &[Cid]) -> Result<GetBlocksResult> {
        let inner = self.inner.read().unwrap();
        let mut result = GetBlocksResult::default();
        for cid in cids {
            match inner.blocks.get(cid) {
                Some(bytes) => {
                    result.blocks.insert(*cid, bytes.clone());
                }
                None => result.missing.push(*cid),
            }
        }
        Ok(result)
    }

    async fn attempt_read<T: DeserializeOwned + Send>(
        &self,
        cid: &Cid,
    ) -> Result<Option<ObjAndBytes<T>>> {
        match self.get_bytes(cid).await? {
            Some(bytes) => Ok(Some(ObjAndBytes {
                obj: parse_obj(cid, &bytes)?,
                bytes,
            })),
            None => Ok(None),
        }
    }

    async fn read_obj_and_bytes<T: DeserializeOwned + Send>(
        &self,
        cid: &Cid,
    ) -> Result<ObjAndBytes<T>> {
        self.attempt_read(cid).await?.ok_or_else(|| missing_block(cid))
    }

    async fn read_obj<T: DeserializeOwned + Send>(&self, cid: &Cid) -> Result<T> {
        Ok(self.read_obj_and_bytes(cid).await?.obj)
    }

    async fn attempt_read_record(&self, cid: &Cid) -> Result<Option<RepoRecord>> {
        match self.get_bytes(cid).await? {
            Some(bytes) => Ok(Some(crate::cbor::decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_record(&self, cid: &Cid) -> Result<RepoRecord> {
        self.attempt_read_record(cid)
            .await?
            .ok_or_else(|| missing_block(cid))
    }
}
