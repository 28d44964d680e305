//! Directory-backed repository storage
//!
//! Layout under the storage root:
//!
//! ```text
//! blocks/<cid>   one file per content-addressed block
//! root           the committed root pointer: "<cid>\n<rev>\n"
//! tmp/           staging area for in-flight writes
//! ```
//!
//! All writes are staged to `tmp/` and renamed into place, so a crash mid
//! write leaves the previous root valid and new blocks merely orphaned.

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
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Directory-backed repository storage
///
/// One file per block, named by CID, plus a single root pointer file
/// rewritten atomically via rename. Suited to simple persistence without a
/// database; for high-churn repositories prefer a database-backed
/// implementation of [`RepoStorage`].
#[derive(Debug, Clone)]
pub struct DiskStorage {
    dir: PathBuf,
    // Serializes update_root/apply_commit root advancement
    root_lock: Arc<tokio::sync::Mutex<()>>,
    staging_seq: Arc<AtomicU64>,
}

impl DiskStorage {
    /// Open (creating if needed) storage rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("blocks")).await.map_err(io_err)?;
        fs::create_dir_all(dir.join("tmp")).await.map_err(io_err)?;
        Ok(Self {
            dir,
            root_lock: Arc::new(tokio::sync::Mutex::new(())),
            staging_seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Path of the storage root directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn block_path(&self, cid: &Cid) -> PathBuf {
        self.dir.join("blocks").join(cid.to_string())
    }

    fn root_path(&self) -> PathBuf {
        self.dir.join("root")
    }

    fn staging_path(&self) -> PathBuf {
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join("tmp").join(format!("stage-{}", seq))
    }

    /// Stage bytes to the tmp dir, then rename into place.
    async fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let staging = self.staging_path();
        let mut file = fs::File::create(&staging).await.map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.sync_data().await.map_err(io_err)?;
        drop(file);
        fs::rename(&staging, dest).await.map_err(io_err)?;
        Ok(())
    }

    async fn read_root_file(&self) -> Result<Option<RootDetail>> {
        let contents = match fs::read_to_string(self.root_path()).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        let mut lines = contents.lines();
        let (Some(cid_line), Some(rev_line)) = (lines.next(), lines.next()) else {
            return Err(StorageError::Io(
                format!("malformed root pointer file: {:?}", contents).into(),
            )
            .into());
        };
        let cid = Cid::from_str(cid_line.trim())
            .map_err(|e| StorageError::Io(Box::new(e)))?;
        let rev = Tid::new(rev_line.trim())?;
        Ok(Some(RootDetail { cid, rev }))
    }

    /// Stale check plus root rewrite. Callers must hold `root_lock`.
    async fn advance_root(&self, cid: Cid, rev: &Tid) -> Result<()> {
        if let Some(current) = self.read_root_file().await? {
            if *rev <= current.rev {
                return Err(StorageError::StaleRevision {
                    attempted: rev.to_string(),
                    current: current.rev.to_string(),
                }
                .into());
            }
        }
        let contents = format!("{}\n{}\n", cid, rev);
        self.write_atomic(&self.root_path(), contents.as_bytes())
            .await?;
        tracing::debug!(%cid, %rev, "advanced repo root");
        Ok(())
    }
}

impl RepoStorage for DiskStorage {
    async fn get_root(&self) -> Result<Option<Cid>> {
        Ok(self.read_root_file().await?.map(|r| r.cid))
    }

    async fn get_root_detailed(&self) -> Result<Option<RootDetail>> {
        self.read_root_file().await
    }

    async fn put_block(&self, cid: Cid, bytes: Bytes, rev: &Tid) -> Result<()> {
        let dest = self.block_path(&cid);
        // Existing block means identical bytes; skip the write
        if fs::try_exists(&dest).await.map_err(io_err)? {
            return Ok(());
        }
        tracing::trace!(%cid, %rev, len = bytes.len(), "put block");
        self.write_atomic(&dest, &bytes).await
    }

    async fn put_many(&self, blocks: BlockMap, rev: &Tid) -> Result<()> {
        for (cid, bytes) in blocks {
            self.put_block(cid, bytes, rev).await?;
        }
        Ok(())
    }

    async fn update_root(&self, cid: Cid, rev: &Tid) -> Result<()> {
        let _guard = self.root_lock.lock().await;
        self.advance_root(cid, rev).await
    }

    async fn apply_commit(&self, commit: CommitData) -> Result<()> {
        // Blocks are durable before the root moves
        self.put_many(commit.blocks, &commit.rev).await?;

        {
            let _guard = self.root_lock.lock().await;
            self.advance_root(commit.cid, &commit.rev).await?;
        }

        for cid in &commit.removed_cids {
            match fs::remove_file(self.block_path(cid)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
        }
        tracing::debug!(cid = %commit.cid, rev = %commit.rev, "applied commit");
        Ok(())
    }

    async fn get_bytes(&self, cid: &Cid) -> Result<Option<Bytes>> {
        match fs::read(self.block_path(cid)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn has(&self, cid: &Cid) -> Result<bool> {
        fs::try_exists(self.block_path(cid)).await.map_err(io_err)
    }

    async fn get_blocks(&self, cids: &[Cid]) -> Result<GetBlocksResult> {
        let mut result = GetBlocksResult::default();
        for cid in cids {
            match self.get_bytes(cid).await? {
                Some(bytes) => {
                    result.blocks.insert(*cid, bytes);
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

fn io_err(e: impl std::error::Error + Send + Sync + 'static) -> crate::error::RepoError {
    StorageError::Io(Box::new(e)).into()
}
