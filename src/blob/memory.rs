//! In-memory blob storage

use crate::blob::{BlobInput, BlobStore, BlobStream};
use crate::error::{BlobError, Result};
use crate::types::Ticker;
use bytes::Bytes;
use cid::Cid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// In-memory blob storage
///
/// Keeps temp, stored, and quarantined content in separate maps, mirroring
/// the directory moves of [`DiskBlobStore`](crate::blob::DiskBlobStore).
/// Useful for testing and ephemeral instances.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
    ticker: Arc<Mutex<Ticker>>,
}

#[derive(Debug, Default)]
struct Inner {
    temp: HashMap<String, Bytes>,
    stored: HashMap<Cid, Bytes>,
    quarantined: HashMap<Cid, Bytes>,
}

impl MemoryBlobStore {
    /// Create a new empty blob store
    pub fn new() -> Self {
        Self::default()
    }

    fn next_temp_key(&self) -> String {
        self.ticker.lock().unwrap().next(None).to_string()
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put_temp(&self, bytes: BlobInput) -> Result<String> {
        let bytes = bytes.collect().await?;
        let key = self.next_temp_key();
        self.inner.write().unwrap().temp.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn make_permanent(&self, key: &str, cid: Cid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let bytes = inner
            .temp
            .remove(key)
            .ok_or_else(|| BlobError::TempNotFound {
                key: key.to_string(),
            })?;
        inner.stored.entry(cid).or_insert(bytes);
        Ok(())
    }

    async fn put_permanent(&self, cid: Cid, bytes: BlobInput) -> Result<()> {
        let bytes = bytes.collect().await?;
        self.inner.write().unwrap().stored.entry(cid).or_insert(bytes);
        Ok(())
    }

    async fn quarantine(&self, cid: &Cid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let bytes = inner
            .stored
            .remove(cid)
            .ok_or(BlobError::NotFound { cid: *cid })?;
        inner.quarantined.insert(*cid, bytes);
        tracing::debug!(%cid, "quarantined blob");
        Ok(())
    }

    async fn unquarantine(&self, cid: &Cid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let bytes = inner
            .quarantined
            .remove(cid)
            .ok_or(BlobError::NotFound { cid: *cid })?;
        inner.stored.insert(*cid, bytes);
        tracing::debug!(%cid, "unquarantined blob");
        Ok(())
    }

    async fn get_bytes(&self, cid: &Cid) -> Result<Bytes> {
        self.inner
            .read()
            .unwrap()
            .stored
            .get(cid)
            .cloned()
            .ok_or_else(|| BlobError::NotFound { cid: *cid }.into())
    }

    async fn get_stream(&self, cid: &Cid) -> Result<BlobStream> {
        let bytes = self.get_bytes(cid).await?;
        Ok(Box::pin(n0_future::stream::iter(std::iter::once(Ok(bytes)))))
    }

    async fn has_temp(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().unwrap().temp.contains_key(key))
    }

    async fn has_stored(&self, cid: &Cid) -> Result<bool> {
        Ok(self.inner.read().unwrap().stored.contains_key(cid))
    }

    async fn delete(&self, cid: &Cid) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.stored.remove(cid);
        inner.quarantined.remove(cid);
        Ok(())
    }

    async fn delete_many(&self, cids: &[Cid]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for cid in cids {
            inner.stored.remove(cid);
            inner.quarantined.remove(cid);
        }
        Ok(())
    }
}
