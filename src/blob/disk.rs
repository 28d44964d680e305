//! Filesystem blob storage
//!
//! Layout under the store root:
//!
//! ```text
//! tmp/<key>         staged content, not yet content-addressed
//! stored/<cid>      permanent, readable blobs
//! quarantine/<cid>  held blobs, excluded from reads
//! ```
//!
//! Lifecycle transitions are directory renames, so a blob is never readable
//! half-written and a crash mid-transition leaves it in exactly one state.

use crate::blob::{BlobInput, BlobStore, BlobStream};
use crate::error::{BlobError, Result};
use crate::types::Ticker;
use bytes::Bytes;
use cid::Cid;
use n0_future::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem blob storage
///
/// Streams write-side content to a staging file before renaming it into
/// place; a cancelled write never leaves a partial permanent blob.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    dir: PathBuf,
    ticker: Arc<Mutex<Ticker>>,
}

impl DiskBlobStore {
    /// Open (creating if needed) a blob store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        for sub in ["tmp", "stored", "quarantine"] {
            fs::create_dir_all(dir.join(sub)).await.map_err(io_err)?;
        }
        Ok(Self {
            dir,
            ticker: Arc::new(Mutex::new(Ticker::new())),
        })
    }

    /// Path of the store root directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join("tmp").join(key)
    }

    fn stored_path(&self, cid: &Cid) -> PathBuf {
        self.dir.join("stored").join(cid.to_string())
    }

    fn quarantine_path(&self, cid: &Cid) -> PathBuf {
        self.dir.join("quarantine").join(cid.to_string())
    }

    fn next_temp_key(&self) -> String {
        self.ticker.lock().unwrap().next(None).to_string()
    }

    /// Consume the input into a staging file, then rename to `dest`.
    async fn write_staged(&self, dest: &Path, input: BlobInput) -> Result<()> {
        let staging = self.temp_path(&format!("{}.part", self.next_temp_key()));
        let mut file = fs::File::create(&staging).await.map_err(io_err)?;

        match input {
            BlobInput::Bytes(bytes) => {
                file.write_all(&bytes).await.map_err(io_err)?;
            }
            BlobInput::Stream(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| BlobError::Io(Box::new(e)))?;
                    file.write_all(&chunk).await.map_err(io_err)?;
                }
            }
        }

        file.sync_data().await.map_err(io_err)?;
        drop(file);
        fs::rename(&staging, dest).await.map_err(io_err)?;
        Ok(())
    }
}

impl BlobStore for DiskBlobStore {
    async fn put_temp(&self, bytes: BlobInput) -> Result<String> {
        let key = self.next_temp_key();
        self.write_staged(&self.temp_path(&key), bytes).await?;
        Ok(key)
    }

    async fn make_permanent(&self, key: &str, cid: Cid) -> Result<()> {
        let temp = self.temp_path(key);
        if !fs::try_exists(&temp).await.map_err(io_err)? {
            return Err(BlobError::TempNotFound {
                key: key.to_string(),
            }
            .into());
        }
        let dest = self.stored_path(&cid);
        if fs::try_exists(&dest).await.map_err(io_err)? {
            // Already stored under this CID; the staged copy is redundant
            fs::remove_file(&temp).await.map_err(io_err)?;
            return Ok(());
        }
        fs::rename(&temp, &dest).await.map_err(io_err)?;
        tracing::debug!(%cid, key, "made blob permanent");
        Ok(())
    }

    async fn put_permanent(&self, cid: Cid, bytes: BlobInput) -> Result<()> {
        let dest = self.stored_path(&cid);
        if fs::try_exists(&dest).await.map_err(io_err)? {
            return Ok(());
        }
        self.write_staged(&dest, bytes).await?;
        tracing::debug!(%cid, "stored blob");
        Ok(())
    }

    async fn quarantine(&self, cid: &Cid) -> Result<()> {
        match fs::rename(self.stored_path(cid), self.quarantine_path(cid)).await {
            Ok(()) => {
                tracing::debug!(%cid, "quarantined blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound { cid: *cid }.into())
            }
            Err(e) => Err(io_err(e)),
        }
    }

    async fn unquarantine(&self, cid: &Cid) -> Result<()> {
        match fs::rename(self.quarantine_path(cid), self.stored_path(cid)).await {
            Ok(()) => {
                tracing::debug!(%cid, "unquarantined blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound { cid: *cid }.into())
            }
            Err(e) => Err(io_err(e)),
        }
    }

    async fn get_bytes(&self, cid: &Cid) -> Result<Bytes> {
        match fs::read(self.stored_path(cid)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound { cid: *cid }.into())
            }
            Err(e) => Err(io_err(e)),
        }
    }

    async fn get_stream(&self, cid: &Cid) -> Result<BlobStream> {
        let file = match fs::File::open(self.stored_path(cid)).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound { cid: *cid }.into());
            }
            Err(e) => return Err(io_err(e)),
        };

        let stream = n0_future::stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let n = file.read(&mut buf).await?;
            if n == 0 {
                Ok(None)
            } else {
                buf.truncate(n);
                Ok(Some((Bytes::from(buf), file)))
            }
        });
        Ok(Box::pin(stream))
    }

    async fn has_temp(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.temp_path(key)).await.map_err(io_err)
    }

    async fn has_stored(&self, cid: &Cid) -> Result<bool> {
        fs::try_exists(self.stored_path(cid)).await.map_err(io_err)
    }

    async fn delete(&self, cid: &Cid) -> Result<()> {
        for path in [self.stored_path(cid), self.quarantine_path(cid)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
        }
        Ok(())
    }

    async fn delete_many(&self, cids: &[Cid]) -> Result<()> {
        for cid in cids {
            self.delete(cid).await?;
        }
        Ok(())
    }
}

fn io_err(e: impl std::error::Error + Send + Sync + 'static) -> crate::error::RepoError {
    BlobError::Io(Box::new(e)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor::compute_cid;
    use crate::error::RepoErrorKind;

    fn blob_cid(data: &[u8]) -> Cid {
        compute_cid(data).unwrap()
    }

    #[tokio::test]
    async fn test_temp_to_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();
        let data = b"blob payload".to_vec();
        let cid = blob_cid(&data);

        let key = store.put_temp(data.clone().into()).await.unwrap();
        assert!(store.has_temp(&key).await.unwrap());

        store.make_permanent(&key, cid).await.unwrap();
        assert!(!store.has_temp(&key).await.unwrap());
        assert_eq!(store.get_bytes(&cid).await.unwrap().as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_streamed_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();

        // Payload bigger than one read chunk
        let payload = vec![0xAB_u8; READ_CHUNK_SIZE * 2 + 17];
        let cid = blob_cid(&payload);
        let chunks: Vec<std::io::Result<Bytes>> = payload
            .chunks(4096)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        store
            .put_permanent(cid, BlobInput::stream(n0_future::stream::iter(chunks)))
            .await
            .unwrap();

        let mut stream = store.get_stream(&cid).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }

    #[tokio::test]
    async fn test_quarantine_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();
        let data = b"suspicious".to_vec();
        let cid = blob_cid(&data);
        store.put_permanent(cid, data.clone().into()).await.unwrap();

        store.quarantine(&cid).await.unwrap();
        assert!(!store.has_stored(&cid).await.unwrap());
        let err = store.get_bytes(&cid).await.unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::BlobNotFound);

        store.unquarantine(&cid).await.unwrap();
        assert_eq!(store.get_bytes(&cid).await.unwrap().as_ref(), &data[..]);
    }

    #[tokio::test]
    async fn test_quarantine_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();
        let err = store.quarantine(&blob_cid(b"ghost")).await.unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::BlobNotFound);
    }

    #[tokio::test]
    async fn test_delete_in_any_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();

        let stored = blob_cid(b"stored");
        let held = blob_cid(b"held");
        store.put_permanent(stored, b"stored".to_vec().into()).await.unwrap();
        store.put_permanent(held, b"held".to_vec().into()).await.unwrap();
        store.quarantine(&held).await.unwrap();

        store.delete_many(&[stored, held]).await.unwrap();
        assert!(!store.has_stored(&stored).await.unwrap());
        assert!(store.unquarantine(&held).await.is_err());

        // Deleting an absent blob is not an error
        store.delete(&blob_cid(b"ghost")).await.unwrap();
    }

    #[tokio::test]
    async fn test_make_permanent_missing_temp() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::open(dir.path()).await.unwrap();
        let err = store
            .make_permanent("no-such-key", blob_cid(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::BlobNotFound);
    }
}
