//! End-to-end contract tests across storage backends
//!
//! Drives the full write path the way a repository host would: encode
//! records, diff the tree, translate to write descriptors, sign a commit,
//! apply it, then read everything back and verify the signature. Each flow
//! runs against both the in-memory and disk backends.

use bytes::Bytes;
use cid::Cid;
use ipld_core::ipld::Ipld;
use weft_repo::commit::public_key_of;
use weft_repo::error::RepoErrorKind;
use weft_repo::ops::{DiffAdd, DiffDelete, DiffUpdate};
use weft_repo::storage::GetBlocksResult;
use weft_repo::types::Did;
use weft_repo::{
    BlobStore, BlockMap, Commit, CommitData, DataDiff, DiskBlobStore, DiskStorage, LegacyCommit,
    MemoryBlobStore, MemoryStorage, RecordWriteDescript, RepoRecord, RepoStorage, Ticker,
    UnsignedCommit, compute_cid, ensure_creates, format_data_key, to_write_descripts,
};

fn make_record(text: &str) -> RepoRecord {
    let mut record = RepoRecord::new();
    record.insert(
        "$type".to_string(),
        Ipld::String("app.bsky.feed.post".to_string()),
    );
    record.insert("text".to_string(), Ipld::String(text.to_string()));
    record
}

fn encode_record(record: &RepoRecord) -> (Cid, Bytes) {
    let bytes = weft_repo::cbor::encode(record).unwrap();
    let cid = compute_cid(&bytes).unwrap();
    (cid, Bytes::from(bytes))
}

fn signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[42u8; 32])
}

fn repo_did() -> Did {
    Did::new("did:plc:ewvi7nxzyoun6zhxrhs64oiz").unwrap()
}

/// Build commit data for a batch of new record blocks.
fn commit_records(
    ticker: &mut Ticker,
    since: Option<&CommitData>,
    records: &[(Cid, Bytes)],
    removed: Vec<Cid>,
) -> CommitData {
    let rev = ticker.next(None);
    let unsigned = UnsignedCommit::new(
        repo_did(),
        records[0].0,
        rev.clone(),
        since.map(|c| c.cid),
    );
    let commit = unsigned.sign(&signing_key()).unwrap();
    let commit_bytes = Bytes::from(commit.to_cbor().unwrap());
    let commit_cid = commit.to_cid().unwrap();

    let mut blocks = BlockMap::new();
    blocks.insert(commit_cid, commit_bytes);
    for (cid, bytes) in records {
        blocks.insert(*cid, bytes.clone());
    }

    CommitData {
        cid: commit_cid,
        rev,
        since: since.map(|c| c.rev.clone()),
        prev: since.map(|c| c.cid),
        blocks,
        removed_cids: removed,
    }
}

async fn full_commit_flow(storage: impl RepoStorage) {
    let mut ticker = Ticker::new();

    let (post_cid, post_bytes) = encode_record(&make_record("hello world"));
    let (profile_cid, profile_bytes) = encode_record(&make_record("profile"));

    // Translate the tree diff for a fresh repository: adds only
    let diff = DataDiff {
        adds: vec![
            DiffAdd {
                key: format_data_key("app.bsky.feed.post", "3jzfcijpj2z2a").into(),
                cid: post_cid,
            },
            DiffAdd {
                key: format_data_key("app.bsky.actor.profile", "self").into(),
                cid: profile_cid,
            },
        ],
        ..Default::default()
    };
    let descripts = to_write_descripts(&diff).unwrap();
    let creates = ensure_creates(descripts).unwrap();
    assert_eq!(creates.len(), 2);

    let commit = commit_records(
        &mut ticker,
        None,
        &[(post_cid, post_bytes), (profile_cid, profile_bytes)],
        vec![],
    );
    let commit_cid = commit.cid;
    let commit_rev = commit.rev.clone();
    storage.apply_commit(commit).await.unwrap();

    // Root advanced to the new commit
    let root = storage.get_root_detailed().await.unwrap().unwrap();
    assert_eq!(root.cid, commit_cid);
    assert_eq!(root.rev, commit_rev);

    // Records read back exactly as written
    let record = storage.read_record(&post_cid).await.unwrap();
    assert_eq!(
        record.get("text"),
        Some(&Ipld::String("hello world".to_string()))
    );

    // Commit block decodes and its signature verifies against the signer
    let stored: Commit = storage.read_obj(&commit_cid).await.unwrap();
    let pubkey = public_key_of(&signing_key()).unwrap();
    assert!(stored.verify(&pubkey).unwrap());

    // A commit re-encoded from its decoded form keeps its address
    assert_eq!(stored.to_cid().unwrap(), commit_cid);
}

#[tokio::test]
async fn test_full_commit_flow_memory() {
    full_commit_flow(MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_full_commit_flow_disk() {
    let dir = tempfile::tempdir().unwrap();
    full_commit_flow(DiskStorage::open(dir.path()).await.unwrap()).await;
}

async fn update_and_stale_flow(storage: impl RepoStorage) {
    let mut ticker = Ticker::new();

    let (old_cid, old_bytes) = encode_record(&make_record("v1"));
    let first = commit_records(&mut ticker, None, &[(old_cid, old_bytes)], vec![]);
    storage.apply_commit(first.clone()).await.unwrap();

    // Second commit updates the record and deletes another entry
    let (new_cid, new_bytes) = encode_record(&make_record("v2"));
    let diff = DataDiff {
        updates: vec![DiffUpdate {
            key: "app.bsky.feed.post/3jzfcijpj2z2a".into(),
            cid: new_cid,
            prev: old_cid,
        }],
        deletes: vec![DiffDelete {
            key: "app.bsky.feed.like/3jzfcijpj2z2b".into(),
            cid: old_cid,
        }],
        ..Default::default()
    };
    let descripts = to_write_descripts(&diff).unwrap();
    assert!(matches!(descripts[0], RecordWriteDescript::Update { .. }));
    assert!(matches!(descripts[1], RecordWriteDescript::Delete { .. }));
    // Mixed batch is not an all-create batch
    let err = ensure_creates(descripts).unwrap_err();
    assert_eq!(err.kind(), &RepoErrorKind::UnexpectedAction);

    let second = commit_records(
        &mut ticker,
        Some(&first),
        &[(new_cid, new_bytes)],
        vec![old_cid],
    );
    storage.apply_commit(second.clone()).await.unwrap();

    let root = storage.get_root_detailed().await.unwrap().unwrap();
    assert_eq!(root.cid, second.cid);
    assert!(second.rev > first.rev);

    // The replaced block is gone, the new one is readable
    assert!(!storage.has(&old_cid).await.unwrap());
    let record = storage.read_record(&new_cid).await.unwrap();
    assert_eq!(record.get("text"), Some(&Ipld::String("v2".to_string())));

    // Replaying the first commit must be rejected as stale, root untouched
    let err = storage.apply_commit(first).await.unwrap_err();
    assert_eq!(err.kind(), &RepoErrorKind::StaleRevision);
    let root = storage.get_root_detailed().await.unwrap().unwrap();
    assert_eq!(root.cid, second.cid);
}

#[tokio::test]
async fn test_update_and_stale_flow_memory() {
    update_and_stale_flow(MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_update_and_stale_flow_disk() {
    let dir = tempfile::tempdir().unwrap();
    update_and_stale_flow(DiskStorage::open(dir.path()).await.unwrap()).await;
}

async fn batch_lookup_flow(storage: impl RepoStorage) {
    let mut ticker = Ticker::new();
    let (a_cid, a_bytes) = encode_record(&make_record("a"));
    let (b_cid, b_bytes) = encode_record(&make_record("b"));
    let commit = commit_records(
        &mut ticker,
        None,
        &[(a_cid, a_bytes), (b_cid, b_bytes)],
        vec![],
    );
    storage.apply_commit(commit).await.unwrap();

    let ghost = compute_cid(b"never stored").unwrap();
    let GetBlocksResult { blocks, missing } =
        storage.get_blocks(&[a_cid, ghost, b_cid]).await.unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(blocks.contains_key(&a_cid) && blocks.contains_key(&b_cid));
    assert_eq!(missing, vec![ghost]);

    // Point lookups never error on absence
    assert!(storage.get_bytes(&ghost).await.unwrap().is_none());
    assert!(storage.attempt_read_record(&ghost).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_lookup_memory() {
    batch_lookup_flow(MemoryStorage::new()).await;
}

#[tokio::test]
async fn test_batch_lookup_disk() {
    let dir = tempfile::tempdir().unwrap();
    batch_lookup_flow(DiskStorage::open(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn test_legacy_commit_block_normalizes() {
    // A stored v3 commit block decodes through the legacy shape unchanged
    let storage = MemoryStorage::new();
    let mut ticker = Ticker::new();
    let (cid, bytes) = encode_record(&make_record("content"));
    let data = commit_records(&mut ticker, None, &[(cid, bytes)], vec![]);
    let commit_cid = data.cid;
    storage.apply_commit(data).await.unwrap();

    let raw = storage.get_bytes(&commit_cid).await.unwrap().unwrap();
    let legacy = LegacyCommit::from_cbor(&raw).unwrap();
    let normalized = legacy.normalize();
    let strict = Commit::from_cbor(&raw).unwrap();
    assert_eq!(normalized, strict);

    let pubkey = public_key_of(&signing_key()).unwrap();
    assert!(normalized.verify(&pubkey).unwrap());
}

#[tokio::test]
async fn test_tampered_stored_commit_fails_verification() {
    let storage = MemoryStorage::new();
    let mut ticker = Ticker::new();
    let (cid, bytes) = encode_record(&make_record("content"));
    let data = commit_records(&mut ticker, None, &[(cid, bytes)], vec![]);
    let commit_cid = data.cid;
    storage.apply_commit(data).await.unwrap();

    let mut stored: Commit = storage.read_obj(&commit_cid).await.unwrap();
    stored.data = compute_cid(b"forged root").unwrap();

    let pubkey = public_key_of(&signing_key()).unwrap();
    assert!(!stored.verify(&pubkey).unwrap());
}

async fn blob_lifecycle_flow(blobs: impl BlobStore) {
    let payload = b"image bytes".to_vec();
    let blob_cid = compute_cid(&payload).unwrap();

    // Upload flow: stage first, promote once the CID is known
    let key = blobs.put_temp(payload.clone().into()).await.unwrap();
    blobs.make_permanent(&key, blob_cid).await.unwrap();
    assert_eq!(blobs.get_bytes(&blob_cid).await.unwrap().as_ref(), &payload[..]);

    // Takedown hides the blob without destroying it
    blobs.quarantine(&blob_cid).await.unwrap();
    let err = blobs.get_bytes(&blob_cid).await.unwrap_err();
    assert_eq!(err.kind(), &RepoErrorKind::BlobNotFound);

    blobs.unquarantine(&blob_cid).await.unwrap();
    assert_eq!(blobs.get_bytes(&blob_cid).await.unwrap().as_ref(), &payload[..]);

    blobs.delete(&blob_cid).await.unwrap();
    assert!(!blobs.has_stored(&blob_cid).await.unwrap());
}

#[tokio::test]
async fn test_blob_lifecycle_memory() {
    blob_lifecycle_flow(MemoryBlobStore::new()).await;
}

#[tokio::test]
async fn test_blob_lifecycle_disk() {
    let dir = tempfile::tempdir().unwrap();
    blob_lifecycle_flow(DiskBlobStore::open(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn test_disk_storage_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut ticker = Ticker::new();
    let (cid, bytes) = encode_record(&make_record("durable"));
    let data = commit_records(&mut ticker, None, &[(cid, bytes)], vec![]);
    let commit_cid = data.cid;
    let rev = data.rev.clone();

    {
        let storage = DiskStorage::open(dir.path()).await.unwrap();
        storage.apply_commit(data).await.unwrap();
    }

    let storage = DiskStorage::open(dir.path()).await.unwrap();
    let root = storage.get_root_detailed().await.unwrap().unwrap();
    assert_eq!(root.cid, commit_cid);
    assert_eq!(root.rev, rev);
    let record = storage.read_record(&cid).await.unwrap();
    assert_eq!(
        record.get("text"),
        Some(&Ipld::String("durable".to_string()))
    );
}
