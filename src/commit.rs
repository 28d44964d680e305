//! Commit structures, normalization, and signature verification.
//!
//! A commit is the signed descriptor naming a repository's record-tree root
//! and revision. Signing and verification share one canonical encoding of
//! the unsigned field set ([`UnsignedCommit`]); the signature covers exactly
//! those bytes, so re-encoding anywhere else would silently break every
//! genuine signature.

use crate::cbor;
use crate::error::{CommitError, Result};
use crate::types::crypto::{KeyCodec, PublicKey};
use crate::types::{Did, Ticker, Tid};
use bytes::Bytes;
use cid::Cid;

mod serde_bytes_helper;

/// Current commit schema version
pub const COMMIT_VERSION: i64 = 3;

/// Unsigned repository commit
///
/// Field declaration order is the canonical encoding order. Do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UnsignedCommit {
    /// Repository DID
    pub did: Did,

    /// Commit version (current = 3)
    pub version: i64,

    /// Record tree root CID
    pub data: Cid,

    /// Revision TID
    pub rev: Tid,

    /// Previous commit CID (deprecated in v3, retained for decoding)
    pub prev: Option<Cid>,
}

impl UnsignedCommit {
    /// Create a new v3 unsigned commit
    pub fn new(did: Did, data: Cid, rev: Tid, prev: Option<Cid>) -> Self {
        Self {
            did,
            version: COMMIT_VERSION,
            data,
            rev,
            prev,
        }
    }

    /// Sign this commit with a key, producing a signed [`Commit`]
    pub fn sign(self, key: &impl SigningKey) -> Result<Commit> {
        let encoded = cbor::encode(&self)?;
        let sig = key.sign_bytes(&encoded)?;
        Ok(Commit {
            did: self.did,
            version: self.version,
            data: self.data,
            rev: self.rev,
            prev: self.prev,
            sig,
        })
    }
}

/// Signed repository commit
///
/// Stored as a block, identified by its CID. The signature is detached:
/// it covers the canonical encoding of the unsigned fields only.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Commit {
    /// Repository DID
    pub did: Did,

    /// Commit version (2 or 3)
    pub version: i64,

    /// Record tree root CID
    pub data: Cid,

    /// Revision TID
    pub rev: Tid,

    /// Previous commit CID (None for initial commit)
    pub prev: Option<Cid>,

    /// Signature bytes
    #[serde(with = "serde_bytes_helper")]
    pub sig: Bytes,
}

impl Commit {
    /// The unsigned field set of this commit
    pub fn unsigned(&self) -> UnsignedCommit {
        UnsignedCommit {
            did: self.did.clone(),
            version: self.version,
            data: self.data,
            rev: self.rev.clone(),
            prev: self.prev,
        }
    }

    /// Canonical bytes the signature covers
    fn unsigned_bytes(&self) -> Result<Vec<u8>> {
        cbor::encode(&self.unsigned())
    }

    /// Serialize to DAG-CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        cbor::encode(self)
    }

    /// Deserialize from DAG-CBOR (strict v3 shape; see [`LegacyCommit`] for v2)
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        cbor::decode(data)
    }

    /// Compute CID of this commit
    pub fn to_cid(&self) -> Result<Cid> {
        let bytes = self.to_cbor()?;
        cbor::compute_cid(&bytes)
    }

    /// Verify the signature against a public key.
    ///
    /// Returns `Ok(false)` for a cryptographically invalid signature, and an
    /// error only for a malformed or unsupported signer key. The key type is
    /// inferred from the [`KeyCodec`].
    pub fn verify(&self, pubkey: &PublicKey) -> Result<bool> {
        let unsigned = self.unsigned_bytes()?;
        let signature = self.sig.as_ref();

        let valid = match pubkey.codec {
            KeyCodec::Ed25519 => {
                let vk = pubkey
                    .to_ed25519()
                    .map_err(|e| CommitError::InvalidKey(e.to_string()))?;
                match ed25519_dalek::Signature::from_slice(signature) {
                    Ok(sig) => vk.verify_strict(&unsigned, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            KeyCodec::Secp256k1 => {
                use k256::ecdsa::{Signature, VerifyingKey, signature::Verifier};
                let vk = pubkey
                    .to_k256()
                    .map_err(|e| CommitError::InvalidKey(e.to_string()))?;
                let verifying_key = VerifyingKey::from(&vk);
                match Signature::from_slice(signature) {
                    Ok(sig) => verifying_key.verify(&unsigned, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            KeyCodec::P256 => {
                use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier};
                let vk = pubkey
                    .to_p256()
                    .map_err(|e| CommitError::InvalidKey(e.to_string()))?;
                let verifying_key = VerifyingKey::from(&vk);
                match Signature::from_slice(signature) {
                    Ok(sig) => verifying_key.verify(&unsigned, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            KeyCodec::Unknown(code) => {
                return Err(CommitError::UnsupportedKeyType(code).into());
            }
        };

        Ok(valid)
    }
}

/// Commit shape tolerant of legacy (v2) encodings
///
/// v2 commits lack `rev` and may lack `version`. [`LegacyCommit::normalize`]
/// brings either shape up to v3.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LegacyCommit {
    /// Repository DID
    pub did: Did,

    /// Commit version, absent in some legacy encodings
    #[serde(default)]
    pub version: Option<i64>,

    /// Record tree root CID
    pub data: Cid,

    /// Revision TID, absent before v3
    #[serde(default)]
    pub rev: Option<Tid>,

    /// Previous commit CID
    #[serde(default)]
    pub prev: Option<Cid>,

    /// Signature bytes, absent on unsigned legacy data
    #[serde(default, with = "serde_bytes_helper::option")]
    pub sig: Option<Bytes>,
}

impl LegacyCommit {
    /// Deserialize from DAG-CBOR, accepting v2 and v3 shapes
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        cbor::decode(data)
    }

    /// Normalize to a v3 commit.
    ///
    /// A commit already at version 3 passes through unchanged. Otherwise the
    /// version is stamped to 3 and, when `rev` is absent, a fresh monotonic
    /// revision is synthesized. Idempotent.
    pub fn normalize(self) -> Commit {
        let rev = self
            .rev
            .unwrap_or_else(|| Ticker::new().next(None));
        Commit {
            did: self.did,
            version: COMMIT_VERSION,
            data: self.data,
            rev,
            prev: self.prev,
            sig: self.sig.unwrap_or_default(),
        }
    }
}

impl From<Commit> for LegacyCommit {
    fn from(c: Commit) -> Self {
        Self {
            did: c.did,
            version: Some(c.version),
            data: c.data,
            rev: Some(c.rev),
            prev: c.prev,
            sig: Some(c.sig),
        }
    }
}

/// True iff two commits share a repository lineage and schema generation.
///
/// Compares owner and version only; a cheap pre-check before content
/// comparison.
pub fn meta_equal(a: &Commit, b: &Commit) -> bool {
    a.did == b.did && a.version == b.version
}

/// Trait for signing keys.
///
/// Implemented for ed25519_dalek::SigningKey, k256::ecdsa::SigningKey, and
/// p256::ecdsa::SigningKey.
pub trait SigningKey {
    /// Sign the given data and return signature as Bytes
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes>;

    /// Get the public key bytes
    fn public_key(&self) -> Vec<u8>;

    /// Multicodec tag for this key's verification half
    fn key_codec(&self) -> KeyCodec;
}

// Ed25519 implementation
impl SigningKey for ed25519_dalek::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use ed25519_dalek::Signer;
        let sig = Signer::sign(self, data);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }

    fn public_key(&self) -> Vec<u8> {
        self.verifying_key().to_bytes().to_vec()
    }

    fn key_codec(&self) -> KeyCodec {
        KeyCodec::Ed25519
    }
}

// K-256 (secp256k1) implementation
impl SigningKey for k256::ecdsa::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use k256::ecdsa::signature::Signer;
        let sig: k256::ecdsa::Signature = Signer::sign(self, data);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }

    fn public_key(&self) -> Vec<u8> {
        self.verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    fn key_codec(&self) -> KeyCodec {
        KeyCodec::Secp256k1
    }
}

// P-256 implementation
impl SigningKey for p256::ecdsa::SigningKey {
    fn sign_bytes(&self, data: &[u8]) -> Result<Bytes> {
        use p256::ecdsa::signature::Signer;
        let sig: p256::ecdsa::Signature = Signer::sign(self, data);
        Ok(Bytes::copy_from_slice(&sig.to_bytes()))
    }

    fn public_key(&self) -> Vec<u8> {
        self.verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    fn key_codec(&self) -> KeyCodec {
        KeyCodec::P256
    }
}

/// Verifying identity for any [`SigningKey`]
pub fn public_key_of(key: &impl SigningKey) -> Result<PublicKey> {
    PublicKey::from_raw(key.key_codec(), key.public_key())
        .map_err(|e| CommitError::InvalidKey(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;

    fn test_cid(data: &[u8]) -> Cid {
        cbor::compute_cid(data).unwrap()
    }

    fn unsigned_commit() -> UnsignedCommit {
        UnsignedCommit::new(
            Did::raw("did:plc:ewvi7nxzyoun6zhxrhs64oiz"),
            test_cid(b"root"),
            Tid::from_micros(1_700_000_000_000_000, 0),
            None,
        )
    }

    #[test]
    fn test_sign_verify_ed25519() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        let pubkey = public_key_of(&key).unwrap();
        assert!(commit.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_sign_verify_k256() {
        let key = k256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let commit = unsigned_commit().sign(&key).unwrap();
        let pubkey = public_key_of(&key).unwrap();
        assert!(commit.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_sign_verify_p256() {
        let key = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let commit = unsigned_commit().sign(&key).unwrap();
        let pubkey = public_key_of(&key).unwrap();
        assert!(commit.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_tampered_field_fails_verification() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let pubkey = public_key_of(&key).unwrap();

        let mut commit = unsigned_commit().sign(&key).unwrap();
        commit.data = test_cid(b"other root");
        assert!(!commit.verify(&pubkey).unwrap());

        let mut commit = unsigned_commit().sign(&key).unwrap();
        commit.rev = Tid::from_micros(1_700_000_000_000_001, 0);
        assert!(!commit.verify(&pubkey).unwrap());

        let mut commit = unsigned_commit().sign(&key).unwrap();
        commit.did = Did::raw("did:plc:aaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(!commit.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let other = ed25519_dalek::SigningKey::from_bytes(&[8u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        assert!(!commit.verify(&public_key_of(&other).unwrap()).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_false_not_error() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let pubkey = public_key_of(&key).unwrap();
        let mut commit = unsigned_commit().sign(&key).unwrap();
        commit.sig = Bytes::from_static(b"not a signature");
        assert!(!commit.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_unknown_key_codec_is_error() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        let bogus = PublicKey {
            codec: KeyCodec::Unknown(0xBEEF),
            bytes: vec![0u8; 32],
        };
        assert!(commit.verify(&bogus).is_err());
    }

    #[test]
    fn test_commit_cbor_round_trip() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        let bytes = commit.to_cbor().unwrap();
        let decoded = Commit::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, commit);

        // Round-tripped commit still verifies
        let pubkey = public_key_of(&key).unwrap();
        assert!(decoded.verify(&pubkey).unwrap());
    }

    #[test]
    fn test_normalize_legacy_fills_version_and_rev() {
        let legacy = LegacyCommit {
            did: Did::raw("did:plc:ewvi7nxzyoun6zhxrhs64oiz"),
            version: None,
            data: test_cid(b"root"),
            rev: None,
            prev: None,
            sig: None,
        };
        let commit = legacy.normalize();
        assert_eq!(commit.version, COMMIT_VERSION);
        assert!(!commit.rev.as_str().is_empty());
    }

    #[test]
    fn test_normalize_idempotent() {
        let legacy = LegacyCommit {
            did: Did::raw("did:plc:ewvi7nxzyoun6zhxrhs64oiz"),
            version: Some(2),
            data: test_cid(b"root"),
            rev: None,
            prev: Some(test_cid(b"prev")),
            sig: None,
        };
        let once = legacy.normalize();
        let twice = LegacyCommit::from(once.clone()).normalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_v3_passthrough() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        let normalized = LegacyCommit::from(commit.clone()).normalize();
        assert_eq!(normalized, commit);
    }

    #[test]
    fn test_legacy_decode_of_v3_bytes() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let commit = unsigned_commit().sign(&key).unwrap();
        let bytes = commit.to_cbor().unwrap();
        let legacy = LegacyCommit::from_cbor(&bytes).unwrap();
        assert_eq!(legacy.normalize(), commit);
    }

    #[test]
    fn test_meta_equal() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let a = unsigned_commit().sign(&key).unwrap();

        let mut b = a.clone();
        b.data = test_cid(b"different content");
        b.rev = Tid::from_micros(1_800_000_000_000_000, 0);
        assert!(meta_equal(&a, &b));

        let mut c = a.clone();
        c.did = Did::raw("did:plc:aaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(!meta_equal(&a, &c));

        let mut d = a.clone();
        d.version = 2;
        assert!(!meta_equal(&a, &d));
    }
}
