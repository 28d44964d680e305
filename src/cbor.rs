//! Canonical DAG-CBOR encoding and content addressing
//!
//! Every block in a repository is the DAG-CBOR encoding of some structured
//! value, addressed by the CID of those bytes. Byte-for-byte stability of
//! the encoding is what makes CIDs and commit signatures stable, so all
//! encode/decode in this crate goes through this module.

use crate::error::{DataError, Result};
use cid::Cid;
use ipld_core::ipld::Ipld;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Multicodec code for DAG-CBOR (0x71)
pub const DAG_CBOR: u64 = 0x71;

/// Multicodec code for SHA2-256 (0x12)
pub const SHA2_256: u64 = 0x12;

/// A repository record: a keyed object, never an array or scalar
pub type RepoRecord = BTreeMap<String, Ipld>;

/// Encode a value as canonical DAG-CBOR
///
/// Equal values always produce byte-identical output, hence identical CIDs.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| DataError::Encode(Box::new(e)).into())
}

/// Decode DAG-CBOR bytes into a typed value
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| DataError::Decode(Box::new(e)).into())
}

/// Decode DAG-CBOR bytes into a generic IPLD value
pub fn decode_ipld(bytes: &[u8]) -> Result<Ipld> {
    decode(bytes)
}

/// Compute CID from raw bytes
///
/// Uses SHA-256 hash and DAG-CBOR codec. Assumes data is already DAG-CBOR
/// encoded. Pure: no side effects, stable across calls and processes.
pub fn compute_cid(data: &[u8]) -> Result<Cid> {
    let mut sha = Sha256::new();
    sha.update(data);
    let hash = sha.finalize().to_vec();
    let mh = multihash::Multihash::<64>::wrap(SHA2_256, hash.as_slice())
        .map_err(|e| DataError::Encode(Box::new(e)))?;

    Ok(Cid::new_v1(DAG_CBOR, mh))
}

/// Encode a value and compute the CID of its encoding
pub fn cid_for_value<T: Serialize>(value: &T) -> Result<Cid> {
    let bytes = encode(value)?;
    compute_cid(&bytes)
}

/// Coerce an IPLD value into a repository record
///
/// Records must be keyed objects. Arrays, primitives, and top-level scalars
/// are rejected with a `NotARecord` error.
pub fn to_record(value: Ipld) -> Result<RepoRecord> {
    match value {
        Ipld::Map(map) => Ok(map),
        other => Err(DataError::NotARecord {
            found: ipld_kind_name(&other),
        }
        .into()),
    }
}

/// Decode DAG-CBOR bytes directly into a repository record
pub fn decode_record(bytes: &[u8]) -> Result<RepoRecord> {
    to_record(decode_ipld(bytes)?)
}

fn ipld_kind_name(value: &Ipld) -> &'static str {
    match value {
        Ipld::Null => "null",
        Ipld::Bool(_) => "bool",
        Ipld::Integer(_) => "integer",
        Ipld::Float(_) => "float",
        Ipld::String(_) => "string",
        Ipld::Bytes(_) => "bytes",
        Ipld::List(_) => "list",
        Ipld::Map(_) => "map",
        Ipld::Link(_) => "link",
    }
}
