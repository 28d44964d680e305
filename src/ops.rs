//! Translation of tree differences into record-level write descriptors.
//!
//! The Merkle-search-tree diff itself is computed elsewhere; this module
//! consumes its output shape ([`DataDiff`]) and turns each entry into a
//! typed Create/Update/Delete instruction addressed by collection and
//! record key. A single malformed path key fails the whole translation,
//! never a partial result.

use crate::error::{DataError, Result};
use cid::Cid;
use smol_str::SmolStr;

/// One added entry in a tree diff: path key plus new record CID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffAdd {
    /// Path key, `"collection/rkey"`
    pub key: SmolStr,
    /// CID of the new record
    pub cid: Cid,
}

/// One updated entry in a tree diff: path key plus new and previous CIDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffUpdate {
    /// Path key, `"collection/rkey"`
    pub key: SmolStr,
    /// CID of the new record
    pub cid: Cid,
    /// CID of the record being replaced
    pub prev: Cid,
}

/// One deleted entry in a tree diff: path key plus the removed CID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDelete {
    /// Path key, `"collection/rkey"`
    pub key: SmolStr,
    /// CID of the removed record
    pub cid: Cid,
}

/// Output shape of a tree difference, at this crate's boundary.
///
/// The three lists keep the diff algorithm's internal order; a key appears
/// at most once across all of them within a single diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDiff {
    /// New records
    pub adds: Vec<DiffAdd>,
    /// Replaced records
    pub updates: Vec<DiffUpdate>,
    /// Removed records
    pub deletes: Vec<DiffDelete>,
}

impl DataDiff {
    /// Check if the diff carries no changes
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Count total operations
    pub fn op_count(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }
}

/// A `(collection, rkey)` pair parsed from a path key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    /// Record collection (NSID)
    pub collection: SmolStr,
    /// Record key within the collection
    pub rkey: SmolStr,
}

/// Parse a path key into collection and rkey.
///
/// Exactly one `/` separator is accepted; anything else is a malformed key.
pub fn parse_data_key(key: &str) -> Result<RecordPath> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(collection), Some(rkey), None) => Ok(RecordPath {
            collection: SmolStr::new(collection),
            rkey: SmolStr::new(rkey),
        }),
        _ => Err(DataError::InvalidKey {
            key: key.to_string(),
        }
        .into()),
    }
}

/// Format a collection and rkey as a path key
pub fn format_data_key(collection: &str, rkey: &str) -> String {
    format!("{}/{}", collection, rkey)
}

/// A typed record-level write instruction derived from a tree diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWriteDescript {
    /// A record that did not exist before
    Create {
        /// Record collection
        collection: SmolStr,
        /// Record key
        rkey: SmolStr,
        /// CID of the new record
        cid: Cid,
    },
    /// A record replaced with new content
    Update {
        /// Record collection
        collection: SmolStr,
        /// Record key
        rkey: SmolStr,
        /// CID of the new record
        cid: Cid,
        /// CID of the replaced record
        prev: Cid,
    },
    /// A record removed from the repository
    Delete {
        /// Record collection
        collection: SmolStr,
        /// Record key
        rkey: SmolStr,
        /// CID of the removed record
        cid: Cid,
    },
}

impl RecordWriteDescript {
    /// Name of this descriptor's action
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Translate a tree diff into an ordered sequence of write descriptors.
///
/// Output is grouped creates, then updates, then deletes, preserving the
/// diff's order within each group. Descriptors are independent of each
/// other. The first malformed key aborts the whole translation.
pub fn to_write_descripts(diff: &DataDiff) -> Result<Vec<RecordWriteDescript>> {
    let mut descripts = Vec::with_capacity(diff.op_count());

    for add in &diff.adds {
        let path = parse_data_key(&add.key)?;
        descripts.push(RecordWriteDescript::Create {
            collection: path.collection,
            rkey: path.rkey,
            cid: add.cid,
        });
    }
    for upd in &diff.updates {
        let path = parse_data_key(&upd.key)?;
        descripts.push(RecordWriteDescript::Update {
            collection: path.collection,
            rkey: path.rkey,
            cid: upd.cid,
            prev: upd.prev,
        });
    }
    for del in &diff.deletes {
        let path = parse_data_key(&del.key)?;
        descripts.push(RecordWriteDescript::Delete {
            collection: path.collection,
            rkey: path.rkey,
            cid: del.cid,
        });
    }

    Ok(descripts)
}

/// Keep only Create descriptors, rejecting anything else.
///
/// Fails on the first non-Create entry; callers needing an all-create batch
/// must not silently drop other kinds.
pub fn ensure_creates(
    descripts: Vec<RecordWriteDescript>,
) -> Result<Vec<RecordWriteDescript>> {
    for descript in &descripts {
        if !matches!(descript, RecordWriteDescript::Create { .. }) {
            return Err(DataError::UnexpectedAction {
                action: descript.action(),
            }
            .into());
        }
    }
    Ok(descripts)
}
