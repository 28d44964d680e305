//! Error types for repository operations

use std::error::Error;
use std::fmt;

use cid::Cid;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

/// Repository operation error with rich diagnostics
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct RepoError {
    kind: RepoErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<String>,
    context: Option<String>,
}

/// Error categories for repository operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    /// Storage operation failed
    Storage,
    /// Serialization/deserialization failed
    Serialization,
    /// Block present but does not match the expected shape
    Schema,
    /// Decoded value is not a keyed object
    NotARecord,
    /// Invalid record key format
    InvalidKey,
    /// Invalid commit structure
    InvalidCommit,
    /// Write descriptor of an unexpected kind
    UnexpectedAction,
    /// Resource not found
    NotFound,
    /// Root update with a non-advancing revision
    StaleRevision,
    /// Blob absent or quarantined
    BlobNotFound,
    /// Cryptographic operation failed
    Crypto,
    /// I/O error
    Io,
}

impl RepoError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: RepoErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
        }
    }

    /// Add a help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context information to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> &RepoErrorKind {
        &self.kind
    }

    // Constructors for different error kinds

    /// Create a storage error
    pub fn storage(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::Storage, Some(Box::new(source)))
    }

    /// Create a serialization error
    pub fn serialization(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::Serialization, Some(Box::new(source)))
    }

    /// Create a not found error
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        Self::new(RepoErrorKind::NotFound, None)
            .with_context(format!("{} not found: {}", resource, id))
    }

    /// Create an invalid record key error
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::new(RepoErrorKind::InvalidKey, None)
            .with_help("record paths must be \"collection/rkey\" with exactly one slash")
            .with_context(format!("key: {}", key.into()))
    }

    /// Create an invalid commit error
    pub fn invalid_commit(msg: impl Into<String>) -> Self {
        Self::new(RepoErrorKind::InvalidCommit, Some(msg.into().into()))
    }

    /// Create a crypto error
    pub fn crypto(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::Crypto, Some(Box::new(source)))
    }

    /// Create an I/O error
    pub fn io(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::Io, Some(Box::new(source)))
    }
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;

        if let Some(ctx) = &self.context {
            write!(f, ": {}", ctx)?;
        }

        if let Some(src) = &self.source {
            write!(f, ": {}", src)?;
        }

        Ok(())
    }
}

// Internal granular errors

/// Errors from canonical encoding, record coercion, and diff translation
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DataError {
    /// Canonical encoding failed
    #[error("Canonical encoding failed")]
    Encode(#[source] BoxError),

    /// Malformed or truncated canonical encoding
    #[error("Malformed canonical encoding")]
    Decode(#[source] BoxError),

    /// Decoded value is not a map
    #[error("Record must be a keyed object, found {found}")]
    NotARecord {
        /// Description of the decoded value's kind
        found: &'static str,
    },

    /// Record path does not split into collection and rkey
    #[error("Invalid record key: {key}")]
    InvalidKey {
        /// The malformed key
        key: String,
    },

    /// Write descriptor of a kind the caller rejects
    #[error("Unexpected action: {action}")]
    UnexpectedAction {
        /// The offending action name
        action: &'static str,
    },
}

impl From<DataError> for RepoError {
    fn from(e: DataError) -> Self {
        match e {
            DataError::Encode(e) | DataError::Decode(e) => {
                RepoError::new(RepoErrorKind::Serialization, Some(e))
            }
            DataError::NotARecord { found } => RepoError::new(RepoErrorKind::NotARecord, None)
                .with_context(format!("expected a map, found {}", found)),
            DataError::InvalidKey { key } => RepoError::invalid_key(key),
            DataError::UnexpectedAction { action } => {
                RepoError::new(RepoErrorKind::UnexpectedAction, None)
                    .with_context(format!("unexpected action: {}", action))
            }
        }
    }
}

/// Commit-specific errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CommitError {
    /// Invalid commit version
    #[error("Invalid commit version: {0}")]
    InvalidVersion(i64),

    /// Invalid signer key
    #[error("Invalid signer key: {0}")]
    InvalidKey(String),

    /// Unsupported key type
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(u64),

    /// Serialization failed
    #[error("Serialization failed")]
    Serialization(#[source] BoxError),
}

impl From<CommitError> for RepoError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::InvalidVersion(v) => {
                RepoError::invalid_commit(format!("unsupported version {}", v))
            }
            CommitError::InvalidKey(msg) => RepoError::new(RepoErrorKind::Crypto, Some(msg.into()))
                .with_context("invalid signer key".to_string()),
            CommitError::UnsupportedKeyType(code) => RepoError::new(RepoErrorKind::Crypto, None)
                .with_context(format!("unsupported key type: 0x{:x}", code)),
            CommitError::Serialization(e) => RepoError::new(RepoErrorKind::Serialization, Some(e)),
        }
    }
}

/// Storage-layer errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum StorageError {
    /// Required block absent
    #[error("Block not found: {cid}")]
    NotFound {
        /// The missing CID
        cid: Cid,
    },

    /// Block present but fails shape validation
    #[error("Block {cid} does not match expected shape")]
    Schema {
        /// CID of the offending block
        cid: Cid,
        /// Underlying decode error
        #[source]
        source: BoxError,
    },

    /// Root update with a revision not greater than the stored one
    #[error("Stale revision: {attempted} does not advance past {current}")]
    StaleRevision {
        /// Revision supplied by the caller
        attempted: String,
        /// Revision currently committed
        current: String,
    },

    /// Underlying I/O failed
    #[error("Storage I/O failed")]
    Io(#[source] BoxError),
}

impl From<StorageError> for RepoError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { cid } => RepoError::not_found("block", cid),
            StorageError::Schema { cid, source } => {
                RepoError::new(RepoErrorKind::Schema, Some(source))
                    .with_context(format!("block: {}", cid))
            }
            StorageError::StaleRevision { attempted, current } => {
                RepoError::new(RepoErrorKind::StaleRevision, None)
                    .with_context(format!("attempted {} <= current {}", attempted, current))
                    .with_help("root updates must carry a strictly greater revision")
            }
            StorageError::Io(e) => RepoError::new(RepoErrorKind::Io, Some(e)),
        }
    }
}

/// Blob storage errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum BlobError {
    /// Blob absent or quarantined
    #[error("Blob not found: {cid}")]
    NotFound {
        /// CID of the requested blob
        cid: Cid,
    },

    /// Temporary key absent
    #[error("Temp blob not found: {key}")]
    TempNotFound {
        /// The temporary key
        key: String,
    },

    /// Underlying I/O failed
    #[error("Blob I/O failed")]
    Io(#[source] BoxError),
}

impl From<BlobError> for RepoError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound { cid } => RepoError::new(RepoErrorKind::BlobNotFound, None)
                .with_context(format!("blob not found: {}", cid))
                .with_help("quarantined blobs are excluded from reads"),
            BlobError::TempNotFound { key } => RepoError::new(RepoErrorKind::BlobNotFound, None)
                .with_context(format!("temp blob not found: {}", key)),
            BlobError::Io(e) => RepoError::new(RepoErrorKind::Io, Some(e)),
        }
    }
}
