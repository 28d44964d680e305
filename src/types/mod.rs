//! Identifier and key types for repository commits

pub mod crypto;
pub mod did;
pub mod tid;

pub use crypto::{CryptoError, KeyCodec, PublicKey};
pub use did::Did;
pub use tid::{Ticker, Tid};

use crate::error::{RepoError, RepoErrorKind};

/// Error for malformed identifier strings
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("invalid {kind}: {value}")]
pub struct IdError {
    kind: &'static str,
    value: String,
}

impl IdError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl From<IdError> for RepoError {
    fn from(e: IdError) -> Self {
        RepoError::new(RepoErrorKind::InvalidKey, Some(Box::new(e)))
    }
}
