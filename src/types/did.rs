//! Repository owner identifiers (DIDs)

use serde::{Deserialize, Deserializer, Serialize, de::Error};
use smol_str::SmolStr;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::LazyLock;

use super::IdError;
use regex::Regex;

/// Regex for DID validation per AT Protocol spec.
///
/// Allows `%` in the identifier but prevents DIDs from ending with `:` or
/// `%`. Does not validate that percent-encoding is well-formed, matching
/// the reference implementation.
pub static DID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]*[a-zA-Z0-9._-]$").unwrap());

/// A repository owner identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Hash)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Did(SmolStr);

impl Did {
    /// Fallible constructor, validates the DID format.
    pub fn new(did: impl AsRef<str>) -> Result<Self, IdError> {
        let did = did.as_ref();
        if did.len() > 2048 || !DID_REGEX.is_match(did) {
            Err(IdError::new("did", did))
        } else {
            Ok(Self(SmolStr::new(did)))
        }
    }

    /// Infallible constructor for when you *know* the string is a valid DID.
    /// Will panic on an invalid DID.
    pub fn raw(did: impl AsRef<str>) -> Self {
        Self::new(did).expect("valid DID")
    }

    /// Returns the DID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Did {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: SmolStr = Deserialize::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Did {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
