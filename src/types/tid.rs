//! Timestamp identifiers: monotonically ordered revision tokens
//!
//! A [Tid] packs a microsecond timestamp and a 10-bit clock id into 13
//! base32-sortable characters. Lexicographic order over the string equals
//! numeric order over the packed value, so revisions compare correctly as
//! plain strings, in memory and in any backend that stores them as text.

use serde::{Deserialize, Deserializer, Serialize, de::Error};
use smol_str::{SmolStr, SmolStrBuilder};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::LazyLock;

use super::IdError;
use regex::Regex;

const S32_CHAR: &[u8] = b"234567abcdefghijklmnopqrstuvwxyz";

fn s32_encode(mut i: u64) -> SmolStr {
    let mut s = SmolStrBuilder::new();
    for _ in 0..13 {
        let c = i & 0x1F;
        s.push(S32_CHAR[c as usize] as char);

        i >>= 5;
    }

    let mut builder = SmolStrBuilder::new();
    for c in s.finish().chars().rev() {
        builder.push(c);
    }
    builder.finish()
}

fn s32_decode(s: &str) -> u64 {
    s.bytes().fold(0u64, |acc, b| {
        let v = S32_CHAR.iter().position(|c| *c == b).unwrap_or(0) as u64;
        (acc << 5) | v
    })
}

static TID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[234567abcdefghij][234567abcdefghijklmnopqrstuvwxyz]{12}$").unwrap()
});

/// A [Timestamp Identifier].
///
/// [Timestamp Identifier]: https://atproto.com/specs/tid
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Hash)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Tid(SmolStr);

impl Tid {
    /// Parses a `TID` from the given string.
    pub fn new(tid: impl AsRef<str>) -> Result<Self, IdError> {
        let tid = tid.as_ref();
        if tid.len() != 13 || !TID_REGEX.is_match(tid) {
            Err(IdError::new("tid", tid))
        } else {
            Ok(Self(SmolStr::new_inline(tid)))
        }
    }

    /// Infallible constructor for when you *know* the string is a valid TID.
    /// Will panic on an invalid TID.
    pub fn raw(tid: impl AsRef<str>) -> Self {
        Self::new(tid).expect("valid TID")
    }

    /// Build a TID from a microsecond timestamp and clock id.
    ///
    /// The TID is laid out as follows:
    /// 0TTTTTTTTTTTTTTT TTTTTTTTTTTTTTTT TTTTTTTTTTTTTTTT TTTTTTCCCCCCCCCC
    pub fn from_micros(micros: u64, clkid: u32) -> Self {
        let tid = (micros << 10) & 0x7FFF_FFFF_FFFF_FC00 | (clkid as u64 & 0x3FF);
        Self(s32_encode(tid))
    }

    /// Microsecond timestamp component of this TID.
    pub fn timestamp_micros(&self) -> u64 {
        s32_decode(&self.0) >> 10
    }

    /// Returns the TID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Tid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: SmolStr = Deserialize::deserialize(deserializer)?;
        Self::new(value).map_err(D::Error::custom)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Tid> for String {
    fn from(value: Tid) -> Self {
        value.0.to_string()
    }
}

impl From<Tid> for SmolStr {
    fn from(value: Tid) -> Self {
        value.0
    }
}

impl AsRef<str> for Tid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Tid {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

/// Monotonic TID source.
///
/// Issues strictly increasing TIDs. When the wall clock stalls or runs
/// backwards, the ticker advances one microsecond past the last issue
/// instead. Pass the last persisted revision as `prev` to keep the
/// guarantee across process restarts.
#[derive(Debug, Clone, Default)]
pub struct Ticker {
    last_micros: u64,
    clkid: u32,
}

impl Ticker {
    /// Create a ticker with clock id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ticker with the given clock id (low 10 bits used).
    pub fn with_clkid(clkid: u32) -> Self {
        Self {
            last_micros: 0,
            clkid: clkid & 0x3FF,
        }
    }

    /// Issue the next TID, strictly greater than both the ticker's previous
    /// issue and `prev`.
    pub fn next(&mut self, prev: Option<&Tid>) -> Tid {
        let now = chrono::Utc::now().timestamp_micros().max(0) as u64;
        let floor = prev
            .map(Tid::timestamp_micros)
            .unwrap_or(0)
            .max(self.last_micros);
        let micros = if now > floor { now } else { floor + 1 };
        self.last_micros = micros;
        Tid::from_micros(micros, self.clkid)
    }
}
