//! Strong type definitions for itemsync.
//!
//! Identities and versions are newtypes so a raw string or integer cannot be
//! passed where the other is expected.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The stable string identifier of an item.
///
/// Assigned locally by a [`KeyGenerator`](crate::keys::KeyGenerator) or by
/// the server on first creation, and never changed afterwards.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKey(String);

impl ItemKey {
    /// Create a key, rejecting empty or non-alphanumeric input.
    pub fn new(key: impl Into<String>) -> Result<Self, CoreError> {
        let key = key.into();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    /// Wrap a key built from [`KEY_ALPHABET`](crate::keys::KEY_ALPHABET).
    pub(crate) fn from_alphabet(key: String) -> Self {
        debug_assert!(!key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric()));
        Self(key)
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemKey({})", self.0)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ItemKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ItemKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A version number assigned by the remote store.
///
/// Versions only move forward. `Version::UNESTABLISHED` marks an object the
/// server has not accepted yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// Sentinel for "never confirmed by the server".
    pub const UNESTABLISHED: Self = Self(0);

    /// Whether the server has assigned this version.
    pub const fn is_established(&self) -> bool {
        self.0 > 0
    }

    /// Parse a `Last-Modified-Version` style header value.
    pub fn parse_header(value: &str) -> Option<Self> {
        value.trim().parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A per-record rejection reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    /// Key of the rejected record, when it has one.
    pub key: Option<ItemKey>,
    /// HTTP-style status code for this record.
    pub code: u16,
    /// Server-provided description.
    pub message: String,
}

impl WriteFailure {
    /// Whether the rejection is a version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self.code, 409 | 412)
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{key}: http {}: {}", self.code, self.message),
            None => write!(f, "http {}: {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_rejects_empty() {
        assert!(ItemKey::new("").is_err());
        assert!(ItemKey::new("AB CD").is_err());
        assert!(ItemKey::new("ABCD1234").is_ok());
    }

    #[test]
    fn test_item_key_serde_is_plain_string() {
        let key = ItemKey::new("ABCD1234").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"ABCD1234\"");

        let back: ItemKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<ItemKey>("\"\"").is_err());
    }

    #[test]
    fn test_version_header_parsing() {
        assert_eq!(Version::parse_header(" 42 "), Some(Version(42)));
        assert_eq!(Version::parse_header("abc"), None);
        assert!(!Version::UNESTABLISHED.is_established());
        assert_eq!(Version(3).max(Version(7)), Version(7));
        assert_eq!(Version(9).max(Version(7)), Version(9));
    }
}
