use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of an untagged hash string: 32 digest bytes in unpadded base64.
pub const OBJECT_HASH_LEN: usize = 43;

/// The shape of a stored value, recoverable from its hash string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Raw bytes, tagged `0`.
    Bytes,
    /// UTF-8 text, tagged `1`.
    Text,
    /// Structurally encoded object, untagged.
    Object,
}

impl ValueKind {
    /// The one-character tag prefixed to the hash, if any.
    pub fn tag(&self) -> Option<char> {
        match self {
            Self::Bytes => Some('0'),
            Self::Text => Some('1'),
            Self::Object => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::Text => write!(f, "text"),
            Self::Object => write!(f, "object"),
        }
    }
}

/// Content address of a stored value: optional kind tag + base64 digest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap a digest string computed for a value of `kind`.
    pub fn tagged(kind: ValueKind, digest: &str) -> Self {
        match kind.tag() {
            Some(tag) => Self(format!("{tag}{digest}")),
            None => Self(digest.to_string()),
        }
    }

    /// Parse a hash string, checking that its kind is recognizable.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let hash = Self(s.to_string());
        hash.kind()?;
        Ok(hash)
    }

    /// Recover the value kind from the hash string.
    ///
    /// Untagged hashes are exactly [`OBJECT_HASH_LEN`] characters long;
    /// anything else must start with a known tag.
    pub fn kind(&self) -> Result<ValueKind, TypeError> {
        if self.0.len() == OBJECT_HASH_LEN {
            return Ok(ValueKind::Object);
        }
        match self.0.chars().next() {
            Some('0') if self.0.len() == OBJECT_HASH_LEN + 1 => Ok(ValueKind::Bytes),
            Some('1') if self.0.len() == OBJECT_HASH_LEN + 1 => Ok(ValueKind::Text),
            _ => Err(TypeError::InvalidHash(self.0.clone())),
        }
    }

    /// The digest part, without the kind tag.
    pub fn digest(&self) -> &str {
        if self.0.len() == OBJECT_HASH_LEN + 1 {
            &self.0[1..]
        } else {
            &self.0
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.0[..self.0.len().min(9)])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value held by a key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Bytes(Vec<u8>),
    Text(String),
    Object(serde_json::Value),
}

impl StoredValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Text(_) => ValueKind::Text,
            Self::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Object(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for StoredValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for StoredValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<serde_json::Value> for StoredValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Object(value)
    }
}
