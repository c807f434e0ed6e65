use arbor_crypto::ContentHasher;
use arbor_types::{ContentHash, StoredValue, ValueKind};

use crate::error::{StoreError, StoreResult};

/// A value encoded to bytes, ready to be stored: kind tag + data.
///
/// Bytes are stored as-is, text as UTF-8, and objects as JSON.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedValue {
    pub kind: ValueKind,
    pub data: Vec<u8>,
}

impl EncodedValue {
    pub fn new(kind: ValueKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Encode a stored value.
    pub fn encode(value: &StoredValue) -> StoreResult<Self> {
        let encoded = match value {
            StoredValue::Bytes(bytes) => Self::new(ValueKind::Bytes, bytes.clone()),
            StoredValue::Text(text) => Self::new(ValueKind::Text, text.as_bytes().to_vec()),
            StoredValue::Object(object) => Self::new(
                ValueKind::Object,
                serde_json::to_vec(object).map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
        };
        Ok(encoded)
    }

    /// Decode back into a stored value.
    pub fn decode(self) -> StoreResult<StoredValue> {
        let decoded = match self.kind {
            ValueKind::Bytes => return Ok(StoredValue::Bytes(self.data)),
            ValueKind::Text => std::str::from_utf8(&self.data)
                .map(|text| StoredValue::Text(text.to_string()))
                .map_err(|e| e.to_string()),
            ValueKind::Object => serde_json::from_slice(&self.data)
                .map(StoredValue::Object)
                .map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| StoreError::CorruptBlob {
            hash: self.compute_hash(),
            reason,
        })
    }

    /// The tagged content hash of this value.
    pub fn compute_hash(&self) -> ContentHash {
        ContentHasher::hash_value(self.kind, &self.data)
    }

    /// Size of the encoded data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
