use arbor_types::{ContentHash, ValueKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// BLAKE3 content hasher producing url-safe base64 digests.
pub struct ContentHasher;

impl ContentHasher {
    /// Digest raw bytes into a 43-character url-safe string.
    pub fn digest(data: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(blake3::hash(data).as_bytes())
    }

    /// Content hash of an encoded value, tagged with its kind.
    pub fn hash_value(kind: ValueKind, encoded: &[u8]) -> ContentHash {
        ContentHash::tagged(kind, &Self::digest(encoded))
    }

    /// Digest a serializable value as JSON.
    pub fn digest_json<T: serde::Serialize>(value: &T) -> Result<String, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(Self::digest(&data))
    }

    /// Verify that encoded bytes match a content hash, tag included.
    pub fn verify(hash: &ContentHash, encoded: &[u8]) -> bool {
        match hash.kind() {
            Ok(kind) => Self::hash_value(kind, encoded) == *hash,
            Err(_) => false,
        }
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::OBJECT_HASH_LEN;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(ContentHasher::digest(b"hello"), ContentHasher::digest(b"hello"));
        assert_ne!(ContentHasher::digest(b"hello"), ContentHasher::digest(b"world"));
    }

    #[test]
    fn digest_is_url_safe_and_unpadded() {
        let digest = ContentHasher::digest(b"some bytes");
        assert_eq!(digest.len(), OBJECT_HASH_LEN);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tags_distinguish_kinds() {
        let bytes = ContentHasher::hash_value(ValueKind::Bytes, b"x");
        let text = ContentHasher::hash_value(ValueKind::Text, b"x");
        let object = ContentHasher::hash_value(ValueKind::Object, b"x");
        assert_eq!(bytes.kind().unwrap(), ValueKind::Bytes);
        assert_eq!(text.kind().unwrap(), ValueKind::Text);
        assert_eq!(object.kind().unwrap(), ValueKind::Object);
        assert_eq!(bytes.digest(), object.digest());
    }

    #[test]
    fn verify_detects_tampering() {
        let hash = ContentHasher::hash_value(ValueKind::Text, b"original");
        assert!(ContentHasher::verify(&hash, b"original"));
        assert!(!ContentHasher::verify(&hash, b"tampered"));
    }

    #[test]
    fn digest_json_matches_digest_of_bytes() {
        let value = serde_json::json!(["R0", "x"]);
        let expected = ContentHasher::digest(br#"["R0","x"]"#);
        assert_eq!(ContentHasher::digest_json(&value).unwrap(), expected);
    }
}
