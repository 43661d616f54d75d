use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// SHA-256 digest of a file's raw bytes.
///
/// Computed once at ingest and served to readers, who can recompute it over
/// the bytes they received. Serialized as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Compute the checksum of a complete buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 16 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Returns `true` if `data` hashes to this checksum.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Checksum {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_hex()
    }
}

/// Incremental checksum computation for streamed content.
#[derive(Clone, Default)]
pub struct ChecksumHasher {
    inner: Sha256,
    len: u64,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> Checksum {
        Checksum(self.inner.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // sha256("") is a well-known constant.
        assert_eq!(
            Checksum::compute(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"Hello, World! This is version 1.0.0\n";
        let mut hasher = ChecksumHasher::new();
        for chunk in data.chunks(5) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.len(), data.len() as u64);
        assert_eq!(hasher.finalize(), Checksum::compute(data));
    }

    #[test]
    fn hex_roundtrip() {
        let c = Checksum::compute(b"roundtrip");
        assert_eq!(Checksum::from_hex(&c.to_hex()).unwrap(), c);
        assert_eq!(c.to_string().len(), 64);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(matches!(
            Checksum::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
        assert!(matches!(
            Checksum::from_hex("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn verify_detects_tampering() {
        let c = Checksum::compute(b"original");
        assert!(c.verify(b"original"));
        assert!(!c.verify(b"tampered"));
    }

    #[test]
    fn serde_is_hex_string() {
        let c = Checksum::compute(b"serde");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
