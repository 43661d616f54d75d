use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::name::FileName;
use crate::version::Version;

/// Domain tag prepended to every content address computation.
const CONTENT_DOMAIN: &str = "verdist-content-v1";

/// Logical address of a piece of stored content.
///
/// A domain-separated BLAKE3 hash over `(filename, version, checksum)`.
/// Re-uploading identical bytes under the same version always yields the same
/// address; any change to one of the three inputs yields a different one.
/// The address says nothing about where a backend keeps the bytes, which is
/// what [`ContentRef`] is for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    /// Derive the address of `(filename, version, checksum)`.
    pub fn derive(filename: &FileName, version: &Version, checksum: &Checksum) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTENT_DOMAIN.as_bytes());
        hasher.update(b":");
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        for part in [filename.as_str().as_bytes(), version.as_str().as_bytes()] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        hasher.update(checksum.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.short_hex())
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Opaque locator into a content store.
///
/// Produced by a store when content is committed and stored verbatim in the
/// metadata index. Only the store that issued a ref interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(name: &str, version: &str, data: &[u8]) -> ContentAddress {
        ContentAddress::derive(
            &FileName::new(name).unwrap(),
            &Version::new(version).unwrap(),
            &Checksum::compute(data),
        )
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(addr("app", "1.0.0", b"x"), addr("app", "1.0.0", b"x"));
    }

    #[test]
    fn every_input_changes_the_address() {
        let base = addr("app", "1.0.0", b"x");
        assert_ne!(base, addr("app2", "1.0.0", b"x"));
        assert_ne!(base, addr("app", "1.0.1", b"x"));
        assert_ne!(base, addr("app", "1.0.0", b"y"));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(addr("a1", "1.0", b"x"), addr("a", "11.0", b"x"));
    }

    #[test]
    fn hex_forms() {
        let a = addr("app", "1.0.0", b"x");
        assert_eq!(a.to_hex().len(), 64);
        assert!(a.to_hex().starts_with(&a.short_hex()));
        assert_eq!(a.short_hex().len(), 8);
    }

    #[test]
    fn content_ref_serializes_transparently() {
        let r = ContentRef::new("objects/ab/cdef");
        assert_eq!(serde_json::to_string(&r).unwrap(), "\"objects/ab/cdef\"");
    }
}
