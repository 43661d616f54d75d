//! Version tokens and their ordering.
//!
//! A version is *semantic* when it consists of exactly three dot-separated
//! decimal components that each fit in a `u64` (`1.0.0`, `2.10.3`). Any other
//! well-formed token (`beta`, `rc1`, `2024-06-01`) is *opaque*.
//!
//! Ordering rules, applied by [`compare_versions`]:
//!
//! 1. Two semantic versions compare numerically by `(major, minor, patch)`.
//!    Equal triples spelled differently (`1.0.0` / `01.0.0`) fall back to
//!    byte order so that `Equal` means "identical token".
//! 2. Two opaque tokens compare byte-wise.
//! 3. An opaque token always orders before a semantic version.
//!
//! Rule 3 keeps the comparator transitive. Falling back to byte order only
//! for the mixed pair would produce cycles such as
//! `2.0.0 < 10.0.0 < 1x < 2.0.0`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a version token in bytes.
pub const MAX_VERSION_LEN: usize = 128;

/// A validated version token with a total order.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Validate and wrap a version token.
    ///
    /// Allowed characters are ASCII alphanumerics and `.`, `-`, `_`, `+`.
    pub fn new(token: impl Into<String>) -> Result<Self, TypeError> {
        let token = token.into();
        let reject = |reason: String| TypeError::InvalidVersion {
            version: token.clone(),
            reason,
        };

        if token.is_empty() {
            return Err(reject("version must not be empty".into()));
        }
        if token.len() > MAX_VERSION_LEN {
            return Err(reject(format!("version exceeds {MAX_VERSION_LEN} bytes")));
        }
        if let Some(ch) = token
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+')))
        {
            return Err(reject(format!("contains forbidden character: {ch:?}")));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `(major, minor, patch)` triple, if this is a semantic version.
    pub fn semantic(&self) -> Option<(u64, u64, u64)> {
        parse_semantic(&self.0)
    }
}

fn parse_semantic(token: &str) -> Option<(u64, u64, u64)> {
    let mut parts = token.split('.');
    let mut component = || -> Option<u64> {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    };
    let triple = (component()?, component()?, component()?);
    if parts.next().is_some() {
        return None;
    }
    Some(triple)
}

/// Compare two version tokens.
///
/// Total and consistent for any pair of strings, not only validated ones.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use verdist_types::compare_versions;
///
/// assert_eq!(compare_versions("1.0.0", "2.0.0"), Ordering::Less);
/// assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
/// assert_eq!(compare_versions("beta", "0.0.1"), Ordering::Less);
/// assert_eq!(compare_versions("alpha", "beta"), Ordering::Less);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_semantic(a), parse_semantic(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.as_bytes().cmp(b.as_bytes())),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.as_bytes().cmp(b.as_bytes()),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.0, &other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Version {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Version {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.0
    }
}
