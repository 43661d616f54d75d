//! File name validation.
//!
//! A valid file name:
//! - Must be non-empty and at most [`MAX_FILENAME_LEN`] bytes
//! - Must not contain `/`, `\`, NUL, or any other control character
//! - Must not be `.` or `..`
//!
//! Names are case-sensitive: `Config` and `config` are distinct families.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a file name in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Characters that are forbidden anywhere in a file name.
const FORBIDDEN_CHARS: &[char] = &['/', '\\'];

/// Validated identifier of a family of versioned file contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Validate and wrap a file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use verdist_types::FileName;
    ///
    /// assert!(FileName::new("test-config").is_ok());
    /// assert!(FileName::new("").is_err());
    /// assert!(FileName::new("etc/passwd").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn validate(name: &str) -> Result<(), TypeError> {
    let reject = |reason: String| TypeError::InvalidFileName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(reject("filename must not be empty".into()));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(reject(format!(
            "filename exceeds {MAX_FILENAME_LEN} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(reject("filename must not be '.' or '..'".into()));
    }
    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(reject(format!("contains forbidden character: {ch:?}")));
        }
    }
    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(reject(format!("contains control character: {ch:?}")));
    }
    Ok(())
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileName({:?})", self.0)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for FileName {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FileName> for String {
    fn from(name: FileName) -> Self {
        name.0
    }
}
