use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::ContentRef;
use crate::checksum::Checksum;
use crate::name::FileName;
use crate::version::Version;

/// One published `(filename, version)` entry.
///
/// Immutable once published: the metadata index never rewrites any field of
/// an accepted record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: FileName,
    pub version: Version,
    /// SHA-256 over the raw bytes, computed at ingest.
    pub checksum: Checksum,
    /// Byte length as counted at ingest.
    pub size: u64,
    /// Where the content store keeps the bytes.
    pub content_ref: ContentRef,
    /// Set by the ingest service when the record is proposed for publish.
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    /// Metadata summary served by info queries.
    pub fn info(&self) -> FileInfo {
        FileInfo {
            filename: self.filename.clone(),
            version: self.version.clone(),
            checksum: self.checksum,
            size: self.size,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Metadata summary of a record, without the storage locator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: FileName,
    pub version: Version,
    pub checksum: Checksum,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}
