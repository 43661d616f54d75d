//! Per-file index documents.
//!
//! A [`FileFamily`] is the unit of atomicity in the index: every backend
//! applies [`FileFamily::publish`] while holding exclusive access to one
//! family, so a record and the latest pointer that names it always change
//! together.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use verdist_types::{Checksum, FileName, FileRecord, Version};

use crate::error::{IndexError, IndexResult};

/// Result of proposing a record to the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was published. It is returned as stored.
    Accepted(FileRecord),
    /// The version already exists with the same checksum. The existing
    /// record is returned unchanged.
    DuplicateVersion(FileRecord),
    /// The version already exists with a different checksum. Nothing was
    /// written.
    Conflict {
        existing: FileRecord,
        proposed: Checksum,
    },
}

impl PutOutcome {
    /// Returns `true` if the record was newly published.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PutOutcome::Accepted(_))
    }
}

/// Monotonic register holding the latest version of one file.
///
/// The only mutation is [`advance`](Self::advance), a compare-and-set that
/// succeeds only when the candidate orders strictly after the current value.
/// Any sequence of advances therefore ends at the maximum candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatestRegister(Option<Version>);

impl LatestRegister {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&Version> {
        self.0.as_ref()
    }

    /// Move the register to `candidate` if it is newer than the current
    /// value. Returns `true` if the register changed.
    pub fn advance(&mut self, candidate: &Version) -> bool {
        match &self.0 {
            Some(current) if candidate <= current => false,
            _ => {
                self.0 = Some(candidate.clone());
                true
            }
        }
    }
}

/// Everything the index knows about one file name.
///
/// Persisted layout (one JSON document per file):
/// ```json
/// {
///   "filename": "test-config",
///   "latest": "2.0.0",
///   "versions": { "1.0.0": { ... }, "2.0.0": { ... } }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFamily {
    pub filename: FileName,
    pub latest: LatestRegister,
    pub versions: BTreeMap<String, FileRecord>,
}

impl FileFamily {
    pub fn new(filename: FileName) -> Self {
        Self {
            filename,
            latest: LatestRegister::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Apply the publish rule to a proposed record.
    ///
    /// - new version: insert, advance the latest register, `Accepted`
    /// - same version, same checksum: `DuplicateVersion` with the existing record
    /// - same version, different checksum: `Conflict`
    pub fn publish(&mut self, record: FileRecord) -> IndexResult<PutOutcome> {
        if record.filename != self.filename {
            return Err(IndexError::Corrupt {
                filename: self.filename.to_string(),
                reason: format!("record for {} routed to wrong family", record.filename),
            });
        }

        if let Some(existing) = self.versions.get(record.version.as_str()) {
            return Ok(if existing.checksum == record.checksum {
                PutOutcome::DuplicateVersion(existing.clone())
            } else {
                PutOutcome::Conflict {
                    existing: existing.clone(),
                    proposed: record.checksum,
                }
            });
        }

        self.latest.advance(&record.version);
        self.versions
            .insert(record.version.as_str().to_string(), record.clone());
        Ok(PutOutcome::Accepted(record))
    }

    pub fn get(&self, version: &Version) -> Option<&FileRecord> {
        self.versions.get(version.as_str())
    }

    /// The record the latest register points at.
    pub fn latest_record(&self) -> IndexResult<Option<&FileRecord>> {
        let Some(version) = self.latest.get() else {
            return Ok(None);
        };
        self.versions
            .get(version.as_str())
            .map(Some)
            .ok_or_else(|| IndexError::Corrupt {
                filename: self.filename.to_string(),
                reason: format!("latest pointer names unknown version {version}"),
            })
    }

    /// All published versions, newest first.
    pub fn versions_newest_first(&self) -> Vec<Version> {
        let mut versions: Vec<Version> =
            self.versions.values().map(|r| r.version.clone()).collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions
    }

    /// Check the invariants of a family loaded from outside this process.
    pub fn verify(&self) -> IndexResult<()> {
        let corrupt = |reason: String| IndexError::Corrupt {
            filename: self.filename.to_string(),
            reason,
        };

        for (key, record) in &self.versions {
            if record.version.as_str() != key {
                return Err(corrupt(format!(
                    "entry {key} holds record for version {}",
                    record.version
                )));
            }
            if record.filename != self.filename {
                return Err(corrupt(format!(
                    "entry {key} holds record for file {}",
                    record.filename
                )));
            }
        }

        let max = self.versions.values().map(|r| &r.version).max();
        if max != self.latest.get() {
            return Err(corrupt(format!(
                "latest pointer {:?} does not match newest version {:?}",
                self.latest.get(),
                max
            )));
        }
        Ok(())
    }
}
