//! In-memory metadata index for tests and single-process deployments.
//!
//! [`InMemoryMetadataIndex`] keeps one [`FileFamily`] per file name, each
//! behind its own `Mutex`, inside a `RwLock`-protected map. Publishing locks
//! only the target family, so uploads of different files proceed in
//! parallel while uploads of the same file are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::debug;
use verdist_types::{FileName, FileRecord, Version};

use crate::error::{IndexError, IndexResult};
use crate::family::{FileFamily, PutOutcome};
use crate::traits::MetadataIndex;

/// An in-memory implementation of [`MetadataIndex`].
///
/// Data is lost when the index is dropped. Cloning shares the same state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadataIndex {
    families: Arc<RwLock<HashMap<FileName, Arc<Mutex<FileFamily>>>>>,
}

impl InMemoryMetadataIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn family(&self, filename: &FileName) -> IndexResult<Option<Arc<Mutex<FileFamily>>>> {
        let families = self.families.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(families.get(filename).cloned())
    }

    fn family_or_create(&self, filename: &FileName) -> IndexResult<Arc<Mutex<FileFamily>>> {
        if let Some(existing) = self.family(filename)? {
            return Ok(existing);
        }
        let mut families = self.families.write().map_err(|_| IndexError::LockPoisoned)?;
        Ok(Arc::clone(families.entry(filename.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(FileFamily::new(filename.clone())))
        })))
    }

    /// Run `f` against a family snapshot, if the family exists.
    fn with_family<T>(
        &self,
        filename: &FileName,
        f: impl FnOnce(&FileFamily) -> IndexResult<T>,
    ) -> IndexResult<Option<T>> {
        let Some(family) = self.family(filename)? else {
            return Ok(None);
        };
        let family = family.lock().map_err(|_| IndexError::LockPoisoned)?;
        f(&family).map(Some)
    }
}

#[async_trait]
impl MetadataIndex for InMemoryMetadataIndex {
    async fn put_record(&self, record: FileRecord) -> IndexResult<PutOutcome> {
        let family = self.family_or_create(&record.filename)?;
        let mut family = family.lock().map_err(|_| IndexError::LockPoisoned)?;
        let outcome = family.publish(record)?;
        debug!(
            filename = %family.filename,
            latest = ?family.latest.get(),
            accepted = outcome.is_accepted(),
            "record proposed"
        );
        Ok(outcome)
    }

    async fn get_latest(&self, filename: &FileName) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .with_family(filename, |f| Ok(f.latest_record()?.cloned()))?
            .flatten())
    }

    async fn get_version(
        &self,
        filename: &FileName,
        version: &Version,
    ) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .with_family(filename, |f| Ok(f.get(version).cloned()))?
            .flatten())
    }

    async fn list_versions(&self, filename: &FileName) -> IndexResult<Vec<Version>> {
        Ok(self
            .with_family(filename, |f| Ok(f.versions_newest_first()))?
            .unwrap_or_default())
    }

    async fn list_files(&self) -> IndexResult<Vec<FileName>> {
        let families = self.families.read().map_err(|_| IndexError::LockPoisoned)?;
        let mut names = Vec::with_capacity(families.len());
        for (name, family) in families.iter() {
            let family = family.lock().map_err(|_| IndexError::LockPoisoned)?;
            if !family.versions.is_empty() {
                names.push(name.clone());
            }
        }
        names.sort();
        Ok(names)
    }
}
