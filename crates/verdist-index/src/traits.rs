//! The [`MetadataIndex`] trait defining the index storage interface.

use async_trait::async_trait;
use verdist_types::{FileInfo, FileName, FileRecord, Version};

use crate::error::IndexResult;
use crate::family::PutOutcome;

/// Shared store of file records and latest pointers.
///
/// Implementations must be thread-safe (`Send + Sync`) and guarantee, per
/// file name:
///
/// - `put_record` inserts the record and advances the latest pointer
///   atomically; a reader never sees one without the other.
/// - Concurrent `put_record` calls are serialized; the final latest pointer
///   is the maximum published version regardless of completion order.
/// - A published record is never modified or removed.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Propose a record for publication.
    async fn put_record(&self, record: FileRecord) -> IndexResult<PutOutcome>;

    /// The record the latest pointer names.
    ///
    /// Returns `Ok(None)` if nothing was ever published for `filename`.
    async fn get_latest(&self, filename: &FileName) -> IndexResult<Option<FileRecord>>;

    /// A specific version's record, or `Ok(None)` if it does not exist.
    async fn get_version(
        &self,
        filename: &FileName,
        version: &Version,
    ) -> IndexResult<Option<FileRecord>>;

    /// Metadata summary of the latest record.
    async fn get_info(&self, filename: &FileName) -> IndexResult<Option<FileInfo>> {
        Ok(self.get_latest(filename).await?.map(|r| r.info()))
    }

    /// Every published version of `filename`, newest first.
    ///
    /// Empty if nothing was ever published.
    async fn list_versions(&self, filename: &FileName) -> IndexResult<Vec<Version>>;

    /// Every file name with at least one published version, sorted.
    async fn list_files(&self) -> IndexResult<Vec<FileName>>;
}
