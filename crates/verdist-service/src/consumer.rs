//! The read side of the control plane.
//!
//! Every lookup goes to the metadata index first. A miss there is
//! not-found. A hit whose content the store cannot produce is an integrity
//! fault, because a published record always points at committed content.

use std::sync::Arc;

use bytes::Bytes;
use tokio::time::{sleep, Instant};
use tracing::{debug, error};
use verdist_index::MetadataIndex;
use verdist_store::ContentStore;
use verdist_types::{FileInfo, FileName, FileRecord, Version};

use crate::config::ServiceConfig;
use crate::deadline::bounded;
use crate::error::{ErrorKind, ServiceError, ServiceResult};

/// File content together with the record it was resolved from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServedFile {
    pub record: FileRecord,
    pub bytes: Bytes,
}

/// Resolves file names and versions against the index and serves content.
///
/// Read-only: no method mutates the store or the index, so every call is
/// safe to repeat.
pub struct ConsumerService {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn MetadataIndex>,
    config: ServiceConfig,
}

impl ConsumerService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn MetadataIndex>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Content of the latest version of `filename`.
    pub async fn get_latest(&self, filename: &str) -> ServiceResult<ServedFile> {
        let record = self.resolve_latest(&FileName::new(filename)?).await?;
        self.fetch(record).await
    }

    /// Content of a specific version.
    pub async fn get_version(&self, filename: &str, version: &str) -> ServiceResult<ServedFile> {
        let filename = FileName::new(filename)?;
        let version = Version::new(version)?;
        let record = self.resolve_version(&filename, &version).await?;
        self.fetch(record).await
    }

    /// Metadata of the latest version. Does not touch the content store.
    pub async fn get_info(&self, filename: &str) -> ServiceResult<FileInfo> {
        let record = self.resolve_latest(&FileName::new(filename)?).await?;
        Ok(record.info())
    }

    /// All published versions of `filename`, newest first.
    pub async fn list_versions(&self, filename: &str) -> ServiceResult<Vec<Version>> {
        let filename = FileName::new(filename)?;
        let versions = bounded(
            "index.list_versions",
            self.config.index_timeout,
            self.index.list_versions(&filename),
        )
        .await?;
        if versions.is_empty() {
            return Err(ServiceError::FileNotFound { filename });
        }
        Ok(versions)
    }

    /// Every file name with at least one published version.
    pub async fn list_files(&self) -> ServiceResult<Vec<FileName>> {
        bounded(
            "index.list_files",
            self.config.index_timeout,
            self.index.list_files(),
        )
        .await
    }

    /// Wait until `version` of `filename` is visible, polling the index
    /// within the configured staleness window.
    ///
    /// Fails with not-found if the version is still invisible when the
    /// window closes. Other errors end the wait immediately.
    pub async fn wait_for_version(&self, filename: &str, version: &str) -> ServiceResult<FileRecord> {
        let filename = FileName::new(filename)?;
        let version = Version::new(version)?;
        let window = self.config.staleness;
        let deadline = Instant::now() + window.max_delay;

        loop {
            match self.resolve_version(&filename, &version).await {
                Err(e) if e.kind() == ErrorKind::NotFound && Instant::now() < deadline => {
                    debug!(%filename, %version, "version not yet visible, polling");
                    sleep(window.poll_interval.min(deadline.saturating_duration_since(Instant::now())))
                        .await;
                }
                other => return other,
            }
        }
    }

    async fn resolve_latest(&self, filename: &FileName) -> ServiceResult<FileRecord> {
        bounded(
            "index.get_latest",
            self.config.index_timeout,
            self.index.get_latest(filename),
        )
        .await?
        .ok_or_else(|| ServiceError::FileNotFound {
            filename: filename.clone(),
        })
    }

    async fn resolve_version(&self, filename: &FileName, version: &Version) -> ServiceResult<FileRecord> {
        bounded(
            "index.get_version",
            self.config.index_timeout,
            self.index.get_version(filename, version),
        )
        .await?
        .ok_or_else(|| ServiceError::VersionNotFound {
            filename: filename.clone(),
            version: version.clone(),
        })
    }

    async fn fetch(&self, record: FileRecord) -> ServiceResult<ServedFile> {
        let stored = bounded(
            "store.read",
            self.config.store_timeout,
            self.store.read(&record.content_ref),
        )
        .await?;

        let fault = |reason: String| {
            error!(
                filename = %record.filename,
                version = %record.version,
                content_ref = %record.content_ref,
                %reason,
                "integrity fault"
            );
            ServiceError::IntegrityFault {
                filename: record.filename.clone(),
                version: record.version.clone(),
                reason,
            }
        };

        let Some(bytes) = stored else {
            return Err(fault(format!("content missing at {}", record.content_ref)));
        };
        if self.config.verify_on_read {
            if bytes.len() as u64 != record.size {
                return Err(fault(format!(
                    "stored content is {} bytes, record says {}",
                    bytes.len(),
                    record.size
                )));
            }
            if !record.checksum.verify(&bytes) {
                return Err(fault("stored content does not match checksum".into()));
            }
        }
        Ok(ServedFile { record, bytes })
    }
}

impl std::fmt::Debug for ConsumerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
