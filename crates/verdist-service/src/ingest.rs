//! The ingest side of the control plane.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};
use verdist_index::{MetadataIndex, PutOutcome};
use verdist_store::{ContentStore, ContentWriter};
use verdist_types::{Checksum, ChecksumHasher, ContentAddress, ContentRef, FileName, FileRecord, Version};

use crate::config::ServiceConfig;
use crate::deadline::bounded;
use crate::error::{ServiceError, ServiceResult};
use crate::feed::PublishFeed;

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    /// The record as published. For a duplicate this is the record that was
    /// already in the index, not the retried upload.
    pub record: FileRecord,
    /// `true` if the version already existed with the same checksum.
    pub duplicate: bool,
}

/// Accepts uploads and publishes them to the metadata index.
pub struct IngestService {
    store: Arc<dyn ContentStore>,
    index: Arc<dyn MetadataIndex>,
    config: ServiceConfig,
    feed: Option<PublishFeed>,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        index: Arc<dyn MetadataIndex>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
            feed: None,
        }
    }

    /// Announce every accepted record on `feed`.
    pub fn with_feed(mut self, feed: PublishFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The feed accepted records are announced on, if any.
    pub fn feed(&self) -> Option<&PublishFeed> {
        self.feed.as_ref()
    }

    /// Upload `body` as `version` of `filename`.
    ///
    /// Re-uploading identical bytes under an existing version succeeds with
    /// [`UploadResult::duplicate`] set. Different bytes under an existing
    /// version fail with [`ServiceError::Conflict`].
    pub async fn upload<R>(&self, filename: &str, version: &str, body: R) -> ServiceResult<UploadResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let filename = FileName::new(filename)?;
        let version = Version::new(version)?;

        let mut writer = bounded(
            "store.begin_write",
            self.config.store_timeout,
            self.store.begin_write(),
        )
        .await?;

        let (checksum, size, content_ref) =
            match self.stage_and_commit(&mut *writer, &filename, &version, body).await {
                Ok(staged) => staged,
                Err(e) => {
                    if let Err(abort) = writer.abort().await {
                        warn!(%filename, %version, error = %abort, "failed to abort staged upload");
                    }
                    return Err(e);
                }
            };
        debug!(%filename, %version, %content_ref, size, "content committed");

        if self.config.verify_after_write {
            self.verify_committed(&filename, &version, &content_ref, &checksum)
                .await?;
        }

        let record = FileRecord {
            filename: filename.clone(),
            version: version.clone(),
            checksum,
            size,
            content_ref: content_ref.clone(),
            uploaded_at: Utc::now(),
        };

        let outcome = match bounded(
            "index.put_record",
            self.config.index_timeout,
            self.index.put_record(record),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%filename, %version, %content_ref, error = %e, "index update failed, content left orphaned");
                return Err(e);
            }
        };

        match outcome {
            PutOutcome::Accepted(record) => {
                info!(
                    %filename,
                    %version,
                    checksum = %record.checksum.short_hex(),
                    size = record.size,
                    "version published"
                );
                if let Some(feed) = &self.feed {
                    feed.publish(record.info());
                }
                Ok(UploadResult {
                    record,
                    duplicate: false,
                })
            }
            PutOutcome::DuplicateVersion(record) => {
                warn!(%filename, %version, "version already published with identical content");
                Ok(UploadResult {
                    record,
                    duplicate: true,
                })
            }
            PutOutcome::Conflict { existing, proposed } => {
                warn!(
                    %filename,
                    %version,
                    existing = %existing.checksum.short_hex(),
                    proposed = %proposed.short_hex(),
                    %content_ref,
                    "conflicting upload rejected, content left orphaned"
                );
                Err(ServiceError::Conflict {
                    filename,
                    version,
                    existing: existing.checksum,
                    proposed,
                })
            }
        }
    }

    /// Stream `body` into `writer` while hashing it, then commit under the
    /// content address.
    async fn stage_and_commit<R>(
        &self,
        writer: &mut dyn ContentWriter,
        filename: &FileName,
        version: &Version,
        mut body: R,
    ) -> ServiceResult<(Checksum, u64, ContentRef)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let limit = self.config.max_upload_bytes;
        let mut hasher = ChecksumHasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = body.read(&mut buf).await.map_err(ServiceError::Body)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            if hasher.len() > limit {
                return Err(ServiceError::TooLarge { limit });
            }
            bounded(
                "store.write",
                self.config.store_timeout,
                writer.write(&buf[..n]),
            )
            .await?;
        }

        let size = hasher.len();
        let checksum = hasher.finalize();
        let address = ContentAddress::derive(filename, version, &checksum);
        let content_ref = bounded(
            "store.commit",
            self.config.store_timeout,
            writer.commit(&address),
        )
        .await?;
        Ok((checksum, size, content_ref))
    }

    async fn verify_committed(
        &self,
        filename: &FileName,
        version: &Version,
        content_ref: &ContentRef,
        checksum: &Checksum,
    ) -> ServiceResult<()> {
        let stored = bounded(
            "store.read",
            self.config.store_timeout,
            self.store.read(content_ref),
        )
        .await?;

        let reason = match stored {
            Some(bytes) if checksum.verify(&bytes) => return Ok(()),
            Some(bytes) => format!(
                "committed content hashes to {}, expected {}",
                Checksum::compute(&bytes).short_hex(),
                checksum.short_hex()
            ),
            None => format!("committed content missing at {content_ref}"),
        };
        error!(%filename, %version, %content_ref, %reason, "post-write verification failed");
        Err(ServiceError::IntegrityFault {
            filename: filename.clone(),
            version: version.clone(),
            reason,
        })
    }
}

impl std::fmt::Debug for IngestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestService")
            .field("config", &self.config)
            .field("feed", &self.feed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::feed::FeedFilter;
    use verdist_index::InMemoryMetadataIndex;
    use verdist_store::InMemoryContentStore;

    struct Fixture {
        store: InMemoryContentStore,
        index: InMemoryMetadataIndex,
        ingest: IngestService,
    }

    fn fixture(config: ServiceConfig) -> Fixture {
        let store = InMemoryContentStore::new();
        let index = InMemoryMetadataIndex::new();
        let ingest = IngestService::new(Arc::new(store.clone()), Arc::new(index.clone()), config);
        Fixture { store, index, ingest }
    }

    fn name(s: &str) -> FileName {
        FileName::new(s).unwrap()
    }

    #[tokio::test]
    async fn upload_publishes_record() {
        let f = fixture(ServiceConfig::default());
        let body = b"Hello, World! This is version 1.0.0\n";
        let result = f.ingest.upload("test-config", "1.0.0", &body[..]).await.unwrap();

        assert!(!result.duplicate);
        assert_eq!(result.record.checksum, Checksum::compute(body));
        assert_eq!(result.record.size, body.len() as u64);

        let stored = f.store.read(&result.record.content_ref).await.unwrap().unwrap();
        assert_eq!(&stored[..], &body[..]);

        let latest = f.index.get_latest(&name("test-config")).await.unwrap().unwrap();
        assert_eq!(latest, result.record);
    }

    #[tokio::test]
    async fn body_larger_than_one_chunk() {
        let f = fixture(ServiceConfig::default());
        let body: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let result = f.ingest.upload("big.bin", "1.0.0", &body[..]).await.unwrap();

        assert_eq!(result.record.size, body.len() as u64);
        assert_eq!(result.record.checksum, Checksum::compute(&body));
        assert_eq!(f.store.total_bytes(), body.len() as u64);
    }

    #[tokio::test]
    async fn empty_body_is_allowed() {
        let f = fixture(ServiceConfig::default());
        let result = f.ingest.upload("empty", "1.0.0", &b""[..]).await.unwrap();
        assert_eq!(result.record.size, 0);
        assert_eq!(result.record.checksum, Checksum::compute(b""));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let f = fixture(ServiceConfig::default());
        for (filename, version) in [("", "1.0.0"), ("app", ""), ("../etc", "1.0.0"), ("app", "1 0")] {
            let err = f.ingest.upload(filename, version, &b"x"[..]).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{filename:?} {version:?}");
        }
        assert!(f.store.is_empty());
        assert!(f.index.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_and_staging_discarded() {
        let f = fixture(ServiceConfig {
            max_upload_bytes: 10,
            ..ServiceConfig::default()
        });
        let err = f
            .ingest
            .upload("app", "1.0.0", &b"way more than ten bytes"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TooLarge { limit: 10 }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.store.is_empty());
        assert!(f.index.get_latest(&name("app")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_at_exact_limit_succeeds() {
        let f = fixture(ServiceConfig {
            max_upload_bytes: 4,
            ..ServiceConfig::default()
        });
        assert!(f.ingest.upload("app", "1.0.0", &b"1234"[..]).await.is_ok());
    }

    #[tokio::test]
    async fn retry_with_same_bytes_is_duplicate() {
        let f = fixture(ServiceConfig::default());
        let first = f.ingest.upload("app", "1.0.0", &b"same"[..]).await.unwrap();
        let second = f.ingest.upload("app", "1.0.0", &b"same"[..]).await.unwrap();

        assert!(second.duplicate);
        assert_eq!(second.record, first.record);
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn different_bytes_for_existing_version_conflict() {
        let f = fixture(ServiceConfig::default());
        let first = f.ingest.upload("app", "1.0.0", &b"A"[..]).await.unwrap();
        let err = f.ingest.upload("app", "1.0.0", &b"B"[..]).await.unwrap_err();

        match &err {
            ServiceError::Conflict { existing, proposed, .. } => {
                assert_eq!(*existing, Checksum::compute(b"A"));
                assert_eq!(*proposed, Checksum::compute(b"B"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = f.index.get_latest(&name("app")).await.unwrap().unwrap();
        assert_eq!(stored, first.record);
    }

    #[tokio::test]
    async fn accepted_uploads_reach_the_feed() {
        let feed = PublishFeed::default();
        let mut stream = feed.subscribe(FeedFilter::default());
        let f = fixture(ServiceConfig::default());
        let ingest = f.ingest.with_feed(feed);

        ingest.upload("app", "1.0.0", &b"v1"[..]).await.unwrap();
        ingest.upload("app", "1.0.0", &b"v1"[..]).await.unwrap();

        let event = stream.try_recv().unwrap();
        assert_eq!(event.info.version.as_str(), "1.0.0");
        assert!(stream.try_recv().is_err(), "duplicates are not announced");
    }

    #[tokio::test]
    async fn failed_index_update_fails_upload_and_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryContentStore::new();
        let feed = PublishFeed::default();
        let mut stream = feed.subscribe(FeedFilter::default());
        let index = verdist_index::FileMetadataIndex::open_reader(dir.path())
            .await
            .unwrap();
        let ingest = IngestService::new(
            Arc::new(store.clone()),
            Arc::new(index.clone()),
            ServiceConfig::default(),
        )
        .with_feed(feed);

        let err = ingest.upload("app", "1.0.0", &b"v1"[..]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(matches!(err, ServiceError::Index(_)));

        // The committed content stays behind, unreferenced and unannounced.
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 2);
        assert!(index.get_latest(&name("app")).await.unwrap().is_none());
        assert!(stream.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_converge_on_max_version() {
        let f = fixture(ServiceConfig::default());
        let ingest = Arc::new(f.ingest);
        let versions = ["1.0.0", "1.2.0", "1.10.0", "2.0.0", "1.9.9", "0.9.0", "2.0.1", "1.11.0"];

        let handles: Vec<_> = versions
            .iter()
            .map(|v| {
                let ingest = Arc::clone(&ingest);
                let v = v.to_string();
                tokio::spawn(async move {
                    ingest
                        .upload("race", &v, v.as_bytes())
                        .await
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert!(!h.await.unwrap().duplicate);
        }

        let latest = f.index.get_latest(&name("race")).await.unwrap().unwrap();
        assert_eq!(latest.version.as_str(), "2.0.1");
    }
}
