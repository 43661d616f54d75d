//! Directory-backed metadata index.
//!
//! Each file name gets one JSON document holding its whole [`FileFamily`].
//! Documents are replaced atomically (write to a temp file, fsync, rename),
//! so a reader in any process sees either the old family or the new one,
//! never a record without its pointer.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;
use verdist_types::{FileName, FileRecord, Version};

use crate::error::{IndexError, IndexResult};
use crate::family::{FileFamily, PutOutcome};
use crate::lease::WriterLease;
use crate::traits::MetadataIndex;

const FAMILIES_DIR: &str = "families";
const DOCUMENT_EXT: &str = "json";

/// Domain tag for document keys.
const DOCUMENT_DOMAIN: &str = "verdist-family-v1";

type FamilyLocks = Arc<Mutex<HashMap<FileName, Arc<tokio::sync::Mutex<()>>>>>;

#[derive(Debug)]
enum Access {
    /// Writes allowed, no cross-process guard.
    Unguarded,
    /// Writes allowed while this process holds the directory's lease.
    Leased(WriterLease),
    ReadOnly,
}

/// Metadata index persisted as one document per file name.
///
/// On-disk layout:
/// ```text
/// <root>/writer.lease                     held by the writing process
/// <root>/families/<aa>/<62 hex chars>.json
/// ```
///
/// Documents are keyed by a BLAKE3 digest of the file name, so any valid
/// name maps to a fixed-length path. The document itself carries the name,
/// which every read checks.
///
/// Writers for the same file name are serialized by an async lock held
/// across load, publish and persist. That lock is per process; across
/// processes, [`open_writer`](Self::open_writer) takes the directory's
/// [`WriterLease`] so a second writer fails to open.
#[derive(Clone, Debug)]
pub struct FileMetadataIndex {
    root: PathBuf,
    locks: FamilyLocks,
    access: Arc<Access>,
}

impl FileMetadataIndex {
    /// Open (or create) an index rooted at `root`, writable without taking
    /// the writer lease.
    pub async fn open(root: impl Into<PathBuf>) -> IndexResult<Self> {
        Self::open_with(root.into(), Access::Unguarded).await
    }

    /// Open for writing, holding the directory's writer lease for as long
    /// as any clone of the index lives.
    pub async fn open_writer(root: impl Into<PathBuf>, lease_ttl: Duration) -> IndexResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let lease = WriterLease::acquire(&root, lease_ttl).await?;
        Self::open_with(root, Access::Leased(lease)).await
    }

    /// Open for reading only. [`put_record`](MetadataIndex::put_record)
    /// fails with [`IndexError::ReadOnly`].
    pub async fn open_reader(root: impl Into<PathBuf>) -> IndexResult<Self> {
        Self::open_with(root.into(), Access::ReadOnly).await
    }

    async fn open_with(root: PathBuf, access: Access) -> IndexResult<Self> {
        fs::create_dir_all(root.join(FAMILIES_DIR)).await?;
        debug!(root = %root.display(), ?access, "file metadata index opened");
        Ok(Self {
            root,
            locks: FamilyLocks::default(),
            access: Arc::new(access),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn families_dir(&self) -> PathBuf {
        self.root.join(FAMILIES_DIR)
    }

    fn document_path(&self, filename: &FileName) -> PathBuf {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOCUMENT_DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(filename.as_str().as_bytes());
        let hex = hasher.finalize().to_hex();
        self.families_dir()
            .join(&hex[..2])
            .join(format!("{}.{DOCUMENT_EXT}", &hex[2..]))
    }

    fn lock_for(&self, filename: &FileName) -> IndexResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| IndexError::LockPoisoned)?;
        Ok(Arc::clone(locks.entry(filename.clone()).or_default()))
    }

    async fn load(&self, filename: &FileName) -> IndexResult<Option<FileFamily>> {
        let path = self.document_path(filename);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let family: FileFamily = serde_json::from_slice(&data).map_err(|e| IndexError::Corrupt {
            filename: filename.to_string(),
            reason: format!("unreadable document: {e}"),
        })?;
        if &family.filename != filename {
            return Err(IndexError::Corrupt {
                filename: filename.to_string(),
                reason: format!("document belongs to {}", family.filename),
            });
        }
        family.verify()?;
        Ok(Some(family))
    }

    async fn persist(&self, family: &FileFamily) -> IndexResult<()> {
        let data = serde_json::to_vec_pretty(family)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;

        let target = self.document_path(&family.filename);
        let Some(dir) = target.parent() else {
            return Err(IndexError::Corrupt {
                filename: family.filename.to_string(),
                reason: "document path has no parent".into(),
            });
        };
        fs::create_dir_all(dir).await?;
        let tmp = dir.join(format!(".{}.tmp", Uuid::now_v7()));

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &target).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(tmp = %tmp.display(), error = %cleanup, "failed to remove temp index document");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// The file name a document claims, if it parses and lives at the path
    /// that name maps to.
    async fn document_owner(&self, path: &Path) -> Option<FileName> {
        #[derive(Deserialize)]
        struct Head {
            filename: FileName,
        }

        let data = fs::read(path).await.ok()?;
        let head: Head = serde_json::from_slice(&data).ok()?;
        (self.document_path(&head.filename) == path).then_some(head.filename)
    }
}

#[async_trait]
impl MetadataIndex for FileMetadataIndex {
    async fn put_record(&self, record: FileRecord) -> IndexResult<PutOutcome> {
        let holder = match &*self.access {
            Access::ReadOnly => return Err(IndexError::ReadOnly),
            Access::Leased(lease) => Some(lease.holder_id()),
            Access::Unguarded => None,
        };
        let lock = self.lock_for(&record.filename)?;
        let _guard = lock.lock().await;

        let mut family = self
            .load(&record.filename)
            .await?
            .unwrap_or_else(|| FileFamily::new(record.filename.clone()));
        let outcome = family.publish(record)?;

        if outcome.is_accepted() {
            self.persist(&family).await?;
            debug!(
                filename = %family.filename,
                latest = ?family.latest.get(),
                versions = family.versions.len(),
                ?holder,
                "family document written"
            );
        }
        Ok(outcome)
    }

    async fn get_latest(&self, filename: &FileName) -> IndexResult<Option<FileRecord>> {
        match self.load(filename).await? {
            Some(family) => Ok(family.latest_record()?.cloned()),
            None => Ok(None),
        }
    }

    async fn get_version(
        &self,
        filename: &FileName,
        version: &Version,
    ) -> IndexResult<Option<FileRecord>> {
        Ok(self
            .load(filename)
            .await?
            .and_then(|family| family.get(version).cloned()))
    }

    async fn list_versions(&self, filename: &FileName) -> IndexResult<Vec<Version>> {
        Ok(self
            .load(filename)
            .await?
            .map(|family| family.versions_newest_first())
            .unwrap_or_default())
    }

    async fn list_files(&self) -> IndexResult<Vec<FileName>> {
        let mut names = Vec::new();
        let mut fans = fs::read_dir(self.families_dir()).await?;
        while let Some(fan) = fans.next_entry().await? {
            if !fan.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(fan.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                    continue;
                }
                match self.document_owner(&path).await {
                    Some(name) => names.push(name),
                    None => warn!(path = %path.display(), "skipping unrecognized index document"),
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verdist_types::name::MAX_FILENAME_LEN;
    use verdist_types::{Checksum, ContentRef};

    use crate::lease::DEFAULT_LEASE_TTL;

    fn name(s: &str) -> FileName {
        FileName::new(s).unwrap()
    }

    fn ver(s: &str) -> Version {
        Version::new(s).unwrap()
    }

    fn record(filename: &str, version: &str, data: &[u8]) -> FileRecord {
        FileRecord {
            filename: name(filename),
            version: ver(version),
            checksum: Checksum::compute(data),
            size: data.len() as u64,
            content_ref: ContentRef::new(format!("objects/{filename}/{version}")),
            uploaded_at: Utc::now(),
        }
    }

    fn leftover_temp_files(index: &FileMetadataIndex) -> usize {
        std::fs::read_dir(index.families_dir())
            .unwrap()
            .map(|fan| fan.unwrap().path())
            .filter(|fan| fan.is_dir())
            .flat_map(|fan| std::fs::read_dir(fan).unwrap())
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count()
    }

    #[tokio::test]
    async fn put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        let rec = record("test-config", "1.0.0", b"v1");
        assert!(index.put_record(rec.clone()).await.unwrap().is_accepted());

        assert_eq!(index.get_latest(&name("test-config")).await.unwrap(), Some(rec.clone()));
        assert_eq!(
            index.get_version(&name("test-config"), &ver("1.0.0")).await.unwrap(),
            Some(rec.clone())
        );
        assert_eq!(index.get_info(&name("test-config")).await.unwrap(), Some(rec.info()));
        assert_eq!(leftover_temp_files(&index), 0);
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        assert!(index.get_latest(&name("nope")).await.unwrap().is_none());
        assert!(index.list_versions(&name("nope")).await.unwrap().is_empty());
        assert!(index.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn documents_are_fanned_out_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        index.put_record(record("my config.yaml", "1.0.0", b"x")).await.unwrap();

        let path = index.document_path(&name("my config.yaml"));
        assert!(path.is_file());
        let fan = path.parent().unwrap();
        assert_eq!(fan.parent().unwrap(), dir.path().join("families"));
        assert_eq!(fan.file_name().unwrap().len(), 2);
        assert_eq!(path.file_name().unwrap().len(), 62 + ".json".len());
        assert_eq!(index.list_files().await.unwrap(), vec![name("my config.yaml")]);
    }

    #[tokio::test]
    async fn longest_file_names_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        let longest = "a".repeat(MAX_FILENAME_LEN);
        let unseen = "b".repeat(MAX_FILENAME_LEN);

        let rec = record(&longest, "1.0.0", b"x");
        assert!(index.put_record(rec.clone()).await.unwrap().is_accepted());
        assert_eq!(index.get_latest(&name(&longest)).await.unwrap(), Some(rec));
        assert!(index.get_latest(&name(&unseen)).await.unwrap().is_none());
        assert!(index
            .get_version(&name(&unseen), &ver("1.0.0"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(index.list_files().await.unwrap(), vec![name(&longest)]);
    }

    #[tokio::test]
    async fn reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileMetadataIndex::open(dir.path()).await.unwrap();
        writer.put_record(record("app", "1.0.0", b"v1")).await.unwrap();

        let reader = FileMetadataIndex::open_reader(dir.path()).await.unwrap();
        assert_eq!(
            reader.get_latest(&name("app")).await.unwrap().unwrap().version.as_str(),
            "1.0.0"
        );
        assert!(matches!(
            reader.put_record(record("app", "2.0.0", b"v2")).await,
            Err(IndexError::ReadOnly)
        ));
    }

    #[tokio::test]
    async fn only_one_writer_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let first = FileMetadataIndex::open_writer(dir.path(), DEFAULT_LEASE_TTL)
            .await
            .unwrap();
        assert!(matches!(
            FileMetadataIndex::open_writer(dir.path(), DEFAULT_LEASE_TTL).await,
            Err(IndexError::WriterLocked { .. })
        ));

        first.put_record(record("app", "1.0.0", b"v1")).await.unwrap();
        drop(first);
        let second = FileMetadataIndex::open_writer(dir.path(), DEFAULT_LEASE_TTL)
            .await
            .unwrap();
        assert!(second.put_record(record("app", "2.0.0", b"v2")).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn latest_survives_out_of_order_publish() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        index.put_record(record("app", "2.0.0", b"v2")).await.unwrap();
        index.put_record(record("app", "1.0.0", b"v1")).await.unwrap();

        let latest = index.get_latest(&name("app")).await.unwrap().unwrap();
        assert_eq!(latest.version.as_str(), "2.0.0");
        assert_eq!(
            index.list_versions(&name("app")).await.unwrap(),
            vec![ver("2.0.0"), ver("1.0.0")]
        );
    }

    #[tokio::test]
    async fn duplicate_and_conflict_leave_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        let original = record("app", "1.0.0", b"A");
        index.put_record(original.clone()).await.unwrap();
        let path = index.document_path(&name("app"));
        let before = std::fs::read(&path).unwrap();

        let dup = index.put_record(record("app", "1.0.0", b"A")).await.unwrap();
        assert_eq!(dup, PutOutcome::DuplicateVersion(original.clone()));

        let conflict = index.put_record(record("app", "1.0.0", b"B")).await.unwrap();
        assert!(matches!(conflict, PutOutcome::Conflict { .. }));

        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn second_instance_sees_published_records() {
        let dir = tempfile::tempdir().unwrap();
        let ingest = FileMetadataIndex::open(dir.path()).await.unwrap();
        let consumer = FileMetadataIndex::open(dir.path()).await.unwrap();

        ingest.put_record(record("shared", "1.0.0", b"v1")).await.unwrap();
        assert_eq!(
            consumer.get_latest(&name("shared")).await.unwrap().unwrap().version.as_str(),
            "1.0.0"
        );

        ingest.put_record(record("shared", "1.1.0", b"v11")).await.unwrap();
        assert_eq!(
            consumer.get_latest(&name("shared")).await.unwrap().unwrap().version.as_str(),
            "1.1.0"
        );
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        let path = index.document_path(&name("broken"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            index.get_latest(&name("broken")).await,
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn stale_pointer_on_disk_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        index.put_record(record("app", "1.0.0", b"v1")).await.unwrap();
        index.put_record(record("app", "2.0.0", b"v2")).await.unwrap();

        let path = index.document_path(&name("app"));
        let mut doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        doc["latest"] = serde_json::Value::String("1.0.0".into());
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        assert!(matches!(
            index.get_latest(&name("app")).await,
            Err(IndexError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn list_files_skips_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        index.put_record(record("b", "1.0.0", b"b")).await.unwrap();
        index.put_record(record("a", "1.0.0", b"a")).await.unwrap();
        std::fs::write(index.families_dir().join("README.txt"), b"hi").unwrap();
        let fan = index.families_dir().join("zz");
        std::fs::create_dir_all(&fan).unwrap();
        std::fs::write(fan.join("junk.json"), b"{}").unwrap();

        // A valid document stored under the wrong key is not listed.
        let misplaced = std::fs::read(index.document_path(&name("a"))).unwrap();
        std::fs::write(fan.join("misplaced.json"), misplaced).unwrap();

        assert_eq!(index.list_files().await.unwrap(), vec![name("a"), name("b")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_converge_on_max() {
        let dir = tempfile::tempdir().unwrap();
        let index = FileMetadataIndex::open(dir.path()).await.unwrap();
        let versions: Vec<String> = (0..20).map(|i| format!("{}.{}.0", i % 3, i)).collect();

        let handles: Vec<_> = versions
            .iter()
            .cloned()
            .map(|v| {
                let index = index.clone();
                tokio::spawn(async move {
                    index
                        .put_record(record("race", &v, v.as_bytes()))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().is_accepted());
        }

        let expected = versions.iter().map(|v| ver(v)).max().unwrap();
        let latest = index.get_latest(&name("race")).await.unwrap().unwrap();
        assert_eq!(latest.version, expected);
        assert_eq!(index.list_versions(&name("race")).await.unwrap().len(), 20);
        assert_eq!(leftover_temp_files(&index), 0);
    }
}
