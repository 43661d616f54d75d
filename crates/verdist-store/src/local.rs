use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;
use verdist_types::{ContentAddress, ContentRef};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStore, ContentWriter};

const OBJECTS_DIR: &str = "objects";
const STAGING_DIR: &str = ".staging";

/// Content store backed by a local directory.
///
/// On-disk layout:
/// ```text
/// <root>/.staging/<uuid-v7>.part     in-flight uploads
/// <root>/objects/<aa>/<62 hex chars>  committed content, fanned out by the
///                                     first address byte
/// ```
///
/// Commit hard-links the staged file into place, which fails rather than
/// replaces when the target exists, so committed content is never
/// overwritten even by racing writers.
#[derive(Clone, Debug)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        fs::create_dir_all(root.join(STAGING_DIR)).await?;
        debug!(root = %root.display(), "local content store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator to a path inside the objects directory.
    ///
    /// Rejects anything this store could not have issued, which also rules
    /// out path traversal through a tampered index.
    fn resolve(&self, content_ref: &ContentRef) -> StoreResult<PathBuf> {
        let invalid = || StoreError::InvalidLocator(content_ref.clone());
        let mut parts = content_ref.as_str().split('/');
        let (Some(OBJECTS_DIR), Some(fan), Some(rest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
        if fan.len() != 2 || rest.len() != 62 || !is_hex(fan) || !is_hex(rest) {
            return Err(invalid());
        }
        Ok(self.root.join(OBJECTS_DIR).join(fan).join(rest))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn begin_write(&self) -> StoreResult<Box<dyn ContentWriter>> {
        let staging = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.part", Uuid::now_v7()));
        let file = File::create(&staging).await?;
        Ok(Box::new(LocalWriter {
            store: self.clone(),
            staging,
            file: Some(file),
            staged: true,
            written: 0,
        }))
    }

    async fn read(&self, content_ref: &ContentRef) -> StoreResult<Option<Bytes>> {
        let path = self.resolve(content_ref)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn locate(&self, address: &ContentAddress) -> ContentRef {
        let hex = address.to_hex();
        ContentRef::new(format!("{OBJECTS_DIR}/{}/{}", &hex[..2], &hex[2..]))
    }
}

struct LocalWriter {
    store: LocalContentStore,
    staging: PathBuf,
    /// `None` once committed or aborted.
    file: Option<File>,
    /// Whether the staging file still exists on disk.
    staged: bool,
    written: u64,
}

#[async_trait]
impl ContentWriter for LocalWriter {
    async fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        let file = self.file.as_mut().ok_or(StoreError::WriterFinished)?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(&mut self, address: &ContentAddress) -> StoreResult<ContentRef> {
        let mut file = self.file.take().ok_or(StoreError::WriterFinished)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let content_ref = self.store.locate(address);
        let target = self.store.resolve(&content_ref)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::hard_link(&self.staging, &target).await {
            Ok(()) => debug!(%content_ref, bytes = self.written, "content committed"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(%content_ref, "content already present, keeping existing copy");
            }
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&self.staging).await?;
        self.staged = false;
        Ok(content_ref)
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.file = None;
        if self.staged {
            fs::remove_file(&self.staging).await?;
            self.staged = false;
        }
        Ok(())
    }
}

impl Drop for LocalWriter {
    fn drop(&mut self) {
        if self.staged {
            if let Err(e) = std::fs::remove_file(&self.staging) {
                warn!(staging = %self.staging.display(), error = %e, "failed to remove abandoned staging file");
            }
        }
    }
}
