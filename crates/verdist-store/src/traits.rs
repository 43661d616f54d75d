use async_trait::async_trait;
use bytes::Bytes;
use verdist_types::{ContentAddress, ContentRef};

use crate::error::StoreResult;

/// Durable, append-only byte storage.
///
/// All implementations must satisfy these invariants:
/// - `locate` is a pure function of the address.
/// - Content under a locator never changes once a commit has returned it.
/// - A committed locator is immediately readable through the same store.
/// - All I/O errors are propagated.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Open a staging area for a new piece of content.
    async fn begin_write(&self) -> StoreResult<Box<dyn ContentWriter>>;

    /// Read committed content.
    ///
    /// Returns `Ok(None)` if nothing is stored under the locator.
    async fn read(&self, content_ref: &ContentRef) -> StoreResult<Option<Bytes>>;

    /// The locator under which `address` is (or would be) stored.
    fn locate(&self, address: &ContentAddress) -> ContentRef;
}

/// A staged write in progress.
///
/// Dropping a writer without committing leaves no visible content. Backends
/// that stage on disk may leave a staging file behind until `abort` is called.
#[async_trait]
pub trait ContentWriter: Send {
    /// Append a chunk to the staged content.
    async fn write(&mut self, chunk: &[u8]) -> StoreResult<()>;

    /// Publish the staged bytes under `address`, at the locator the owning
    /// store's [`ContentStore::locate`] gives for it.
    ///
    /// If content already exists at that address it is kept as-is and the
    /// staged copy is discarded (idempotent). Returns the locator either way.
    async fn commit(&mut self, address: &ContentAddress) -> StoreResult<ContentRef>;

    /// Discard the staged bytes.
    async fn abort(&mut self) -> StoreResult<()>;
}
