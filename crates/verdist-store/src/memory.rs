use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use verdist_types::{ContentAddress, ContentRef};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStore, ContentWriter};

const MEMORY_PREFIX: &str = "mem/";

type ObjectMap = Arc<RwLock<HashMap<ContentRef, Bytes>>>;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Staged bytes live in the writer until
/// commit, then move into the shared map behind a `RwLock`.
#[derive(Clone, Default)]
pub struct InMemoryContentStore {
    objects: ObjectMap,
}

impl InMemoryContentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all committed objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .map(|m| m.values().map(|b| b.len() as u64).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn begin_write(&self) -> StoreResult<Box<dyn ContentWriter>> {
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            buffer: Some(Vec::new()),
        }))
    }

    async fn read(&self, content_ref: &ContentRef) -> StoreResult<Option<Bytes>> {
        let map = self.objects.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(content_ref).cloned())
    }

    fn locate(&self, address: &ContentAddress) -> ContentRef {
        ContentRef::new(format!("{MEMORY_PREFIX}{}", address.to_hex()))
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("object_count", &self.len())
            .finish()
    }
}

struct MemoryWriter {
    store: InMemoryContentStore,
    /// `None` once committed or aborted.
    buffer: Option<Vec<u8>>,
}

#[async_trait]
impl ContentWriter for MemoryWriter {
    async fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        let buffer = self.buffer.as_mut().ok_or(StoreError::WriterFinished)?;
        buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(&mut self, address: &ContentAddress) -> StoreResult<ContentRef> {
        let buffer = self.buffer.take().ok_or(StoreError::WriterFinished)?;
        let content_ref = self.store.locate(address);
        let mut map = self.store.objects.write().map_err(|_| StoreError::LockPoisoned)?;
        map.entry(content_ref.clone())
            .or_insert_with(|| Bytes::from(buffer));
        Ok(content_ref)
    }

    async fn abort(&mut self) -> StoreResult<()> {
        self.buffer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdist_types::{Checksum, FileName, Version};

    fn address(version: &str, data: &[u8]) -> ContentAddress {
        ContentAddress::derive(
            &FileName::new("app").unwrap(),
            &Version::new(version).unwrap(),
            &Checksum::compute(data),
        )
    }

    async fn put(store: &InMemoryContentStore, version: &str, data: &[u8]) -> ContentRef {
        let mut writer = store.begin_write().await.unwrap();
        writer.write(data).await.unwrap();
        writer.commit(&address(version, data)).await.unwrap()
    }

    #[tokio::test]
    async fn write_and_read() {
        let store = InMemoryContentStore::new();
        let content_ref = put(&store, "1.0.0", b"hello world").await;
        let read = store.read(&content_ref).await.unwrap().expect("should exist");
        assert_eq!(&read[..], b"hello world");
    }

    #[tokio::test]
    async fn chunked_writes_concatenate() {
        let store = InMemoryContentStore::new();
        let mut writer = store.begin_write().await.unwrap();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        let content_ref = writer.commit(&address("1.0.0", b"hello world")).await.unwrap();
        assert_eq!(&store.read(&content_ref).await.unwrap().unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn locate_matches_commit() {
        let store = InMemoryContentStore::new();
        let content_ref = put(&store, "1.0.0", b"x").await;
        assert_eq!(store.locate(&address("1.0.0", b"x")), content_ref);
    }

    #[tokio::test]
    async fn commit_never_overwrites() {
        let store = InMemoryContentStore::new();
        let target = address("1.0.0", b"first");
        let mut w1 = store.begin_write().await.unwrap();
        w1.write(b"first").await.unwrap();
        let r1 = w1.commit(&target).await.unwrap();

        let mut w2 = store.begin_write().await.unwrap();
        w2.write(b"second").await.unwrap();
        let r2 = w2.commit(&target).await.unwrap();

        assert_eq!(r1, r2);
        assert_eq!(&store.read(&r1).await.unwrap().unwrap()[..], b"first");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn aborted_write_is_invisible() {
        let store = InMemoryContentStore::new();
        let mut writer = store.begin_write().await.unwrap();
        writer.write(b"discard me").await.unwrap();
        writer.abort().await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            writer.write(b"more").await,
            Err(StoreError::WriterFinished)
        ));
    }

    #[tokio::test]
    async fn double_commit_is_rejected() {
        let store = InMemoryContentStore::new();
        let mut writer = store.begin_write().await.unwrap();
        writer.write(b"x").await.unwrap();
        writer.commit(&address("1.0.0", b"x")).await.unwrap();
        assert!(matches!(
            writer.commit(&address("1.0.0", b"x")).await,
            Err(StoreError::WriterFinished)
        ));
    }

    #[tokio::test]
    async fn read_missing_returns_none() {
        let store = InMemoryContentStore::new();
        let missing = store.locate(&address("9.9.9", b"never"));
        assert!(store.read(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn total_bytes_counts_committed_only() {
        let store = InMemoryContentStore::new();
        put(&store, "1.0.0", b"12345").await;
        put(&store, "2.0.0", b"123456789").await;
        let mut pending = store.begin_write().await.unwrap();
        pending.write(b"uncommitted").await.unwrap();
        assert_eq!(store.total_bytes(), 14);
    }

    #[tokio::test]
    async fn concurrent_reads_are_safe() {
        let store = InMemoryContentStore::new();
        let content_ref = put(&store, "1.0.0", b"shared data").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let content_ref = content_ref.clone();
                tokio::spawn(async move {
                    let data = store.read(&content_ref).await.unwrap().unwrap();
                    assert_eq!(&data[..], b"shared data");
                })
            })
            .collect();

        for h in handles {
            h.await.expect("task should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryContentStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryContentStore"));
        assert!(debug.contains("object_count"));
    }
}
