//! In-memory storage backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use bytes::Bytes;
use cairn_types::{Digest, FileMetadata, RevisionId};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::Store;

#[derive(Default)]
struct Inner {
    chunks: HashMap<Digest, Bytes>,
    /// File name → revision history, oldest first.
    metadata: HashMap<String, Vec<FileMetadata>>,
}

/// In-memory store backed by two maps behind a single `RwLock`.
///
/// The reference backend: useful for tests and for running without
/// persistence. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn put_chunk(&self, digest: Digest, data: Bytes) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.chunks.contains_key(&digest) {
            debug!(%digest, "chunk already present, skipping write");
            return Ok(());
        }
        debug!(%digest, size = data.len(), "storing chunk in memory");
        inner.chunks.insert(digest, data);
        Ok(())
    }

    async fn get_chunk(&self, digest: Digest) -> Result<Bytes, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .chunks
            .get(&digest)
            .cloned()
            .ok_or(StoreError::ChunkNotFound(digest))
    }

    async fn contains_chunk(&self, digest: Digest) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.chunks.contains_key(&digest))
    }

    async fn put_metadata(&self, metadata: FileMetadata) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        debug!(
            revision = %metadata.revision,
            chunks = metadata.chunks.len(),
            "appending revision in memory"
        );
        inner
            .metadata
            .entry(metadata.revision.name.clone())
            .or_default()
            .push(metadata);
        Ok(())
    }

    async fn get_metadata(&self, revision: &RevisionId) -> Result<FileMetadata, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .metadata
            .get(&revision.name)
            .and_then(|history| history.iter().find(|m| m.revision == *revision))
            .cloned()
            .ok_or_else(|| StoreError::FileNotFound(revision.to_string()))
    }

    async fn get_revisions(&self, name: &str) -> Result<Vec<RevisionId>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        let history = inner
            .metadata
            .get(name)
            .ok_or_else(|| StoreError::FileNotFound(name.to_string()))?;
        Ok(history.iter().map(|m| m.revision.clone()).collect())
    }

    async fn list_files(&self) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.metadata.keys().cloned().collect())
    }

    async fn list_chunks(&self) -> Result<BTreeSet<Digest>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.chunks.keys().copied().collect())
    }

    async fn list_revisions(&self, name: &str) -> Result<Vec<FileMetadata>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.metadata.get(name).cloned().unwrap_or_default())
    }
}
