//! The storage contract shared by every backend.

use std::collections::BTreeSet;

use bytes::Bytes;
use cairn_types::{Digest, FileMetadata, RevisionId};

use crate::error::StoreError;

/// Durable chunk storage plus an append-only revision index per file.
///
/// Every method is independently thread-safe. Implementations must be
/// `Send + Sync` so a single store can be shared across tasks behind an
/// `Arc<dyn Store>`.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Store `data` under `digest`.
    ///
    /// Idempotent: writing a digest that is already present is a no-op, since
    /// equal digests imply equal bytes.
    async fn put_chunk(&self, digest: Digest, data: Bytes) -> Result<(), StoreError>;

    /// Retrieve a chunk. Fails with [`StoreError::ChunkNotFound`] when absent.
    async fn get_chunk(&self, digest: Digest) -> Result<Bytes, StoreError>;

    /// Check whether a chunk exists.
    async fn contains_chunk(&self, digest: Digest) -> Result<bool, StoreError>;

    /// Append `metadata` to the revision history of its file.
    ///
    /// Either the record is appended or nothing changes.
    async fn put_metadata(&self, metadata: FileMetadata) -> Result<(), StoreError>;

    /// Exact lookup on `(name, mod_time)`.
    /// Fails with [`StoreError::FileNotFound`] when no such revision exists.
    async fn get_metadata(&self, revision: &RevisionId) -> Result<FileMetadata, StoreError>;

    /// Revision ids of a file in insertion order.
    /// Fails with [`StoreError::FileNotFound`] for unknown names.
    async fn get_revisions(&self, name: &str) -> Result<Vec<RevisionId>, StoreError>;

    /// Names of every file with at least one committed revision.
    async fn list_files(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Digests of every stored chunk.
    async fn list_chunks(&self) -> Result<BTreeSet<Digest>, StoreError>;

    /// Full revision history of a file in insertion order; empty for unknown names.
    async fn list_revisions(&self, name: &str) -> Result<Vec<FileMetadata>, StoreError>;
}
