//! A [`Store`] wrapper that injects chunk-write failures and random latency.
//!
//! `FaultyStore` wraps any `Arc<dyn Store>` and can be told to fail every
//! chunk write after the first `n` succeed. It also counts how many chunk
//! and metadata writes reached it, so tests can assert that metadata was
//! never written after a failed chunk. The latency RNG is seeded for
//! reproducible behaviour across test runs.
//!
//! # Example
//!
//! ```ignore
//! let faulty = FaultyStore::new(inner)
//!     .fail_chunk_writes_after(3)
//!     .write_latency(1, 5)
//!     .seed(42);
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cairn_types::{Digest, FileMetadata, RevisionId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::Store;

/// A [`Store`] wrapper for failure-injection tests.
pub struct FaultyStore {
    inner: Arc<dyn Store>,
    /// Chunk writes allowed to succeed before every further one fails.
    chunk_write_budget: Option<usize>,
    write_latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
    chunk_writes: AtomicUsize,
    metadata_writes: AtomicUsize,
}

impl FaultyStore {
    /// Wrap an existing store; by default it passes everything through.
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            chunk_write_budget: None,
            write_latency_ms: (0, 0),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            chunk_writes: AtomicUsize::new(0),
            metadata_writes: AtomicUsize::new(0),
        }
    }

    /// Let `n` chunk writes succeed, then fail every later one.
    pub fn fail_chunk_writes_after(mut self, n: usize) -> Self {
        self.chunk_write_budget = Some(n);
        self
    }

    /// Set the write latency range in milliseconds (uniform random).
    pub fn write_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.write_latency_ms = (min_ms, max_ms);
        self
    }

    /// Set the RNG seed for deterministic behaviour.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Number of chunk writes attempted through this wrapper.
    pub fn chunk_writes(&self) -> usize {
        self.chunk_writes.load(Ordering::SeqCst)
    }

    /// Number of metadata writes attempted through this wrapper.
    pub fn metadata_writes(&self) -> usize {
        self.metadata_writes.load(Ordering::SeqCst)
    }

    /// Sleep for a random duration in `[min, max]` milliseconds.
    async fn delay(&self, range: (u64, u64)) {
        let (min, max) = range;
        if max == 0 {
            return;
        }

        let ms = if min == max {
            min
        } else {
            self.rng
                .lock()
                .expect("lock poisoned")
                .random_range(min..=max)
        };

        if ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait::async_trait]
impl Store for FaultyStore {
    async fn put_chunk(&self, digest: Digest, data: Bytes) -> Result<(), StoreError> {
        let attempt = self.chunk_writes.fetch_add(1, Ordering::SeqCst);
        self.delay(self.write_latency_ms).await;
        if let Some(budget) = self.chunk_write_budget
            && attempt >= budget
        {
            debug!(%digest, attempt, "injecting chunk write failure");
            return Err(StoreError::Io(std::io::Error::other(format!(
                "injected failure writing chunk {digest}"
            ))));
        }
        self.inner.put_chunk(digest, data).await
    }

    async fn get_chunk(&self, digest: Digest) -> Result<Bytes, StoreError> {
        self.inner.get_chunk(digest).await
    }

    async fn contains_chunk(&self, digest: Digest) -> Result<bool, StoreError> {
        self.inner.contains_chunk(digest).await
    }

    async fn put_metadata(&self, metadata: FileMetadata) -> Result<(), StoreError> {
        self.metadata_writes.fetch_add(1, Ordering::SeqCst);
        self.delay(self.write_latency_ms).await;
        self.inner.put_metadata(metadata).await
    }

    async fn get_metadata(&self, revision: &RevisionId) -> Result<FileMetadata, StoreError> {
        self.inner.get_metadata(revision).await
    }

    async fn get_revisions(&self, name: &str) -> Result<Vec<RevisionId>, StoreError> {
        self.inner.get_revisions(name).await
    }

    async fn list_files(&self) -> Result<BTreeSet<String>, StoreError> {
        self.inner.list_files().await
    }

    async fn list_chunks(&self) -> Result<BTreeSet<Digest>, StoreError> {
        self.inner.list_chunks().await
    }

    async fn list_revisions(&self, name: &str) -> Result<Vec<FileMetadata>, StoreError> {
        self.inner.list_revisions(name).await
    }
}
