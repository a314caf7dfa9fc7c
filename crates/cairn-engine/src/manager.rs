//! [`ChunkManager`]: splits files into chunks and commits them to a store.
//!
//! A `ChunkManager` owns a chunker and a shared handle to a [`Store`], and
//! exposes the add / has / get pipeline for file revisions.

use std::path::Path;
use std::sync::Arc;

use cairn_cas::{Chunk, Chunker};
use cairn_store::{Store, StoreError};
use cairn_types::{DEFAULT_CHUNK_SIZE, FileMetadata, HashAlgorithm, RevisionId};
use tokio::io::AsyncRead;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::reader::FileReader;

/// Configuration for creating a [`ChunkManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Chunk size in bytes.
    pub chunk_size: u32,
    /// Hash used to name chunks.
    pub hash: HashAlgorithm,
    /// Maximum number of chunk writes in flight for a single file.
    ///
    /// `1` writes chunks strictly one after another.
    pub write_concurrency: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash: HashAlgorithm::default(),
            write_concurrency: 1,
        }
    }
}

/// Commits file revisions into a [`Store`] and reads them back.
pub struct ChunkManager {
    /// Chunk and metadata storage.
    store: Arc<dyn Store>,
    /// Fixed-size content-addressing chunker.
    chunker: Chunker,
    write_concurrency: usize,
}

impl ChunkManager {
    /// Create a manager over `store`.
    pub fn new(config: ManagerConfig, store: Arc<dyn Store>) -> Result<Self, EngineError> {
        if config.write_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "write_concurrency must be at least 1".to_string(),
            ));
        }
        let chunker = Chunker::new(config.chunk_size, config.hash)
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            store,
            chunker,
            write_concurrency: config.write_concurrency,
        })
    }

    /// Return a reference to the store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunker.chunk_size()
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.chunker.hash()
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Commit the bytes readable from `reader` as `revision`.
    ///
    /// Chunks are read and written in ascending offset order. Metadata is
    /// only written after every chunk write has succeeded; any read or write
    /// failure aborts the add and leaves no metadata behind. A zero-length
    /// stream still commits metadata with no chunks.
    pub async fn add(
        &self,
        revision: RevisionId,
        reader: impl AsyncRead + Unpin,
    ) -> Result<FileMetadata, EngineError> {
        debug!(%revision, chunk_size = self.chunker.chunk_size(), "add: starting");

        let mut stream = self.chunker.stream(reader);
        let mut metadata = FileMetadata::empty(revision);
        // Dropping the set on an early return aborts writes still in flight.
        let mut in_flight: JoinSet<Result<(), StoreError>> = JoinSet::new();

        // Step 1: every chunk reaches the store.
        while let Some(chunk) = stream.next_chunk().await? {
            metadata.length += chunk.data.len() as u64;
            metadata.chunks.push(chunk.to_ref());

            if self.write_concurrency == 1 {
                write_chunk(self.store.as_ref(), chunk).await?;
                continue;
            }

            while in_flight.len() >= self.write_concurrency {
                join_one(&mut in_flight).await?;
            }
            let store = Arc::clone(&self.store);
            in_flight.spawn(async move { write_chunk(store.as_ref(), chunk).await });
        }
        while !in_flight.is_empty() {
            join_one(&mut in_flight).await?;
        }

        // Step 2: only now does the revision become visible.
        self.store.put_metadata(metadata.clone()).await?;

        info!(
            revision = %metadata.revision,
            chunks = metadata.chunks.len(),
            length = metadata.length,
            "add: revision committed"
        );

        Ok(metadata)
    }

    /// Commit the file at `path`, named by its path and modification time.
    pub async fn add_path(&self, path: &Path) -> Result<FileMetadata, EngineError> {
        let stat = tokio::fs::metadata(path).await?;
        if !stat.is_file() {
            return Err(EngineError::NotAFile(path.to_path_buf()));
        }
        let revision = RevisionId::new(path.to_string_lossy(), stat.modified()?);
        let file = tokio::fs::File::open(path).await?;
        self.add(revision, file).await
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Report whether metadata for exactly `revision` has been committed.
    ///
    /// Only checks the metadata; see [`has_complete`](Self::has_complete)
    /// for a check that also covers the referenced chunks.
    pub async fn has(&self, revision: &RevisionId) -> Result<bool, EngineError> {
        match self.store.get_metadata(revision).await {
            Ok(_) => Ok(true),
            Err(StoreError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`has`](Self::has), but also requires every referenced chunk to
    /// still be present in the store.
    pub async fn has_complete(&self, revision: &RevisionId) -> Result<bool, EngineError> {
        let metadata = match self.store.get_metadata(revision).await {
            Ok(m) => m,
            Err(StoreError::FileNotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        for chunk in &metadata.chunks {
            if !self.store.contains_chunk(chunk.digest).await? {
                warn!(
                    %revision,
                    offset = chunk.offset,
                    digest = %chunk.digest,
                    "revision references a missing chunk"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Revision history of `name`, oldest first. Empty for unknown names.
    pub async fn history(&self, name: &str) -> Result<Vec<FileMetadata>, EngineError> {
        Ok(self.store.list_revisions(name).await?)
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Open `revision` for reading.
    ///
    /// Fails with `FileNotFound` when the revision was never committed.
    /// Chunks are fetched lazily as the returned reader is drained.
    pub async fn get(&self, revision: &RevisionId) -> Result<FileReader, EngineError> {
        let metadata = self.store.get_metadata(revision).await?;
        debug!(
            %revision,
            chunks = metadata.chunks.len(),
            length = metadata.length,
            "get: opening revision"
        );
        Ok(FileReader::new(Arc::clone(&self.store), metadata))
    }
}

/// Store one chunk unless its digest is already present.
async fn write_chunk(store: &dyn Store, chunk: Chunk) -> Result<(), StoreError> {
    if store.contains_chunk(chunk.digest).await? {
        debug!(digest = %chunk.digest, offset = chunk.offset, "chunk already stored");
        return Ok(());
    }
    debug!(
        digest = %chunk.digest,
        offset = chunk.offset,
        size = chunk.data.len(),
        "writing chunk"
    );
    store.put_chunk(chunk.digest, chunk.data).await
}

/// Wait for one in-flight chunk write and surface its failure.
async fn join_one(set: &mut JoinSet<Result<(), StoreError>>) -> Result<(), EngineError> {
    if let Some(result) = set.join_next().await {
        result??;
    }
    Ok(())
}
