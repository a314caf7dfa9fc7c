//! Error types for the engine.

use std::path::PathBuf;

use cairn_store::StoreError;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to access the store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chunking the input failed.
    #[error("cas error: {0}")]
    Cas(#[from] cairn_cas::CasError),

    /// I/O error outside the chunker (opening or writing files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The manager was configured with unusable parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The path handed to the manager is not a regular file.
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// A stored chunk does not have the length its metadata records.
    #[error("chunk {offset} has {actual} bytes, metadata says {expected}")]
    ChunkSizeMismatch {
        /// Ordinal position of the chunk.
        offset: u64,
        /// Size recorded in the metadata.
        expected: u32,
        /// Size of the bytes returned by the store.
        actual: usize,
    },

    /// A background chunk write panicked or was cancelled.
    #[error("chunk write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// True when the underlying cause is a missing chunk or revision.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_not_found())
    }
}
