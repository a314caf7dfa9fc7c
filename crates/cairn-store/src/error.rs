//! Error types for storage operations.

use cairn_types::{Digest, HashAlgorithm};

/// Errors that can occur during storage operations.
///
/// `ChunkNotFound` and `FileNotFound` are domain results callers are
/// expected to test for; everything else is backend-specific.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested chunk was not found.
    #[error("chunk not found: {0}")]
    ChunkNotFound(Digest),

    /// No committed revision matches the request.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding persisted metadata failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Chunk data on disk does not hash to its content address.
    #[error("chunk corruption detected: expected {expected}, actual hash {actual}")]
    CorruptChunk {
        /// The digest that was requested.
        expected: Digest,
        /// The digest computed from the data actually on disk.
        actual: Digest,
    },

    /// An existing store was created with a different hash algorithm.
    #[error("store uses {found} digests, {requested} was requested")]
    IncompatibleHash {
        /// Algorithm recorded in the store.
        found: HashAlgorithm,
        /// Algorithm the caller asked for.
        requested: HashAlgorithm,
    },
}

impl StoreError {
    /// True for the two "not found" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ChunkNotFound(_) | StoreError::FileNotFound(_)
        )
    }
}

impl From<postcard::Error> for StoreError {
    fn from(e: postcard::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
