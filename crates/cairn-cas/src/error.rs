//! Error types for chunking operations.

/// Errors that can occur while chunking.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// Chunk size must be at least one byte.
    #[error("invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(u32),

    /// An I/O error occurred while reading the input stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
