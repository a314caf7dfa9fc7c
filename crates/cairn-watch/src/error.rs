//! Error types for the watcher.

use std::path::PathBuf;

/// Errors that can occur while starting a watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The OS notification subscription could not be created.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// An exclusion pattern is not a valid glob.
    #[error("invalid exclusion pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// The watch root is missing or not a directory.
    #[error("cannot watch {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
