//! Feeds watcher discoveries into the chunk manager.

use cairn_engine::{ChunkManager, EngineError};
use cairn_types::{FileMetadata, RevisionId};
use cairn_watch::{Discoveries, FileDiscovery};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// What happened to one discovery.
#[derive(Debug)]
pub enum Outcome {
    /// A new revision was committed.
    Committed(FileMetadata),
    /// A revision was committed, but the file was modified while it was
    /// being read, so its content may mix old and new bytes. A later
    /// notification reports the new revision.
    Modified(FileMetadata),
    /// This exact revision is already in the store.
    Unchanged,
    /// The file changed after it was discovered; a later notification
    /// will report the new revision.
    Stale,
}

/// Counters for one run of the ingest loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub committed: u64,
    /// Committed while the file was being written; also counted in `committed`.
    pub modified: u64,
    pub unchanged: u64,
    pub stale: u64,
    pub failed: u64,
}

/// Commit one discovered file unless its revision is already stored.
pub async fn ingest_one(
    manager: &ChunkManager,
    discovery: &FileDiscovery,
) -> Result<Outcome, EngineError> {
    let revision = RevisionId::from(discovery.clone());
    if manager.has(&revision).await? {
        return Ok(Outcome::Unchanged);
    }

    let file = tokio::fs::File::open(&discovery.path).await?;
    if file.metadata().await?.modified()? != discovery.modified {
        return Ok(Outcome::Stale);
    }

    commit_checked(manager, discovery, revision, file).await
}

/// Commit `reader` as `revision`, then check the file was not modified
/// while it was read.
async fn commit_checked(
    manager: &ChunkManager,
    discovery: &FileDiscovery,
    revision: RevisionId,
    reader: impl AsyncRead + Unpin,
) -> Result<Outcome, EngineError> {
    let metadata = manager.add(revision, reader).await?;
    let after = tokio::fs::metadata(&discovery.path)
        .await
        .and_then(|stat| stat.modified());
    match after {
        Ok(modified) if modified == discovery.modified => Ok(Outcome::Committed(metadata)),
        // Gone or rewritten: either way the bytes read may be inconsistent.
        _ => Ok(Outcome::Modified(metadata)),
    }
}

/// Ingest discoveries until the stream ends.
///
/// Per-file failures are logged and counted; they never stop the loop.
pub async fn run(manager: &ChunkManager, discoveries: &mut Discoveries) -> IngestStats {
    let mut stats = IngestStats::default();

    while let Some(discovery) = discoveries.recv().await {
        match ingest_one(manager, &discovery).await {
            Ok(Outcome::Committed(meta)) => {
                stats.committed += 1;
                info!(
                    path = %discovery.path.display(),
                    length = meta.length,
                    chunks = meta.chunks.len(),
                    "backed up"
                );
            }
            Ok(Outcome::Modified(meta)) => {
                stats.committed += 1;
                stats.modified += 1;
                warn!(
                    path = %discovery.path.display(),
                    revision = %meta.revision,
                    "file changed while it was backed up"
                );
            }
            Ok(Outcome::Unchanged) => {
                stats.unchanged += 1;
                debug!(path = %discovery.path.display(), "already backed up");
            }
            Ok(Outcome::Stale) => {
                stats.stale += 1;
                debug!(path = %discovery.path.display(), "changed since discovery");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(path = %discovery.path.display(), error = %e, "backup failed");
            }
        }
    }

    stats
}
