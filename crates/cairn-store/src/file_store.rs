//! File-based storage backend.
//!
//! On-disk layout under the base directory:
//!
//! ```text
//! {base}/STORE                         hash algorithm the store was created with
//! {base}/chunks/{hex[0..2]}/{hex[2..4]}/{hex}
//! {base}/files/{blake3(name)}.log      postcard-encoded revision history
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use cairn_types::{Digest, FileMetadata, HashAlgorithm, RevisionId};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::traits::Store;

/// Current version of the revision log encoding.
const LOG_VERSION: u8 = 2;

const MARKER_FILE: &str = "STORE";
const CHUNKS_DIR: &str = "chunks";
const FILES_DIR: &str = "files";
const LOG_EXTENSION: &str = "log";

/// Revision history of one file as persisted on disk.
#[derive(Serialize, Deserialize)]
struct RevisionLog {
    version: u8,
    name: String,
    revisions: Vec<FileMetadata>,
}

/// Durable store with one file per chunk and one log per file name.
///
/// Every write goes to a temporary file that is synced and then renamed into
/// place, so readers observe either the old state or the new one. The
/// directory holding the new entry is synced before the write returns, so a
/// chunk is on disk before any revision log that references it. Chunks are
/// re-hashed on read and a mismatch is reported as
/// [`StoreError::CorruptChunk`].
pub struct FileStore {
    base_dir: PathBuf,
    hash: HashAlgorithm,
    /// Serializes read-modify-write cycles on revision logs.
    log_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl FileStore {
    /// Open (or create) a store rooted at `base_dir`.
    ///
    /// A new store records `hash` in its marker file. An existing store keeps
    /// the algorithm it was created with; asking for a different one fails
    /// with [`StoreError::IncompatibleHash`].
    pub async fn open(base_dir: impl AsRef<Path>, hash: HashAlgorithm) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(base_dir.join(CHUNKS_DIR)).await?;
        tokio::fs::create_dir_all(base_dir.join(FILES_DIR)).await?;

        let marker = base_dir.join(MARKER_FILE);
        match tokio::fs::read_to_string(&marker).await {
            Ok(content) => {
                let found: HashAlgorithm = content
                    .trim()
                    .parse()
                    .map_err(|e: cairn_types::UnknownHashAlgorithm| {
                        StoreError::Serialization(e.to_string())
                    })?;
                if found != hash {
                    return Err(StoreError::IncompatibleHash {
                        found,
                        requested: hash,
                    });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&marker, format!("{hash}\n")).await?;
                info!(path = %base_dir.display(), %hash, "initialized file store");
            }
            Err(e) => return Err(StoreError::Io(e)),
        }

        Ok(Self {
            base_dir,
            hash,
            log_lock: Mutex::new(()),
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Hash algorithm this store verifies chunks with.
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Compute the full file path for a chunk.
    fn chunk_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_string();
        self.base_dir
            .join(CHUNKS_DIR)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex)
    }

    /// Compute the revision log path for a file name.
    fn log_path(&self, name: &str) -> PathBuf {
        let key = blake3::hash(name.as_bytes()).to_hex();
        self.base_dir
            .join(FILES_DIR)
            .join(format!("{key}.{LOG_EXTENSION}"))
    }

    /// Write `data` to `path` through a synced temporary file and a rename.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("{}.{n}.tmp", std::process::id()));

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(e));
        }
        match path.parent() {
            Some(parent) => sync_dir(parent).await,
            None => Ok(()),
        }
    }

    async fn read_log(&self, path: &Path) -> Result<Option<RevisionLog>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let log: RevisionLog = postcard::from_bytes(&bytes)?;
                if log.version != LOG_VERSION {
                    return Err(StoreError::Serialization(format!(
                        "unsupported revision log version {}, expected {LOG_VERSION}",
                        log.version
                    )));
                }
                Ok(Some(log))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// Flush a directory's entries to disk.
///
/// Directories cannot be opened as files on every platform; elsewhere the
/// rename is left to the OS.
async fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    if cfg!(unix) {
        tokio::fs::File::open(dir).await?.sync_all().await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl Store for FileStore {
    async fn put_chunk(&self, digest: Digest, data: Bytes) -> Result<(), StoreError> {
        let path = self.chunk_path(&digest);
        if tokio::fs::try_exists(&path).await? {
            debug!(%digest, "chunk already on disk, skipping write");
            return Ok(());
        }
        // chunks/XX/YY: sync the parent of each fan-out level created here.
        if let Some(leaf) = path.parent()
            && !tokio::fs::try_exists(leaf).await?
        {
            let fanout = leaf.parent().unwrap_or(leaf);
            let fresh_fanout = !tokio::fs::try_exists(fanout).await?;
            tokio::fs::create_dir_all(leaf).await?;
            if fresh_fanout {
                sync_dir(&self.base_dir.join(CHUNKS_DIR)).await?;
            }
            sync_dir(fanout).await?;
        }

        self.write_atomic(&path, &data).await?;

        debug!(%digest, path = %path.display(), size = data.len(), "stored chunk to file");
        Ok(())
    }

    async fn get_chunk(&self, digest: Digest) -> Result<Bytes, StoreError> {
        let path = self.chunk_path(&digest);
        match tokio::fs::read(&path).await {
            Ok(data) => {
                let actual = self.hash.digest(&data);
                if actual != digest {
                    error!(expected = %digest, %actual, "chunk corruption detected on read");
                    return Err(StoreError::CorruptChunk {
                        expected: digest,
                        actual,
                    });
                }
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::ChunkNotFound(digest))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn contains_chunk(&self, digest: Digest) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.chunk_path(&digest)).await?)
    }

    async fn put_metadata(&self, metadata: FileMetadata) -> Result<(), StoreError> {
        let path = self.log_path(&metadata.revision.name);
        let _guard = self.log_lock.lock().await;

        let mut log = self.read_log(&path).await?.unwrap_or_else(|| RevisionLog {
            version: LOG_VERSION,
            name: metadata.revision.name.clone(),
            revisions: Vec::new(),
        });
        debug!(
            revision = %metadata.revision,
            chunks = metadata.chunks.len(),
            history = log.revisions.len(),
            "appending revision to log"
        );
        log.revisions.push(metadata);

        let bytes = postcard::to_allocvec(&log)?;
        self.write_atomic(&path, &bytes).await
    }

    async fn get_metadata(&self, revision: &RevisionId) -> Result<FileMetadata, StoreError> {
        self.read_log(&self.log_path(&revision.name))
            .await?
            .and_then(|log| {
                log.revisions
                    .into_iter()
                    .find(|m| m.revision == *revision)
            })
            .ok_or_else(|| StoreError::FileNotFound(revision.to_string()))
    }

    async fn get_revisions(&self, name: &str) -> Result<Vec<RevisionId>, StoreError> {
        let log = self
            .read_log(&self.log_path(name))
            .await?
            .ok_or_else(|| StoreError::FileNotFound(name.to_string()))?;
        Ok(log.revisions.into_iter().map(|m| m.revision).collect())
    }

    async fn list_files(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut names = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(self.base_dir.join(FILES_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            if let Some(log) = self.read_log(&path).await? {
                names.insert(log.name);
            }
        }
        Ok(names)
    }

    async fn list_chunks(&self) -> Result<BTreeSet<Digest>, StoreError> {
        let mut digests = BTreeSet::new();

        // Walk the 2-level fan-out: chunks/XX/YY/<hex>
        let mut level0 = tokio::fs::read_dir(self.base_dir.join(CHUNKS_DIR)).await?;
        while let Some(d0) = level0.next_entry().await? {
            if !d0.file_type().await?.is_dir() {
                continue;
            }
            let mut level1 = tokio::fs::read_dir(d0.path()).await?;
            while let Some(d1) = level1.next_entry().await? {
                if !d1.file_type().await?.is_dir() {
                    continue;
                }
                let mut files = tokio::fs::read_dir(d1.path()).await?;
                while let Some(entry) = files.next_entry().await? {
                    if !entry.file_type().await?.is_file() {
                        continue;
                    }
                    if let Some(name) = entry.file_name().to_str()
                        && let Ok(digest) = name.parse::<Digest>()
                    {
                        digests.insert(digest);
                    }
                }
            }
        }
        Ok(digests)
    }

    async fn list_revisions(&self, name: &str) -> Result<Vec<FileMetadata>, StoreError> {
        Ok(self
            .read_log(&self.log_path(name))
            .await?
            .map(|log| log.revisions)
            .unwrap_or_default())
    }
}
