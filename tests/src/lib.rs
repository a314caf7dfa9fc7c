//! Shared test harness for cairn integration tests.
//!
//! Provides [`BackupHarness`]: a temporary source tree plus a chunk manager
//! over a chosen store, wired the same way the daemon wires them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use cairn_engine::{ChunkManager, ManagerConfig};
use cairn_store::{FileStore, MemoryStore, Store};
use cairn_types::{FileMetadata, HashAlgorithm, RevisionId};
use cairn_watch::{Discoveries, FileDiscovery, FsWatcher, WatchConfig};
use tempfile::TempDir;

/// A source tree under a temp dir and a manager to back it up into.
pub struct BackupHarness {
    _dir: TempDir,
    root: PathBuf,
    staging: PathBuf,
    manager: ChunkManager,
}

impl BackupHarness {
    /// Harness over a fresh in-memory store.
    pub fn in_memory(chunk_size: u32) -> Self {
        Self::with_store(chunk_size, Arc::new(MemoryStore::new()))
    }

    /// Harness over an existing store.
    pub fn with_store(chunk_size: u32, store: Arc<dyn Store>) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        // Canonical, so paths match what the OS reports in notifications.
        let base = dir.path().canonicalize().expect("canonicalize temp dir");
        let root = base.join("tree");
        let staging = base.join("staging");
        std::fs::create_dir(&root).expect("create tree");
        std::fs::create_dir(&staging).expect("create staging");
        let manager = ChunkManager::new(
            ManagerConfig {
                chunk_size,
                ..ManagerConfig::default()
            },
            store,
        )
        .expect("valid manager config");
        Self {
            _dir: dir,
            root,
            staging,
            manager,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.manager.store()
    }

    /// Write `data` to `rel` under the root, creating parent directories.
    pub fn write_file(&self, rel: &str, data: &[u8]) -> PathBuf {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, data).expect("write test file");
        path
    }

    /// Atomically place a complete file at `rel` with the given mtime.
    ///
    /// The file is written outside the tree and renamed in, so a watcher
    /// never observes it half-written.
    pub fn place_file(&self, rel: &str, data: &[u8], modified: SystemTime) -> PathBuf {
        let staged = self.staging.join(rel.replace('/', "_"));
        std::fs::write(&staged, data).expect("write staged file");
        std::fs::File::options()
            .write(true)
            .open(&staged)
            .and_then(|f| f.set_modified(modified))
            .expect("set mtime");

        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::rename(&staged, &path).expect("rename into tree");
        path
    }

    /// Start a watcher on the root with the given exclusion patterns,
    /// written relative to the root.
    pub fn watch(&self, exclude: &[&str]) -> (FsWatcher, Discoveries) {
        let mut config = WatchConfig::new(&self.root);
        for pattern in exclude {
            config = config.exclude(format!("{}/{pattern}", self.root.display()));
        }
        FsWatcher::start(config).expect("start watcher")
    }

    /// Commit a discovery unless its revision is already stored.
    ///
    /// Returns the new metadata, or `None` if the revision was known.
    pub async fn commit(&self, discovery: FileDiscovery) -> Option<FileMetadata> {
        let revision = RevisionId::from(discovery.clone());
        if self.manager.has(&revision).await.expect("has") {
            return None;
        }
        let file = tokio::fs::File::open(&discovery.path)
            .await
            .expect("open discovered file");
        Some(self.manager.add(revision, file).await.expect("add"))
    }

    /// Commit everything the initial walk reports. Returns the number of
    /// revisions committed.
    pub async fn backup_walk(&self, watcher: &FsWatcher, rx: &mut Discoveries) -> usize {
        let finished = watcher.walk_finished();
        tokio::pin!(finished);
        let mut committed = 0;
        loop {
            tokio::select! {
                biased;
                d = rx.recv() => match d {
                    Some(d) => {
                        if self.commit(d).await.is_some() {
                            committed += 1;
                        }
                    }
                    None => break,
                },
                _ = &mut finished => break,
            }
        }
        committed
    }

    /// Commit discoveries until one for `path` has been committed.
    pub async fn backup_until(&self, rx: &mut Discoveries, path: &Path) -> FileMetadata {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let d = rx.recv().await.expect("watcher closed early");
                let is_target = d.path == path;
                if let Some(meta) = self.commit(d).await
                    && is_target
                {
                    return meta;
                }
            }
        })
        .await
        .expect("timed out waiting for the change to be backed up")
    }

    /// Read a committed revision back in full.
    pub async fn restore(&self, revision: &RevisionId) -> Vec<u8> {
        self.manager
            .get(revision)
            .await
            .expect("get")
            .read_to_end()
            .await
            .expect("read_to_end")
    }
}

/// Open a file store in `dir` with the default hash.
pub async fn open_file_store(dir: &Path) -> Arc<FileStore> {
    Arc::new(
        FileStore::open(dir, HashAlgorithm::default())
            .await
            .expect("open file store"),
    )
}

/// Revision of the file at `path` as it is on disk now.
pub fn revision_on_disk(path: &Path) -> RevisionId {
    let modified = std::fs::metadata(path)
        .expect("stat")
        .modified()
        .expect("mtime");
    RevisionId::new(path.to_string_lossy(), modified)
}

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 0xDEAD_BEEF)
}

/// Generate test data with a specific seed (for unique files).
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}
