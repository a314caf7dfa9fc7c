//! [`FsWatcher`]: initial walk plus live notifications over one tree.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use cairn_types::RevisionId;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::filter::ExcludeSet;
use crate::handoff;

/// What to watch and what to leave out.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory whose tree is watched.
    pub root: PathBuf,
    /// Glob patterns matched against full paths. A matching directory
    /// excludes everything below it.
    pub exclude: Vec<String>,
    /// Descend into symlinked directories and report symlinked files.
    pub follow_links: bool,
}

impl WatchConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
            follow_links: false,
        }
    }

    /// Add one exclusion pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }
}

/// A regular file found by the walk or by a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiscovery {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl From<FileDiscovery> for RevisionId {
    fn from(d: FileDiscovery) -> Self {
        RevisionId::new(d.path.to_string_lossy(), d.modified)
    }
}

/// Stream of discoveries. Exactly one consumer reads it.
pub struct Discoveries {
    rx: handoff::Receiver<FileDiscovery>,
}

impl Discoveries {
    /// Wait for the next discovered file.
    ///
    /// Returns `None` once the watcher has been closed or dropped.
    pub async fn recv(&mut self) -> Option<FileDiscovery> {
        self.rx.recv().await
    }
}

/// Discovers regular files under a root, first by walking the tree and
/// then by following OS change notifications.
///
/// Walk and notification events may interleave and the same file may be
/// reported more than once. Closing (or dropping) the watcher stops both
/// producers and makes [`Discoveries::recv`] return `None`.
pub struct FsWatcher {
    root: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    walk_done_rx: watch::Receiver<bool>,
    /// The OS subscription; `None` once closed.
    watcher: Option<RecommendedWatcher>,
}

impl FsWatcher {
    /// Subscribe to changes under `config.root` and start the initial walk.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: WatchConfig) -> Result<(Self, Discoveries), WatchError> {
        let exclude = ExcludeSet::new(&config.exclude)?;
        let root = config.root;

        let stat = std::fs::metadata(&root).map_err(|source| WatchError::Io {
            path: root.clone(),
            source,
        })?;
        if !stat.is_dir() {
            return Err(WatchError::Io {
                path: root.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    "watch root is not a directory",
                ),
            });
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (walk_done_tx, walk_done_rx) = watch::channel(false);
        let (tx, rx) = handoff::channel(shutdown_rx.clone());

        // Subscribe before walking so changes made during the walk are seen.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(root = %root.display(), excluded = config.exclude.len(), "watching");

        tokio::spawn(notification_loop(
            root.clone(),
            raw_rx,
            tx.clone(),
            exclude.clone(),
            config.follow_links,
            shutdown_rx,
        ));

        let walk_root = root.clone();
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            walk(&handle, &walk_root, &exclude, config.follow_links, &tx);
            walk_done_tx.send_replace(true);
        });

        Ok((
            Self {
                root,
                shutdown_tx,
                walk_done_rx,
                watcher: Some(watcher),
            },
            Discoveries { rx },
        ))
    }

    /// Resolves once the initial walk has ended, whether it finished,
    /// failed, or was cut short by [`close`](Self::close).
    pub fn walk_finished(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut done = self.walk_done_rx.clone();
        async move {
            let _ = done.wait_for(|done| *done).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop both producers and end the discovery stream. Idempotent.
    ///
    /// Producers blocked on a handoff return immediately; a consumer
    /// waiting in [`Discoveries::recv`] gets `None`.
    pub fn close(&mut self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        // Dropping the subscription stops OS event delivery.
        self.watcher.take();
        info!(root = %self.root.display(), "watcher closed");
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Walk the tree once, handing every regular file to the consumer.
///
/// Runs on a blocking thread; each handoff blocks it until the consumer
/// takes the event or the watcher closes.
fn walk(
    handle: &Handle,
    root: &Path,
    exclude: &ExcludeSet,
    follow_links: bool,
    tx: &handoff::Sender<FileDiscovery>,
) {
    let mut sent = 0u64;
    let entries = WalkDir::new(root)
        .follow_links(follow_links)
        .into_iter()
        .filter_entry(|entry| !exclude.matches(entry.path()));

    for entry in entries {
        if tx.is_closed() {
            debug!(sent, "initial walk stopped: watcher closed");
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                error!(root = %root.display(), error = %e, "initial walk failed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let modified = entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|meta| meta.modified());
        let modified = match modified {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot stat file");
                continue;
            }
        };

        let discovery = FileDiscovery {
            path: entry.into_path(),
            modified,
        };
        if !handle.block_on(tx.send(discovery)) {
            debug!(sent, "initial walk stopped: watcher closed");
            return;
        }
        sent += 1;
    }

    info!(root = %root.display(), files = sent, "initial walk complete");
}

/// Turn raw OS notifications into discoveries until shutdown.
async fn notification_loop(
    root: PathBuf,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    tx: handoff::Sender<FileDiscovery>,
    exclude: ExcludeSet,
    follow_links: bool,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let res = tokio::select! {
            biased;
            _ = handoff::closed(&mut shutdown_rx) => break,
            res = raw_rx.recv() => match res {
                Some(res) => res,
                None => break,
            },
        };

        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "notification error");
                continue;
            }
        };

        // Reads (including our own) and removals never produce a new revision.
        if matches!(event.kind, EventKind::Access(_) | EventKind::Remove(_)) {
            continue;
        }
        debug!(kind = ?event.kind, paths = event.paths.len(), "notification");

        for path in event.paths {
            if exclude.covers(&root, &path) {
                continue;
            }
            let Some(discovery) = stat_discovery(path, follow_links).await else {
                continue;
            };
            if !tx.send(discovery).await {
                debug!("notification loop stopped: watcher closed");
                return;
            }
        }
    }
    debug!("notification loop finished");
}

/// Re-stat a notified path. Only regular files are reported.
async fn stat_discovery(path: PathBuf, follow_links: bool) -> Option<FileDiscovery> {
    let stat = if follow_links {
        tokio::fs::metadata(&path).await
    } else {
        tokio::fs::symlink_metadata(&path).await
    };
    let stat = match stat {
        Ok(stat) => stat,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot stat notified path");
            return None;
        }
    };
    if !stat.is_file() {
        return None;
    }
    match stat.modified() {
        Ok(modified) => Some(FileDiscovery { path, modified }),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "no modification time");
            None
        }
    }
}
