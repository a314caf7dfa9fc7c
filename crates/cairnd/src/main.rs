//! `cairnd`: the cairn backup daemon.
//!
//! Watches a directory tree and commits every regular file it discovers,
//! at startup and whenever it changes, into a deduplicating chunk store.
//!
//! # Usage
//!
//! ```text
//! cairnd watch --root ~/docs                          # back up into ~/.cairn
//! cairnd watch --root ~/docs --exclude '~/docs/tmp'   # leave a subtree out
//! cairnd watch -c cairn.toml --store memory           # dry run, nothing persisted
//! cairnd stats                                        # summarize the file store
//! ```

mod config;
mod ingest;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cairn_engine::ChunkManager;
use cairn_store::{FileStore, MemoryStore, Store};
use cairn_watch::FsWatcher;
use clap::{Parser, Subcommand};
use tracing::info;

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "cairnd", version, about = "Deduplicating backup daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a tree and back up every file revision.
    Watch {
        /// Root of the backup tree.
        #[arg(short, long, env = "CAIRN_ROOT")]
        root: Option<PathBuf>,

        /// Comma-separated glob patterns (full paths) to exclude.
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Storage backend: "file" or "memory".
        #[arg(long)]
        store: Option<String>,

        /// Override the file store directory.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<u32>,
    },

    /// Show what the file store holds.
    Stats {
        /// Override the file store directory.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Watch {
            root,
            exclude,
            store,
            data_dir,
            chunk_size,
        } => {
            // CLI args override config file values.
            if let Some(root) = root {
                config.watch.root = Some(root);
            }
            if !exclude.is_empty() {
                config.watch.exclude = exclude;
            }
            if let Some(backend) = store {
                config.storage.backend = backend;
            }
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            if let Some(size) = chunk_size {
                config.storage.chunk_size = Some(size);
            }
            cmd_watch(config).await
        }
        Commands::Stats { data_dir } => {
            if let Some(dir) = data_dir {
                config.storage.data_dir = dir;
            }
            cmd_stats(&config).await
        }
    }
}

// -----------------------------------------------------------------------
// cairnd watch
// -----------------------------------------------------------------------

async fn open_store(config: &CliConfig) -> Result<Arc<dyn Store>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "file" => {
            let dir = &config.storage.data_dir;
            std::fs::create_dir_all(dir).context("failed to create data directory")?;
            let store = FileStore::open(dir, config.storage.hash)
                .await
                .with_context(|| format!("cannot open store at {}", dir.display()))?;
            Ok(Arc::new(store))
        }
        other => bail!("unknown storage backend {other:?} (expected \"file\" or \"memory\")"),
    }
}

async fn cmd_watch(config: CliConfig) -> Result<()> {
    let watch_config = config.watch_config()?;
    info!(
        root = %watch_config.root.display(),
        backend = %config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        chunk_size = config.chunk_size(),
        hash = %config.storage.hash,
        "starting cairnd"
    );

    let store = open_store(&config).await?;
    let manager = ChunkManager::new(config.manager_config(), store)?;
    let (mut watcher, mut discoveries) =
        FsWatcher::start(watch_config).context("failed to start watcher")?;

    let closer = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current file");
        }
        watcher.close();
    });

    let stats = ingest::run(&manager, &mut discoveries).await;
    closer.abort();

    info!(
        committed = stats.committed,
        modified = stats.modified,
        unchanged = stats.unchanged,
        stale = stats.stale,
        failed = stats.failed,
        "cairnd stopped"
    );
    Ok(())
}

// -----------------------------------------------------------------------
// cairnd stats
// -----------------------------------------------------------------------

async fn cmd_stats(config: &CliConfig) -> Result<()> {
    let dir = &config.storage.data_dir;
    if !dir.is_dir() {
        bail!("no store at {}", dir.display());
    }
    let store = FileStore::open(dir, config.storage.hash)
        .await
        .with_context(|| format!("cannot open store at {}", dir.display()))?;

    let files = store.list_files().await?;
    let chunks = store.list_chunks().await?;
    println!("Store: {}", dir.display());
    println!("Files: {}", files.len());
    println!("Chunks: {}", chunks.len());
    for name in &files {
        let revisions = store.list_revisions(name).await?;
        let latest = revisions.last().map(|m| m.length).unwrap_or(0);
        println!(
            "  {name} revisions={} latest_length={latest}",
            revisions.len()
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
