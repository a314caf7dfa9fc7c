//! TOML configuration for the cairn daemon.
//!
//! Every section is optional; command-line flags override file values.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use cairn_engine::ManagerConfig;
use cairn_types::{DEFAULT_CHUNK_SIZE, HashAlgorithm};
use cairn_watch::WatchConfig;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// What to back up.
    pub watch: WatchSection,
    /// Where chunks and metadata go.
    pub storage: StorageSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[watch]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Root of the backup tree. Required, either here or via `--root`.
    pub root: Option<PathBuf>,
    /// Glob patterns (full paths) to leave out.
    pub exclude: Vec<String>,
    /// Follow symlinks during the initial walk.
    pub follow_links: bool,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
    /// Directory for the file backend.
    pub data_dir: PathBuf,
    /// Chunk size in bytes. Defaults to 4096.
    pub chunk_size: Option<u32>,
    /// Chunk digest: `"sha256"` (default) or `"blake3"`.
    pub hash: HashAlgorithm,
    /// Chunk writes in flight per file. Defaults to 1.
    pub write_concurrency: Option<usize>,
}

impl Default for StorageSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".cairn"))
            .unwrap_or_else(|| PathBuf::from(".cairn"));
        Self {
            backend: "file".to_string(),
            data_dir,
            chunk_size: None,
            hash: HashAlgorithm::default(),
            write_concurrency: None,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("cannot read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective chunk size.
    pub fn chunk_size(&self) -> u32 {
        self.storage.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Effective per-file write concurrency.
    pub fn write_concurrency(&self) -> usize {
        self.storage.write_concurrency.unwrap_or(1)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            chunk_size: self.chunk_size(),
            hash: self.storage.hash,
            write_concurrency: self.write_concurrency(),
        }
    }

    /// Watcher settings. Fails when no root has been given.
    pub fn watch_config(&self) -> anyhow::Result<WatchConfig> {
        let Some(root) = &self.watch.root else {
            bail!("--root must be specified");
        };
        Ok(WatchConfig {
            root: root.clone(),
            exclude: self.watch.exclude.clone(),
            follow_links: self.watch.follow_links,
        })
    }
}
