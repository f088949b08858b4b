//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` is optional and falls back to the delays
//! used by the demo UI (3 s / 3 s for document processing, 5 s for index
//! sync, 2 s simulated query latency).
//!
//! ```toml
//! [db]
//! path = "./data/kb.sqlite"
//!
//! [timing]
//! pending_ms = 3000
//! processing_ms = 3000
//! sync_ms = 5000
//!
//! [query]
//! latency_ms = 2000
//!
//! [upload]
//! accept_extensions = ["pdf"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shared_kb_core::DocumentStatus;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Delays between deferred lifecycle transitions, in milliseconds.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Pending → Processing.
    #[serde(default = "default_pending_ms")]
    pub pending_ms: u64,
    /// Processing → Completed.
    #[serde(default = "default_processing_ms")]
    pub processing_ms: u64,
    /// Syncing → Completed.
    #[serde(default = "default_sync_ms")]
    pub sync_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pending_ms: default_pending_ms(),
            processing_ms: default_processing_ms(),
            sync_ms: default_sync_ms(),
        }
    }
}

fn default_pending_ms() -> u64 {
    3000
}
fn default_processing_ms() -> u64 {
    3000
}
fn default_sync_ms() -> u64 {
    5000
}

impl TimingConfig {
    /// How long a document stays in `status` before advancing.
    ///
    /// `None` for `Completed`, which never advances.
    pub fn document_delay(&self, status: DocumentStatus) -> Option<Duration> {
        match status {
            DocumentStatus::Pending => Some(Duration::from_millis(self.pending_ms)),
            DocumentStatus::Processing => Some(Duration::from_millis(self.processing_ms)),
            DocumentStatus::Completed => None,
        }
    }

    pub fn sync_delay(&self) -> Duration {
        Duration::from_millis(self.sync_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
        }
    }
}

fn default_latency_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// File extensions accepted by `kb doc upload`, without the dot.
    #[serde(default = "default_accept_extensions")]
    pub accept_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            accept_extensions: default_accept_extensions(),
        }
    }
}

fn default_accept_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

impl UploadConfig {
    /// Case-insensitive extension check. An empty list accepts everything.
    pub fn accepts(&self, path: &Path) -> bool {
        if self.accept_extensions.is_empty() {
            return true;
        }
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => return false,
        };
        self.accept_extensions
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

impl Config {
    /// All-defaults configuration backed by `./data/kb.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/kb.sqlite"),
            },
            timing: TimingConfig::default(),
            query: QueryConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    let timing = &config.timing;
    if timing.pending_ms == 0 || timing.processing_ms == 0 || timing.sync_ms == 0 {
        anyhow::bail!("timing delays must be > 0");
    }

    if config
        .upload
        .accept_extensions
        .iter()
        .any(|e| e.trim_start_matches('.').is_empty())
    {
        anyhow::bail!("upload.accept_extensions must not contain empty entries");
    }

    Ok(())
}
