//! Configuration for patch operations

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loaded from `officepatch.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchConfig {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub queries: QueriesConfig,
}

impl PatchConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PatchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Per-operation options derived from this configuration.
    pub fn options(&self) -> PatchOptions {
        PatchOptions {
            backup: self.backup.enabled,
        }
    }
}

/// Backup policy for destructive operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Create a timestamped sibling copy before mutating a document.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Defaults for query extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// Directory query definition files are extracted to when the caller
    /// does not name one.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// Options threaded through every destructive operation.
#[derive(Debug, Clone, Copy)]
pub struct PatchOptions {
    /// Create a backup before mutating the target document.
    pub backup: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self { backup: true }
    }
}

impl PatchOptions {
    pub fn without_backup() -> Self {
        Self { backup: false }
    }
}
