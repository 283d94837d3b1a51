//! Configuration loading for the partition-index layer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/pindex/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PIndexError;

/// Defaults for the full-text backend; index params can override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTextSettings {
    /// Memory budget for the Tantivy writer (MB)
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Commit after this many pending mutations even inside a snapshot
    #[serde(default = "default_batch_max_ops")]
    pub batch_max_ops: usize,
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_batch_max_ops() -> usize {
    100
}

impl Default for FullTextSettings {
    fn default() -> Self {
        Self {
            writer_memory_mb: default_writer_memory_mb(),
            batch_max_ops: default_batch_max_ops(),
        }
    }
}

impl FullTextSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        // Tantivy refuses writer budgets below 15MB
        if self.writer_memory_mb < 15 {
            return Err(format!(
                "writer_memory_mb must be >= 15, got {}",
                self.writer_memory_mb
            ));
        }
        if self.batch_max_ops == 0 {
            return Err("batch_max_ops must be > 0".to_string());
        }
        Ok(())
    }
}

/// Defaults for the key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvSettings {
    /// Keep an undo history so rollback is exact
    #[serde(default = "default_history")]
    pub history: bool,

    /// Undo records kept per partition; older ones are dropped and a
    /// rollback behind them clears the partition
    #[serde(default = "default_history_retain_ops")]
    pub history_retain_ops: u64,
}

fn default_history() -> bool {
    true
}

fn default_history_retain_ops() -> u64 {
    10_000
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            history: default_history(),
            history_retain_ops: default_history_retain_ops(),
        }
    }
}

impl KvSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.history_retain_ops == 0 {
            return Err("history_retain_ops must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding one `<name>.pindex` directory per partition index
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub fulltext: FullTextSettings,

    #[serde(default)]
    pub kv: KvSettings,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "pindex")
        .map(|p| p.data_local_dir().join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            fulltext: FullTextSettings::default(),
            kv: KvSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/pindex/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (PINDEX_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, PIndexError> {
        let config_dir = ProjectDirs::from("", "", "pindex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .set_default(
                "fulltext.writer_memory_mb",
                default_writer_memory_mb() as i64,
            )
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .set_default("fulltext.batch_max_ops", default_batch_max_ops() as i64)
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .set_default("kv.history", default_history())
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .set_default(
                "kv.history_retain_ops",
                default_history_retain_ops() as i64,
            )
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PINDEX_DATA_DIR, PINDEX_LOG_LEVEL, PINDEX_FULLTEXT__BATCH_MAX_OPS, ...
        builder = builder.add_source(
            Environment::with_prefix("PINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| PIndexError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PIndexError::Config(e.to_string()))?;

        settings.fulltext.validate().map_err(PIndexError::Config)?;
        settings.kv.validate().map_err(PIndexError::Config)?;
        Ok(settings)
    }

    /// Expand ~ in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}
