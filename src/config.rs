//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.thesisbuilder.toml` files.

use crate::engine::LatencyRange;
use crate::store::DEFAULT_STORAGE_KEY;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".thesisbuilder.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where reports are kept.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Analysis engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON file under `data_dir`.
    #[default]
    File,
    /// Process memory; nothing survives exit.
    Memory,
}

/// Report storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Directory holding the library file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Key the library is stored under.
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
            key: default_key(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".thesisbuilder")
}

fn default_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// Simulated engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shortest simulated analysis, in milliseconds.
    #[serde(default = "default_min_latency")]
    pub min_latency_ms: u64,

    /// Longest simulated analysis, in milliseconds.
    #[serde(default = "default_max_latency")]
    pub max_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: default_min_latency(),
            max_latency_ms: default_max_latency(),
        }
    }
}

fn default_min_latency() -> u64 {
    5_000
}

fn default_max_latency() -> u64 {
    10_000
}

impl EngineConfig {
    /// Latency range for the mock engine.
    pub fn latency(&self) -> LatencyRange {
        LatencyRange::new(
            Duration::from_millis(self.min_latency_ms),
            Duration::from_millis(self.max_latency_ms),
        )
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.thesisbuilder.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if let Some(min) = args.min_latency_ms {
            self.engine.min_latency_ms = min;
        }
        if let Some(max) = args.max_latency_ms {
            self.engine.max_latency_ms = max;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        if self.engine.min_latency_ms > self.engine.max_latency_ms {
            bail!(
                "engine.min_latency_ms ({}) is greater than engine.max_latency_ms ({})",
                self.engine.min_latency_ms,
                self.engine.max_latency_ms
            );
        }
        if self.storage.key.trim().is_empty() {
            bail!("storage.key must not be empty");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::File);
        assert_eq!(config.storage.data_dir, PathBuf::from(".thesisbuilder"));
        assert_eq!(config.storage.key, "thesisbuilder.research_library");
        assert_eq!(config.engine.latency(), LatencyRange::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[storage]
backend = "memory"
key = "custom"

[engine]
min_latency_ms = 10
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.key, "custom");
        assert_eq!(config.storage.data_dir, PathBuf::from(".thesisbuilder"));
        assert_eq!(config.engine.min_latency_ms, 10);
        assert_eq!(config.engine.max_latency_ms, 10_000);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[storage]\nbackend = \"s3\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.engine.min_latency_ms = 20;
        config.engine.max_latency_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let args = crate::cli::Args::parse_from([
            "thesisbuilder",
            "--data-dir",
            "/tmp/library",
            "--max-latency-ms",
            "200",
            "-v",
            "list",
        ]);

        let mut config = Config::default();
        config.engine.min_latency_ms = 100;
        config.merge_with_args(&args);

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/library"));
        assert_eq!(config.engine.min_latency_ms, 100);
        assert_eq!(config.engine.max_latency_ms, 200);
        assert!(config.general.verbose);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), Config::default_toml()).unwrap();
        let loaded = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded, Some(Config::default()));

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[engine\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("backend = \"file\""));
        assert!(toml_str.contains("[engine]"));
    }
}
