//! TOML configuration for the nzbfs CLI.
//!
//! Configuration is stored at `~/.config/nzbfs/config.toml` (XDG standard
//! on Linux). A missing file is not an error: [`Config::load`] falls back
//! to [`Config::default`], matching the defaults a fresh install should
//! behave with.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! max_download_workers = 8
//! streaming_chunk_size = 8388608
//! max_range_size = 33554432
//! seek_threshold = 1048576
//! sample_percentage = 10
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default `max_download_workers`: within spec's 5-20 recommendation.
pub const DEFAULT_MAX_DOWNLOAD_WORKERS: usize = 8;
/// Default streaming window size: 8 MiB.
pub const DEFAULT_STREAMING_CHUNK_SIZE: i64 = 8 * 1024 * 1024;
/// Default bounded-range cap: 32 MiB.
pub const DEFAULT_MAX_RANGE_SIZE: i64 = 32 * 1024 * 1024;
/// Default forced-discard seek threshold: 1 MiB.
pub const DEFAULT_SEEK_THRESHOLD: i64 = 1024 * 1024;
/// Default import-time availability sample percentage.
pub const DEFAULT_SAMPLE_PERCENTAGE: u8 = 10;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_max_download_workers")]
    pub max_download_workers: usize,

    #[serde(default = "default_streaming_chunk_size")]
    pub streaming_chunk_size: i64,

    #[serde(default = "default_max_range_size")]
    pub max_range_size: i64,

    #[serde(default = "default_seek_threshold")]
    pub seek_threshold: i64,

    #[serde(default = "default_sample_percentage")]
    pub sample_percentage: u8,

    /// Root directory the demo transport reads article bodies from. A
    /// stand-in for a real NNTP connection pool, which this workspace
    /// doesn't implement.
    pub articles_dir: Option<PathBuf>,

    /// Path to the JSON-backed metadata catalog file.
    pub catalog_path: Option<PathBuf>,
}

fn default_max_download_workers() -> usize {
    DEFAULT_MAX_DOWNLOAD_WORKERS
}
fn default_streaming_chunk_size() -> i64 {
    DEFAULT_STREAMING_CHUNK_SIZE
}
fn default_max_range_size() -> i64 {
    DEFAULT_MAX_RANGE_SIZE
}
fn default_seek_threshold() -> i64 {
    DEFAULT_SEEK_THRESHOLD
}
fn default_sample_percentage() -> u8 {
    DEFAULT_SAMPLE_PERCENTAGE
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_download_workers: DEFAULT_MAX_DOWNLOAD_WORKERS,
            streaming_chunk_size: DEFAULT_STREAMING_CHUNK_SIZE,
            max_range_size: DEFAULT_MAX_RANGE_SIZE,
            seek_threshold: DEFAULT_SEEK_THRESHOLD,
            sample_percentage: DEFAULT_SAMPLE_PERCENTAGE,
            articles_dir: None,
            catalog_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default path, or return the default
    /// config if the file doesn't exist.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let path = match path {
            Some(p) => p.clone(),
            None => config_path()?,
        };

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// Path to the configuration file: `~/.config/nzbfs/config.toml` on
/// Linux, the corresponding XDG-style directory elsewhere.
pub fn config_path() -> Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    Ok(base_dirs.config_dir().join("nzbfs").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_carries_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.defaults.max_download_workers, 8);
        assert_eq!(config.defaults.streaming_chunk_size, 8 * 1024 * 1024);
        assert_eq!(config.defaults.max_range_size, 32 * 1024 * 1024);
        assert_eq!(config.defaults.seek_threshold, 1024 * 1024);
        assert_eq!(config.defaults.sample_percentage, 10);
    }

    #[test]
    fn parses_partial_toml_with_defaults_filled_in() {
        let toml = r#"
            [defaults]
            max_download_workers = 16
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.max_download_workers, 16);
        assert_eq!(config.defaults.streaming_chunk_size, 8 * 1024 * 1024);
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let config = Config::load(Some(&missing)).unwrap();
        assert_eq!(config.defaults.max_download_workers, 8);
    }

    #[test]
    fn load_reads_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults]\nsample_percentage = 50\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.defaults.sample_percentage, 50);
    }
}
