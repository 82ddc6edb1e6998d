//! Pipeline configuration.
//!
//! All durable locations the pipeline touches are collected in
//! [`PipelineConfig`] and passed to the orchestrator at construction. An
//! optional TOML file overrides the defaults; a missing file means the
//! built-in data layout.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::waveform::ChannelPolicy;

/// Name of the optional configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "keygram.toml";

/// Durable locations and transform policy for one batch run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// CSV table of not-yet-processed (URL, key-signature) rows.
    pub pending_table_path: PathBuf,
    /// CSV table mapping artifact paths to key-signature labels.
    pub output_table_path: PathBuf,
    /// Directory receiving one spectrogram image per successful entry.
    pub artifact_dir: PathBuf,
    /// Scratch directory for per-entry download and decode files.
    pub transient_dir: PathBuf,
    /// Directory for per-launch log files.
    pub log_dir: PathBuf,
    /// Channel reduction applied before spectrogram extraction.
    pub channel_policy: ChannelPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pending_table_path: PathBuf::from("data/unprocessed-data.csv"),
            output_table_path: PathBuf::from("data/dataset/music-data.csv"),
            artifact_dir: PathBuf::from("data/dataset/spectrograms"),
            transient_dir: PathBuf::from("data/temp_data"),
            log_dir: PathBuf::from("data/logs"),
            channel_policy: ChannelPolicy::First,
        }
    }
}

/// Errors that may occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file could not be parsed as TOML.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

impl PipelineConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
