//! Pipeline configuration, loaded from an optional `cardwatch.toml`.
//!
//! Every section has defaults, so a missing file or a partial file is fine.
//! Command-line flags override individual values after loading. Credentials
//! never live here; they are read from the environment at run time.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cards taken from the active pool each run.
    pub active_quota: usize,
    /// Cards per run across both pools.
    pub total_quota: usize,
    /// Added to the calendar day index. Lets a test or replay shift the rotation.
    pub day_offset: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_quota: 8,
            total_quota: 10,
            day_offset: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    /// Evidence items kept per card.
    pub max_results: usize,
    /// Pause between consecutive card lookups.
    pub delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.search.brave.com/res/v1/web/search".to_string(),
            max_results: 5,
            delay_ms: 1100,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposerConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 8192,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one YAML file per card.
    pub data_dir: PathBuf,
    /// Markdown report written when a run changes anything.
    pub report_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/cards"),
            report_path: PathBuf::from("card-update-report.md"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schedule: ScheduleConfig,
    pub search: SearchConfig,
    pub proposer: ProposerConfig,
    pub paths: PathsConfig,
}

impl PipelineConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.total_quota == 0 {
            return Err(ConfigError::Invalid(
                "schedule.total_quota must be at least 1".into(),
            ));
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid(
                "search.max_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
