//! Ingestion configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or none at
//! all) is valid. CLI flags are applied on top by the caller.

use crate::data::bitmex::DEFAULT_BASE_URL;
use crate::data::fetcher::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub bundle: BundleSettings,
    pub upstream: UpstreamConfig,
    pub validation: ValidationConfig,
}

/// What to ingest and where to put it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSettings {
    pub symbols: Vec<String>,
    /// First session (inclusive).
    pub start: Option<NaiveDate>,
    /// Last session (inclusive).
    pub end: Option<NaiveDate>,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["XBTUSD".to_string()],
            start: None,
            end: None,
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("bundle"),
        }
    }
}

/// Upstream REST client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Buckets requested per page. The exchange caps this at 500 (later 1000).
    pub page_size: usize,
    pub timeout_secs: u64,
    /// Minimum gap between requests; 0 disables pacing.
    pub min_request_interval_ms: u64,
    /// Retries for transport errors, 429 and 5xx. 0 means fail fast.
    pub max_retries: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: 30,
            min_request_interval_ms: 0,
            max_retries: 0,
        }
    }
}

/// What to do when a series does not have the expected bar count per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageSeverity {
    /// Abort the run.
    #[default]
    Fatal,
    /// Log and continue.
    Warn,
    /// Skip the check.
    Ignore,
}

impl std::str::FromStr for CoverageSeverity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fatal" => Ok(Self::Fatal),
            "warn" => Ok(Self::Warn),
            "ignore" => Ok(Self::Ignore),
            other => Err(ConfigError::Invalid(format!(
                "unknown coverage severity '{other}' (expected fatal, warn or ignore)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub coverage: CoverageSeverity,
}

impl IngestConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols to ingest".into()));
        }
        if self.bundle.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid("empty symbol name".into()));
        }
        if self.upstream.page_size < MIN_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "upstream.page_size must be at least {MIN_PAGE_SIZE}: pages overlap by the provisional bar"
            )));
        }
        if let (Some(start), Some(end)) = (self.bundle.start, self.bundle.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}
