//! Global configuration management
//!
//! Reads and manages global settings from `config.toml` in the config directory.
//! Global settings include the package index and toolchain distribution URLs
//! and download parallelism.
//!
//! Precedence for URLs: descriptor value, then `MILENV_INDEX_URL` /
//! `MILENV_DIST_URL`, then this file, then the built-in default.

use crate::config::{defaults, urls};
use crate::infra::dirs::MilenvDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding the package index URL
pub const ENV_INDEX_URL: &str = "MILENV_INDEX_URL";

/// Environment variable overriding the toolchain distribution URL
pub const ENV_DIST_URL: &str = "MILENV_DIST_URL";

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration for milenv
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Package index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Toolchain distribution settings
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Download settings
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Package index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Custom package index URL
    pub url: Option<String>,
}

/// Toolchain distribution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Custom distribution server URL
    pub dist_url: Option<String>,
}

/// Download configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent artifact downloads
    pub parallel: Option<usize>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// If the config file exists but is invalid, returns an error.
    pub fn load(dirs: &MilenvDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Get the effective package index URL
    #[must_use]
    pub fn index_url(&self, descriptor_url: Option<&str>) -> String {
        pick_url(
            descriptor_url,
            ENV_INDEX_URL,
            self.index.url.as_deref(),
            urls::PACKAGE_INDEX,
        )
    }

    /// Get the effective toolchain distribution URL
    #[must_use]
    pub fn dist_url(&self, descriptor_url: Option<&str>) -> String {
        pick_url(
            descriptor_url,
            ENV_DIST_URL,
            self.toolchain.dist_url.as_deref(),
            urls::TOOLCHAIN_DIST,
        )
    }

    /// Get the effective download parallelism (never zero)
    #[must_use]
    pub fn parallel_downloads(&self) -> usize {
        self.download
            .parallel
            .unwrap_or(defaults::DEFAULT_PARALLEL_DOWNLOADS)
            .max(1)
    }
}

fn pick_url(descriptor: Option<&str>, var: &str, configured: Option<&str>, default: &str) -> String {
    if let Some(url) = descriptor {
        return url.to_string();
    }
    if let Ok(url) = std::env::var(var) {
        if !url.is_empty() {
            return url;
        }
    }
    configured.unwrap_or(default).to_string()
}
