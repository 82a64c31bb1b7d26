//! Platform-specific directory management
//!
//! Provides platform-specific paths for cache, config, and data directories.
//! Follows XDG Base Directory Specification on Linux and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `MILENV_CACHE_DIR` - Override cache directory
//! - `MILENV_CONFIG_DIR` - Override config directory
//! - `MILENV_DATA_DIR` - Override data directory (holds the artifact store)

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "MILENV_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "MILENV_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "MILENV_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "milenv";

/// Subdirectory names
const STORE_SUBDIR: &str = "store";
const DOWNLOADS_SUBDIR: &str = "downloads";

/// Platform-specific directory provider for milenv
#[derive(Debug, Clone)]
pub struct MilenvDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl MilenvDirs {
    /// Create a new `MilenvDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: resolve(ENV_CACHE_DIR, dirs::cache_dir, &[".cache"]),
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Directories rooted at an explicit base
    #[must_use]
    pub fn rooted(base: &std::path::Path) -> Self {
        Self {
            cache_dir: base.join("cache"),
            config_dir: base.join("config"),
            data_dir: base.join("data"),
        }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/milenv` or `~/.cache/milenv`
    /// - macOS: `~/Library/Caches/milenv`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Get the config directory path
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Get the data directory path
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Content-addressed artifact store
    ///
    /// Lives under the data directory because entries are referenced by
    /// activated shells and must not be evicted like cache files.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(STORE_SUBDIR)
    }

    /// Scratch space for in-flight downloads
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join(DOWNLOADS_SUBDIR)
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for MilenvDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a directory from its override variable, the platform default,
/// or a path below the home directory
fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        return PathBuf::from(path);
    }

    platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_fallback
            .iter()
            .fold(base, |acc, part| acc.join(part))
            .join(APP_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = MilenvDirs::new();
        assert!(!dirs.cache_dir().as_os_str().is_empty());
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.data_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_store_dir_is_under_data_dir() {
        let dirs = MilenvDirs::new();
        assert!(dirs.store_dir().starts_with(dirs.data_dir()));
    }

    #[test]
    fn test_downloads_dir_is_under_cache_dir() {
        let dirs = MilenvDirs::new();
        assert!(dirs.downloads_dir().starts_with(dirs.cache_dir()));
    }

    #[test]
    fn test_global_config_path_is_under_config_dir() {
        let dirs = MilenvDirs::new();
        assert!(dirs.global_config_path().starts_with(dirs.config_dir()));
        assert!(dirs.global_config_path().ends_with("config.toml"));
    }

    #[test]
    fn test_rooted_dirs() {
        let base = std::path::Path::new("/tmp/milenv-test");
        let dirs = MilenvDirs::rooted(base);
        assert_eq!(dirs.store_dir(), base.join("data").join("store"));
        assert_eq!(dirs.global_config_path(), base.join("config").join("config.toml"));
    }
}
