//! Platform-specific directory management
//!
//! Provides the config and data directories. Follows the XDG Base Directory
//! Specification on Linux and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `MOSBUILD_CONFIG_DIR` - Override config directory
//! - `MOSBUILD_DATA_DIR` - Override data directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "MOSBUILD_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "MOSBUILD_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "mosbuild";

/// Directory holding fetched libraries and modules
const DEPS_SUBDIR: &str = "deps";

/// Platform-specific directory provider for mosbuild
#[derive(Debug, Clone)]
pub struct MosbuildDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl MosbuildDirs {
    /// Create a new `MosbuildDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/mosbuild` or `~/.config/mosbuild`
    /// - macOS: `~/Library/Application Support/mosbuild`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Get the data directory path
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default directory searched for libraries and modules by name
    #[must_use]
    pub fn deps_dir(&self) -> PathBuf {
        self.data_dir.join(DEPS_SUBDIR)
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for MosbuildDirs {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        return PathBuf::from(path);
    }
    platform().map(|p| p.join(APP_NAME)).unwrap_or_else(|| {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.extend(home_fallback);
        path.join(APP_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = MosbuildDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.data_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_deps_dir_is_under_data_dir() {
        let dirs = MosbuildDirs::new();
        assert!(dirs.deps_dir().starts_with(dirs.data_dir()));
    }

    #[test]
    fn test_global_config_path_is_under_config_dir() {
        let dirs = MosbuildDirs::new();
        assert!(dirs.global_config_path().starts_with(dirs.config_dir()));
        assert!(dirs.global_config_path().ends_with("config.toml"));
    }
}
