//! Global configuration management
//!
//! Reads settings from `config.toml` in the config directory. A missing file
//! yields the defaults; command-line flags override whatever is loaded here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::defaults::{DEFAULT_BUILD_DIR, DEFAULT_SOURCE_GLOBS, LATEST_VERSION};
use crate::error::ConfigError;
use crate::infra::dirs::MosbuildDirs;

/// Global configuration for mosbuild
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GlobalConfig {
    /// Resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Build layout settings
    #[serde(default)]
    pub build: BuildConfig,
}

/// Resolution settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResolveConfig {
    /// Maximum number of concurrent library fetches
    pub parallel: Option<usize>,

    /// Value of `mos.version`, the default for `libs_version` and friends
    pub mos_version: Option<String>,

    /// Extra directories searched for libraries by name
    #[serde(default)]
    pub libs_dirs: Vec<PathBuf>,

    /// Directory holding fetched libraries and modules
    pub deps_dir: Option<PathBuf>,
}

/// Build layout settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildConfig {
    /// Globs a source directory expands to
    pub source_globs: Option<Vec<String>>,

    /// Build directory relative to the app
    pub build_dir: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the config file exists but
    /// contains invalid TOML.
    pub fn load(dirs: &MosbuildDirs) -> Result<Self, ConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Effective fetch parallelism, at least 1
    #[must_use]
    pub fn parallel(&self) -> usize {
        self.resolve.parallel.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Effective `mos.version`
    #[must_use]
    pub fn mos_version(&self) -> &str {
        self.resolve.mos_version.as_deref().unwrap_or(LATEST_VERSION)
    }

    /// Effective deps directory
    #[must_use]
    pub fn deps_dir(&self, dirs: &MosbuildDirs) -> PathBuf {
        self.resolve.deps_dir.clone().unwrap_or_else(|| dirs.deps_dir())
    }

    /// Effective source globs
    #[must_use]
    pub fn source_globs(&self) -> Vec<String> {
        self.build.source_globs.clone().unwrap_or_else(|| {
            DEFAULT_SOURCE_GLOBS.iter().map(ToString::to_string).collect()
        })
    }

    /// Effective build directory
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.build
            .build_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.mos_version(), "latest");
        assert_eq!(config.source_globs(), vec!["*.c", "*.cpp"]);
        assert_eq!(config.build_dir(), PathBuf::from("build"));
        assert!(config.parallel() >= 1);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = GlobalConfig::load_from_path(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_load_valid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = r#"
[resolve]
parallel = 0
mos_version = "2.20.0"
libs_dirs = ["/opt/mos/libs"]

[build]
source_globs = ["*.c"]
"#;
        fs::write(&config_path, content).unwrap();

        let config = GlobalConfig::load_from_path(&config_path).unwrap();
        assert_eq!(config.parallel(), 1);
        assert_eq!(config.mos_version(), "2.20.0");
        assert_eq!(config.resolve.libs_dirs, vec![PathBuf::from("/opt/mos/libs")]);
        assert_eq!(config.source_globs(), vec!["*.c"]);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = GlobalConfig::load_from_path(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
