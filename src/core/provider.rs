//! Component provider interface
//!
//! Maps a library or module reference to a readable local directory. All
//! fetching (VCS, HTTP, caches) lives behind this trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::swmodule::SwModule;
use crate::error::ComponentError;

/// A component available on the local filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalComponent {
    /// Directory holding the component's `mos.yml`
    pub path: PathBuf,
    /// Revision the directory was checked out at, empty if unknown
    pub repo_version: String,
    /// Whether the checkout has local modifications
    pub dirty: bool,
}

impl LocalComponent {
    /// Component at `path` with no revision information
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Resolves references to local directories
#[async_trait]
pub trait ComponentProvider: Send + Sync {
    /// Local directory of a library
    async fn lib_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        platform: &str,
    ) -> Result<LocalComponent, ComponentError>;

    /// Local directory of a module
    async fn module_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        platform: &str,
    ) -> Result<LocalComponent, ComponentError>;
}
