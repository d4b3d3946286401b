//! Local component provider
//!
//! Finds libraries and modules on disk: explicit per-name overrides first, then
//! local locations, then search directories laid out as `<dir>/<name>` or
//! `<dir>/<repo>/<path-in-repo>`. Remote references that are not present
//! locally cannot be fetched. Lookups touch the disk and run on the blocking pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::core::paths::clean_path;
use crate::core::provider::{ComponentProvider, LocalComponent};
use crate::core::swmodule::{parse_git_location, ModuleType, SwModule};
use crate::error::ComponentError;

/// Provider backed by directories on the local filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalComponentProvider {
    overrides: HashMap<String, PathBuf>,
    libs_dirs: Vec<PathBuf>,
    modules_dirs: Vec<PathBuf>,
}

impl LocalComponentProvider {
    /// Create a provider with no search directories
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` for the component called `name`
    #[must_use]
    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), path.into());
        self
    }

    /// Search `dir` for libraries
    #[must_use]
    pub fn with_libs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.libs_dirs.push(dir.into());
        self
    }

    /// Search `dir` for modules
    #[must_use]
    pub fn with_modules_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.modules_dirs.push(dir.into());
        self
    }

    fn locate(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        search_dirs: &[PathBuf],
        default_version: &str,
    ) -> Result<LocalComponent, ComponentError> {
        let name = module.name().unwrap_or_default();
        // Search directories hold renamed libraries under their original name
        let dir_name = module.unrenamed_name().unwrap_or_default();
        let mut searched = Vec::new();

        if let Some(path) = self.overrides.get(&name) {
            let path = absolute(root_app_dir, path);
            if path.is_dir() {
                return Ok(inspect(&path));
            }
            searched.push(path);
        }

        let kind = module.module_type();
        if kind == ModuleType::Local && !module.location.is_empty() {
            let path = absolute(root_app_dir, Path::new(&module.location));
            if path.is_dir() {
                return Ok(inspect(&path));
            }
            searched.push(path);
        }

        let git = parse_git_location(&module.location).filter(|_| kind == ModuleType::Git);
        for dir in search_dirs {
            let dir = absolute(root_app_dir, dir);
            let mut candidates = Vec::with_capacity(2);
            if let Some(git) = &git {
                candidates.push(dir.join(&git.repo_name).join(&git.path_within_repo));
            }
            candidates.push(dir.join(&dir_name));
            for candidate in candidates {
                let candidate = clean_path(&candidate);
                if candidate.is_dir() {
                    return Ok(inspect(&candidate));
                }
                searched.push(candidate);
            }
        }

        if kind == ModuleType::Git {
            return Err(ComponentError::RemoteUnsupported {
                kind: kind.to_string(),
                location: module.location.clone(),
                version: module.git_revision(default_version),
            });
        }
        Err(ComponentError::NotFound {
            name,
            location: module.location.clone(),
            searched,
        })
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(&root.join(path))
    }
}

/// Describe a component directory, reading its git head and worktree state
/// if it is a checkout
fn inspect(path: &Path) -> LocalComponent {
    let (repo_version, dirty) = match gix::open(path) {
        Ok(repo) => {
            let head = repo.head_id().map(|id| id.to_string()).unwrap_or_default();
            let dirty = repo.is_dirty().unwrap_or_else(|e| {
                warn!("cannot read worktree status of {}: {e}", path.display());
                false
            });
            (head, dirty)
        }
        Err(_) => (String::new(), false),
    };
    LocalComponent {
        path: path.to_path_buf(),
        repo_version,
        dirty,
    }
}

/// Run a lookup on the blocking pool
async fn locate_blocking<F>(provider: &LocalComponentProvider, lookup: F) -> Result<LocalComponent, ComponentError>
where
    F: FnOnce(&LocalComponentProvider) -> Result<LocalComponent, ComponentError> + Send + 'static,
{
    tokio::task::spawn_blocking({
        let provider = provider.clone();
        move || lookup(&provider)
    })
    .await
    .map_err(|e| ComponentError::TaskFailed { error: e.to_string() })?
}

#[async_trait]
impl ComponentProvider for LocalComponentProvider {
    async fn lib_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        _platform: &str,
    ) -> Result<LocalComponent, ComponentError> {
        let (module, root, version) = (module.clone(), root_app_dir.to_path_buf(), default_version.to_string());
        locate_blocking(self, move |p| p.locate(&module, &root, &p.libs_dirs, &version)).await
    }

    async fn module_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        _platform: &str,
    ) -> Result<LocalComponent, ComponentError> {
        let (module, root, version) = (module.clone(), root_app_dir.to_path_buf(), default_version.to_string());
        locate_blocking(self, move |p| p.locate(&module, &root, &p.modules_dirs, &version)).await
    }
}
