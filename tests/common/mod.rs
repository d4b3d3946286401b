//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use mosbuild::core::composer::{ComposeOptions, ComposeOutput, ManifestComposer};
use mosbuild::core::expr::Interp;
use mosbuild::core::provider::{ComponentProvider, LocalComponent};
use mosbuild::core::resolver::ResolveOptions;
use mosbuild::core::swmodule::SwModule;
use mosbuild::error::{ComponentError, MosbuildError};
use mosbuild::infra::components::LocalComponentProvider;

/// Test project context
///
/// Creates a temporary directory holding an app, its libraries and modules.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Directory of the app
    pub fn app_dir(&self) -> PathBuf {
        self.dir.path().join("app")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Create `libs/<name>` with a manifest and one source file
    pub fn create_lib(&self, name: &str, extra: &str) {
        self.create_file(
            &format!("libs/{name}/mos.yml"),
            &format!(
                "manifest_version: 2017-09-29\n\
                 type: lib\n\
                 description: {name}\n\
                 version: 1.0\n\
                 sources:\n  - src\n\
                 {extra}"
            ),
        );
        self.create_file(&format!("libs/{name}/src/{name}.c"), "int x;\n");
    }

    /// Create the app manifest
    pub fn create_app(&self, body: &str) {
        self.create_file("app/mos.yml", &format!("manifest_version: 2017-09-29\n{body}"));
        self.create_file("app/src/main.c", "int main(void) { return 0; }\n");
    }

    /// Standard layout: app -> mylib1, mylib2, mylib3; mylib2 and mylib3 -> mylib4
    pub fn with_standard_libs() -> Self {
        let project = Self::new();
        project.create_app(
            "name: app\n\
             sources:\n  - src\n\
             build_vars:\n  APP_VAR: app\n\
             libs:\n  \
               - location: ../libs/mylib1\n  \
               - location: ../libs/mylib2\n  \
               - location: ../libs/mylib3\n",
        );
        project.create_lib("core", "no_implicit_init_deps: true\n");
        project.create_lib("mylib1", "");
        project.create_lib("mylib2", "libs:\n  - location: ../libs/mylib4\n");
        project.create_lib(
            "mylib3",
            "build_vars:\n  VAR1: \"${build_vars.VAR1} lib3_var1\"\n\
             libs:\n  - location: ../libs/mylib4\n",
        );
        project.create_lib("mylib4", "build_vars:\n  VAR1: lib4_var1\n");
        project.create_file("modules/mongoose-os/mos.yml", "manifest_version: 2017-09-29\n");
        project
    }

    /// Provider searching `libs/` and `modules/` of the project
    pub fn provider(&self) -> LocalComponentProvider {
        LocalComponentProvider::new()
            .with_libs_dir(self.dir.path().join("libs"))
            .with_modules_dir(self.dir.path().join("modules"))
    }

    /// Resolve options for the app
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            app_dir: self.app_dir(),
            parallel: 4,
            ..ResolveOptions::default()
        }
    }

    /// Compose the app with the local provider
    pub async fn compose(&self) -> Result<ComposeOutput, MosbuildError> {
        compose_with(Arc::new(self.provider()), self.resolve_options()).await
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose with a given provider, writing generated files
pub async fn compose_with(
    provider: Arc<dyn ComponentProvider>,
    options: ResolveOptions,
) -> Result<ComposeOutput, MosbuildError> {
    ManifestComposer::new(provider, Interp::default())
        .read_manifest_final(options, &ComposeOptions::default())
        .await
}

/// Names of resolved libraries in build order
pub fn lib_names(out: &ComposeOutput) -> Vec<String> {
    out.manifest
        .libs_handled
        .iter()
        .map(|lh| lh.name().to_string())
        .collect()
}

/// Provider wrapper recording every lib fetch and rejecting pinned versions
pub struct RecordingProvider {
    inner: LocalComponentProvider,
    pub lib_fetches: Mutex<Vec<(String, String)>>,
    /// Versions other than this one fail
    pub only_version: Option<String>,
}

impl RecordingProvider {
    pub fn new(inner: LocalComponentProvider) -> Self {
        Self {
            inner,
            lib_fetches: Mutex::new(Vec::new()),
            only_version: None,
        }
    }

    pub fn fetches(&self) -> Vec<(String, String)> {
        self.lib_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComponentProvider for RecordingProvider {
    async fn lib_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        platform: &str,
    ) -> Result<LocalComponent, ComponentError> {
        let version = module.version_or(default_version);
        self.lib_fetches
            .lock()
            .unwrap()
            .push((module.name().unwrap_or_default(), version.clone()));
        if let Some(only) = &self.only_version {
            if &version != only {
                return Err(ComponentError::NotFound {
                    name: module.name().unwrap_or_default(),
                    location: module.location.clone(),
                    searched: Vec::new(),
                });
            }
        }
        self.inner
            .lib_local_path(module, root_app_dir, default_version, platform)
            .await
    }

    async fn module_local_path(
        &self,
        module: &SwModule,
        root_app_dir: &Path,
        default_version: &str,
        platform: &str,
    ) -> Result<LocalComponent, ComponentError> {
        self.inner
            .module_local_path(module, root_app_dir, default_version, platform)
            .await
    }
}
