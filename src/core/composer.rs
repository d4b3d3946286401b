//! Final manifest composition
//!
//! Runs library resolution, then turns the folded manifest into a build-ready
//! one: modules fetched, placeholders expanded, path entries resolved to
//! existing files, library sources merged into the app, and the deps manifest
//! and deps-init source generated.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use super::deps_manifest::{deps_init_c_code, DepsManifest};
use super::expr::{Interp, Vars};
use super::manifest::{Manifest, ManifestType};
use super::merge::merge_platforms;
use super::paths::{apply_fs_filters, dedup, prepend_paths, resolve_paths};
use super::provider::{ComponentProvider, LocalComponent};
use super::resolver::{LibraryResolver, ResolveOptions};
use super::swmodule::SwModule;
use crate::config::defaults::{
    BINARY_LIBS_GLOB, DEFAULT_BUILD_DIR, DEFAULT_SOURCE_GLOBS, DEPS_INIT_FILE_NAME,
    DEPS_MANIFEST_FILE_NAME, FS_GLOB, GEN_SUBDIR, MOS_MODULE_LOCATION, MOS_MODULE_NAME,
    SUPPORTED_PLATFORMS,
};
use crate::error::{ManifestError, MosbuildError, ResolverError};
use crate::infra::filesystem;

/// Composition switches
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Globs a source directory expands to
    pub source_globs: Vec<String>,
    /// Build directory, relative to the app directory unless absolute
    pub build_dir: PathBuf,
    /// Write the deps manifest and deps-init source
    pub generate_files: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            source_globs: DEFAULT_SOURCE_GLOBS.iter().map(ToString::to_string).collect(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            generate_files: true,
        }
    }
}

/// Final manifest plus the data the build driver needs around it
#[derive(Debug)]
pub struct ComposeOutput {
    pub manifest: Manifest,
    /// Latest modification time of all manifests read
    pub mtime: SystemTime,
    /// Local directory of the SDK module
    pub mos_dir_effective: PathBuf,
    pub app_source_dirs: Vec<String>,
    pub app_fs_dirs: Vec<String>,
    pub app_bin_lib_dirs: Vec<String>,
    /// Deps manifest, for apps
    pub deps: Option<DepsManifest>,
    /// Libraries the app references directly
    pub app_deps: Vec<String>,
    /// Files written under the gen directory
    pub generated: Vec<PathBuf>,
    /// Interpreter holding the run's globals, module and library paths
    pub interp: Interp,
    /// Number of resolution passes
    pub passes: usize,
    /// Number of conditional folds
    pub folds: usize,
}

impl ComposeOutput {
    /// Variables visible in the final manifest
    pub fn vars(&self) -> Vars {
        self.interp.vars_for(&self.manifest)
    }
}

/// Builds final manifests through a component provider
pub struct ManifestComposer {
    provider: Arc<dyn ComponentProvider>,
    interp: Interp,
}

impl std::fmt::Debug for ManifestComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestComposer").finish_non_exhaustive()
    }
}

fn expand_field(
    interp: &Interp,
    vars: &Vars,
    origin: &str,
    field: &str,
    value: &str,
) -> Result<String, ManifestError> {
    interp
        .expand(value, vars, false)
        .map_err(|source| ManifestError::Expression {
            origin: origin.to_string(),
            field: field.to_string(),
            source,
        })
}

fn expand_list(
    interp: &Interp,
    vars: &Vars,
    origin: &str,
    field: &str,
    items: &[String],
) -> Result<Vec<String>, ManifestError> {
    interp
        .expand_all(items, vars)
        .map_err(|source| ManifestError::Expression {
            origin: origin.to_string(),
            field: field.to_string(),
            source,
        })
}

impl ManifestComposer {
    /// Create a composer
    pub fn new(provider: Arc<dyn ComponentProvider>, interp: Interp) -> Self {
        Self { provider, interp }
    }

    /// Resolve the app and compose its final manifest
    pub async fn read_manifest_final(
        &self,
        resolve: ResolveOptions,
        compose: &ComposeOptions,
    ) -> Result<ComposeOutput, MosbuildError> {
        let resolver = LibraryResolver::new(Arc::clone(&self.provider), self.interp.clone(), resolve);
        let resolution = resolver.resolve().await?;
        let root_dir = resolution.root_dir;
        let mut interp = resolution.interp;
        let mut manifest = resolution.manifest;
        let origin = manifest.origin.clone();

        if manifest.name.is_empty() {
            manifest.name = root_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if manifest.name.chars().any(char::is_whitespace) {
            return Err(ManifestError::NameHasSpaces { name: manifest.name }.into());
        }

        let vars = interp.vars_for(&manifest);
        manifest.name = expand_field(&interp, &vars, &origin, "name", &manifest.name)?;
        manifest.version = expand_field(&interp, &vars, &origin, "version", &manifest.version)?;
        manifest.description = expand_field(&interp, &vars, &origin, "description", &manifest.description)?;

        let (modules, mos_dir_effective) = self.prepare_modules(&mut manifest, &root_dir, &mut interp).await?;

        for lh in &manifest.libs_handled {
            interp.set_global(format!("mos.libs.{}.path", lh.name()), lh.path.clone());
        }
        let vars = interp.vars_for(&manifest);
        let libs_version = manifest.libs_version.clone();
        for lh in &mut manifest.libs_handled {
            let field = format!("{} sources", lh.name());
            lh.sources = expand_list(&interp, &vars, &origin, &field, &lh.sources)?;
            let field = format!("{} binary_libs", lh.name());
            lh.binary_libs = expand_list(&interp, &vars, &origin, &field, &lh.binary_libs)?;
            lh.version = lh.lib.version_or(&libs_version);
        }

        let dir = root_dir.to_string_lossy().into_owned();
        for (field, items) in [
            ("sources", &mut manifest.sources),
            ("includes", &mut manifest.includes),
            ("filesystem", &mut manifest.filesystem),
            ("binary_libs", &mut manifest.binary_libs),
            ("tests", &mut manifest.tests),
        ] {
            *items = prepend_paths(&expand_list(&interp, &vars, &origin, field, items)?, &dir);
        }
        manifest.cflags = expand_list(&interp, &vars, &origin, "cflags", &manifest.cflags)?;
        manifest.cxxflags = expand_list(&interp, &vars, &origin, "cxxflags", &manifest.cxxflags)?;

        let source_globs: Vec<&str> = compose.source_globs.iter().map(String::as_str).collect();
        let sources = resolve_paths(&manifest.sources, &source_globs)?;
        manifest.sources = sources.files;
        let mut app_source_dirs = sources.dirs;

        let fs = resolve_paths(&manifest.filesystem, &[FS_GLOB])?;
        manifest.filesystem = apply_fs_filters(&fs.files, &manifest.fs_filters);
        manifest.fs_filters.clear();
        let app_fs_dirs = fs.dirs;

        let mut deps = None;
        let mut generated_files = Vec::new();
        if manifest.manifest_type() == ManifestType::App {
            for lh in &mut manifest.libs_handled {
                let declared = !lh.sources.is_empty();
                let resolved = resolve_paths(&lh.sources, &source_globs)?;
                lh.binary_libs = resolve_paths(&lh.binary_libs, &[BINARY_LIBS_GLOB])?.files;
                if declared && resolved.files.is_empty() && lh.binary_libs.is_empty() {
                    return Err(ManifestError::LibSourcesMissing {
                        name: lh.name().to_string(),
                    }
                    .into());
                }
                lh.sources = resolved.files;
                manifest.sources.extend(lh.sources.iter().cloned());
                app_source_dirs.extend(resolved.dirs);
            }
            manifest.sources = dedup(std::mem::take(&mut manifest.sources));

            let generated = DepsManifest::generate(&manifest, &modules)?;
            if compose.generate_files {
                let gen_dir = gen_dir(&root_dir, &compose.build_dir);
                let deps_path = gen_dir.join(DEPS_MANIFEST_FILE_NAME);
                generated.write(&deps_path)?;

                let code = deps_init_c_code(&manifest, &generated);
                let init_path = gen_dir.join(DEPS_INIT_FILE_NAME);
                if filesystem::write_file_if_different(&init_path, &code)? {
                    debug!("wrote {}", init_path.display());
                }
                manifest.sources.push(init_path.to_string_lossy().into_owned());
                generated_files.extend([deps_path, init_path]);
            }
            deps = Some(generated);
        }

        let bin_libs = resolve_paths(&manifest.binary_libs, &[BINARY_LIBS_GLOB])?;
        manifest.binary_libs = bin_libs.files;
        manifest.tests = resolve_paths(&manifest.tests, &[FS_GLOB])?.files;

        let supported: Vec<String> = SUPPORTED_PLATFORMS.iter().map(ToString::to_string).collect();
        manifest.platforms = merge_platforms(&manifest.platforms, &supported);
        manifest.platforms.sort();

        info!(
            "composed {:?}: {} libs, {} sources",
            manifest.name,
            manifest.libs_handled.len(),
            manifest.sources.len()
        );

        Ok(ComposeOutput {
            manifest,
            mtime: resolution.mtime,
            mos_dir_effective,
            app_source_dirs: dedup(app_source_dirs),
            app_fs_dirs,
            app_bin_lib_dirs: bin_libs.dirs,
            deps,
            app_deps: resolution.app_deps,
            generated: generated_files,
            interp,
            passes: resolution.passes,
            folds: resolution.folds,
        })
    }

    /// Fetch every module once, later entries first, and expose their paths
    async fn prepare_modules(
        &self,
        manifest: &mut Manifest,
        root_dir: &Path,
        interp: &mut Interp,
    ) -> Result<(Vec<(SwModule, LocalComponent)>, PathBuf), MosbuildError> {
        match manifest.modules.iter_mut().find(|m| m.name == MOS_MODULE_NAME) {
            Some(m) if m.version.is_empty() => m.version.clone_from(&manifest.mongoose_os_version),
            Some(_) => {}
            None => manifest.modules.push(SwModule {
                version: manifest.mongoose_os_version.clone(),
                ..SwModule::named(MOS_MODULE_NAME, MOS_MODULE_LOCATION)
            }),
        }

        let mut handled = Vec::new();
        let mut mos_dir = PathBuf::new();
        for module in manifest.modules.iter().rev() {
            let name = module.name().map_err(|_| ManifestError::NoName {
                origin: manifest.origin.clone(),
            })?;
            if handled.iter().any(|(m, _): &(SwModule, LocalComponent)| m.name == name) {
                continue;
            }
            let component = self
                .provider
                .module_local_path(module, root_dir, &manifest.modules_version, &manifest.platform)
                .await
                .map_err(|source| ResolverError::Fetch {
                    origin: manifest.origin.clone(),
                    name: name.clone(),
                    source,
                })?;
            debug!("module {name:?} at {}", component.path.display());
            interp.set_global(
                format!("mos.modules.{name}.path"),
                component.path.to_string_lossy().into_owned(),
            );
            if name == MOS_MODULE_NAME {
                mos_dir.clone_from(&component.path);
            }
            handled.push((
                SwModule {
                    name,
                    ..module.clone()
                },
                component,
            ));
        }
        Ok((handled, mos_dir))
    }
}

/// Directory for generated files
pub fn gen_dir(root_dir: &Path, build_dir: &Path) -> PathBuf {
    root_dir.join(build_dir).join(GEN_SUBDIR)
}
