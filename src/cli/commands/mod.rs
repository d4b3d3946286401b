//! CLI command implementations
//!
//! Each command is implemented in its own submodule. All of them resolve the
//! app first; the shared flags for that live in [`ResolveArgs`].

pub mod deps;
pub mod eval;
pub mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::debug;

use crate::cli::output::{create_spinner, is_json, is_quiet};
use crate::core::composer::{ComposeOptions, ComposeOutput, ManifestComposer};
use crate::core::expr::Interp;
use crate::core::global_config::GlobalConfig;
use crate::core::manifest::ManifestAdjustments;
use crate::core::reader::MOS_VERSION_VAR;
use crate::core::resolver::ResolveOptions;
use crate::core::swmodule::SwModule;
use crate::infra::components::LocalComponentProvider;
use crate::infra::dirs::MosbuildDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the app and print its final manifest
    Manifest {
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Show library build and init order
    Deps {
        /// Render the dependency graph as a tree
        #[arg(long)]
        tree: bool,

        /// Write the deps manifest and deps-init source
        #[arg(long)]
        write: bool,

        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// Evaluate an expression against the final manifest's variables
    Eval {
        /// Expression, e.g. `build_vars.MGOS == "1"`
        expr: String,

        #[command(flatten)]
        resolve: ResolveArgs,
    },
}

/// Flags that adjust resolution
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Target platform, overrides the manifest's
    #[arg(long)]
    pub platform: Option<String>,

    /// Set a build variable (KEY=VALUE)
    #[arg(long = "build-var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub build_vars: Vec<(String, String)>,

    /// Set a C define (KEY=VALUE)
    #[arg(long = "cdef", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub cdefs: Vec<(String, String)>,

    /// Use a local directory for a library (NAME:PATH)
    #[arg(long = "lib", value_name = "NAME:PATH", value_parser = parse_lib_override)]
    pub libs: Vec<(String, PathBuf)>,

    /// Search a directory for libraries by name
    #[arg(long = "libs-dir", value_name = "DIR")]
    pub libs_dirs: Vec<PathBuf>,

    /// Add a library to the app if it does not reference it already
    #[arg(long = "extra-lib", value_name = "LOCATION")]
    pub extra_libs: Vec<String>,

    /// Do not write generated files
    #[arg(long)]
    pub no_generate: bool,
}

impl ResolveArgs {
    fn adjustments(&self) -> ManifestAdjustments {
        ManifestAdjustments {
            platform: self.platform.clone().unwrap_or_default(),
            build_vars: self.build_vars.iter().cloned().collect(),
            cdefs: self.cdefs.iter().cloned().collect(),
            extra_libs: self.extra_libs.iter().map(SwModule::new).collect(),
            ..ManifestAdjustments::default()
        }
    }
}

/// Parse `KEY=VALUE`
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

/// Parse `NAME:PATH`
fn parse_lib_override(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once(':') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME:PATH, got {s:?}")),
    }
}

fn cwd_relative(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path {}", path.display()))
}

/// Resolve and compose the app in `dir`
pub(crate) async fn compose(dir: &Path, args: &ResolveArgs, generate: bool) -> Result<ComposeOutput> {
    let dirs = MosbuildDirs::new();
    let config = GlobalConfig::load(&dirs).context("Failed to load configuration")?;
    let deps_dir = config.deps_dir(&dirs);

    // Paths given on the command line are relative to the working directory
    let mut provider = LocalComponentProvider::new();
    for (name, path) in &args.libs {
        provider = provider.with_override(name.clone(), cwd_relative(path)?);
    }
    for libs_dir in &args.libs_dirs {
        provider = provider.with_libs_dir(cwd_relative(libs_dir)?);
    }
    for libs_dir in &config.resolve.libs_dirs {
        provider = provider.with_libs_dir(libs_dir.clone());
    }
    provider = provider
        .with_libs_dir(deps_dir.clone())
        .with_modules_dir(deps_dir);

    let mut interp = Interp::default();
    interp.set_global(MOS_VERSION_VAR, config.mos_version());

    let resolve = ResolveOptions {
        app_dir: dir.to_path_buf(),
        adjustments: args.adjustments(),
        parallel: config.parallel(),
        ..ResolveOptions::default()
    };
    let compose = ComposeOptions {
        source_globs: config.source_globs(),
        build_dir: config.build_dir(),
        generate_files: generate && !args.no_generate,
    };
    debug!("resolving {} with {:?}", dir.display(), compose);

    let spinner = (!is_quiet() && !is_json()).then(|| create_spinner("Resolving libraries..."));
    let composer = ManifestComposer::new(Arc::new(provider), interp);
    let result = composer.read_manifest_final(resolve, &compose).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    result.with_context(|| format!("Failed to resolve app in {}", dir.display()))
}

impl Commands {
    /// Execute the command against the app in `dir`
    pub async fn run(self, dir: &Path) -> Result<()> {
        match self {
            Self::Manifest { resolve } => manifest::execute(dir, &resolve).await,
            Self::Deps { tree, write, resolve } => deps::execute(dir, &resolve, tree, write).await,
            Self::Eval { expr, resolve } => eval::execute(dir, &resolve, &expr).await,
        }
    }
}
