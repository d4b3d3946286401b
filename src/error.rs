//! Error types for mosbuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest loading and validation errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file could not be read
    #[error("failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Manifest file is not valid YAML for the schema
    #[error("failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Mandatory `manifest_version` key is absent
    #[error("manifest version is missing in {:?}", path.display().to_string())]
    VersionMissing { path: PathBuf },

    /// `manifest_version` predates the oldest supported one
    #[error("too old manifest_version {version:?} in {:?} (oldest supported is {min:?})", path.display().to_string())]
    VersionTooOld {
        version: String,
        path: PathBuf,
        min: String,
    },

    /// `manifest_version` is newer than this tool understands
    #[error("too new manifest_version {version:?} in {:?} (latest supported is {max:?}). Please run \"mos update\".", path.display().to_string())]
    VersionTooNew {
        version: String,
        path: PathBuf,
        max: String,
    },

    /// Manifest carries a non-empty `error` field
    #[error("{origin}: {message}")]
    Declared { origin: String, message: String },

    /// Expression failure inside a manifest field
    #[error("{origin}: {field}: {source}")]
    Expression {
        origin: String,
        field: String,
        source: ExprError,
    },

    /// Module entry reached the merge without a derived name
    #[error("{origin}: module {location:?} not normalized")]
    ModuleNotNormalized { origin: String, location: String },

    /// Library or module name fails validation
    #[error("{origin}: invalid name {name:?}")]
    InvalidName { origin: String, name: String },

    /// Library or module has neither a name nor a location to derive it from
    #[error("{origin}: neither name nor location specified for a dependency")]
    NoName { origin: String },

    /// Application name contains spaces
    #[error("app name {name:?} contains spaces")]
    NameHasSpaces { name: String },

    /// Resolution requires a platform but none was given
    #[error("--platform must be specified or mos.yml should contain a platform key")]
    PlatformRequired,

    /// Library declares sources but none exist on disk
    #[error("neither sources nor prebuilt binary exists for the lib {name:?}")]
    LibSourcesMissing { name: String },
}

/// Dependency resolution errors
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Cycle in the build dependency graph
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Cycle in the init dependency graph
    #[error("init dependency cycle: {}", cycle.join(" -> "))]
    InitCycle { cycle: Vec<String> },

    /// Library declares a name different from the explicit reference name
    #[error("Library {lib_name:?} at {location:?} is referred to as {referred_as:?} from {referrer:?}")]
    NameMismatch {
        lib_name: String,
        location: String,
        referred_as: String,
        referrer: String,
    },

    /// Library declares a name that the reference must use explicitly
    #[error("Library {lib_name:?} at {location:?} must be referred to as {lib_name:?} from {referrer:?}")]
    NameRequired {
        lib_name: String,
        location: String,
        referrer: String,
    },

    /// Component provider failed to produce a local directory
    #[error("{origin}: failed to fetch {name:?}: {source}")]
    Fetch {
        origin: String,
        name: String,
        source: ComponentError,
    },

    /// A resolution task panicked or was aborted
    #[error("resolution task failed: {error}")]
    TaskFailed { error: String },

    /// Conditional expansion kept changing the manifest
    #[error("conditional expansion did not converge after {folds} folds")]
    ExpansionDidNotConverge { folds: usize },

    /// A matching cond carries an `error` field
    #[error("{origin}: {message}")]
    CondError { origin: String, message: String },
}

/// Expression evaluation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Expression text could not be parsed
    #[error("syntax error in {expr:?} at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },

    /// Variable is not defined in the namespace
    #[error("undefined variable {name:?}")]
    Undefined { name: String },
}

/// Component provider errors
#[derive(Error, Debug)]
pub enum ComponentError {
    /// No local directory could be found for the component
    #[error("{name:?} ({location}) not found locally, searched: {searched:?}")]
    NotFound {
        name: String,
        location: String,
        searched: Vec<PathBuf>,
    },

    /// Remote component requested with no way to fetch it
    #[error("cannot fetch remote {kind} component {location:?} at version {version:?}")]
    RemoteUnsupported {
        kind: String,
        location: String,
        version: String,
    },

    /// Lookup task panicked or was cancelled
    #[error("component lookup failed: {error}")]
    TaskFailed { error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to list a directory
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },

    /// Malformed glob pattern
    #[error("Invalid glob pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },
}

/// User configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Config file is not valid TOML
    #[error("Failed to parse config '{path}': {error}")]
    Parse { path: PathBuf, error: String },
}

/// Top-level mosbuild error type
#[derive(Error, Debug)]
pub enum MosbuildError {
    /// Manifest error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Resolver error
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Expression error
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),

    /// Component error
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Config error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for engine operations
pub type Result<T, E = MosbuildError> = std::result::Result<T, E>;
