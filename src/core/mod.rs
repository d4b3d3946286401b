//! Core manifest logic
//!
//! Everything that interprets manifests lives here. Reading files and globbing
//! directories go through [`crate::infra::filesystem`]; fetching components
//! goes through the [`provider::ComponentProvider`] trait.
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (mos.yml) data model
//! - [`swmodule`] - Library and module references
//! - [`reader`] - Manifest file reading and platform overlays
//! - [`expr`] - Expression evaluation and `${...}` expansion
//! - [`merge`] - Manifest extension
//! - [`paths`] - Path prefixing and resolution
//! - [`graph`] - Dependency graph and topological sort
//! - [`registry`] - Per-name locks for concurrent resolution
//! - [`resolver`] - Library resolution
//! - [`conds`] - Conditional expansion
//! - [`composer`] - Final manifest composition
//! - [`deps_manifest`] - Deps manifest and init code generation
//! - [`provider`] - Component provider trait
//! - [`global_config`] - User configuration

pub mod composer;
pub mod conds;
pub mod deps_manifest;
pub mod expr;
pub mod global_config;
pub mod graph;
pub mod manifest;
pub mod merge;
pub mod paths;
pub mod provider;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod swmodule;
