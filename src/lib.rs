//! mosbuild - Mongoose OS app manifest resolver
//!
//! This library turns an application's `mos.yml` and the manifests of every
//! library it pulls in, directly or transitively, into one final manifest:
//! libraries ordered for building and for initialization, conditionals folded,
//! variables expanded and path entries resolved to files on disk.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Manifest model, resolution and composition
//! - [`infra`] - Infrastructure layer (filesystem, local components, directories)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
