//! Infrastructure layer
//!
//! Handles I/O: the filesystem, locally available components and the
//! user's directories.

pub mod components;
pub mod dirs;
pub mod filesystem;
