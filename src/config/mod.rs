//! Configuration constants
//!
//! Compile-time defaults shared by the resolution engine and the CLI.

pub mod defaults;
