//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! Resolution itself lives in [`crate::core`].

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use clap::Parser;

use commands::Commands;

static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{} ({}{} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        if option_env!("VERGEN_GIT_DIRTY") == Some("true") { "-dirty" } else { "" },
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
    )
});

/// mosbuild - Mongoose OS app manifest resolver
///
/// Resolves an app's mos.yml and its libraries into one build-ready manifest.
#[derive(Parser, Debug)]
#[command(name = "mosbuild")]
#[command(author, version, about, long_about = None)]
#[command(long_version = LONG_VERSION.as_str())]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// App directory
    #[arg(short = 'C', long = "dir", default_value = ".", global = true)]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run(&self.dir).await
        } else {
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
