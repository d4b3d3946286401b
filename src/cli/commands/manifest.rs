//! Manifest command implementation
//!
//! Implements `mosbuild manifest`: resolve the app and print the final
//! manifest as YAML, or JSON with `--json`.

use std::path::Path;

use anyhow::{Context, Result};

use super::{compose, ResolveArgs};
use crate::cli::output::is_json;

/// Execute the manifest command
pub async fn execute(dir: &Path, args: &ResolveArgs) -> Result<()> {
    let out = compose(dir, args, true).await?;
    tracing::info!(
        "resolved {} libs in {} passes, {} folds",
        out.manifest.libs_handled.len(),
        out.passes,
        out.folds
    );

    let text = if is_json() {
        serde_json::to_string_pretty(&out.manifest).context("Failed to serialize manifest")?
    } else {
        serde_yaml::to_string(&out.manifest).context("Failed to serialize manifest")?
    };
    println!("{}", text.trim_end());
    Ok(())
}
