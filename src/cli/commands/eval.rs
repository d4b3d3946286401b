//! Eval command implementation
//!
//! Implements `mosbuild eval`, which evaluates an expression the way
//! manifest conds do, against the final manifest.

use std::path::Path;

use anyhow::{Context, Result};

use super::{compose, ResolveArgs};
use crate::cli::output::is_json;
use crate::core::expr::Value;

/// Execute the eval command
pub async fn execute(dir: &Path, args: &ResolveArgs, expr: &str) -> Result<()> {
    let out = compose(dir, args, false).await?;
    let value = out
        .interp
        .evaluate(expr, &out.vars())
        .with_context(|| format!("Failed to evaluate {expr:?}"))?;

    if is_json() {
        let json = match &value {
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Bool(b) => serde_json::Value::from(*b),
        };
        println!("{}", serde_json::json!({ "expr": expr, "value": json }));
    } else {
        println!("{value}");
    }
    Ok(())
}
