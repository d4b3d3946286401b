//! Deps command implementation
//!
//! Implements `mosbuild deps`: build and init order of the app's libraries,
//! optionally as a tree, optionally writing the deps manifest.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Result;

use super::{compose, ResolveArgs};
use crate::cli::output::{is_json, print_success};
use crate::core::composer::ComposeOutput;
use crate::core::manifest::Manifest;

/// Execute the deps command
pub async fn execute(dir: &Path, args: &ResolveArgs, tree: bool, write: bool) -> Result<()> {
    let out = compose(dir, args, write).await?;

    if is_json() {
        println!("{}", deps_json(&out));
    } else if tree {
        print!("{}", render_tree(&out.manifest.name, &out.app_deps, &lib_deps(&out.manifest)));
    } else {
        println!("build order: {}", lib_names(&out.manifest).join(" "));
        println!("init order:  {}", out.manifest.init_deps.join(" "));
    }

    for path in &out.generated {
        print_success(&format!("Wrote {}", path.display()));
    }
    Ok(())
}

fn lib_names(manifest: &Manifest) -> Vec<&str> {
    manifest.libs_handled.iter().map(|lh| lh.name()).collect()
}

fn lib_deps(manifest: &Manifest) -> BTreeMap<String, Vec<String>> {
    manifest
        .libs_handled
        .iter()
        .map(|lh| (lh.name().to_string(), lh.deps.clone()))
        .collect()
}

fn deps_json(out: &ComposeOutput) -> serde_json::Value {
    let libs: Vec<serde_json::Value> = out
        .manifest
        .libs_handled
        .iter()
        .map(|lh| {
            serde_json::json!({
                "name": lh.name(),
                "path": lh.path,
                "version": lh.version,
                "deps": lh.deps,
                "init_deps": lh.init_deps,
            })
        })
        .collect();
    serde_json::json!({
        "app": out.manifest.name,
        "app_deps": out.app_deps,
        "build_order": lib_names(&out.manifest),
        "init_order": out.manifest.init_deps,
        "libs": libs,
        "generated": out.generated,
    })
}

/// Render the build graph below the app; repeated subtrees are marked `(*)`
fn render_tree(app: &str, roots: &[String], deps: &BTreeMap<String, Vec<String>>) -> String {
    let mut output = format!("{app}\n");
    let mut seen = HashSet::new();
    for (i, root) in roots.iter().enumerate() {
        format_node(&mut output, root, "", i == roots.len() - 1, deps, &mut seen);
    }
    output
}

fn format_node(
    output: &mut String,
    node: &str,
    prefix: &str,
    is_last: bool,
    deps: &BTreeMap<String, Vec<String>>,
    seen: &mut HashSet<String>,
) {
    let connector = if is_last { "└── " } else { "├── " };
    let children = deps.get(node).map(Vec::as_slice).unwrap_or_default();
    if !seen.insert(node.to_string()) && !children.is_empty() {
        output.push_str(&format!("{prefix}{connector}{node} (*)\n"));
        return;
    }
    output.push_str(&format!("{prefix}{connector}{node}\n"));

    let child_prefix = if is_last {
        format!("{prefix}    ")
    } else {
        format!("{prefix}│   ")
    };
    for (i, dep) in children.iter().enumerate() {
        format_node(output, dep, &child_prefix, i == children.len() - 1, deps, seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.iter().map(ToString::to_string).collect()))
            .collect()
    }

    #[test]
    fn test_render_tree_marks_repeats() {
        let deps = graph(&[
            ("mylib1", &[]),
            ("mylib2", &["mylib4"]),
            ("mylib3", &["mylib4"]),
            ("mylib4", &["core"]),
            ("core", &[]),
        ]);
        let roots: Vec<String> = ["mylib1", "mylib2", "mylib3"].iter().map(ToString::to_string).collect();
        let tree = render_tree("app", &roots, &deps);
        assert_eq!(
            tree,
            "app\n\
             ├── mylib1\n\
             ├── mylib2\n\
             │   └── mylib4\n\
             │       └── core\n\
             └── mylib3\n\
             \x20   └── mylib4 (*)\n"
        );
    }

    #[test]
    fn test_render_tree_without_libs() {
        assert_eq!(render_tree("app", &[], &BTreeMap::new()), "app\n");
    }
}
