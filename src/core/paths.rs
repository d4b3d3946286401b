//! Path handling for manifest entries
//!
//! Manifest path lists hold entries relative to the manifest's directory,
//! optionally prefixed with `+` (include) or `-` (exclude). Entries are
//! re-rooted while manifests are merged and resolved to concrete files at the end.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use super::manifest::{LibHandled, ManifestCond};
use crate::config::defaults::ALL_LIBS_KEYWORD;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Files and their parent directories produced by path resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub files: Vec<String>,
    pub dirs: Vec<String>,
}

/// Lexically normalize a path, resolving `.` and `..` without touching the disk
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Join `entry` onto `dir` and normalize the result
pub fn join_path(dir: &str, entry: &str) -> String {
    clean_path(&Path::new(dir).join(entry))
        .to_string_lossy()
        .into_owned()
}

fn split_prefix(entry: &str) -> (&str, &str) {
    match entry.chars().next() {
        Some(c @ ('+' | '-')) => entry.split_at(c.len_utf8()),
        _ => ("", entry),
    }
}

/// Re-root relative entries under `dir`
///
/// The `+`/`-` marker is preserved; absolute entries and entries starting with
/// a variable (`$`) or keyword (`@`) are left alone.
pub fn prepend_paths(items: &[String], dir: &str) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let (prefix, path) = split_prefix(item);
            if dir.is_empty()
                || path.is_empty()
                || path.starts_with('$')
                || path.starts_with('@')
                || Path::new(path).is_absolute()
            {
                return item.clone();
            }
            format!("{prefix}{}", join_path(dir, path))
        })
        .collect()
}

/// Re-root the path lists inside every cond fragment
pub fn prepend_cond_paths(conds: &[ManifestCond], dir: &str) -> Vec<ManifestCond> {
    conds
        .iter()
        .map(|c| {
            let mut c = c.clone();
            if let Some(apply) = c.apply.as_mut() {
                apply.sources = prepend_paths(&apply.sources, dir);
                apply.includes = prepend_paths(&apply.includes, dir);
                apply.filesystem = prepend_paths(&apply.filesystem, dir);
                apply.binary_libs = prepend_paths(&apply.binary_libs, dir);
            }
            c
        })
        .collect()
}

/// Replace `@all_libs` entries with one entry per library directory
///
/// `@all_libs/include` becomes `<lib1>/include`, `<lib2>/include`, ...
pub fn expand_all_libs_paths(items: &[String], libs: &[LibHandled]) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let (prefix, path) = split_prefix(item);
        match path.strip_prefix(ALL_LIBS_KEYWORD) {
            Some(rest) => {
                let rest = rest.trim_start_matches(['/', '\\']);
                for lh in libs {
                    let expanded = if rest.is_empty() {
                        lh.path.clone()
                    } else {
                        join_path(&lh.path, rest)
                    };
                    out.push(format!("{prefix}{expanded}"));
                }
            }
            None => out.push(item.clone()),
        }
    }
    out
}

/// Whether the text contains glob wildcards
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Compile a single-component glob (`*`, `?`, `[...]`); `*` never crosses `/`
pub fn glob_matcher(pattern: &str) -> Result<GlobMatcher, FilesystemError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| FilesystemError::InvalidPattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })
}

/// Compile every pattern, dropping malformed ones
fn matchers<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Vec<GlobMatcher> {
    patterns.into_iter().filter_map(|p| glob_matcher(p).ok()).collect()
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return clean_path(path);
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    clean_path(&cwd.join(path))
}

/// Expand directory entries into `dir/<glob>` patterns
///
/// Existing files and non-empty glob patterns pass through unchanged; anything
/// else is silently dropped. Returns the patterns and the directory of each.
fn globify(entries: &[String], globs: &[&str]) -> Result<(Vec<String>, Vec<String>), FilesystemError> {
    let mut patterns = Vec::new();
    let mut dirs = Vec::new();
    for entry in entries {
        let path = Path::new(entry);
        let dir = if path.is_dir() {
            for glob in globs {
                patterns.push(path.join(glob));
            }
            path.to_path_buf()
        } else {
            if !path.exists() && filesystem::glob(entry)?.is_empty() {
                continue;
            }
            patterns.push(path.to_path_buf());
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        dirs.push(absolutize(&dir).to_string_lossy().into_owned());
    }
    let patterns = patterns
        .iter()
        .map(|p| absolutize(p).to_string_lossy().into_owned())
        .collect();
    Ok((patterns, dirs))
}

fn resolve_unprefixed(entries: &[String], globs: &[&str]) -> Result<ResolvedPaths, FilesystemError> {
    let (patterns, dirs) = globify(entries, globs)?;
    let mut files = Vec::new();
    for pattern in &patterns {
        for found in filesystem::glob(pattern)? {
            files.push(found.to_string_lossy().into_owned());
        }
    }
    Ok(ResolvedPaths { files, dirs })
}

/// Resolve path entries into existing files and their directories
///
/// `-` entries are resolved the same way and subtracted, separately for files
/// and directories.
pub fn resolve_paths(entries: &[String], globs: &[&str]) -> Result<ResolvedPaths, FilesystemError> {
    let mut add = Vec::new();
    let mut remove = Vec::new();
    for entry in entries {
        match split_prefix(entry) {
            ("-", path) => remove.push(path.to_string()),
            (_, path) => add.push(path.to_string()),
        }
    }

    let added = resolve_unprefixed(&add, globs)?;
    let removed = resolve_unprefixed(&remove, globs)?;
    let removed_files: HashSet<&String> = removed.files.iter().collect();
    let removed_dirs: HashSet<&String> = removed.dirs.iter().collect();

    Ok(ResolvedPaths {
        files: added
            .files
            .iter()
            .filter(|f| !removed_files.contains(f))
            .cloned()
            .collect(),
        dirs: added
            .dirs
            .iter()
            .filter(|d| !removed_dirs.contains(d))
            .cloned()
            .collect(),
    })
}

/// Keep files whose basename passes the `+pattern`/`-pattern` filters
///
/// With no `+` filters every file is a candidate; `-` filters then exclude.
pub fn apply_fs_filters(files: &[String], filters: &[String]) -> Vec<String> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for filter in filters {
        match split_prefix(filter) {
            ("-", pattern) => exclude.push(pattern),
            (_, pattern) => include.push(pattern),
        }
    }
    let has_include = !include.is_empty();
    let include = matchers(include);
    let exclude = matchers(exclude);
    files
        .iter()
        .filter(|f| {
            let Some(base) = Path::new(f.as_str()).file_name() else {
                return false;
            };
            (!has_include || include.iter().any(|m| m.is_match(base)))
                && !exclude.iter().any(|m| m.is_match(base))
        })
        .cloned()
        .collect()
}

/// Remove duplicate entries, keeping the first occurrence
pub fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert(i.clone()))
        .collect()
}
