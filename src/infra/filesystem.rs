//! Filesystem operations
//!
//! Handles file and directory operations, including glob expansion.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::core::paths::{glob_matcher, has_glob_meta};
use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file unless it already holds exactly that content
///
/// Returns whether the file was written.
pub fn write_file_if_different(path: &Path, content: &str) -> Result<bool, FilesystemError> {
    if std::fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    write_file(path, content)?;
    Ok(true)
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Modification time of a file
pub fn modified_time(path: &Path) -> Result<SystemTime, FilesystemError> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Size and SHA-256 (hex) of a file
pub fn file_digest(path: &Path) -> Result<(u64, String), FilesystemError> {
    let content = std::fs::read(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok((content.len() as u64, hex::encode(hasher.finalize())))
}

/// Expand a glob pattern into existing paths
///
/// Wildcards may appear in any component; matches within one directory are
/// returned in name order. A pattern without wildcards yields itself if it exists.
pub fn glob(pattern: &str) -> Result<Vec<PathBuf>, FilesystemError> {
    let path = Path::new(pattern);
    if !has_glob_meta(pattern) {
        return Ok(if path.exists() {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut candidates = vec![PathBuf::new()];
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        match component {
            Component::Normal(_) if has_glob_meta(&text) => {
                let matcher = glob_matcher(&text)?;
                let mut next = Vec::new();
                for dir in &candidates {
                    let listed = if dir.as_os_str().is_empty() {
                        Path::new(".")
                    } else {
                        dir.as_path()
                    };
                    if !listed.is_dir() {
                        continue;
                    }
                    let entries = WalkDir::new(listed)
                        .min_depth(1)
                        .max_depth(1)
                        .sort_by_file_name();
                    for entry in entries {
                        let entry = entry.map_err(|e| FilesystemError::ReadDir {
                            path: listed.to_path_buf(),
                            error: e.to_string(),
                        })?;
                        if matcher.is_match(entry.file_name()) {
                            next.push(dir.join(entry.file_name()));
                        }
                    }
                }
                candidates = next;
            }
            _ => {
                for dir in &mut candidates {
                    dir.push(component.as_os_str());
                }
            }
        }
        if candidates.is_empty() {
            break;
        }
    }

    candidates.retain(|p| p.exists());
    Ok(candidates)
}
