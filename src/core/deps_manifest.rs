//! Dependency manifest
//!
//! The deps manifest (`deps_manifest.yml`) records the exact libraries, modules
//! and binary blobs that went into a firmware. The deps-init C file calls the
//! init function of every library in init order.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::manifest::{LibHandled, Manifest};
use super::provider::LocalComponent;
use super::swmodule::{identifier_name, SwModule};
use crate::config::defaults::DEPS_MANIFEST_VERSION;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Deps manifest structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsManifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_name: String,

    /// Libraries, sorted by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<DepsEntry>,

    /// Modules, sorted by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<DepsEntry>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifest_version: String,
}

/// One library or module
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo_version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repo_dirty: bool,
    /// Binary libraries, sorted by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blobs: Vec<DepsBlob>,
}

/// A prebuilt binary shipped by a library
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsBlob {
    pub name: String,
    pub size: u64,
    #[serde(rename = "cs_sha256")]
    pub sha256: String,
}

impl DepsEntry {
    /// Repository revision with a `-dirty` suffix for modified checkouts
    pub fn repo_version_label(&self) -> String {
        if !self.repo_version.is_empty() && self.repo_dirty {
            format!("{}-dirty", self.repo_version)
        } else {
            self.repo_version.clone()
        }
    }
}

impl DepsManifest {
    /// Describe the libraries of a final manifest and the modules it uses
    ///
    /// Every binary lib of a library is read and hashed.
    pub fn generate(
        manifest: &Manifest,
        modules: &[(SwModule, LocalComponent)],
    ) -> Result<Self, FilesystemError> {
        let mut libs = manifest
            .libs_handled
            .iter()
            .map(lib_entry)
            .collect::<Result<Vec<_>, _>>()?;
        libs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut modules: Vec<DepsEntry> = modules
            .iter()
            .map(|(m, c)| DepsEntry {
                name: m.name.clone(),
                location: m.location.clone(),
                repo_version: c.repo_version.clone(),
                repo_dirty: c.dirty,
                ..DepsEntry::default()
            })
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            app_name: manifest.name.clone(),
            libs,
            modules,
            manifest_version: DEPS_MANIFEST_VERSION.to_string(),
        })
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Parse from YAML
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Entry of the library called `name`
    pub fn lib(&self, name: &str) -> Option<&DepsEntry> {
        self.libs.iter().find(|e| e.name == name)
    }

    /// Write to `path`, creating parent directories
    pub fn write(&self, path: &Path) -> Result<(), FilesystemError> {
        let content = self.to_yaml().map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            filesystem::create_dir_all(parent)?;
        }
        filesystem::write_file(path, &content)
    }
}

fn lib_entry(lh: &LibHandled) -> Result<DepsEntry, FilesystemError> {
    let mut blobs = Vec::with_capacity(lh.binary_libs.len());
    for file in &lh.binary_libs {
        let path = Path::new(file);
        let (size, sha256) = filesystem::file_digest(path)?;
        blobs.push(DepsBlob {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size,
            sha256,
        });
    }
    blobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(DepsEntry {
        name: lh.name().to_string(),
        location: lh.lib.location.clone(),
        version: lh.version.clone(),
        repo_version: lh.repo_version.clone(),
        repo_dirty: lh.repo_dirty,
        blobs,
    })
}

fn quote_or_null(s: &str) -> String {
    if s.is_empty() {
        "NULL".to_string()
    } else {
        format!("{s:?}")
    }
}

/// Generate the deps-init C source for a final manifest
///
/// Libraries without sources or binary libs have no init function.
pub fn deps_init_c_code(manifest: &Manifest, deps: &DepsManifest) -> String {
    let mut libs = Vec::with_capacity(manifest.init_deps.len());
    for name in &manifest.init_deps {
        let Some(lh) = manifest.libs_handled.iter().find(|lh| lh.name() == name) else {
            continue;
        };
        let init = (!lh.sources.is_empty() || !lh.binary_libs.is_empty())
            .then(|| format!("mgos_{}_init", identifier_name(name)));
        let entry = deps.lib(name);
        let blobs = entry
            .map(|e| {
                e.blobs
                    .iter()
                    .map(|b| format!("{}:{}", b.name, b.sha256))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let repo_version = entry.map(DepsEntry::repo_version_label).unwrap_or_default();
        libs.push((lh, init, blobs, repo_version));
    }

    let mut c = String::new();
    c.push_str("/* This file is auto-generated, do not edit. */\n\n");
    c.push_str("#include <stdbool.h>\n#include <stddef.h>\n\n");
    c.push_str("#include \"common/cs_dbg.h\"\n\n");
    c.push_str("#include \"mgos_deps.h\"\n\n");

    for (_, init, _, _) in &libs {
        if let Some(init) = init {
            let _ = writeln!(c, "extern bool {init}(void);");
        }
    }

    c.push_str("\nconst struct mgos_lib_info mgos_libs_info[] = {\n");
    for (lh, init, blobs, repo_version) in &libs {
        let _ = writeln!(
            c,
            "    {{.name = {}, .version = {}, .repo_version = {}, .binary_libs = {}, .init = {}}},",
            quote_or_null(lh.name()),
            quote_or_null(&lh.user_version),
            quote_or_null(repo_version),
            quote_or_null(blobs),
            init.as_deref().unwrap_or("NULL"),
        );
    }
    c.push_str("    {.name = NULL},\n};\n\n");

    c.push_str("const struct mgos_module_info mgos_modules_info[] = {\n");
    for module in &deps.modules {
        let _ = writeln!(
            c,
            "    {{.name = {}, .repo_version = {}}},",
            quote_or_null(&module.name),
            quote_or_null(&module.repo_version_label()),
        );
    }
    c.push_str("    {.name = NULL},\n};\n\n");

    c.push_str("bool mgos_deps_init(void) {\n");
    for (lh, init, _, _) in &libs {
        if let Some(init) = init {
            let _ = writeln!(c, "  LOG(LL_DEBUG, (\"init %s...\", {:?}));", lh.name());
            let _ = writeln!(c, "  if (!{init}()) {{");
            let _ = writeln!(c, "    LOG(LL_ERROR, (\"%s init failed\", {:?}));", lh.name());
            c.push_str("    return false;\n  }\n");
        }
    }
    c.push_str("  return true;\n}\n");
    c
}
