//! Manifest data model
//!
//! A manifest (`mos.yml`) describes one buildable unit, either the application
//! or a library. During resolution manifests are merged, expanded and finally
//! flattened into a single build-ready manifest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::swmodule::SwModule;
use crate::error::ManifestError;

/// String map whose YAML values may be scalars of any type
pub type VarMap = BTreeMap<String, String>;

/// Kind of buildable unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestType {
    #[default]
    App,
    Lib,
}

impl fmt::Display for ManifestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => f.write_str("app"),
            Self::Lib => f.write_str("lib"),
        }
    }
}

/// One buildable unit at some point of resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub manifest_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ManifestType>,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Provenance used in error messages, usually the file path
    #[serde(skip)]
    pub origin: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    /// Legacy spelling of `platform`
    #[serde(rename = "arch", default, skip_serializing)]
    pub arch_old: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub platforms: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub filesystem: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub binary_libs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub fs_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_schema: Vec<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub cflags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub cxxflags: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "string_map")]
    pub build_vars: VarMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "string_map")]
    pub cdefs: VarMap,

    /// Unresolved library references, consumed during resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<SwModule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<SwModule>,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub libs_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub modules_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub mongoose_os_version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub init_after: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "string_seq")]
    pub init_before: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_implicit_init_deps: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conds: Vec<ManifestCond>,

    /// Resolved libraries in build order
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub libs_handled: Vec<LibHandled>,
    /// Library names in init order
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub init_deps: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning: String,
}

/// Conditional manifest fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestCond {
    /// Boolean expression deciding whether the fragment applies
    #[serde(default)]
    pub when: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<Box<Manifest>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning: String,
}

/// Caller-supplied changes applied on top of the app manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestAdjustments {
    pub platform: String,
    pub build_vars: VarMap,
    pub cdefs: VarMap,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub extra_libs: Vec<SwModule>,
}

/// Resolution state of one library
///
/// The library's own manifest is kept only until the final manifest is composed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LibState {
    /// Manifest read, its own references still queued
    Resolving(Box<Manifest>),
    /// Manifest read and its references resolved
    Resolved(Box<Manifest>),
    /// Merged into the final manifest
    #[default]
    Flattened,
}

/// A resolved, deduplicated library
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LibHandled {
    pub lib: SwModule,
    pub path: String,
    #[serde(skip)]
    pub state: LibState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub init_deps: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binary_libs: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo_version: String,
    #[serde(skip_serializing_if = "is_false")]
    pub repo_dirty: bool,
}

impl LibHandled {
    /// Start tracking a library whose manifest has just been read
    pub fn new(lib: SwModule, path: String, manifest: Manifest) -> Self {
        Self {
            lib,
            path,
            state: LibState::Resolving(Box::new(manifest)),
            ..Self::default()
        }
    }

    /// Library name
    pub fn name(&self) -> &str {
        &self.lib.name
    }

    /// The library's own manifest, until flattened
    pub fn manifest(&self) -> Option<&Manifest> {
        match &self.state {
            LibState::Resolving(m) | LibState::Resolved(m) => Some(m),
            LibState::Flattened => None,
        }
    }

    /// Mutable access to the library's own manifest, until flattened
    pub fn manifest_mut(&mut self) -> Option<&mut Manifest> {
        match &mut self.state {
            LibState::Resolving(m) | LibState::Resolved(m) => Some(m),
            LibState::Flattened => None,
        }
    }

    /// Move back to `Resolving` because new references were queued
    pub fn mark_resolving(&mut self) {
        match std::mem::take(&mut self.state) {
            LibState::Resolving(m) | LibState::Resolved(m) => self.state = LibState::Resolving(m),
            LibState::Flattened => {}
        }
    }

    /// Record that the library's references have all been resolved
    pub fn mark_resolved(&mut self) {
        match std::mem::take(&mut self.state) {
            LibState::Resolving(m) | LibState::Resolved(m) => self.state = LibState::Resolved(m),
            LibState::Flattened => {}
        }
    }

    /// Drop the nested manifest, keeping only what the final manifest needs
    pub fn flatten(&mut self) {
        if let Some(m) = self.manifest() {
            self.user_version = m.version.clone();
        }
        self.state = LibState::Flattened;
    }
}

impl Manifest {
    /// Effective type, `app` when unset
    pub fn manifest_type(&self) -> ManifestType {
        self.kind.unwrap_or_default()
    }

    /// Surface the manifest's declared warning and error
    pub fn check_declared(&self) -> Result<(), ManifestError> {
        if !self.warning.is_empty() {
            tracing::warn!("{}: {}", self.origin, self.warning);
        }
        if !self.error.is_empty() {
            return Err(ManifestError::Declared {
                origin: self.origin.clone(),
                message: self.error.clone(),
            });
        }
        Ok(())
    }

    /// Whether a library of the given name is referenced
    pub fn has_lib(&self, name: &str) -> bool {
        self.libs
            .iter()
            .any(|l| l.name().is_ok_and(|n| n == name))
    }

    /// Set a variable in both build vars and C defines
    pub fn set_var_and_cdef(&mut self, key: &str, value: &str) {
        self.build_vars.insert(key.to_string(), value.to_string());
        self.cdefs.insert(key.to_string(), value.to_string());
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(v: &bool) -> bool {
    !*v
}

fn scalar_to_string(value: serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Tagged(t) => scalar_to_string(t.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => None,
    }
}

/// Deserialize any YAML scalar as a string, so `version: 1.0` stays "1.0"
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match raw {
        None => Ok(String::new()),
        Some(v) => scalar_to_string(v).ok_or_else(|| serde::de::Error::custom("expected a scalar")),
    }
}

fn string_map<'de, D>(deserializer: D) -> Result<VarMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_yaml::Mapping>::deserialize(deserializer)?;
    let mut out = VarMap::new();
    for (k, v) in raw.unwrap_or_default() {
        let key = scalar_to_string(k)
            .ok_or_else(|| serde::de::Error::custom("map keys must be scalars"))?;
        let value = scalar_to_string(v).ok_or_else(|| {
            serde::de::Error::custom(format!("value of {key:?} must be a scalar"))
        })?;
        out.insert(key, value);
    }
    Ok(out)
}

fn string_seq<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|v| {
            scalar_to_string(v).ok_or_else(|| serde::de::Error::custom("list items must be scalars"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB_YAML: &str = r#"
author: mongoose-os
type: lib
description: Test library
version: 1.5
sources:
  - src
build_vars:
  NUM: 1
  FLAG: true
  EMPTY:
  TEXT: "${build_vars.NUM} more"
cdefs:
  MYLIB_X: 42
libs:
  - origin: ../libs/mylib4
  - location: https://github.com/mongoose-os-libs/core
    version: 2.20.0
conds:
  - when: mos.platform == "esp32"
    apply:
      build_vars:
        ESP: 1
  - when: build_vars.NUM == "2"
    error: "NUM must not be 2"
manifest_version: 2017-09-29
"#;

    #[test]
    fn test_parse_library_manifest() {
        let m: Manifest = serde_yaml::from_str(LIB_YAML).unwrap();
        assert_eq!(m.manifest_type(), ManifestType::Lib);
        assert_eq!(m.version, "1.5");
        assert_eq!(m.manifest_version, "2017-09-29");
        assert_eq!(m.build_vars["NUM"], "1");
        assert_eq!(m.build_vars["FLAG"], "true");
        assert_eq!(m.build_vars["EMPTY"], "");
        assert_eq!(m.cdefs["MYLIB_X"], "42");
        assert_eq!(m.libs[0].origin_old, "../libs/mylib4");
        assert_eq!(m.libs[1].version, "2.20.0");
        assert_eq!(m.conds.len(), 2);
        assert_eq!(
            m.conds[0].apply.as_ref().unwrap().build_vars["ESP"],
            "1"
        );
        assert_eq!(m.conds[1].error, "NUM must not be 2");
    }

    #[test]
    fn test_type_defaults_to_app() {
        let m: Manifest = serde_yaml::from_str("name: demo\n").unwrap();
        assert_eq!(m.kind, None);
        assert_eq!(m.manifest_type(), ManifestType::App);
    }

    #[test]
    fn test_declared_error_aborts() {
        let m = Manifest {
            origin: "libs/broken/mos.yml".to_string(),
            error: "this library is deprecated".to_string(),
            ..Manifest::default()
        };
        let err = m.check_declared().unwrap_err();
        assert_eq!(
            err.to_string(),
            "libs/broken/mos.yml: this library is deprecated"
        );

        let warned = Manifest {
            warning: "prefer mylib2".to_string(),
            ..Manifest::default()
        };
        assert!(warned.check_declared().is_ok());
    }

    #[test]
    fn test_lib_lifecycle() {
        let mut lh = LibHandled::new(
            SwModule::named("mylib1", "../libs/mylib1"),
            "/w/libs/mylib1".to_string(),
            Manifest {
                version: "1.3".to_string(),
                ..Manifest::default()
            },
        );
        assert!(matches!(lh.state, LibState::Resolving(_)));
        lh.mark_resolved();
        assert!(matches!(lh.state, LibState::Resolved(_)));
        lh.mark_resolving();
        assert!(matches!(lh.state, LibState::Resolving(_)));
        lh.flatten();
        assert_eq!(lh.state, LibState::Flattened);
        assert!(lh.manifest().is_none());
        assert_eq!(lh.user_version, "1.3");
    }

    #[test]
    fn test_serialized_manifest_omits_empty_fields() {
        let mut m = Manifest {
            name: "app".to_string(),
            ..Manifest::default()
        };
        m.set_var_and_cdef("MGOS", "1");
        let yaml = serde_yaml::to_string(&m).unwrap();
        assert!(yaml.contains("build_vars"));
        assert!(!yaml.contains("sources"));
        assert!(!yaml.contains("libs_handled"));
    }
}
