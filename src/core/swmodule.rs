//! Library and module references
//!
//! A reference names a dependency by location (git URL or local path) plus an
//! optional explicit name, version and variant.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::defaults::LATEST_VERSION;

static GIT_SSH_SHORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\w+)@)?(\S+?):(\S+)").expect("valid regex"));
static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9-_]").expect("valid regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*)://(?:([^@/]*)@)?([^/:]*)(?::\d+)?(/.*)?$")
        .expect("valid regex")
});

/// The boards library is renamed so it sorts after everything else
const BOARDS_LIB_NAME: &str = "boards";
const BOARDS_LIB_NEW_NAME: &str = "zz_boards";

/// How a reference is fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    Git,
    Local,
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => f.write_str("git"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Reason a reference has no usable name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Explicit name fails validation
    Invalid(String),
    /// Neither a name nor a location to derive one from
    Missing,
}

/// A reference to a library or module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwModule {
    /// Explicit type, `git` or `local`; inferred from the location when empty
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    /// Legacy spelling of `location`
    #[serde(rename = "origin", default, skip_serializing)]
    pub origin_old: String,
    #[serde(
        default,
        skip_serializing_if = "String::is_empty",
        deserialize_with = "crate::core::manifest::scalar_string"
    )]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

/// Components of a git location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLocation {
    /// Repository path on the host, e.g. `mongoose-os-libs/core`
    pub repo_path: String,
    /// Repository name, e.g. `core`
    pub repo_name: String,
    /// Last path component without `.git`
    pub lib_name: String,
    /// Path of the library inside the repository, empty for the root
    pub path_within_repo: String,
}

impl SwModule {
    /// Create a reference to `location`
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Create a reference with an explicit name
    pub fn named(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new(location)
        }
    }

    /// Fill in `location` from the legacy key and derive the name if absent
    pub fn normalize(&mut self) -> Result<(), NameError> {
        if self.location.is_empty() && !self.origin_old.is_empty() {
            self.location = std::mem::take(&mut self.origin_old);
        } else {
            self.origin_old.clear();
        }
        if self.name.is_empty() {
            self.name = self.name()?;
        }
        Ok(())
    }

    /// Effective name, with the boards rename applied
    pub fn name(&self) -> Result<String, NameError> {
        let name = self.declared_name()?;
        if name == BOARDS_LIB_NAME {
            return Ok(BOARDS_LIB_NEW_NAME.to_string());
        }
        Ok(name)
    }

    /// Name before the boards rename, as used for library directories
    pub fn unrenamed_name(&self) -> Result<String, NameError> {
        let name = self.name()?;
        if name == BOARDS_LIB_NEW_NAME {
            return Ok(BOARDS_LIB_NAME.to_string());
        }
        Ok(name)
    }

    fn declared_name(&self) -> Result<String, NameError> {
        if !self.name.is_empty() {
            if !is_valid_name(&self.name) {
                return Err(NameError::Invalid(self.name.clone()));
            }
            return Ok(self.name.clone());
        }
        if self.location.is_empty() {
            return Err(NameError::Missing);
        }
        let name = match self.module_type() {
            ModuleType::Git => parse_git_location(&self.location).map(|l| l.lib_name),
            ModuleType::Local => Path::new(self.location.trim_end_matches(['/', '\\']))
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        };
        match name {
            Some(n) if !n.is_empty() => Ok(n),
            _ => Err(NameError::Missing),
        }
    }

    /// Kind of the reference
    pub fn module_type(&self) -> ModuleType {
        match self.kind.as_str() {
            "git" => return ModuleType::Git,
            "" => {}
            _ => return ModuleType::Local,
        }
        if let Some(caps) = URL.captures(&self.location) {
            let scheme = &caps[1];
            let host = caps.get(3).map_or("", |m| m.as_str());
            if scheme == "ssh" || (scheme == "https" && host == "github.com") {
                return ModuleType::Git;
            }
        }
        if GIT_SSH_SHORT.is_match(&self.location) {
            return ModuleType::Git;
        }
        ModuleType::Local
    }

    /// Requested version, or `default` if the reference does not pin one
    pub fn version_or(&self, default: &str) -> String {
        if self.version.is_empty() {
            default.to_string()
        } else {
            self.version.clone()
        }
    }

    /// Version as a git revision; `latest` means the default branch
    pub fn git_revision(&self, default: &str) -> String {
        let version = self.version_or(default);
        if version == LATEST_VERSION {
            "master".to_string()
        } else {
            version
        }
    }
}

/// Whether `name` is acceptable as a library or module name
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Turn a name into a C identifier fragment, e.g. `my-lib` -> `my_lib`
pub fn identifier_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Split a git location into repository and in-repository parts
///
/// GitHub https URLs address subdirectories as `owner/repo/tree/<rev>/<path>`;
/// other hosts use the first component ending in `.git` as the repository.
pub fn parse_git_location(location: &str) -> Option<GitLocation> {
    let (scheme, host, path) = if let Some(caps) = URL.captures(location) {
        (
            caps[1].to_string(),
            caps.get(3).map_or("", |m| m.as_str()).to_string(),
            caps.get(4).map_or("", |m| m.as_str()).to_string(),
        )
    } else if let Some(caps) = GIT_SSH_SHORT.captures(location) {
        (String::new(), caps[2].to_string(), caps[3].to_string())
    } else {
        return None;
    };

    let parts: Vec<&str> = path.split('/').collect();
    let last = parts.last().copied().unwrap_or_default();
    let lib_name = last.strip_suffix(".git").unwrap_or(last).to_string();

    let mut repo_name = String::new();
    let mut path_within_repo = String::new();
    let repo_path;
    if scheme == "https" && host == "github.com" && parts.len() > 4 {
        repo_path = parts[1..3].join("/");
        repo_name = parts[2].to_string();
        path_within_repo = parts[5..].join("/");
    } else {
        let mut path_parts = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if let Some(stripped) = part.strip_suffix(".git") {
                repo_name = stripped.to_string();
                path_parts.push(repo_name.clone());
                path_within_repo = parts[i + 1..].join("/");
                break;
            }
            if !part.is_empty() {
                repo_name = (*part).to_string();
                path_parts.push(repo_name.clone());
            }
        }
        repo_path = path_parts.join("/");
    }

    Some(GitLocation {
        repo_path,
        repo_name,
        lib_name,
        path_within_repo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use crate::test_utils::generators::{lib_name, local_location};
    use proptest::prelude::*;

    #[test]
    fn test_name_from_git_location() {
        let m = SwModule::new("https://github.com/mongoose-os-libs/core");
        assert_eq!(m.module_type(), ModuleType::Git);
        assert_eq!(m.name().unwrap(), "core");

        let m = SwModule::new("git@github.com:cesanta/mjs.git");
        assert_eq!(m.module_type(), ModuleType::Git);
        assert_eq!(m.name().unwrap(), "mjs");
    }

    #[test]
    fn test_name_from_local_location() {
        let m = SwModule::new("../libs/mylib1/");
        assert_eq!(m.module_type(), ModuleType::Local);
        assert_eq!(m.name().unwrap(), "mylib1");
    }

    #[test]
    fn test_explicit_name_wins_and_is_validated() {
        let m = SwModule::named("wifi", "https://github.com/mongoose-os-libs/wifi-ng");
        assert_eq!(m.name().unwrap(), "wifi");

        let bad = SwModule::named("1wifi", "../wifi");
        assert_eq!(bad.name(), Err(NameError::Invalid("1wifi".to_string())));
        assert_eq!(SwModule::default().name(), Err(NameError::Missing));
    }

    #[test]
    fn test_boards_is_renamed() {
        let mut m = SwModule::new("https://github.com/mongoose-os-libs/boards");
        m.normalize().unwrap();
        assert_eq!(m.name, "zz_boards");
        assert_eq!(m.unrenamed_name().unwrap(), "boards");
    }

    #[test]
    fn test_normalize_moves_legacy_origin() {
        let mut m = SwModule {
            origin_old: "../libs/mylib2".to_string(),
            ..SwModule::default()
        };
        m.normalize().unwrap();
        assert_eq!(m.location, "../libs/mylib2");
        assert_eq!(m.name, "mylib2");
    }

    #[test]
    fn test_explicit_type_overrides_inference() {
        let m = SwModule {
            kind: "git".to_string(),
            location: "/srv/repos/foo.git".to_string(),
            ..SwModule::default()
        };
        assert_eq!(m.module_type(), ModuleType::Git);
        assert_eq!(m.name().unwrap(), "foo");
    }

    #[test]
    fn test_git_location_with_subdirectory() {
        let loc = parse_git_location("https://github.com/cesanta/mongoose-os/tree/master/fw").unwrap();
        assert_eq!(loc.repo_path, "cesanta/mongoose-os");
        assert_eq!(loc.repo_name, "mongoose-os");
        assert_eq!(loc.lib_name, "fw");
        assert_eq!(loc.path_within_repo, "fw");

        let loc = parse_git_location("ssh://git@example.com/group/libs.git/net/dns").unwrap();
        assert_eq!(loc.repo_name, "libs");
        assert_eq!(loc.path_within_repo, "net/dns");
        assert_eq!(loc.lib_name, "dns");
    }

    #[test]
    fn test_versions() {
        let m = SwModule::new("https://github.com/mongoose-os-libs/core");
        assert_eq!(m.version_or("2.20.0"), "2.20.0");
        assert_eq!(m.git_revision("latest"), "master");

        let pinned = SwModule {
            version: "1.2".to_string(),
            ..m
        };
        assert_eq!(pinned.version_or("latest"), "1.2");
    }

    #[test]
    fn test_identifier_name() {
        assert_eq!(identifier_name("my-lib.v2"), "my_lib_v2");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn prop_local_location_names_the_lib(
            (name, location) in lib_name().prop_flat_map(|n| (Just(n.clone()), local_location(n)))
        ) {
            prop_assume!(name != BOARDS_LIB_NAME);
            let mut m = SwModule::new(location);
            prop_assert_eq!(m.module_type(), ModuleType::Local);
            m.normalize().unwrap();
            prop_assert_eq!(m.name, name);
        }
    }
}
