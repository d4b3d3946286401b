//! Manifest file reading
//!
//! Loads `mos.yml` files, enforces the supported `manifest_version` range,
//! applies schema defaults and overlays the per-platform `mos_<platform>.yml`.

use std::path::Path;
use std::time::SystemTime;

use super::expr::Interp;
use super::manifest::{Manifest, ManifestAdjustments, ManifestType};
use super::merge::{extend_in_place, ExtendOptions};
use super::swmodule::NameError;
use crate::config::defaults::{MANIFEST_FILE_NAME, MAX_MANIFEST_VERSION, MIN_MANIFEST_VERSION};
use crate::error::{ManifestError, MosbuildError};
use crate::infra::filesystem;

/// Platform defaults folded underneath every manifest chain
const ROOT_MANIFEST: &str = include_str!("root_manifest.yml");

/// Origin reported for the embedded platform defaults
pub const ROOT_MANIFEST_ORIGIN: &str = "<platform defaults>";

/// Variable holding the tool version
pub const MOS_VERSION_VAR: &str = "mos.version";

/// Variable holding the target platform
pub const MOS_PLATFORM_VAR: &str = "mos.platform";

/// Path of the platform overlay next to `mos.yml`
pub fn platform_manifest_path(dir: &Path, platform: &str) -> std::path::PathBuf {
    dir.join(format!("mos_{platform}.yml"))
}

fn check_version(m: &Manifest, path: &Path, mandatory: bool) -> Result<(), ManifestError> {
    let version = m.manifest_version.as_str();
    if version.is_empty() {
        if mandatory {
            return Err(ManifestError::VersionMissing {
                path: path.to_path_buf(),
            });
        }
        return Ok(());
    }
    if version < MIN_MANIFEST_VERSION {
        return Err(ManifestError::VersionTooOld {
            version: version.to_string(),
            path: path.to_path_buf(),
            min: MIN_MANIFEST_VERSION.to_string(),
        });
    }
    if version > MAX_MANIFEST_VERSION {
        return Err(ManifestError::VersionTooNew {
            version: version.to_string(),
            path: path.to_path_buf(),
            max: MAX_MANIFEST_VERSION.to_string(),
        });
    }
    Ok(())
}

fn expand_version_field(
    value: &mut String,
    field: &str,
    origin: &str,
    interp: &Interp,
) -> Result<(), ManifestError> {
    if value.is_empty() {
        *value = format!("${{{MOS_VERSION_VAR}}}");
    }
    *value = interp
        .expand(value, interp.globals(), false)
        .map_err(|source| ManifestError::Expression {
            origin: origin.to_string(),
            field: field.to_string(),
            source,
        })?;
    Ok(())
}

/// Parse manifest text and apply per-file defaults
pub fn parse_manifest(
    content: &str,
    path: &Path,
    interp: &Interp,
    version_mandatory: bool,
) -> Result<Manifest, ManifestError> {
    let mut manifest: Manifest =
        serde_yaml::from_str(content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    manifest.origin = path.display().to_string();

    check_version(&manifest, path, version_mandatory)?;
    manifest.check_declared()?;

    for module in &mut manifest.modules {
        module.normalize().map_err(|e| match e {
            NameError::Invalid(name) => ManifestError::InvalidName {
                origin: manifest.origin.clone(),
                name,
            },
            NameError::Missing => ManifestError::NoName {
                origin: manifest.origin.clone(),
            },
        })?;
    }

    if manifest.platform.is_empty() && !manifest.arch_old.is_empty() {
        manifest.platform = std::mem::take(&mut manifest.arch_old);
    }

    let origin = manifest.origin.clone();
    expand_version_field(&mut manifest.mongoose_os_version, "mongoose_os_version", &origin, interp)?;
    expand_version_field(&mut manifest.libs_version, "libs_version", &origin, interp)?;
    expand_version_field(&mut manifest.modules_version, "modules_version", &origin, interp)?;

    Ok(manifest)
}

/// Read a single manifest file, returning it with its modification time
pub fn read_manifest_file(
    path: &Path,
    interp: &Interp,
    version_mandatory: bool,
) -> Result<(Manifest, SystemTime), MosbuildError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let manifest = parse_manifest(&content, path, interp, version_mandatory)?;
    let mtime = filesystem::modified_time(path)?;
    Ok((manifest, mtime))
}

/// Read the manifest of an app or library directory
///
/// The adjustments' platform overrides the manifest's; the platform overlay
/// and the adjustments' build vars are merged on top.
pub fn read_manifest(
    dir: &Path,
    adjustments: &ManifestAdjustments,
    interp: &Interp,
) -> Result<(Manifest, SystemTime), MosbuildError> {
    let mut interp = interp.clone();
    let path = dir.join(MANIFEST_FILE_NAME);
    let (mut manifest, mut mtime) = read_manifest_file(&path, &interp, true)?;

    if !adjustments.platform.is_empty() {
        manifest.platform.clone_from(&adjustments.platform);
    }
    manifest.platform = manifest.platform.to_lowercase();
    interp.set_global(MOS_PLATFORM_VAR, manifest.platform.clone());

    if manifest.kind.is_none() {
        manifest.kind = Some(ManifestType::App);
    }

    if !manifest.platform.is_empty() {
        let overlay_path = platform_manifest_path(dir, &manifest.platform);
        if overlay_path.is_file() {
            let (overlay, overlay_mtime) = read_manifest_file(&overlay_path, &interp, false)?;
            mtime = mtime.max(overlay_mtime);
            tracing::debug!("applying platform overlay {}", overlay_path.display());
            extend_in_place(
                &mut manifest,
                &overlay,
                &interp,
                ExtendOptions {
                    skip_failed_expansions: true,
                    extend_init_deps: true,
                    ..ExtendOptions::default()
                },
            )?;
        }
    }

    if !adjustments.build_vars.is_empty() {
        let overlay = Manifest {
            build_vars: adjustments.build_vars.clone(),
            ..Manifest::default()
        };
        extend_in_place(
            &mut manifest,
            &overlay,
            &interp,
            ExtendOptions {
                skip_failed_expansions: true,
                ..ExtendOptions::default()
            },
        )?;
    }

    Ok((manifest, mtime))
}

/// Parse the embedded platform-defaults manifest
pub fn read_root_manifest(interp: &Interp) -> Result<Manifest, ManifestError> {
    parse_manifest(ROOT_MANIFEST, Path::new(ROOT_MANIFEST_ORIGIN), interp, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn interp() -> Interp {
        let mut interp = Interp::default();
        interp.set_global(MOS_VERSION_VAR, "2.20.0");
        interp.set_global(MOS_PLATFORM_VAR, "");
        interp
    }

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_version_bounds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mos.yml");

        std::fs::write(&path, "name: x\n").unwrap();
        let err = read_manifest_file(&path, &interp(), true).unwrap_err();
        assert!(err.to_string().starts_with("manifest version is missing in"));
        assert!(read_manifest_file(&path, &interp(), false).is_ok());

        std::fs::write(&path, "manifest_version: 2016-01-01\n").unwrap();
        let err = read_manifest_file(&path, &interp(), true).unwrap_err();
        assert!(err.to_string().contains("oldest supported is \"2017-03-17\""));

        std::fs::write(&path, "manifest_version: 2099-01-01\n").unwrap();
        let err = read_manifest_file(&path, &interp(), true).unwrap_err();
        assert!(err.to_string().contains("Please run \"mos update\""));
    }

    #[test]
    fn test_defaults_applied() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "mos.yml",
            "manifest_version: 2017-09-29\narch: ESP32\nmodules:\n  - location: https://github.com/cesanta/mjs\n",
        );
        let (m, _) = read_manifest(tmp.path(), &ManifestAdjustments::default(), &interp()).unwrap();
        assert_eq!(m.platform, "esp32");
        assert_eq!(m.manifest_type(), ManifestType::App);
        assert_eq!(m.libs_version, "2.20.0");
        assert_eq!(m.modules_version, "2.20.0");
        assert_eq!(m.mongoose_os_version, "2.20.0");
        assert_eq!(m.modules[0].name, "mjs");
        assert!(m.origin.ends_with("mos.yml"));
    }

    #[test]
    fn test_platform_overlay_and_adjustments() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "mos.yml",
            "manifest_version: 2017-09-29\nplatform: esp8266\nsources: [src]\ninit_after: [a]\nbuild_vars:\n  A: base\n",
        );
        write(
            tmp.path(),
            "mos_esp32.yml",
            "sources: [src/esp32]\ninit_after: [b]\nbuild_vars:\n  A: \"${build_vars.A} esp32 ${build_vars.NOPE}\"\n",
        );
        let adjustments = ManifestAdjustments {
            platform: "ESP32".to_string(),
            build_vars: [("B".to_string(), "cli".to_string())].into(),
            ..ManifestAdjustments::default()
        };
        let (m, _) = read_manifest(tmp.path(), &adjustments, &interp()).unwrap();
        assert_eq!(m.platform, "esp32");
        assert_eq!(m.sources, vec!["src", "src/esp32"]);
        assert_eq!(m.init_after, vec!["a", "b"]);
        assert_eq!(m.build_vars["A"], "base esp32 ${build_vars.NOPE}");
        assert_eq!(m.build_vars["B"], "cli");
    }

    #[test]
    fn test_declared_error_in_file() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "mos.yml",
            "manifest_version: 2017-09-29\nerror: use mylib2 instead\n",
        );
        let err = read_manifest(tmp.path(), &ManifestAdjustments::default(), &interp()).unwrap_err();
        assert!(err.to_string().ends_with("mos.yml: use mylib2 instead"));
    }

    #[test]
    fn test_root_manifest_parses() {
        let root = read_root_manifest(&interp()).unwrap();
        assert_eq!(root.origin, ROOT_MANIFEST_ORIGIN);
        assert_eq!(root.conds.len(), 1);
    }
}
