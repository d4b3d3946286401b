//! Manifest merging
//!
//! `extend_manifest` folds a lower-precedence manifest `m1` and a
//! higher-precedence manifest `m2` into a target manifest, field class by field class.

use std::collections::BTreeMap;

use super::expr::Interp;
use super::manifest::{Manifest, VarMap};
use super::paths::{prepend_cond_paths, prepend_paths};
use super::swmodule::SwModule;
use crate::error::ManifestError;

/// Switches for `extend_manifest`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendOptions {
    /// Leave the target's sources untouched
    pub skip_sources: bool,
    /// Keep `${...}` text that fails to expand instead of failing
    pub skip_failed_expansions: bool,
    /// Concatenate `init_after`/`init_before`
    pub extend_init_deps: bool,
}

fn concat<T: Clone>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().chain(b).cloned().collect()
}

fn concat_paths(a: &[String], a_dir: &str, b: &[String], b_dir: &str) -> Vec<String> {
    let mut out = prepend_paths(a, a_dir);
    out.extend(prepend_paths(b, b_dir));
    out
}

/// Union of modules by name, later entries win, sorted by name
fn merge_modules(m1: &Manifest, m2: &Manifest) -> Result<Vec<SwModule>, ManifestError> {
    let mut by_name = BTreeMap::new();
    for (origin, module) in m1
        .modules
        .iter()
        .map(|m| (&m1.origin, m))
        .chain(m2.modules.iter().map(|m| (&m2.origin, m)))
    {
        if module.name.is_empty() {
            return Err(ManifestError::ModuleNotNormalized {
                origin: origin.clone(),
                location: module.location.clone(),
            });
        }
        by_name.insert(module.name.clone(), module.clone());
    }
    Ok(by_name.into_values().collect())
}

/// Merge two variable maps; `m2` values are expanded before insertion
fn merge_vars(
    m1: &VarMap,
    m2: &VarMap,
    field: &str,
    origin: &str,
    interp: &Interp,
    vars: &super::expr::Vars,
    skip_failed: bool,
) -> Result<VarMap, ManifestError> {
    let mut out = m1.clone();
    for (k, v) in m2 {
        let expanded = interp
            .expand(v, vars, skip_failed)
            .map_err(|source| ManifestError::Expression {
                origin: origin.to_string(),
                field: format!("{field}.{k}"),
                source,
            })?;
        out.insert(k.clone(), expanded);
    }
    Ok(out)
}

/// Intersection of supported platform sets; an empty side means "all"
pub fn merge_platforms(p1: &[String], p2: &[String]) -> Vec<String> {
    if p1.is_empty() {
        return p2.to_vec();
    }
    if p2.is_empty() {
        return p1.to_vec();
    }
    p2.iter().filter(|p| p1.contains(p)).cloned().collect()
}

/// Merge `m1` (lower precedence) and `m2` (higher precedence) into `main`
///
/// Fields outside the merged classes keep `main`'s values. Relative paths of
/// each side are re-rooted under its directory.
pub fn extend_manifest(
    main: &mut Manifest,
    m1: &Manifest,
    m2: &Manifest,
    m1_dir: &str,
    m2_dir: &str,
    interp: &Interp,
    opts: ExtendOptions,
) -> Result<(), ManifestError> {
    m1.check_declared()?;
    m2.check_declared()?;

    if !opts.skip_sources {
        main.sources = concat_paths(&m1.sources, m1_dir, &m2.sources, m2_dir);
    }
    main.includes = concat_paths(&m1.includes, m1_dir, &m2.includes, m2_dir);
    main.filesystem = concat_paths(&m1.filesystem, m1_dir, &m2.filesystem, m2_dir);
    main.binary_libs = concat_paths(&m1.binary_libs, m1_dir, &m2.binary_libs, m2_dir);

    main.modules = merge_modules(m1, m2)?;

    main.libs = concat(&m1.libs, &m2.libs);
    main.config_schema = concat(&m1.config_schema, &m2.config_schema);
    main.cflags = concat(&m1.cflags, &m2.cflags);
    main.cxxflags = concat(&m1.cxxflags, &m2.cxxflags);
    if opts.extend_init_deps {
        main.init_after = concat(&m1.init_after, &m2.init_after);
        main.init_before = concat(&m1.init_before, &m2.init_before);
    }

    let vars = interp.vars_for(m1);
    let skip = opts.skip_failed_expansions;
    main.build_vars = merge_vars(&m1.build_vars, &m2.build_vars, "build_vars", &m2.origin, interp, &vars, skip)?;
    main.cdefs = merge_vars(&m1.cdefs, &m2.cdefs, "cdefs", &m2.origin, interp, &vars, skip)?;

    main.platforms = merge_platforms(&m1.platforms, &m2.platforms);

    let mut conds = prepend_cond_paths(&m1.conds, m1_dir);
    conds.extend(prepend_cond_paths(&m2.conds, m2_dir));
    main.conds = conds;

    Ok(())
}

/// Extend `target` with `overlay`, `target` acting as both the base and the result
pub fn extend_in_place(
    target: &mut Manifest,
    overlay: &Manifest,
    interp: &Interp,
    opts: ExtendOptions,
) -> Result<(), ManifestError> {
    let base = target.clone();
    extend_manifest(target, &base, overlay, "", "", interp, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::test_utils::generators::{path_entry, platform, var_map};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn vars(pairs: &[(&str, &str)]) -> VarMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_field_classes() {
        let m1 = Manifest {
            origin: "lib4".to_string(),
            sources: strings(&["src"]),
            includes: strings(&["include"]),
            cflags: strings(&["-O2"]),
            platforms: strings(&["esp32", "esp8266", "cc3200"]),
            modules: vec![SwModule::named("mjs", "https://github.com/cesanta/mjs")],
            build_vars: vars(&[("VAR1", "lib4_var1"), ("KEEP", "k")]),
            ..Manifest::default()
        };
        let m2 = Manifest {
            origin: "lib3".to_string(),
            sources: strings(&["-src/skip.c"]),
            includes: strings(&["/abs/include"]),
            cflags: strings(&["-Wall"]),
            platforms: strings(&["esp8266", "esp32"]),
            modules: vec![SwModule {
                version: "2.0".to_string(),
                ..SwModule::named("mjs", "https://github.com/cesanta/mjs")
            }],
            build_vars: vars(&[("VAR1", "${build_vars.VAR1} lib3_var1")]),
            ..Manifest::default()
        };

        let mut main = m2.clone();
        extend_manifest(&mut main, &m1, &m2, "/w/lib4", "/w/lib3", &Interp::default(), ExtendOptions::default())
            .unwrap();

        assert_eq!(main.sources, strings(&["/w/lib4/src", "-/w/lib3/src/skip.c"]));
        assert_eq!(main.includes, strings(&["/w/lib4/include", "/abs/include"]));
        assert_eq!(main.cflags, strings(&["-O2", "-Wall"]));
        assert_eq!(main.platforms, strings(&["esp8266", "esp32"]));
        assert_eq!(main.modules.len(), 1);
        assert_eq!(main.modules[0].version, "2.0");
        assert_eq!(main.build_vars["VAR1"], "lib4_var1 lib3_var1");
        assert_eq!(main.build_vars["KEEP"], "k");
        assert_eq!(main.origin, "lib3");
    }

    #[test]
    fn test_skip_sources_and_init_deps() {
        let m1 = Manifest {
            sources: strings(&["a.c"]),
            init_after: strings(&["x"]),
            ..Manifest::default()
        };
        let m2 = Manifest {
            sources: strings(&["b.c"]),
            init_after: strings(&["y"]),
            ..Manifest::default()
        };
        let mut main = Manifest {
            sources: strings(&["own.c"]),
            ..Manifest::default()
        };
        let opts = ExtendOptions {
            skip_sources: true,
            ..ExtendOptions::default()
        };
        extend_manifest(&mut main, &m1, &m2, "", "", &Interp::default(), opts).unwrap();
        assert_eq!(main.sources, strings(&["own.c"]));
        assert!(main.init_after.is_empty());

        let opts = ExtendOptions {
            extend_init_deps: true,
            ..ExtendOptions::default()
        };
        extend_manifest(&mut main, &m1, &m2, "", "", &Interp::default(), opts).unwrap();
        assert_eq!(main.init_after, strings(&["x", "y"]));
    }

    #[test]
    fn test_expansion_failure() {
        let m2 = Manifest {
            origin: "app/mos.yml".to_string(),
            build_vars: vars(&[("X", "${build_vars.UNKNOWN}")]),
            ..Manifest::default()
        };
        let mut main = Manifest::default();
        let err = extend_manifest(&mut main, &Manifest::default(), &m2, "", "", &Interp::default(), ExtendOptions::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("app/mos.yml: build_vars.X: "));

        let opts = ExtendOptions {
            skip_failed_expansions: true,
            ..ExtendOptions::default()
        };
        extend_manifest(&mut main, &Manifest::default(), &m2, "", "", &Interp::default(), opts).unwrap();
        assert_eq!(main.build_vars["X"], "${build_vars.UNKNOWN}");
    }

    #[test]
    fn test_declared_error_and_unnormalized_module() {
        let broken = Manifest {
            origin: "lib/mos.yml".to_string(),
            error: "unsupported".to_string(),
            ..Manifest::default()
        };
        let mut main = Manifest::default();
        assert!(matches!(
            extend_in_place(&mut main, &broken, &Interp::default(), ExtendOptions::default()),
            Err(ManifestError::Declared { .. })
        ));

        let unnamed = Manifest {
            modules: vec![SwModule::new("https://github.com/cesanta/mjs")],
            ..Manifest::default()
        };
        assert!(matches!(
            extend_in_place(&mut main, &unnamed, &Interp::default(), ExtendOptions::default()),
            Err(ManifestError::ModuleNotNormalized { .. })
        ));
    }

    #[test]
    fn test_merge_platforms() {
        assert_eq!(merge_platforms(&[], &strings(&["esp32"])), strings(&["esp32"]));
        assert_eq!(merge_platforms(&strings(&["esp32"]), &[]), strings(&["esp32"]));
        assert!(merge_platforms(&strings(&["esp32"]), &strings(&["stm32"])).is_empty());
    }

    fn arb_manifest() -> impl Strategy<Value = Manifest> {
        (
            prop::collection::vec(path_entry(), 0..5),
            prop::collection::vec("[a-z]{1,6}", 0..5),
            var_map(),
            prop::collection::vec(platform(), 0..3),
            prop::collection::btree_set("[a-z]{1,6}", 0..4),
        )
            .prop_map(|(sources, cflags, build_vars, platforms, modules)| Manifest {
                includes: sources.clone(),
                sources,
                cflags,
                cdefs: build_vars.clone(),
                build_vars,
                platforms,
                modules: modules
                    .into_iter()
                    .map(|n| SwModule::named(n.clone(), format!("../{n}")))
                    .collect(),
                ..Manifest::default()
            })
    }

    proptest! {
        /// Merging an empty manifest underneath leaves every field class unchanged.
        #[test]
        fn prop_empty_base_is_identity(m in arb_manifest()) {
            let mut main = m.clone();
            extend_manifest(&mut main, &Manifest::default(), &m, "", "", &Interp::default(), ExtendOptions::default())
                .unwrap();
            prop_assert_eq!(main, m);
        }
    }
}
