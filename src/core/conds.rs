//! Conditional expansion
//!
//! Folds the manifest chain (platform defaults, libraries in build order, app)
//! into a common manifest, then applies `conds` whose `when` holds against it.
//! Applying a cond may add libraries, in which case resolution must run again
//! before the next fold. Repeats until the fold carries no conds.

use tracing::{debug, warn};

use super::expr::{Interp, Vars};
use super::manifest::{LibHandled, Manifest};
use super::merge::{extend_in_place, extend_manifest, ExtendOptions};
use super::paths::prepend_paths;
use super::resolver::{ParseState, PrepareTarget};
use crate::error::{ManifestError, MosbuildError, ResolverError};

/// Outcome of one expansion run
#[derive(Debug)]
pub enum Expansion {
    /// No conds left; the flattened manifest
    Done(Box<Manifest>),
    /// Conds added libraries to these manifests; resolve them and expand again
    Restart(Vec<PrepareTarget>),
}

/// Apply the conds of `dst` whose `when` holds in `when_vars`
///
/// Fragment values are expanded against `dst` itself. Only the app may be
/// renamed by a fragment.
pub fn expand_manifest_conds(
    dst: &mut Manifest,
    when_vars: &Vars,
    interp: &Interp,
    is_app: bool,
) -> Result<(), MosbuildError> {
    let conds = std::mem::take(&mut dst.conds);

    for (i, cond) in conds.into_iter().enumerate() {
        let n = i + 1;
        let applies = interp
            .evaluate_bool(&cond.when, when_vars)
            .map_err(|source| ManifestError::Expression {
                origin: dst.origin.clone(),
                field: format!("cond {n} when {:?}", cond.when),
                source,
            })?;
        if !applies {
            continue;
        }
        debug!("{}: cond {n} ({}) applies", dst.origin, cond.when);

        if !cond.warning.is_empty() {
            warn!("{}: {}", dst.origin, cond.warning);
        }
        if !cond.error.is_empty() {
            return Err(ResolverError::CondError {
                origin: dst.origin.clone(),
                message: cond.error,
            }
            .into());
        }

        if let Some(mut apply) = cond.apply {
            apply.origin = format!("{} cond {n}", dst.origin);
            extend_in_place(
                dst,
                &apply,
                interp,
                ExtendOptions {
                    skip_failed_expansions: true,
                    ..ExtendOptions::default()
                },
            )?;
            if is_app && !apply.name.is_empty() {
                dst.name = apply.name;
            }
            if !apply.description.is_empty() {
                dst.description = apply.description;
            }
            if !apply.version.is_empty() {
                dst.version = apply.version;
            }
        }
    }
    Ok(())
}

/// Fixed-point driver over a resolution state
#[derive(Debug)]
pub struct ConditionalExpander<'a> {
    interp: &'a Interp,
    max_folds: usize,
    folds: usize,
}

impl<'a> ConditionalExpander<'a> {
    /// Create an expander that gives up after `max_folds` folds
    pub fn new(interp: &'a Interp, max_folds: usize) -> Self {
        Self {
            interp,
            max_folds,
            folds: 0,
        }
    }

    /// Number of folds performed so far
    pub fn folds(&self) -> usize {
        self.folds
    }

    /// Fold the chain `[root, libs..., app]` into one manifest
    ///
    /// Each library's own sources and binary libs are recorded on its
    /// `LibHandled`, re-rooted under the library directory; the folded manifest
    /// keeps the app's sources.
    fn fold(&mut self, state: &mut ParseState, root: &Manifest) -> Result<Manifest, MosbuildError> {
        self.folds += 1;
        if self.folds > self.max_folds {
            return Err(ResolverError::ExpansionDidNotConverge { folds: self.max_folds }.into());
        }

        let opts = ExtendOptions {
            skip_sources: true,
            ..ExtendOptions::default()
        };
        let mut common = Manifest::default();

        let step = |common: &mut Manifest, src: &Manifest, dir: &str| -> Result<(), MosbuildError> {
            let mut cur = src.clone();
            extend_manifest(&mut cur, common, src, "", dir, self.interp, opts)?;
            *common = cur;
            Ok(())
        };

        step(&mut common, root, "")?;
        for name in &state.lib_order {
            let Some(lh) = state.libs_handled.get_mut(name) else {
                continue;
            };
            let Some(src) = lh.manifest().cloned() else {
                continue;
            };
            lh.sources = prepend_paths(&src.sources, &lh.path);
            lh.binary_libs = prepend_paths(&src.binary_libs, &lh.path);
            step(&mut common, &src, &lh.path)?;
        }
        step(&mut common, &state.app, "")?;

        Ok(common)
    }

    /// Run folds until the common manifest is free of conds or new libraries appear
    pub fn expand(&mut self, state: &mut ParseState, root: &Manifest) -> Result<Expansion, MosbuildError> {
        loop {
            let mut common = self.fold(state, root)?;

            if common.conds.is_empty() {
                let mut libs: Vec<LibHandled> = Vec::with_capacity(state.lib_order.len());
                for name in &state.lib_order {
                    if let Some(lh) = state.libs_handled.get_mut(name) {
                        lh.flatten();
                        libs.push(lh.clone());
                    }
                }
                common.libs_handled = libs;
                common.init_deps.clone_from(&state.init_order);
                debug!("conditional expansion settled after {} folds", self.folds);
                return Ok(Expansion::Done(Box::new(common)));
            }

            let when_vars = self.interp.vars_for(&common);

            expand_manifest_conds(&mut state.app, &when_vars, self.interp, true)?;
            if !state.app.libs.is_empty() {
                debug!("app conds added {} libs", state.app.libs.len());
                return Ok(Expansion::Restart(vec![PrepareTarget::App]));
            }

            for name in &state.lib_order {
                let Some(lm) = state.libs_handled.get_mut(name).and_then(LibHandled::manifest_mut) else {
                    continue;
                };
                if lm.conds.is_empty() {
                    continue;
                }
                expand_manifest_conds(lm, &when_vars, self.interp, false)?;
                if !lm.libs.is_empty() {
                    debug!("{name} conds added {} libs", lm.libs.len());
                    return Ok(Expansion::Restart(vec![PrepareTarget::Lib(name.clone())]));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::ManifestCond;
    use crate::core::swmodule::SwModule;

    fn interp() -> Interp {
        let mut interp = Interp::default();
        interp.set_global("mos.platform", "esp32");
        interp
    }

    fn cond(when: &str, apply: Manifest) -> ManifestCond {
        ManifestCond {
            when: when.to_string(),
            apply: Some(Box::new(apply)),
            ..ManifestCond::default()
        }
    }

    fn lib(name: &str, manifest: Manifest) -> LibHandled {
        LibHandled::new(
            SwModule::named(name, format!("../libs/{name}")),
            format!("/w/libs/{name}"),
            Manifest {
                origin: format!("/w/libs/{name}/mos.yml"),
                ..manifest
            },
        )
    }

    fn state_with(libs: Vec<LibHandled>, app: Manifest) -> ParseState {
        let mut state = ParseState::new(app, Default::default());
        for lh in libs {
            state.lib_order.push(lh.name().to_string());
            state.libs_handled.insert(lh.name().to_string(), lh);
        }
        state
    }

    #[test]
    fn test_when_uses_common_but_fragment_uses_owner() {
        let a = lib(
            "a",
            Manifest {
                build_vars: [("A_VAL".to_string(), "own".to_string())].into(),
                conds: vec![cond(
                    r#"build_vars.APP_FLAG == "on""#,
                    Manifest {
                        sources: vec!["extra".to_string()],
                        build_vars: [("A_OUT".to_string(), "${build_vars.A_VAL}".to_string())].into(),
                        ..Manifest::default()
                    },
                )],
                ..Manifest::default()
            },
        );
        let app = Manifest {
            origin: "/w/app/mos.yml".to_string(),
            build_vars: [
                ("APP_FLAG".to_string(), "on".to_string()),
                ("A_VAL".to_string(), "app".to_string()),
            ]
            .into(),
            ..Manifest::default()
        };
        let mut state = state_with(vec![a], app);
        let interp = interp();
        let mut expander = ConditionalExpander::new(&interp, 10);

        let Expansion::Done(m) = expander.expand(&mut state, &Manifest::default()).unwrap() else {
            panic!("expected Done");
        };
        assert_eq!(expander.folds(), 2);
        assert_eq!(m.build_vars["A_OUT"], "own");
        assert_eq!(m.build_vars["A_VAL"], "app");
        assert_eq!(m.libs_handled[0].sources, vec!["/w/libs/a/extra"]);
        assert!(m.libs_handled[0].manifest().is_none());
    }

    #[test]
    fn test_quiescent_without_conds() {
        let mut state = state_with(vec![lib("a", Manifest::default())], Manifest::default());
        let interp = interp();
        let mut expander = ConditionalExpander::new(&interp, 10);
        assert!(matches!(
            expander.expand(&mut state, &Manifest::default()).unwrap(),
            Expansion::Done(_)
        ));
        assert_eq!(expander.folds(), 1);
    }

    #[test]
    fn test_cond_adding_libs_restarts() {
        let app = Manifest {
            conds: vec![cond(
                r#"mos.platform == "esp32""#,
                Manifest {
                    libs: vec![SwModule::new("../libs/esp32-extras")],
                    ..Manifest::default()
                },
            )],
            ..Manifest::default()
        };
        let mut state = state_with(vec![], app);
        let interp = interp();
        let mut expander = ConditionalExpander::new(&interp, 10);
        match expander.expand(&mut state, &Manifest::default()).unwrap() {
            Expansion::Restart(targets) => assert_eq!(targets, vec![PrepareTarget::App]),
            Expansion::Done(_) => panic!("expected Restart"),
        }
        assert_eq!(state.app.libs.len(), 1);
        assert!(state.app.conds.is_empty());
    }

    #[test]
    fn test_cond_error_and_rename() {
        let mut app = Manifest {
            origin: "app/mos.yml".to_string(),
            name: "app".to_string(),
            conds: vec![
                cond(
                    "true",
                    Manifest {
                        name: "renamed".to_string(),
                        version: "2.0".to_string(),
                        ..Manifest::default()
                    },
                ),
                cond("false", Manifest::default()),
            ],
            ..Manifest::default()
        };
        expand_manifest_conds(&mut app, &Vars::new(), &interp(), true).unwrap();
        assert_eq!(app.name, "renamed");
        assert_eq!(app.version, "2.0");

        let mut lib_manifest = Manifest {
            name: "lib".to_string(),
            conds: vec![cond("true", Manifest {
                name: "ignored".to_string(),
                ..Manifest::default()
            })],
            ..Manifest::default()
        };
        expand_manifest_conds(&mut lib_manifest, &Vars::new(), &interp(), false).unwrap();
        assert_eq!(lib_manifest.name, "lib");

        let mut failing = Manifest {
            origin: "app/mos.yml".to_string(),
            conds: vec![ManifestCond {
                when: "mos.platform == 'esp32'".to_string(),
                error: "esp32 is not supported".to_string(),
                ..ManifestCond::default()
            }],
            ..Manifest::default()
        };
        let mut vars = Vars::new();
        vars.set("mos.platform", "esp32");
        let err = expand_manifest_conds(&mut failing, &vars, &interp(), true).unwrap_err();
        assert_eq!(err.to_string(), "app/mos.yml: esp32 is not supported");
    }

    #[test]
    fn test_non_converging_conds_hit_guard() {
        // Every fold re-adds a cond through the app's own fragment.
        let mut inner = cond("true", Manifest::default());
        for _ in 0..3 {
            inner = cond("true", Manifest {
                conds: vec![inner],
                ..Manifest::default()
            });
        }
        let app = Manifest {
            conds: vec![inner],
            ..Manifest::default()
        };
        let mut state = state_with(vec![], app);
        let interp = interp();
        let mut expander = ConditionalExpander::new(&interp, 3);
        let err = expander.expand(&mut state, &Manifest::default()).unwrap_err();
        assert!(matches!(
            err,
            MosbuildError::Resolver(ResolverError::ExpansionDidNotConverge { folds: 3 })
        ));
    }
}
