//! Library resolution
//!
//! Walks the library reference tree breadth-first, one frontier per pass. Every
//! reference in a frontier is handled by its own task: the first reference of a
//! name fetches the library and reads its manifest, later references of the same
//! name wait on the [`NameRegistry`] slot and become re-encounters. Results are
//! folded into the shared [`ParseState`] in reference order once the pass joins,
//! so graph edge order does not depend on task completion order.
//!
//! After the tree is resolved the build and init orders are derived and the
//! [`ConditionalExpander`] runs; if conds add libraries the affected manifests
//! are queued again and resolution resumes.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::conds::{expand_manifest_conds, ConditionalExpander, Expansion};
use super::expr::Interp;
use super::graph::DependencyGraph;
use super::manifest::{LibHandled, Manifest, ManifestAdjustments};
use super::paths::{clean_path, expand_all_libs_paths, glob_matcher};
use super::provider::{ComponentProvider, LocalComponent};
use super::reader::{read_manifest, read_root_manifest, MOS_PLATFORM_VAR, MOS_VERSION_VAR};
use super::registry::{NameRegistry, Slot};
use super::swmodule::{identifier_name, NameError, SwModule};
use crate::config::defaults::{
    CORE_LIB_LOCATION, CORE_LIB_NAME, DEPS_APP, LATEST_VERSION, MAX_EXPANSION_FOLDS,
};
use crate::error::{ManifestError, MosbuildError, ResolverError};

/// Manifest whose `libs` are waiting to be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareTarget {
    /// The application manifest
    App,
    /// The own manifest of a resolved library
    Lib(String),
}

impl PrepareTarget {
    /// Graph node name of the target
    pub fn node_name(&self) -> &str {
        match self {
            Self::App => DEPS_APP,
            Self::Lib(name) => name,
        }
    }
}

/// Inputs of one resolution run
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Application directory
    pub app_dir: PathBuf,
    /// Caller-supplied manifest changes
    pub adjustments: ManifestAdjustments,
    /// Fail when neither the manifest nor the adjustments name a platform
    pub require_platform: bool,
    /// Maximum number of concurrent library fetches
    pub parallel: usize,
    /// Fold limit of the conditional expander
    pub max_folds: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            app_dir: PathBuf::from("."),
            adjustments: ManifestAdjustments::default(),
            require_platform: false,
            parallel: num_cpus::get(),
            max_folds: MAX_EXPANSION_FOLDS,
        }
    }
}

/// Mutable state of a resolution run, guarded by one lock
#[derive(Debug, Default)]
pub struct ParseState {
    /// Application manifest
    pub app: Manifest,
    /// Resolved libraries by name
    pub libs_handled: BTreeMap<String, LibHandled>,
    /// Build dependency graph, rooted at `app`
    pub deps: DependencyGraph,
    /// Init dependency graph; may hold glob patterns until expanded
    pub init_deps: DependencyGraph,
    /// Manifests whose `libs` still need resolving
    pub pending: Vec<PrepareTarget>,
    /// Adjustments applied to every library manifest
    pub adjustments: ManifestAdjustments,
    /// Library names in build order
    pub lib_order: Vec<String>,
    /// Library names in init order
    pub init_order: Vec<String>,
    /// Latest modification time of all manifests read
    pub mtime: Option<SystemTime>,
}

impl ParseState {
    /// Fresh state around the application manifest
    pub fn new(app: Manifest, adjustments: ManifestAdjustments) -> Self {
        let mut deps = DependencyGraph::new();
        deps.add_node(DEPS_APP);
        let mut init_deps = DependencyGraph::new();
        init_deps.add_node(DEPS_APP);
        Self {
            app,
            deps,
            init_deps,
            adjustments,
            ..Self::default()
        }
    }

    fn target_manifest_mut(&mut self, target: &PrepareTarget) -> Option<&mut Manifest> {
        match target {
            PrepareTarget::App => Some(&mut self.app),
            PrepareTarget::Lib(name) => self.libs_handled.get_mut(name).and_then(LibHandled::manifest_mut),
        }
    }

    fn touch(&mut self, mtime: SystemTime) {
        self.mtime = Some(self.mtime.map_or(mtime, |m| m.max(mtime)));
    }

    /// Derive the build and init orders from the graphs
    ///
    /// Init graph entries are glob patterns over library names; they are
    /// expanded against the build order before sorting.
    pub fn compute_orders(&mut self) -> Result<(), ResolverError> {
        let mut order = self
            .deps
            .topological(false)
            .map_err(|c| ResolverError::CircularDependency { cycle: c.0 })?;
        order.retain(|n| n != DEPS_APP);

        let mut expanded: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.init_deps.nodes() {
            if node == DEPS_APP {
                continue;
            }
            let keys = expand_glob(node, &order);
            if keys.len() != 1 || keys[0] != node {
                debug!("{node} expanded to {keys:?}");
            }
            let mut node_deps = Vec::new();
            for dep in self.init_deps.deps(node) {
                for d in expand_glob(dep, &order) {
                    if !node_deps.contains(&d) {
                        node_deps.push(d);
                    }
                }
            }
            for key in keys {
                let entry = expanded.entry(key).or_default();
                for d in &node_deps {
                    if !entry.contains(d) {
                        entry.push(d.clone());
                    }
                }
            }
        }

        let mut init_graph = DependencyGraph::new();
        for (node, mut node_deps) in expanded {
            node_deps.sort();
            debug!("{node} init deps: {node_deps:?}");
            if let Some(lh) = self.libs_handled.get_mut(&node) {
                lh.init_deps.clone_from(&node_deps);
            }
            init_graph.add_node_with_deps(&node, &node_deps);
        }
        let init_order = init_graph
            .topological(false)
            .map_err(|c| ResolverError::InitCycle { cycle: c.0 })?;

        for name in &order {
            let deps = self.deps.deps(name).to_vec();
            if let Some(lh) = self.libs_handled.get_mut(name) {
                lh.deps = deps;
            }
        }

        info!("libs_handled: {order:?}");
        info!("init_deps: {init_order:?}");
        self.lib_order = order;
        self.init_order = init_order;
        Ok(())
    }
}

/// Names in `order` matching the glob `pattern`, without duplicates
///
/// A malformed pattern matches nothing.
fn expand_glob(pattern: &str, order: &[String]) -> Vec<String> {
    let Ok(matcher) = glob_matcher(pattern) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for name in order {
        if matcher.is_match(name) && !out.contains(name) {
            out.push(name.clone());
        }
    }
    out
}

/// Process-wide context shared by the tasks of a resolution run
struct ParseContext {
    root_dir: PathBuf,
    provider: Arc<dyn ComponentProvider>,
    registry: NameRegistry<SwModule>,
    interp: Interp,
    libs_version: String,
    state: Mutex<ParseState>,
}

impl ParseContext {
    fn lock_state(&self) -> MutexGuard<'_, ParseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One library reference taken from a pending manifest
#[derive(Debug, Clone)]
struct LibRef {
    parent: PrepareTarget,
    parent_origin: String,
    parent_platform: String,
    parent_no_implicit_init_deps: bool,
    /// Name given by the referring manifest, empty if none
    ref_name: String,
    module: SwModule,
    key: String,
}

/// A library read for the first time
#[derive(Debug)]
struct FreshLib {
    module: SwModule,
    path: String,
    manifest: Manifest,
    mtime: SystemTime,
    component: LocalComponent,
}

#[derive(Debug)]
enum LibOutcome {
    Fresh(Box<FreshLib>),
    /// Name already resolved; carries the module registered first
    Reencounter(SwModule),
    /// The first reference of the name failed; its error is reported instead
    Skipped,
}

/// Result of a resolution run
#[derive(Debug)]
pub struct Resolution {
    /// Folded manifest: libraries in build order, init order, no nested manifests
    pub manifest: Manifest,
    /// Latest modification time of all manifests read
    pub mtime: SystemTime,
    /// Absolute application directory
    pub root_dir: PathBuf,
    /// Interpreter with the run's globals set
    pub interp: Interp,
    /// Libraries the app references directly
    pub app_deps: Vec<String>,
    /// Number of breadth-first passes
    pub passes: usize,
    /// Number of conditional folds
    pub folds: usize,
}

/// Resolves the library tree of an application
pub struct LibraryResolver {
    provider: Arc<dyn ComponentProvider>,
    interp: Interp,
    options: ResolveOptions,
}

impl std::fmt::Debug for LibraryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryResolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LibraryResolver {
    /// Create a resolver; `mos.version` defaults to `latest` if unset
    pub fn new(provider: Arc<dyn ComponentProvider>, mut interp: Interp, options: ResolveOptions) -> Self {
        if interp.globals().get(MOS_VERSION_VAR).is_none() {
            interp.set_global(MOS_VERSION_VAR, LATEST_VERSION);
        }
        Self {
            provider,
            interp,
            options,
        }
    }

    /// Resolve the application's library tree and expand all conds
    pub async fn resolve(&self) -> Result<Resolution, MosbuildError> {
        let root_dir = std::path::absolute(&self.options.app_dir)
            .map(|p| clean_path(&p))
            .map_err(|e| ManifestError::Read {
                path: self.options.app_dir.clone(),
                error: e.to_string(),
            })?;

        let mut interp = self.interp.clone();
        let (app, mtime, adjustments) = self.prepare_app(&root_dir, &mut interp)?;
        let libs_version = app.libs_version.clone();

        let mut state = ParseState::new(app, adjustments);
        state.touch(mtime);
        state.pending.push(PrepareTarget::App);

        let ctx = Arc::new(ParseContext {
            root_dir: root_dir.clone(),
            provider: Arc::clone(&self.provider),
            registry: NameRegistry::new(),
            interp: interp.clone(),
            libs_version,
            state: Mutex::new(state),
        });

        let mut root = read_root_manifest(&interp)?;
        let root_vars = interp.vars_for(&root);
        expand_manifest_conds(&mut root, &root_vars, &interp, false)?;

        let permits = Arc::new(Semaphore::new(self.options.parallel.max(1)));
        let mut expander = ConditionalExpander::new(&interp, self.options.max_folds);
        let mut passes = 0;

        let mut manifest = loop {
            passes += run_pending(&ctx, &permits).await?;

            let mut state = ctx.lock_state();
            state.compute_orders()?;
            match expander.expand(&mut state, &root)? {
                Expansion::Done(m) => break *m,
                Expansion::Restart(targets) => {
                    for target in &targets {
                        if let PrepareTarget::Lib(name) = target {
                            if let Some(lh) = state.libs_handled.get_mut(name) {
                                lh.mark_resolving();
                            }
                        }
                    }
                    state.pending.extend(targets);
                }
            }
        };

        manifest.includes = expand_all_libs_paths(&manifest.includes, &manifest.libs_handled);
        manifest.sources = expand_all_libs_paths(&manifest.sources, &manifest.libs_handled);
        manifest.filesystem = expand_all_libs_paths(&manifest.filesystem, &manifest.libs_handled);
        manifest.binary_libs = expand_all_libs_paths(&manifest.binary_libs, &manifest.libs_handled);

        let folds = expander.folds();
        let (mtime, app_deps) = {
            let state = ctx.lock_state();
            (state.mtime.unwrap_or(mtime), state.deps.deps(DEPS_APP).to_vec())
        };
        Ok(Resolution {
            manifest,
            mtime,
            root_dir,
            interp,
            app_deps,
            passes,
            folds,
        })
    }

    /// Read the app manifest and apply the run-wide adjustments to it
    fn prepare_app(
        &self,
        root_dir: &Path,
        interp: &mut Interp,
    ) -> Result<(Manifest, SystemTime, ManifestAdjustments), MosbuildError> {
        let mut adjustments = self.options.adjustments.clone();
        let (mut app, mtime) = read_manifest(root_dir, &adjustments, interp)?;

        if self.options.require_platform && app.platform.is_empty() {
            return Err(ManifestError::PlatformRequired.into());
        }

        if !app.no_implicit_init_deps && !app.has_lib(CORE_LIB_NAME) {
            app.libs.push(SwModule::new(CORE_LIB_LOCATION));
        }
        for extra in std::mem::take(&mut adjustments.extra_libs) {
            let name = extra.name().unwrap_or_default();
            if !app.has_lib(&name) {
                app.libs.push(extra);
            }
        }

        app.set_var_and_cdef("MGOS", "1");
        app.cdefs
            .extend(adjustments.cdefs.iter().map(|(k, v)| (k.clone(), v.clone())));
        app.cflags.append(&mut adjustments.cflags);
        app.cxxflags.append(&mut adjustments.cxxflags);

        if adjustments.platform.is_empty() {
            adjustments.platform.clone_from(&app.platform);
        }
        interp.set_global(MOS_PLATFORM_VAR, app.platform.clone());

        Ok((app, mtime, adjustments))
    }
}

/// Resolve pending manifests frontier by frontier; returns the number of passes
async fn run_pending(ctx: &Arc<ParseContext>, permits: &Arc<Semaphore>) -> Result<usize, MosbuildError> {
    let mut passes = 0;
    loop {
        let targets = std::mem::take(&mut ctx.lock_state().pending);
        if targets.is_empty() {
            return Ok(passes);
        }
        passes += 1;
        info!("prepare libs pass {passes} ({} manifests)", targets.len());
        run_pass(ctx, permits, &targets).await?;
    }
}

/// Take the `libs` of every target, in target order
fn collect_refs(state: &mut ParseState, targets: &[PrepareTarget]) -> Result<Vec<LibRef>, ManifestError> {
    let mut refs = Vec::new();
    for target in targets {
        let Some(manifest) = state.target_manifest_mut(target) else {
            continue;
        };
        let libs = std::mem::take(&mut manifest.libs);
        for mut module in libs {
            let ref_name = module.name.clone();
            let origin = manifest.origin.clone();
            module.normalize().map_err(|e| name_error(e, &origin))?;
            let key = module.name().map_err(|e| name_error(e, &origin))?;
            refs.push(LibRef {
                parent: target.clone(),
                parent_origin: origin,
                parent_platform: manifest.platform.clone(),
                parent_no_implicit_init_deps: manifest.no_implicit_init_deps,
                ref_name,
                module,
                key,
            });
        }
    }
    Ok(refs)
}

fn name_error(e: NameError, origin: &str) -> ManifestError {
    match e {
        NameError::Invalid(name) => ManifestError::InvalidName {
            origin: origin.to_string(),
            name,
        },
        NameError::Missing => ManifestError::NoName {
            origin: origin.to_string(),
        },
    }
}

/// Resolve one frontier and fold the outcomes into the state
async fn run_pass(
    ctx: &Arc<ParseContext>,
    permits: &Arc<Semaphore>,
    targets: &[PrepareTarget],
) -> Result<(), MosbuildError> {
    let (refs, adjustments) = {
        let mut state = ctx.lock_state();
        let refs = collect_refs(&mut state, targets)?;
        (refs, Arc::new(state.adjustments.clone()))
    };

    let mut claimed = HashSet::new();
    let mut join_set = JoinSet::new();
    for (index, lib_ref) in refs.iter().cloned().enumerate() {
        let ctx = Arc::clone(ctx);
        let owns = !ctx.registry.contains(&lib_ref.key) && claimed.insert(lib_ref.key.clone());
        if owns {
            let slot = ctx.registry.add_or_fetch_and_lock(&lib_ref.key).await;
            let permits = Arc::clone(permits);
            let adjustments = Arc::clone(&adjustments);
            join_set.spawn(async move { (index, prepare_first(ctx, lib_ref, slot, permits, adjustments).await) });
        } else {
            join_set.spawn(async move { (index, prepare_again(ctx, lib_ref).await) });
        }
    }

    let mut outcomes: Vec<Option<LibOutcome>> = (0..refs.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(outcome))) => outcomes[index] = Some(outcome),
            Ok((_, Err(e))) => {
                join_set.detach_all();
                return Err(e);
            }
            Err(e) => {
                join_set.detach_all();
                return Err(ResolverError::TaskFailed { error: e.to_string() }.into());
            }
        }
    }

    let mut state = ctx.lock_state();
    for (lib_ref, outcome) in refs.iter().zip(outcomes) {
        match outcome {
            Some(LibOutcome::Fresh(fresh)) => apply_fresh(&mut state, lib_ref, *fresh),
            Some(LibOutcome::Reencounter(had)) => apply_reencounter(&mut state, lib_ref, &had),
            Some(LibOutcome::Skipped) | None => {}
        }
    }
    for target in targets {
        if let PrepareTarget::Lib(name) = target {
            if let Some(lh) = state.libs_handled.get_mut(name) {
                lh.mark_resolved();
            }
        }
    }
    Ok(())
}

/// First reference of a name: fetch the library and read its manifest
async fn prepare_first(
    ctx: Arc<ParseContext>,
    lib_ref: LibRef,
    mut slot: Slot<SwModule>,
    permits: Arc<Semaphore>,
    adjustments: Arc<ManifestAdjustments>,
) -> Result<LibOutcome, MosbuildError> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| ResolverError::TaskFailed { error: e.to_string() })?;

    let mut module = lib_ref.module;
    info!("reading lib {:?} at {:?}", lib_ref.key, module.location);

    let component = fetch_lib(&ctx, &module, &lib_ref.key, &lib_ref.parent_origin, &lib_ref.parent_platform).await?;
    let dir = clean_path(&ctx.root_dir.join(&component.path));
    let (manifest, mtime) = read_manifest(&dir, &adjustments, &ctx.interp)?;

    // The name in use comes from the library manifest, the reference, or the
    // location, in that order; the first two must agree when both are set.
    if !manifest.name.is_empty() {
        if !lib_ref.ref_name.is_empty() && lib_ref.ref_name != manifest.name {
            return Err(ResolverError::NameMismatch {
                lib_name: manifest.name,
                location: module.location,
                referred_as: lib_ref.ref_name,
                referrer: lib_ref.parent_origin,
            }
            .into());
        }
        let in_use = module.name().unwrap_or_default();
        if lib_ref.ref_name.is_empty() && in_use != manifest.name {
            return Err(ResolverError::NameRequired {
                lib_name: manifest.name,
                location: module.location,
                referrer: lib_ref.parent_origin,
            }
            .into());
        }
    }
    if !lib_ref.ref_name.is_empty() {
        module.name = lib_ref.ref_name;
    }
    module.name = module.name().map_err(|e| name_error(e, &lib_ref.parent_origin))?;

    info!("handling lib {:?} at {:?}", module.name, module.location);
    *slot = Some(module.clone());

    Ok(LibOutcome::Fresh(Box::new(FreshLib {
        module,
        path: dir.to_string_lossy().into_owned(),
        manifest,
        mtime,
        component,
    })))
}

/// Later reference of a name: wait for the first one to finish
async fn prepare_again(ctx: Arc<ParseContext>, lib_ref: LibRef) -> Result<LibOutcome, MosbuildError> {
    let slot = ctx.registry.add_or_fetch_and_lock(&lib_ref.key).await;
    Ok(match &*slot {
        Some(had) => LibOutcome::Reencounter(had.clone()),
        None => LibOutcome::Skipped,
    })
}

/// Ask the provider for the library, retrying with `latest` for unpinned references
async fn fetch_lib(
    ctx: &ParseContext,
    module: &SwModule,
    name: &str,
    origin: &str,
    platform: &str,
) -> Result<LocalComponent, ResolverError> {
    let fetch_error = |source| ResolverError::Fetch {
        origin: origin.to_string(),
        name: name.to_string(),
        source,
    };
    match ctx
        .provider
        .lib_local_path(module, &ctx.root_dir, &ctx.libs_version, platform)
        .await
    {
        Ok(component) => Ok(component),
        Err(e) if module.version.is_empty() && ctx.libs_version != LATEST_VERSION => {
            warn!(
                "{name}: failed to fetch version {:?} ({e}), trying {LATEST_VERSION:?}",
                ctx.libs_version
            );
            ctx.provider
                .lib_local_path(module, &ctx.root_dir, LATEST_VERSION, platform)
                .await
                .map_err(fetch_error)
        }
        Err(e) => Err(fetch_error(e)),
    }
}

fn apply_fresh(state: &mut ParseState, lib_ref: &LibRef, fresh: FreshLib) {
    let FreshLib {
        module,
        path,
        manifest,
        mtime,
        component,
    } = fresh;
    let name = module.name.clone();
    let parent = lib_ref.parent.node_name();

    state.deps.add_dep(parent, &name);
    state.init_deps.add_node(&name);
    if !lib_ref.parent_no_implicit_init_deps {
        state.init_deps.add_dep(parent, &name);
    }

    let have = format!("MGOS_HAVE_{}", identifier_name(&name).to_uppercase());
    if let Some(pm) = state.target_manifest_mut(&lib_ref.parent) {
        pm.set_var_and_cdef(&have, "1");
    }

    state.init_deps.add_node_with_deps(&name, &manifest.init_after);
    if !manifest.no_implicit_init_deps && name != CORE_LIB_NAME {
        state.init_deps.add_dep(&name, CORE_LIB_NAME);
    }
    for dep in &manifest.init_before {
        state.init_deps.add_node_with_deps(dep, &[name.as_str()]);
    }

    let mut lh = LibHandled::new(module, path, manifest);
    lh.repo_version = component.repo_version;
    lh.repo_dirty = component.dirty;
    state.libs_handled.insert(name.clone(), lh);
    state.pending.push(PrepareTarget::Lib(name));
    state.touch(mtime);
}

fn apply_reencounter(state: &mut ParseState, lib_ref: &LibRef, had: &SwModule) {
    if had.location == lib_ref.module.location {
        debug!("lib {:?} at {:?}: already handled", had.name, had.location);
    } else {
        info!(
            "lib {:?} at {:?}: overridden by same at {:?}",
            had.name, lib_ref.module.location, had.location
        );
    }

    let parent = lib_ref.parent.node_name();
    state.deps.add_dep(parent, &had.name);
    if !lib_ref.parent_no_implicit_init_deps {
        state.init_deps.add_dep(parent, &had.name);
    }

    if lib_ref.parent == PrepareTarget::App && !lib_ref.module.variant.is_empty() {
        if let Some(lh) = state.libs_handled.get_mut(&had.name) {
            debug!("{} variant: {:?} -> {:?}", had.name, lh.lib.variant, lib_ref.module.variant);
            lh.lib.variant.clone_from(&lib_ref.module.variant);
        }
    }
}
