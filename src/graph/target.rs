//! Build Targets
//!
//! Targets live in a flat arena and reference each other through stable
//! `TargetId` handles, so the `depends`/`includes` graph carries no
//! ownership cycles and cycle repair is a pure graph operation. A target is
//! created on first mention and never destroyed.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::prelude::DiGraphMap;
use tracing::{debug, info};

use crate::interpreter::state::State;
use crate::interpreter::types::{Action, LolVal, Value};
use crate::paths::{Pathname, Platform};

/// Stable handle into the target arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(pub u32);

/// A node in the dependency graph, file or phony.
#[derive(Debug, Default)]
pub struct Target {
    pub name: String,
    pub depends: BTreeSet<TargetId>,
    pub includes: BTreeSet<TargetId>,
    /// Resolved filesystem path, set by the bind pass.
    pub boundname: Option<String>,
    /// Index into `state.build_steps` once scheduled.
    pub build_step: Option<usize>,
    /// Created by the MkDir machinery.
    pub is_dir: bool,
    /// Suffix is one of `.h` `.hpp` `.hh`; set during search.
    pub is_header: bool,
    /// Appears as an action output somewhere.
    pub is_output: bool,
    /// The special `dirs` aggregate itself.
    pub is_dirs_target: bool,
    /// Force the ninja `generator` option.
    pub generated: bool,
    /// Force the ninja `restat` option.
    pub restat: bool,
    /// If this include target has dependencies of its own, they collapse
    /// into one synthetic phony; this is its member set.
    pub collection: Option<BTreeSet<String>>,
    /// Dependency cache for collation without an output filter.
    pub deps: Option<BTreeSet<String>>,
    /// Target-level variables (`on <target>` assignments and friends).
    pub vars: HashMap<String, Value>,
    pub temporary: bool,
    pub notfile: bool,
    /// Headers found by the scanner; `Some` marks the target as scanned.
    pub headers: Option<Vec<String>>,
    /// The bindlist variable that exposed this target as a generated file.
    pub bind_varname: Option<String>,
}

impl Target {
    fn new(name: &str, notfile: bool) -> Self {
        Target {
            name: name.to_string(),
            notfile,
            ..Target::default()
        }
    }
}

/// Synthetic phony name aggregating an included target with its deps.
pub fn collection_name(target: &Target, platform: Platform) -> String {
    let mut name = target.name.clone();
    if platform.is_vms {
        // : is a special escape for VMS paths
        name = name.replace(':', "_").to_lowercase();
    }
    format!("_{}_", name)
}

/// The target arena. Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct Targets {
    arena: Vec<Target>,
    index: IndexMap<String, TargetId>,
}

impl Targets {
    /// Look up a target by name, creating it on first mention.
    pub fn bind(&mut self, name: &str) -> TargetId {
        self.bind_with(name, false)
    }

    pub fn bind_notfile(&mut self, name: &str) -> TargetId {
        self.bind_with(name, true)
    }

    fn bind_with(&mut self, name: &str, notfile: bool) -> TargetId {
        if let Some(&tid) = self.index.get(name) {
            return tid;
        }
        let tid = TargetId(self.arena.len() as u32);
        self.arena.push(Target::new(name, notfile));
        self.index.insert(name.to_string(), tid);
        tid
    }

    pub fn lookup(&self, name: &str) -> Option<TargetId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, tid: TargetId) -> &Target {
        &self.arena[tid.0 as usize]
    }

    pub fn get_mut(&mut self, tid: TargetId) -> &mut Target {
        &mut self.arena[tid.0 as usize]
    }

    /// Snapshot of all handles in insertion order.
    pub fn ids(&self) -> Vec<TargetId> {
        (0..self.arena.len() as u32).map(TargetId).collect()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Add dependency edges, binding names as needed. Self-edges are dropped.
    pub fn add_depends(&mut self, tid: TargetId, names: &[String]) {
        for name in names {
            let dep = self.bind(name);
            if dep != tid {
                self.get_mut(tid).depends.insert(dep);
            }
        }
    }

    pub fn add_includes(&mut self, tid: TargetId, names: &[String]) {
        for name in names {
            let inc = self.bind(name);
            if inc != tid {
                self.get_mut(tid).includes.insert(inc);
            }
        }
    }
}

// =============================================================================
// BUILD STEPS
// =============================================================================

/// One action scheduled against concrete targets at a call site. A build
/// step owns one root `UpdatingAction`; later same-target invocations are
/// `link`ed as children and share the step's build statement.
#[derive(Debug, Clone)]
pub struct UpdatingAction {
    pub action: Rc<Action>,
    pub targets: Vec<TargetId>,
    pub sources: Vec<TargetId>,
    /// The invocation LoL; columns past targets/sources are `$(3)`…
    pub params: LolVal,
    pub next: Vec<UpdatingAction>,
    /// True when this action was `link`ed under another one.
    pub linked: bool,
    /// Ninja rule name, assigned during emission.
    pub rule_name: String,
    /// Expanded command cache.
    pub command: Option<String>,
    pub restat: bool,
    pub generator: bool,
    pub depfile: Option<String>,
    pub bindvars: Vec<String>,
}

impl UpdatingAction {
    pub fn new(action: Rc<Action>, sources: Vec<TargetId>, params: LolVal) -> Self {
        UpdatingAction {
            action,
            targets: Vec::new(),
            sources,
            params,
            next: Vec::new(),
            linked: false,
            rule_name: String::new(),
            command: None,
            restat: false,
            generator: false,
            depfile: None,
            bindvars: Vec::new(),
        }
    }

    /// Append a follow-up action applied to the same targets.
    pub fn link(&mut self, mut ua: UpdatingAction) {
        ua.linked = true;
        self.next.push(ua);
    }

    /// Only alone steps are candidates for rule deduplication.
    pub fn is_alone(&self) -> bool {
        self.next.is_empty() && !self.linked
    }
}

/// One entry of `state.build_steps`; becomes one `build` statement.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub targets: Vec<TargetId>,
    pub action: UpdatingAction,
}

// =============================================================================
// BINDING AND SEARCH
// =============================================================================

/// Resolve the target's location, then register it for reverse lookups.
pub fn bind_location(state: &mut State, tid: TargetId, strict: bool) {
    if state.targets.get(tid).boundname.is_none() {
        let bn = search(state, tid, strict);
        state.targets.get_mut(tid).boundname = bn;

        let (is_output, is_header) = {
            let t = state.targets.get(tid);
            (t.is_output, t.is_header)
        };
        if is_output && is_header {
            let gen_headers = state.targets.bind("_gen_headers");
            if gen_headers != tid {
                state.targets.get_mut(gen_headers).depends.insert(tid);
            }
        }
    }

    if let Some(bn) = state.targets.get(tid).boundname.clone() {
        state.target_locations.insert(bn, tid);
    }
}

/// Construct the full path for a target using its `LOCATE` and `SEARCH`
/// variables, or fall back to the plain name when not `strict`. Strict
/// binding is used for headers, where a bare name is worse than nothing.
pub fn search(state: &mut State, tid: TargetId, strict: bool) -> Option<String> {
    let (name, notfile) = {
        let t = state.targets.get(tid);
        (t.name.clone(), t.notfile)
    };
    if notfile {
        return None;
    }

    let platform = state.platform;
    let mut path = Pathname::parse(&name);
    state.targets.get_mut(tid).is_header =
        matches!(path.suffix.as_str(), ".h" | ".hpp" | ".hh");

    if !path.member.is_empty() {
        return None;
    }

    // the grist qualifies the target name, not the filename
    path.grist.clear();

    let locate = state.get_var_on("LOCATE", Some(tid));
    if !locate.is_empty() {
        path.root = locate[0].clone();
        return Some(path.build_for(true, platform));
    }

    for search_dir in state.get_var_on("SEARCH", Some(tid)) {
        path.root = search_dir;
        let candidate = path.build_for(true, platform);
        // a generated file shadows a stale on-disk file of the same name
        if state.target_locations.contains_key(&candidate) {
            return Some(candidate);
        }
        if state.fs.exists(&candidate) {
            return Some(candidate);
        }
    }

    let mut plain = Pathname::parse(&name);
    plain.grist.clear();
    let candidate = plain.build_for(true, platform);
    if strict {
        if state.fs.exists(&candidate) {
            Some(candidate)
        } else {
            None
        }
    } else {
        Some(candidate)
    }
}

// =============================================================================
// DEPENDENCY COLLATION
// =============================================================================

/// The set of path strings this target depends on, for emission.
///
/// Phony dependencies contribute their name; directory dependencies
/// collapse into the `dirs` token; includes recurse up to depth 10 and may
/// collapse into a synthetic collection phony; anything listed in `outputs`
/// is filtered to keep Ninja free of self-loops.
pub fn get_dependency_list(
    state: &mut State,
    tid: TargetId,
    level: u32,
    outputs: Option<&BTreeSet<String>>,
) -> BTreeSet<String> {
    let mut res = BTreeSet::new();
    let use_cached = outputs.map_or(true, |o| o.len() == 1);

    if level == 10 {
        // do not go too deep for includes
        return res;
    }

    if use_cached {
        if let Some(deps) = &state.targets.get(tid).deps {
            return deps.clone();
        }
    }

    let platform = state.platform;
    let (self_notfile, self_is_dirs) = {
        let t = state.targets.get(tid);
        (t.notfile, t.is_dirs_target)
    };
    let depends: Vec<TargetId> = state.targets.get(tid).depends.iter().copied().collect();

    for &dep in &depends {
        let (notfile, boundname, name) = {
            let t = state.targets.get(dep);
            (t.notfile, t.boundname.clone(), t.name.clone())
        };
        let depval = if notfile {
            Some(name)
        } else if let Some(bn) = boundname {
            if !self_is_dirs && state.is_dir(&bn) {
                res.insert("dirs".to_string());
                continue;
            }
            Some(bn)
        } else {
            None
        };
        if let Some(depval) = depval {
            if outputs.map_or(false, |o| o.contains(&depval)) {
                continue;
            }
            res.insert(depval);
        }
    }

    if !self_notfile {
        let includes: Vec<TargetId> =
            state.targets.get(tid).includes.iter().copied().collect();
        for inc in includes {
            if use_cached && state.targets.get(inc).collection.is_some() {
                res.insert(collection_name(state.targets.get(inc), platform));
                continue;
            }

            let (notfile, boundname, name) = {
                let t = state.targets.get(inc);
                (t.notfile, t.boundname.clone(), t.name.clone())
            };
            let depval = if notfile {
                Some(name)
            } else if let Some(bn) = boundname {
                if state.target_locations.contains_key(&bn) || state.fs.is_file(&bn) {
                    Some(bn)
                } else {
                    None
                }
            } else {
                None
            };
            let Some(mut depval) = depval else { continue };
            if outputs.map_or(false, |o| o.contains(&depval)) {
                continue;
            }

            let has_edges = {
                let t = state.targets.get(inc);
                !t.depends.is_empty() || !t.includes.is_empty()
            };
            if has_edges {
                let inner = get_dependency_list(state, inc, level + 1, outputs);
                if !use_cached {
                    res.extend(inner);
                } else if !inner.is_empty() {
                    let mut members = BTreeSet::new();
                    members.insert(depval.clone());
                    members.extend(inner);
                    let t = state.targets.get_mut(inc);
                    t.collection = Some(members);
                    depval = collection_name(t, platform);
                }
            }
            res.insert(depval);
        }

        // fold in dependencies of sources nothing builds
        for &dep in &depends {
            let (notfile, has_step) = {
                let t = state.targets.get(dep);
                (t.notfile, t.build_step.is_some())
            };
            if notfile || has_step {
                continue;
            }
            let inner = get_dependency_list(state, dep, 0, outputs);
            res.extend(inner);
        }
    }

    if state.debug.deps {
        let name = &state.targets.get(tid).name;
        match &state.limit_target {
            Some(limit) if !name.contains(limit.as_str()) => {}
            _ => debug!("{} {:?}", name, res),
        }
    }

    if use_cached {
        state.targets.get_mut(tid).deps = Some(res.clone());
    }
    res
}

// =============================================================================
// CYCLE REPAIR
// =============================================================================

/// Break simple cycles in the `depends ∪ includes` graph reachable from
/// `root` by dropping an `includes` edge on each cycle.
pub fn search_for_cycles(state: &mut State, root: TargetId) {
    let mut graph: DiGraphMap<TargetId, ()> = DiGraphMap::new();
    graph.add_node(root);

    let mut stack = vec![root];
    let mut visited: HashSet<TargetId> = HashSet::new();
    while let Some(tid) = stack.pop() {
        if !visited.insert(tid) {
            continue;
        }
        let t = state.targets.get(tid);
        let edges: Vec<TargetId> = t.includes.iter().chain(t.depends.iter()).copied().collect();
        for other in edges {
            let _ = graph.add_edge(tid, other, ());
            stack.push(other);
        }
    }

    loop {
        let mut removed = false;
        for scc in tarjan_scc(&graph) {
            if scc.len() < 2 {
                continue;
            }
            let members: HashSet<TargetId> = scc.iter().copied().collect();
            let mut broke = false;
            'hunt: for &u in &scc {
                let incs: Vec<TargetId> =
                    state.targets.get(u).includes.iter().copied().collect();
                for v in incs {
                    if members.contains(&v) {
                        debug!(
                            "removed circular dependency: {} from {}",
                            state.targets.get(v).name,
                            state.targets.get(u).name
                        );
                        state.targets.get_mut(u).includes.remove(&v);
                        let _ = graph.remove_edge(u, v);
                        removed = true;
                        broke = true;
                        break 'hunt;
                    }
                }
            }
            if !broke {
                // a pure depends cycle cannot be repaired here; ninja
                // reports it with file context
                info!(
                    "dependency cycle through {} left in place",
                    state.targets.get(scc[0]).name
                );
            }
        }
        if !removed {
            break;
        }
    }
}
