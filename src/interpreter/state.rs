//! Interpreter State
//!
//! `State` owns everything the evaluator and emitter touch: the variable
//! scopes, rule and action tables, the target arena, the ordered build
//! steps and the various once-per-process caches. It has a single
//! exclusive owner at any time, so nothing here needs interior mutability.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::compile::{compile, Cmd};
use crate::fs::{FileProvider, RealFs};
use crate::graph::target::{BuildStep, TargetId, Targets};
use crate::interpreter::types::{Action, ExecError, LolVal, Rule, Value};
use crate::parser::parse;
use crate::paths::{host_platform, Platform};

pub const JAM_VERSION: &str = "2.5.5";

/// Environment variables never imported into the global scope.
const DELETE_VARS: &[&str] = &["LS_COLORS", "GITHUB_TOKEN"];

/// Variables split into lists on the platform path separator.
const PATH_VARS: &[&str] = &[
    "PATH",
    "LD_LIBRARY_PATH",
    "PKG_CONFIG_PATH",
    "CLASSPATH",
    "PYTHONPATH",
];

/// Platform symbol lookup (VMS DCL symbols). Optional collaborator.
pub trait SymbolProvider {
    fn get_symbol(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFlags {
    pub headers: bool,
    pub deps: bool,
    pub include: bool,
    pub env: bool,
}

// =============================================================================
// VARIABLE SCOPES
// =============================================================================

/// The dynamic scope stack. The bottom scope is global and initialises from
/// the process environment; `push`/`pop` bracket rule bodies, included
/// files and block statements.
#[derive(Debug)]
pub struct Vars {
    scopes: Vec<HashMap<String, Value>>,
}

impl Vars {
    pub fn new(platform: Platform, debug_env: bool) -> Self {
        let env: Vec<(String, String)> = std::env::vars().collect();
        Self::from_env(env, platform, debug_env)
    }

    /// Build the global scope from an explicit environment snapshot.
    pub fn from_env(
        env: Vec<(String, String)>,
        platform: Platform,
        debug_env: bool,
    ) -> Self {
        let mut global: HashMap<String, Value> = HashMap::new();

        for (key, val) in env {
            if DELETE_VARS.contains(&key.as_str()) {
                continue;
            }
            if PATH_VARS.contains(&key.as_str()) {
                let parts = val
                    .split(platform.path_separator())
                    .map(str::to_string)
                    .collect();
                global.insert(key, parts);
            } else {
                global.insert(key, vec![val]);
            }
        }

        let os_flag = if platform.is_vms {
            "VMS"
        } else if platform.is_windows {
            "NT"
        } else {
            "UNIX"
        };
        global.insert(os_flag.to_string(), vec!["1".to_string()]);
        global.insert(
            "OSPLAT".to_string(),
            vec![std::env::consts::ARCH.to_string()],
        );
        global.insert(
            "OS".to_string(),
            vec![std::env::consts::OS.to_uppercase()],
        );
        global.insert(
            "JAMUNAME".to_string(),
            vec![
                std::env::consts::OS.to_string(),
                std::env::consts::ARCH.to_string(),
            ],
        );
        global.insert("JAMVERSION".to_string(), vec![JAM_VERSION.to_string()]);

        if debug_env {
            for (key, val) in &global {
                debug!("{}={:?}", key, val);
            }
        }

        Vars {
            scopes: vec![global],
        }
    }

    /// Mutate the innermost scope already defining `name`; undefined names
    /// land in the global scope.
    pub fn set(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.insert(name.to_string(), value);
                return;
            }
        }
        self.scopes[0].insert(name.to_string(), value);
    }

    /// Always write the current scope: rule parameters and `local`s.
    pub fn set_local(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), value);
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.scopes[0].insert(name.to_string(), value);
    }

    /// Innermost definition of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Default)]
pub struct StateConfig {
    pub verbose: bool,
    pub debug: DebugFlags,
    pub limit_target: Option<String>,
    pub platform: Option<Platform>,
    pub fs: Option<Arc<dyn FileProvider>>,
    /// Environment override for tests; `None` reads the process environment.
    pub env: Option<Vec<(String, String)>>,
}

/// Container of the whole evaluation: variables, rules, actions, targets
/// and build steps, plus caches and diagnostics switches.
pub struct State {
    pub vars: Vars,
    /// The target-context stack for `on target` lookups.
    pub current_target: Vec<TargetId>,
    pub rules: IndexMap<String, Rc<Rule>>,
    pub actions: IndexMap<String, Rc<Action>>,
    pub targets: Targets,
    pub current_rule: Option<Rc<Rule>>,
    /// The LoL of the rule invocation currently executing.
    pub params: Option<LolVal>,
    pub always_build: BTreeSet<TargetId>,
    /// Insertion order is emission order.
    pub build_steps: Vec<BuildStep>,
    /// Reverse boundname -> target map.
    pub target_locations: HashMap<String, TargetId>,
    pub complained_rules: HashSet<String>,
    pub headers_complained: bool,
    pub scan_skipped: HashSet<String>,
    /// Header scan cache keyed by (filename, patterns).
    pub scan_cache: HashMap<(String, Vec<String>), Option<Vec<String>>>,
    is_dir_cache: HashMap<String, bool>,
    sub_root_memo: Option<Option<String>>,
    pub verbose: bool,
    pub debug: DebugFlags,
    /// Limit debug output to targets whose name contains this.
    pub limit_target: Option<String>,
    pub platform: Platform,
    pub symbols: Option<Box<dyn SymbolProvider>>,
    pub fs: Arc<dyn FileProvider>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        let platform = config.platform.unwrap_or_else(host_platform);
        let vars = match config.env {
            Some(env) => Vars::from_env(env, platform, config.debug.env),
            None => Vars::new(platform, config.debug.env),
        };
        let fs: Arc<dyn FileProvider> = config.fs.unwrap_or_else(|| Arc::new(RealFs::new()));

        let mut state = State {
            vars,
            current_target: Vec::new(),
            rules: IndexMap::new(),
            actions: IndexMap::new(),
            targets: Targets::default(),
            current_rule: None,
            params: None,
            always_build: BTreeSet::new(),
            build_steps: Vec::new(),
            target_locations: HashMap::new(),
            complained_rules: HashSet::new(),
            headers_complained: false,
            scan_skipped: HashSet::new(),
            scan_cache: HashMap::new(),
            is_dir_cache: HashMap::new(),
            sub_root_memo: None,
            verbose: config.verbose,
            debug: config.debug,
            limit_target: config.limit_target,
            platform,
            symbols: None,
            fs,
        };
        // accumulates generated headers for order-only emission
        state.targets.bind_notfile("_gen_headers");
        state
    }

    pub fn parse_and_compile(
        &mut self,
        contents: &str,
        filename: Option<&str>,
    ) -> Result<Vec<Cmd>, ExecError> {
        let ast = parse(contents, filename)?;
        Ok(compile(&ast))
    }

    /// Variable lookup: active target contexts first, then the scope
    /// stack, then the optional platform symbol provider.
    pub fn get_var(&mut self, name: &str) -> Value {
        for &tid in self.current_target.iter().rev() {
            if let Some(val) = self.targets.get(tid).vars.get(name) {
                return val.clone();
            }
        }
        if let Some(val) = self.vars.lookup(name) {
            return val.clone();
        }
        self.check_symbol(name).unwrap_or_default()
    }

    /// Lookup under a temporary extra target context.
    pub fn get_var_on(&mut self, name: &str, on_target: Option<TargetId>) -> Value {
        match on_target {
            Some(tid) => {
                self.current_target.push(tid);
                let val = self.get_var(name);
                self.current_target.pop();
                val
            }
            None => self.get_var(name),
        }
    }

    /// Whether `name` is defined in any scope, ignoring target contexts.
    /// Used by `?=` and `default =`.
    pub fn defined(&self, name: &str) -> Option<&Value> {
        self.vars.lookup(name)
    }

    fn check_symbol(&mut self, name: &str) -> Option<Value> {
        if !self.platform.is_vms {
            return None;
        }
        let val = self.symbols.as_ref()?.get_symbol(name)?;
        let value = vec![val];
        // symbols read once land in the global scope
        self.vars.set_global(name, value.clone());
        if self.debug.env {
            debug!("{}={:?}", name, value);
        }
        Some(value)
    }

    /// Whether a path names a directory: the filesystem first, then
    /// targets the MkDir machinery marked as directories.
    pub fn is_dir(&mut self, name: &str) -> bool {
        if let Some(&cached) = self.is_dir_cache.get(name) {
            return cached;
        }
        let result = (self.platform.is_vms && name.ends_with(']'))
            || self.fs.is_dir(name)
            || self
                .targets
                .lookup(name)
                .map_or(false, |tid| self.targets.get(tid).is_dir);
        self.is_dir_cache.insert(name.to_string(), result);
        result
    }

    /// The configured source root: `SUBDIR_ROOT`, else `NINJA_ROOTDIR`.
    pub fn sub_root(&mut self) -> Option<String> {
        if let Some(memo) = &self.sub_root_memo {
            return memo.clone();
        }
        let mut root = self.get_var("SUBDIR_ROOT");
        if root.is_empty() {
            root = self.get_var("NINJA_ROOTDIR");
        }
        let result = root.into_iter().next();
        if self.verbose {
            debug!("source root: {:?}", result);
        }
        self.sub_root_memo = Some(result.clone());
        result
    }
}
