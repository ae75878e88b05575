//! Builtin Rules
//!
//! The core Jam rules implemented natively. Dispatch is case-insensitive,
//! so `DEPENDS`, `Depends` and `depends` all reach the same entry. Builtins
//! shadow user rules of the same name.

use regex_lite::Regex;
use tracing::warn;

use crate::interpreter::state::State;
use crate::interpreter::types::{lol_get, ExecError, LolVal, Value};
use crate::pattern;

/// Invoke a builtin. Returns `None` when `name` is not a builtin.
pub fn call_builtin(
    state: &mut State,
    name: &str,
    lol: &LolVal,
) -> Option<Result<Value, ExecError>> {
    let result = match name.to_ascii_lowercase().as_str() {
        "always" => always(state, lol),
        "depends" => depends(state, lol),
        "echo" => echo(state, lol),
        "exit" => exit(state, lol),
        "generated" => generated(state, lol),
        "glob" => glob(state, lol),
        "includes" => includes(state, lol),
        "leaves" => accept(state, lol),
        "locate" => set_target_var(state, lol, "LOCATE"),
        "match" => match_rule(state, lol),
        "mkdir" => mkdir(state, lol),
        "nocare" => accept(state, lol),
        "notfile" => notfile(state, lol),
        "noupdate" => accept(state, lol),
        "restat" => restat(state, lol),
        "search" => set_target_var(state, lol, "SEARCH"),
        "subst" => subst(state, lol),
        "temporary" => temporary(state, lol),
        _ => return None,
    };
    Some(result)
}

fn ok() -> Result<Value, ExecError> {
    Ok(Vec::new())
}

fn always(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.always_build.insert(tid);
    }
    ok()
}

fn depends(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let deps = lol_get(lol, 1).to_vec();
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.add_depends(tid, &deps);
    }
    ok()
}

fn includes(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let incs = lol_get(lol, 1).to_vec();
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.add_includes(tid, &incs);
    }
    ok()
}

fn echo(_state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    println!("{}", lol_get(lol, 0).join(" "));
    ok()
}

fn exit(_state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    Err(ExecError::Exit {
        message: lol_get(lol, 0).join(" "),
    })
}

fn notfile(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.get_mut(tid).notfile = true;
    }
    ok()
}

fn temporary(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.get_mut(tid).temporary = true;
    }
    ok()
}

fn restat(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.get_mut(tid).restat = true;
    }
    ok()
}

fn generated(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.get_mut(tid).generated = true;
    }
    ok()
}

// NOCARE, NOUPDATE and LEAVES bind their targets but carry no meaning
// here: rebuild accounting belongs to ninja.
fn accept(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    for name in lol_get(lol, 0).to_vec() {
        state.targets.bind(&name);
    }
    ok()
}

/// MKDIR marks directory targets and maintains the `dirs` aggregate that
/// directory dependencies collapse into.
fn mkdir(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let dirs = state.targets.bind_notfile("dirs");
    state.targets.get_mut(dirs).notfile = true;
    state.targets.get_mut(dirs).is_dirs_target = true;
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state.targets.get_mut(tid).is_dir = true;
        if tid != dirs {
            state.targets.get_mut(dirs).depends.insert(tid);
        }
    }
    ok()
}

fn set_target_var(state: &mut State, lol: &LolVal, var: &str) -> Result<Value, ExecError> {
    let value = lol_get(lol, 1).to_vec();
    for name in lol_get(lol, 0).to_vec() {
        let tid = state.targets.bind(&name);
        state
            .targets
            .get_mut(tid)
            .vars
            .insert(var.to_string(), value.clone());
    }
    ok()
}

/// GLOB dirs : patterns. Directory entries matching any pattern, as
/// dir-joined paths.
fn glob(state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let patterns = lol_get(lol, 1).to_vec();
    let mut out = Vec::new();
    for dir in lol_get(lol, 0).to_vec() {
        let entries = match state.fs.list_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries {
            if patterns.iter().any(|p| pattern::matches(p, &entry)) {
                out.push(format!("{}/{}", dir.trim_end_matches('/'), entry));
            }
        }
    }
    Ok(out)
}

/// MATCH regexps : list. The union of capture groups over all matches.
fn match_rule(_state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let strings = lol_get(lol, 1).to_vec();
    let mut out = Vec::new();
    for pattern in lol_get(lol, 0).to_vec() {
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!("MATCH: bad pattern '{}': {}", pattern, err);
                continue;
            }
        };
        for s in &strings {
            for caps in re.captures_iter(s) {
                if caps.len() > 1 {
                    for group in caps.iter().skip(1).flatten() {
                        out.push(group.as_str().to_string());
                    }
                } else if let Some(whole) = caps.get(0) {
                    out.push(whole.as_str().to_string());
                }
            }
        }
    }
    Ok(out)
}

/// SUBST list : pattern : replacement. Regex replacement over each element.
fn subst(_state: &mut State, lol: &LolVal) -> Result<Value, ExecError> {
    let strings = lol_get(lol, 0).to_vec();
    let pattern = lol_get(lol, 1).first().cloned().unwrap_or_default();
    let replacement = lol_get(lol, 2).first().cloned().unwrap_or_default();
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(err) => {
            warn!("SUBST: bad pattern '{}': {}", pattern, err);
            return Ok(strings);
        }
    };
    Ok(strings
        .iter()
        .map(|s| re.replace_all(s, replacement.as_str()).into_owned())
        .collect())
}
