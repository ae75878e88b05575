//! Header Scanner
//!
//! Recursive include discovery. For each bound target whose `HDRSCAN`
//! (regexes) and `HDRRULE` (rule names) are both set, the file is read,
//! capture-group matches are collected, and each `HDRRULE` runs with
//! `[[target], [headers...]]` under the target's variable overlay. The
//! standard HdrRule calls `INCLUDES`/`DEPENDS`, feeding results back into
//! the graph; scanning recurses into the new includes up to depth 10.
//!
//! Two optional batch backends (`ripgrep`, `grep -E`) can pre-compute a
//! filename → headers database that is consulted before the in-process
//! scan; either degrades silently to the in-process scanner.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use regex_lite::Regex;
use tracing::{debug, info, warn};

use crate::graph::target::{self, TargetId};
use crate::interpreter::interpreter::{exec_one_rule, under_target};
use crate::interpreter::state::State;
use crate::interpreter::types::{ExecError, LolVal};

/// Pre-scanned filename → headers database from a batch backend.
pub type HeaderDb = HashMap<String, Vec<String>>;

/// How headers are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchKind {
    /// In-process scan, the basic jam algorithm.
    #[default]
    Base,
    Ripgrep,
    Grep,
    /// Skip header scanning entirely.
    None,
}

impl SearchKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "base" => Some(SearchKind::Base),
            "ripgrep" => Some(SearchKind::Ripgrep),
            "grep" => Some(SearchKind::Grep),
            "none" => Some(SearchKind::None),
            _ => Option::None,
        }
    }
}

/// Recursively discover headers for a target. Each target is scanned at
/// most once; recursion stops at depth 10 without error.
pub fn find_headers(
    state: &mut State,
    tid: TargetId,
    level: u32,
    db: Option<&HeaderDb>,
) -> Result<(), ExecError> {
    if level == 10 {
        return Ok(());
    }
    if state.targets.get(tid).headers.is_some() {
        return Ok(());
    }
    state.targets.get_mut(tid).headers = Some(Vec::new());

    let found = target_find_headers(state, tid, db)?;
    if found {
        let includes: Vec<TargetId> =
            state.targets.get(tid).includes.iter().copied().collect();
        for inc in includes {
            let boundname = state.targets.get(inc).boundname.clone();
            if skip_include(state, boundname.as_deref()) {
                continue;
            }
            find_headers(state, inc, level + 1, db)?;
        }
    }
    Ok(())
}

fn target_find_headers(
    state: &mut State,
    tid: TargetId,
    db: Option<&HeaderDb>,
) -> Result<bool, ExecError> {
    let before = state.targets.get(tid).includes.len();

    let Some(boundname) = state.targets.get(tid).boundname.clone() else {
        return Ok(false);
    };
    if state
        .targets
        .get(tid)
        .headers
        .as_ref()
        .is_some_and(|h| !h.is_empty())
    {
        return Ok(false);
    }

    let hdrscan = state.get_var_on("HDRSCAN", Some(tid));
    let hdrrule = state.get_var_on("HDRRULE", Some(tid));
    if hdrscan.is_empty() || hdrrule.is_empty() {
        return Ok(false);
    }

    let headers = db
        .and_then(|db| db.get(&boundname).cloned())
        .or_else(|| scan_headers(state, &boundname, &hdrscan))
        .unwrap_or_default();

    if state.debug.headers {
        let name = &state.targets.get(tid).name;
        match &state.limit_target {
            Some(limit) if !name.contains(limit.as_str()) => {}
            _ => debug!("{} {:?}", name, headers),
        }
    }

    state.targets.get_mut(tid).headers = Some(headers.clone());

    if !headers.is_empty() {
        let name = state.targets.get(tid).name.clone();
        let lol: LolVal = vec![vec![name], headers];
        under_target(state, tid, |state| -> Result<(), ExecError> {
            for rule_name in &hdrrule {
                exec_one_rule(state, rule_name, &lol)?;
            }
            Ok(())
        })?;
    }

    if before != state.targets.get(tid).includes.len() {
        let includes: Vec<TargetId> =
            state.targets.get(tid).includes.iter().copied().collect();
        for inc in includes {
            target::bind_location(state, inc, true);
        }
        return Ok(true);
    }
    Ok(false)
}

/// Includes outside the configured source root are not scanned.
pub fn skip_include(state: &mut State, boundname: Option<&str>) -> bool {
    let Some(boundname) = boundname else {
        return true;
    };
    let Some(root) = state.sub_root() else {
        return false;
    };
    if !boundname.starts_with(&root) {
        if state.verbose && !state.scan_skipped.contains(boundname) {
            if state.scan_skipped.is_empty() {
                info!(
                    "headers outside the source root directory \
                     will be skipped from headers scan"
                );
            }
            info!("skipped from headers scan: {}", boundname);
            state.scan_skipped.insert(boundname.to_string());
        }
        return true;
    }
    false
}

/// Scan one file with a pattern set. Results are cached per
/// `(filename, patterns)` pair; a missing file caches as `None`.
fn scan_headers(state: &mut State, filename: &str, patterns: &[String]) -> Option<Vec<String>> {
    let key = (filename.to_string(), patterns.to_vec());
    if let Some(cached) = state.scan_cache.get(&key) {
        return cached.clone();
    }
    let result = scan_headers_uncached(state, filename, patterns);
    state.scan_cache.insert(key, result.clone());
    result
}

fn scan_headers_uncached(
    state: &mut State,
    filename: &str,
    patterns: &[String],
) -> Option<Vec<String>> {
    if !state.fs.exists(filename) {
        if !state.verbose && !state.headers_complained {
            warn!(
                "errors while headers searching, \
                 use verbose option to turn on all messages"
            );
            state.headers_complained = true;
        }
        if state.verbose {
            warn!("{} not found while searching headers, skipped", filename);
        }
        return None;
    }

    let contents = state.fs.read(filename).ok()?;
    let mut headers = Vec::new();
    for pattern in patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!("HDRSCAN: bad pattern '{}': {}", pattern, err);
                continue;
            }
        };
        for line in contents.lines() {
            for caps in re.captures_iter(line) {
                for group in caps.iter().skip(1).flatten() {
                    headers.push(group.as_str().to_string());
                }
            }
        }
    }
    Some(headers)
}

// =============================================================================
// BATCH BACKENDS
// =============================================================================

/// Run the selected batch backend over the tree with every global HDRSCAN
/// pattern. `None` means the in-process scanner should do all the work.
pub fn build_headers_db(state: &mut State, kind: SearchKind) -> Option<HeaderDb> {
    if !matches!(kind, SearchKind::Ripgrep | SearchKind::Grep) {
        return None;
    }
    let patterns = state.get_var("HDRSCAN");
    if patterns.is_empty() {
        return None;
    }

    let mut db = HeaderDb::new();
    for pattern in patterns {
        let part = match kind {
            SearchKind::Ripgrep => scan_ripgrep(&pattern),
            SearchKind::Grep => scan_grep(&pattern),
            _ => unreachable!(),
        }?;
        for (file, headers) in part {
            db.entry(file).or_default().extend(headers);
        }
    }
    Some(db)
}

fn scan_ripgrep(pattern: &str) -> Option<HeaderDb> {
    let output = Command::new("rg")
        .args(["--heading", "-N", pattern])
        .output()
        .map_err(|err| warn!("ripgrep backend unavailable: {}", err))
        .ok()?;
    Some(parse_ripgrep_output(&output.stdout, pattern))
}

fn scan_grep(pattern: &str) -> Option<HeaderDb> {
    let output = Command::new("grep")
        .args(["-I", "-s", "-H", "-r", "-E", pattern])
        .output()
        .map_err(|err| warn!("grep backend unavailable: {}", err))
        .ok()?;
    Some(parse_grep_output(&output.stdout, pattern))
}

fn abs_path(path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p).display().to_string())
            .unwrap_or_else(|_| path.to_string())
    }
}

// `rg --heading -N` groups matches under a filename line, with blank lines
// between files.
fn parse_ripgrep_output(stdout: &[u8], pattern: &str) -> HeaderDb {
    let mut db = HeaderDb::new();
    let Ok(re) = Regex::new(pattern) else {
        return db;
    };

    let mut expect_filename = true;
    let mut current: Option<String> = None;
    for raw in stdout.split(|&b| b == b'\n') {
        if raw.is_empty() {
            expect_filename = true;
            continue;
        }
        let Ok(line) = std::str::from_utf8(raw) else {
            continue;
        };
        if expect_filename {
            expect_filename = false;
            let file = abs_path(line);
            // .yi sources carry false positives
            current = (!file.ends_with(".yi")).then_some(file);
            continue;
        }
        let Some(file) = &current else { continue };
        let headers = db.entry(file.clone()).or_default();
        for caps in re.captures_iter(line) {
            for group in caps.iter().skip(1).flatten() {
                headers.push(group.as_str().to_string());
            }
        }
    }
    db
}

// `grep -H` prefixes every match with `filename:`.
fn parse_grep_output(stdout: &[u8], pattern: &str) -> HeaderDb {
    let mut db = HeaderDb::new();
    let Ok(re) = Regex::new(pattern) else {
        return db;
    };

    for raw in stdout.split(|&b| b == b'\n') {
        if raw.is_empty() {
            continue;
        }
        let Ok(line) = std::str::from_utf8(raw) else {
            continue;
        };
        let Some((file, matched)) = line.split_once(':') else {
            warn!("grep returned unexpected output: {}", line);
            continue;
        };
        let file = abs_path(file);
        if file.ends_with(".yi") {
            continue;
        }
        let headers = db.entry(file).or_default();
        for caps in re.captures_iter(matched) {
            for group in caps.iter().skip(1).flatten() {
                headers.push(group.as_str().to_string());
            }
        }
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::run;
    use crate::interpreter::state::StateConfig;
    use crate::paths::Platform;
    use std::sync::Arc;

    fn state_rooted(dir: &Path) -> State {
        State::with_config(StateConfig {
            env: Some(Vec::new()),
            platform: Some(Platform::unix()),
            fs: Some(Arc::new(crate::fs::RealFs::rooted(dir))),
            ..StateConfig::default()
        })
    }

    fn run_source(state: &mut State, source: &str) {
        let cmds = state.parse_and_compile(source, Some("test")).unwrap();
        run(state, &cmds).unwrap();
    }

    const HDR_SETUP: &str = "HDRSCAN = \"#include \\\"(.*)\\\"\" ; \
         HDRRULE = HdrRule ; \
         rule HdrRule { INCLUDES $(1) : $(2) ; }";

    #[test]
    fn test_scan_discovers_includes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.c"),
            "#include \"util.h\"\n#include \"data.h\"\nint main() {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("util.h"), "#include \"data.h\"\n").unwrap();
        std::fs::write(dir.path().join("data.h"), "int x;\n").unwrap();

        let mut state = state_rooted(dir.path());
        run_source(&mut state, HDR_SETUP);

        let tid = state.targets.bind("main.c");
        target::bind_location(&mut state, tid, false);
        find_headers(&mut state, tid, 0, None).unwrap();

        let main = state.targets.get(tid);
        assert_eq!(main.headers.as_ref().unwrap().len(), 2);
        assert_eq!(main.includes.len(), 2);

        // recursion reached util.h
        let util = state.targets.lookup("util.h").unwrap();
        assert_eq!(state.targets.get(util).includes.len(), 1);
    }

    #[test]
    fn test_missing_file_warns_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_rooted(dir.path());
        run_source(&mut state, HDR_SETUP);

        let tid = state.targets.bind("ghost.c");
        target::bind_location(&mut state, tid, false);
        find_headers(&mut state, tid, 0, None).unwrap();

        assert!(state.headers_complained);
        assert!(state.targets.get(tid).headers.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_scan_cache_reuse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.c"), "#include \"a.h\"\n").unwrap();

        let mut state = state_rooted(dir.path());
        run_source(&mut state, HDR_SETUP);

        let tid = state.targets.bind("one.c");
        target::bind_location(&mut state, tid, false);
        find_headers(&mut state, tid, 0, None).unwrap();
        assert_eq!(state.scan_cache.len(), 1);

        // the cache answers a second scan of the same (file, patterns) pair
        let key = state.scan_cache.keys().next().unwrap().clone();
        assert_eq!(
            state.scan_cache.get(&key).unwrap().as_ref().unwrap(),
            &vec!["a.h".to_string()]
        );
    }

    #[test]
    fn test_out_of_root_include_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_rooted(dir.path());
        state.vars.set("SUBDIR_ROOT", vec!["/inside".to_string()]);
        assert!(skip_include(&mut state, Some("/outside/x.h")));
        assert!(!skip_include(&mut state, Some("/inside/x.h")));
        assert!(skip_include(&mut state, None));
    }

    #[test]
    fn test_db_consulted_before_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.c"), "// no includes here\n").unwrap();

        let mut state = state_rooted(dir.path());
        run_source(&mut state, HDR_SETUP);

        let mut db = HeaderDb::new();
        db.insert("main.c".to_string(), vec!["fromdb.h".to_string()]);

        let tid = state.targets.bind("main.c");
        target::bind_location(&mut state, tid, false);
        find_headers(&mut state, tid, 0, Some(&db)).unwrap();

        assert!(state.targets.lookup("fromdb.h").is_some());
    }

    #[test]
    fn test_parse_ripgrep_output() {
        let stdout = b"/src/a.c\n#include \"one.h\"\n#include \"two.h\"\n\n/src/b.yi\n#include \"skip.h\"\n";
        let db = parse_ripgrep_output(stdout, "#include \"(.*)\"");
        assert_eq!(
            db.get("/src/a.c").unwrap(),
            &vec!["one.h".to_string(), "two.h".to_string()]
        );
        assert!(!db.contains_key("/src/b.yi"));
    }

    #[test]
    fn test_parse_grep_output() {
        let stdout = b"/src/a.c:#include \"one.h\"\n/src/b.c:#include \"two.h\"\n";
        let db = parse_grep_output(stdout, "#include \"(.*)\"");
        assert_eq!(db.get("/src/a.c").unwrap(), &vec!["one.h".to_string()]);
        assert_eq!(db.get("/src/b.c").unwrap(), &vec!["two.h".to_string()]);
    }
}
