//! Ninja Emitter
//!
//! Lowers build steps into ninja rules and build statements: expands the
//! action templates through the platform line-concatenation policy,
//! deduplicates identical commands of alone steps, emits phony aggregates
//! and collections, and partitions dependencies into inputs, order-only
//! and implicit edges.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;

use crate::graph::target::{collection_name, get_dependency_list, UpdatingAction};
use crate::interpreter::expand::var_string;
use crate::interpreter::state::State;
use crate::interpreter::types::{ExecError, LolVal};
use crate::ninja::syntax::{RuleOpts, Writer};
use crate::ninja::NINJA_SIGIL;
use crate::paths::escape_path;

/// Write the whole `build.ninja` stream.
pub fn ninja_build<W: Write>(state: &mut State, out: W) -> Result<(), ExecError> {
    let mut writer = Writer::new(out, 120);

    emit_rules(state, &mut writer)?;
    let phonies = emit_phonies(state, &mut writer)?;
    emit_collections(state, &mut writer, phonies)?;
    emit_steps(state, &mut writer)?;

    writer.default("all")?;
    Ok(())
}

// One ninja rule per step, except that alone steps with identical
// (action name, expanded command) share the first step's rule.
fn emit_rules<W: Write>(state: &mut State, writer: &mut Writer<W>) -> Result<(), ExecError> {
    let mut commands_cache: HashMap<String, Vec<(String, String)>> = HashMap::new();

    for (counter, step_idx) in (0..state.build_steps.len()).enumerate() {
        let action_name = state.build_steps[step_idx].action.action.name.clone();
        let mut rule_name = format!("{}{}", action_name, counter).replace('+', "_");
        let full_cmd = get_command(state, step_idx)?;

        let mut shared = false;
        if state.build_steps[step_idx].action.is_alone() {
            let entries = commands_cache.entry(action_name).or_default();
            if let Some((existing, _)) = entries.iter().find(|(_, cmd)| *cmd == full_cmd) {
                rule_name = existing.clone();
                shared = true;
            } else {
                entries.push((rule_name.clone(), full_cmd.clone()));
            }
        }
        state.build_steps[step_idx].action.rule_name = rule_name.clone();
        if shared {
            continue;
        }

        let step = &state.build_steps[step_idx];
        let restat = step.action.restat
            || step
                .targets
                .iter()
                .any(|&tid| state.targets.get(tid).restat);
        let generator = step.action.generator
            || step
                .targets
                .iter()
                .any(|&tid| state.targets.get(tid).generated);

        if state.platform.is_vms {
            // commands go through a response file the rule replays
            let rspfile = format!("{}.com", rule_name);
            let description = step_description(state, step_idx);
            writer.rule(
                &rule_name,
                &format!("@{}", rspfile),
                &RuleOpts {
                    description: Some(description),
                    rspfile: Some(rspfile),
                    rspfile_content: Some(full_cmd),
                    restat,
                    generator,
                    ..RuleOpts::default()
                },
            )?;
        } else {
            let mut depfile = None;
            for &tid in &step.targets {
                if let Some(df) = state.targets.get(tid).vars.get("DEPFILE") {
                    depfile = df.first().cloned();
                    if depfile.is_some() {
                        break;
                    }
                }
            }
            writer.rule(
                &rule_name,
                &full_cmd,
                &RuleOpts {
                    depfile,
                    restat,
                    generator,
                    ..RuleOpts::default()
                },
            )?;
        }
    }
    Ok(())
}

fn emit_phonies<W: Write>(
    state: &mut State,
    writer: &mut Writer<W>,
) -> Result<HashSet<String>, ExecError> {
    let mut phonies = HashSet::new();
    for tid in state.targets.ids() {
        let deps = get_dependency_list(state, tid, 0, None);
        let t = state.targets.get(tid);
        if !t.notfile {
            continue;
        }
        let name = t.name.clone();
        let implicit: Vec<String> = deps.iter().map(|d| escape_path(d)).collect();
        writer.build(&[name.clone()], "phony", &[], &implicit, &[])?;
        phonies.insert(name);
    }
    Ok(phonies)
}

fn emit_collections<W: Write>(
    state: &mut State,
    writer: &mut Writer<W>,
    mut phonies: HashSet<String>,
) -> Result<(), ExecError> {
    let platform = state.platform;
    for tid in state.targets.ids() {
        let t = state.targets.get(tid);
        let Some(members) = t.collection.clone() else {
            continue;
        };
        let name = collection_name(t, platform);
        if phonies.contains(&name) {
            continue;
        }
        let implicit: Vec<String> = members.iter().map(|m| escape_path(m)).collect();
        writer.build(&[name.clone()], "phony", &[], &implicit, &[])?;
        phonies.insert(name);
    }
    Ok(())
}

fn emit_steps<W: Write>(state: &mut State, writer: &mut Writer<W>) -> Result<(), ExecError> {
    // headers that are also outputs become order-only edges
    let gen_headers: HashSet<String> = match state.targets.lookup("_gen_headers") {
        Some(gen) => state
            .targets
            .get(gen)
            .depends
            .iter()
            .filter_map(|&dep| state.targets.get(dep).boundname.clone())
            .collect(),
        None => HashSet::new(),
    };

    for step_idx in 0..state.build_steps.len() {
        let target_ids = state.build_steps[step_idx].targets.clone();

        let mut outputs = Vec::new();
        for &tid in &target_ids {
            if let Some(bn) = &state.targets.get(tid).boundname {
                outputs.push(bn.clone());
            }
        }
        if outputs.is_empty() {
            continue;
        }
        let outputs_set: BTreeSet<String> = outputs.iter().cloned().collect();

        let mut all_deps = BTreeSet::new();
        for &tid in &target_ids {
            all_deps.extend(get_dependency_list(state, tid, 0, Some(&outputs_set)));
        }

        let source_ids = state.build_steps[step_idx].action.sources.clone();
        let inputs: Vec<String> = source_ids
            .iter()
            .map(|&sid| {
                let t = state.targets.get(sid);
                t.boundname.clone().unwrap_or_else(|| t.name.clone())
            })
            // ninja forbids a path on both sides of a build statement
            .filter(|name| !outputs_set.contains(name))
            .collect();
        let inputs_set: HashSet<&String> = inputs.iter().collect();

        let mut implicit = BTreeSet::new();
        let mut order_only = BTreeSet::new();
        for dep in &all_deps {
            if inputs_set.contains(dep) || outputs_set.contains(dep) {
                continue;
            }
            // generated headers and directory creation only gate ordering
            if gen_headers.contains(dep) || dep == "dirs" {
                order_only.insert(escape_path(dep));
            } else {
                implicit.insert(escape_path(dep));
            }
        }

        let rule_name = state.build_steps[step_idx].action.rule_name.clone();
        writer.build(
            &outputs.iter().map(|o| escape_path(o)).collect::<Vec<_>>(),
            &rule_name,
            &inputs.iter().map(|i| escape_path(i)).collect::<Vec<_>>(),
            &implicit.into_iter().collect::<Vec<_>>(),
            &order_only.into_iter().collect::<Vec<_>>(),
        )?;
    }
    Ok(())
}

// =============================================================================
// COMMAND EXPANSION
// =============================================================================

/// Expand (and cache) the full command of a build step, chained actions
/// included.
pub fn get_command(state: &mut State, step_idx: usize) -> Result<String, ExecError> {
    if let Some(cmd) = &state.build_steps[step_idx].action.command {
        return Ok(cmd.clone());
    }
    let ua = state.build_steps[step_idx].action.clone();
    let cmd = build_command(state, &ua)?;
    state.build_steps[step_idx].action.command = Some(cmd.clone());
    Ok(cmd)
}

fn build_command(state: &mut State, ua: &UpdatingAction) -> Result<String, ExecError> {
    let mut base = if state.platform.is_vms {
        prepare_vms_action(state, ua)?
    } else if state.platform.is_windows {
        prepare_windows_action(state, ua)?
    } else {
        prepare_action(state, ua)?
    };

    for child in &ua.next {
        let lines = build_command_inner(state, child)?;
        if state.platform.is_vms || state.platform.is_windows {
            base.push_str("$\n$^");
        }
        base.push_str(&lines);
    }

    if state.platform.is_vms {
        // an empty prompt line terminates the script
        base.push_str("$\n$^$$");
    }
    Ok(base)
}

// children expand without the platform epilogue
fn build_command_inner(state: &mut State, ua: &UpdatingAction) -> Result<String, ExecError> {
    let mut base = if state.platform.is_vms {
        prepare_vms_action(state, ua)?
    } else if state.platform.is_windows {
        prepare_windows_action(state, ua)?
    } else {
        prepare_action(state, ua)?
    };
    for child in &ua.next {
        let lines = build_command_inner(state, child)?;
        if state.platform.is_vms || state.platform.is_windows {
            base.push_str("$\n$^");
        }
        base.push_str(&lines);
    }
    Ok(base)
}

/// The step's positional vector for command expansion: bound target names,
/// bound source names, then the remaining invocation columns.
fn bound_params(state: &State, ua: &UpdatingAction) -> LolVal {
    let mut res = Vec::new();
    res.push(
        ua.targets
            .iter()
            .map(|&tid| {
                let t = state.targets.get(tid);
                t.boundname.clone().unwrap_or_else(|| t.name.clone())
            })
            .collect(),
    );
    res.push(
        ua.sources
            .iter()
            .filter_map(|&sid| state.targets.get(sid).boundname.clone())
            .collect(),
    );
    res.extend(ua.params.iter().skip(2).cloned());
    res
}

// VMS wants bare filenames in bindlist variables prefixed with [].
fn modify_vms_paths(state: &mut State, ua: &UpdatingAction) {
    for &tid in &ua.targets {
        for var in &ua.bindvars {
            let Some(value) = state.targets.get(tid).vars.get(var).cloned() else {
                continue;
            };
            let modified = value
                .into_iter()
                .map(|item| {
                    if item.contains(':') || item.contains('[') {
                        item
                    } else {
                        format!("[]{}", item)
                    }
                })
                .collect();
            state
                .targets
                .get_mut(tid)
                .vars
                .insert(var.clone(), modified);
        }
    }
}

// Expand the template lines under the step's target context: comments
// dropped, `$` doubled for ninja, the sigil lowered back to `$`.
fn prepare_lines(
    state: &mut State,
    ua: &UpdatingAction,
    comment_sym: &str,
) -> Result<Vec<String>, ExecError> {
    let params = bound_params(state, ua);
    let old_targets = std::mem::replace(&mut state.current_target, ua.targets.clone());
    if state.platform.is_vms {
        modify_vms_paths(state, ua);
    }

    let mut lines = Vec::new();
    let mut failed = None;
    for line in ua.action.commands.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(comment_sym) {
            continue;
        }
        match var_string(state, line, &params) {
            Ok(expanded) => {
                let expanded = expanded.replace('$', "$$").replace(NINJA_SIGIL, "$");
                if !expanded.is_empty() {
                    lines.push(expanded);
                }
            }
            Err(err) => {
                failed = Some(err);
                break;
            }
        }
    }

    state.current_target = old_targets;
    match failed {
        Some(err) => Err(err),
        None => Ok(lines),
    }
}

fn track_quotes(quotes: &mut Vec<char>, line: &str, quote_chars: &[char]) {
    for c in line.chars() {
        if quote_chars.contains(&c) {
            if quotes.last() == Some(&c) {
                quotes.pop();
            } else {
                quotes.push(c);
            }
        }
    }
}

/// POSIX concatenation: continuation suffixes and open quotes join lines
/// with a space; a completed command ends with ` ; $` and a ninja line
/// continuation.
fn prepare_action(state: &mut State, ua: &UpdatingAction) -> Result<String, ExecError> {
    let mut quotes: Vec<char> = Vec::new();
    let mut concat = String::new();

    for line in prepare_lines(state, ua, "#")? {
        track_quotes(&mut quotes, &line, &['\'', '"', '`']);

        if let Some(stripped) = line.strip_suffix('\\') {
            concat.push_str(stripped);
        } else if line.ends_with("&&")
            || line.ends_with(';')
            || line.ends_with('(')
            || line.ends_with('|')
            || is_keyword_ending(&line, "then")
            || is_keyword_ending(&line, "do")
            || is_keyword_ending(&line, "else")
            || !quotes.is_empty()
        {
            concat.push_str(&line);
            concat.push(' ');
        } else {
            concat.push_str(&line);
            concat.push_str(" ; $\n");
        }
    }
    Ok(concat)
}

fn is_keyword_ending(line: &str, keyword: &str) -> bool {
    line == keyword || line.ends_with(&format!(" {}", keyword))
}

/// Windows: `^` continuations, lines joined with `$`-newline plus a `$^`
/// marker the executor lowers to a script newline.
fn prepare_windows_action(state: &mut State, ua: &UpdatingAction) -> Result<String, ExecError> {
    let mut quotes: Vec<char> = Vec::new();
    let mut concat = String::new();
    let mut add_newline = false;

    for line in prepare_lines(state, ua, "REM")? {
        if add_newline {
            concat.push_str(" $\n$^");
        }
        add_newline = false;
        track_quotes(&mut quotes, &line, &['\'', '"', '`']);

        if let Some(stripped) = line.strip_suffix('^') {
            concat.push_str(stripped);
        } else if !quotes.is_empty() {
            concat.push_str(&line);
            concat.push(' ');
        } else {
            concat.push_str(&line);
            add_newline = true;
        }
    }
    Ok(concat)
}

/// VMS: every line runs at a `$$ ` DCL prompt, `-` continues a line.
fn prepare_vms_action(state: &mut State, ua: &UpdatingAction) -> Result<String, ExecError> {
    let mut quotes: Vec<char> = Vec::new();
    let mut concat = String::from("$$ ");
    let mut add_newline = false;

    for line in prepare_lines(state, ua, "!")? {
        if add_newline {
            concat.push_str(" $\n$^$$");
        }
        add_newline = false;
        track_quotes(&mut quotes, &line, &['"']);

        if let Some(stripped) = line.strip_suffix('-') {
            concat.push_str(stripped);
        } else if !quotes.is_empty() {
            concat.push_str(&line);
            concat.push(' ');
        } else {
            concat.push_str(&line);
            add_newline = true;
        }
    }
    Ok(concat)
}

/// `name & name target...` shown for VMS response-file rules.
fn step_description(state: &State, step_idx: usize) -> String {
    let step = &state.build_steps[step_idx];
    let mut names = BTreeSet::new();
    names.insert(step.action.action.name.clone());
    for child in &step.action.next {
        names.insert(child.action.name.clone());
    }
    let targets: Vec<String> = step
        .targets
        .iter()
        .filter_map(|&tid| state.targets.get(tid).boundname.clone())
        .collect();
    format!(
        "{} {}",
        names.into_iter().collect::<Vec<_>>().join(" & "),
        targets.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::run;
    use crate::interpreter::state::StateConfig;
    use crate::paths::Platform;

    fn test_state(platform: Platform) -> State {
        State::with_config(StateConfig {
            env: Some(Vec::new()),
            platform: Some(platform),
            ..StateConfig::default()
        })
    }

    fn run_source(state: &mut State, source: &str) {
        let cmds = state.parse_and_compile(source, Some("test")).unwrap();
        run(state, &cmds).unwrap();
    }

    fn emit(state: &mut State) -> String {
        // steps reference bound names; bind without scanning
        crate::graph::bind_targets(state, crate::graph::headers::SearchKind::None).unwrap();
        let mut buf = Vec::new();
        ninja_build(state, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_simple_copy_scenario() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions cp { cp $(>) $(<) } cp test.c : test.h ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("rule cp0\n"));
        assert!(out.contains("command = cp test.h test.c ; $\n"));
        assert!(out.contains("build test.c: cp0 test.h\n"));
        assert!(out.contains("default all\n"));
    }

    #[test]
    fn test_multiline_action_joins_continuations() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions sh { \n echo a \\\n echo b \n } sh out.txt ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("command = echo a echo b ; $\n"));
    }

    #[test]
    fn test_comments_dropped_from_commands() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions sh { \n # setup\n echo x \n } sh out.txt ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("command = echo x ; $\n"));
        assert!(!out.contains("setup"));
    }

    #[test]
    fn test_dollar_doubling_and_sigil() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions sh { echo $x <NINJA_SIGIL>out } sh out.txt ;",
        );
        let out = emit(&mut state);
        // jam's own $ doubles; the sigil lowers to a bare $
        assert!(out.contains("echo $$x $out"));
    }

    #[test]
    fn test_rule_deduplication_for_identical_commands() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions mark { touch stamp-file } mark a ; mark b ;",
        );
        let out = emit(&mut state);
        assert_eq!(out.matches("rule mark").count(), 1);
        assert!(out.contains("build a: mark0"));
        assert!(out.contains("build b: mark0"));
    }

    #[test]
    fn test_different_commands_do_not_deduplicate() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions cp { cp $(>) $(<) } cp a : x ; cp b : y ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("rule cp0"));
        assert!(out.contains("rule cp1"));
    }

    #[test]
    fn test_chained_step_emits_one_rule_and_statement() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions touch { touch $(<) } actions stamp { stamp $(<) } \
             touch out ; stamp out ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("command = touch out ; $\nstamp out ; $\n"));
        assert_eq!(out.matches("build out:").count(), 1);
    }

    #[test]
    fn test_phony_emission() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "NOTFILE all ; DEPENDS all : out ; \
             actions touch { touch $(<) } touch out ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("build all: phony | out\n"));
    }

    #[test]
    fn test_plus_in_action_name_sanitised() {
        let mut state = test_state(Platform::unix());
        run_source(&mut state, "actions c++ { c++ $(<) } c++ a.o ;");
        let out = emit(&mut state);
        assert!(out.contains("rule c__0"));
    }

    #[test]
    fn test_depfile_from_target_var() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions cc { cc $(<) } DEPFILE on main.o = main.d ; cc main.o ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("depfile = main.d"));
    }

    #[test]
    fn test_restat_and_generator_flags() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions gen { gen $(<) } RESTAT out ; GENERATED out ; gen out ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("restat = 1"));
        assert!(out.contains("generator = 1"));
    }

    #[test]
    fn test_vms_response_file_rule() {
        let mut state = test_state(Platform::vms());
        run_source(&mut state, "actions cp { copy $(>) $(<) } cp out.c : in.c ;");
        let mut buf = Vec::new();
        crate::graph::bind_targets(&mut state, crate::graph::headers::SearchKind::None).unwrap();
        ninja_build(&mut state, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("command = @cp0.com"));
        assert!(out.contains("rspfile = cp0.com"));
        assert!(out.contains("rspfile_content = $$ copy in.c out.c"));
        assert!(out.contains("description = cp out.c"));
    }

    #[test]
    fn test_gen_header_becomes_order_only() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions gen { gen $(<) } gen config.h ; \
             actions cc { cc -c $(>) -o $(<) } cc main.o : main.c ; \
             DEPENDS main.o : config.h ;",
        );
        let out = emit(&mut state);
        assert!(out.contains("build main.o: cc1 main.c || config.h"));
    }

    #[test]
    fn test_no_self_loops_in_build_statements() {
        let mut state = test_state(Platform::unix());
        run_source(
            &mut state,
            "actions link { link $(<) } DEPENDS app : app ; link app : app ;",
        );
        let out = emit(&mut state);
        for line in out.lines().filter(|l| l.starts_with("build ")) {
            let (outs, rest) = line[6..].split_once(':').unwrap();
            for output in outs.split_whitespace() {
                assert!(
                    !rest.split_whitespace().any(|w| w == output),
                    "self loop in {:?}",
                    line
                );
            }
        }
    }
}
