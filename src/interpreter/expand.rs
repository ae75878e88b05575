//! Variable Expansion
//!
//! Implements `$(name[index]:modifiers)` expansion over list values.
//! Multiple `$(...)` occurrences in one word produce the Cartesian product
//! of their value lists; an empty list anywhere makes the word vanish.
//! `$(<)`, `$(>)` and `$(1)`..`$(9)` read the current rule's positional
//! argument vector.
//!
//! Modifiers form a closed set: `G R P D B S M` address pathname parts
//! (bare letters select, `X=value` edits), `E` supplies a default for an
//! empty value, `J` joins the list into one word, `L`/`U` fold case, `T`
//! translates to the platform path syntax and `W` expands wildcards.

use crate::ast::types::{Arg, Lol};
use crate::interpreter::state::State;
use crate::interpreter::types::{ExecError, LolVal, Value};
use crate::paths::Pathname;

/// Expand an argument list into a value, concatenating the results.
pub fn expand_list(state: &mut State, args: &[Arg]) -> Result<Value, ExecError> {
    let mut out = Vec::new();
    for arg in args {
        out.extend(expand_arg(state, arg)?);
    }
    Ok(out)
}

/// Expand one argument: a word, or a `[ rule ... ]` invocation whose
/// return value replaces it.
pub fn expand_arg(state: &mut State, arg: &Arg) -> Result<Value, ExecError> {
    match arg {
        Arg::Word(word) => expand_word(state, word),
        Arg::Call(call) => crate::interpreter::interpreter::exec_rule_call(state, call),
    }
}

/// Expand every column of an argument LoL.
pub fn expand_lol(state: &mut State, lol: &Lol) -> Result<LolVal, ExecError> {
    lol.iter().map(|list| expand_list(state, list)).collect()
}

/// Expand a word against the current rule parameters.
pub fn expand_word(state: &mut State, word: &str) -> Result<Value, ExecError> {
    expand_word_with(state, word, None)
}

/// Expand one line of an action template: every whitespace-separated word
/// is product-expanded against the step's bound parameter LoL and the
/// results are joined with single spaces.
pub fn var_string(state: &mut State, line: &str, lol: &LolVal) -> Result<String, ExecError> {
    let mut words = Vec::new();
    for word in line.split_whitespace() {
        words.extend(expand_word_with(state, word, Some(lol))?);
    }
    Ok(words.join(" "))
}

enum Seg {
    Lit(String),
    Var(String),
}

fn split_segments(word: &str) -> Vec<Seg> {
    let chars: Vec<char> = word.chars().collect();
    let mut segs = Vec::new();
    let mut lit = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1] == '(' {
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < chars.len() && depth > 0 {
                if chars[j] == '(' {
                    depth += 1;
                } else if chars[j] == ')' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                j += 1;
            }
            if depth != 0 {
                // unterminated; keep the rest literally
                lit.extend(&chars[i..]);
                i = chars.len();
                break;
            }
            if !lit.is_empty() {
                segs.push(Seg::Lit(std::mem::take(&mut lit)));
            }
            segs.push(Seg::Var(chars[i + 2..j].iter().collect()));
            i = j + 1;
        } else {
            lit.push(chars[i]);
            i += 1;
        }
    }
    if !lit.is_empty() {
        segs.push(Seg::Lit(lit));
    }
    segs
}

fn expand_word_with(
    state: &mut State,
    word: &str,
    lol: Option<&LolVal>,
) -> Result<Value, ExecError> {
    if !word.contains("$(") {
        return Ok(vec![word.to_string()]);
    }

    let mut results = vec![String::new()];
    for seg in split_segments(word) {
        match seg {
            Seg::Lit(text) => {
                for r in &mut results {
                    r.push_str(&text);
                }
            }
            Seg::Var(content) => {
                let vals = expand_variable(state, &content, lol)?;
                if vals.is_empty() {
                    // an empty product vanishes the whole word
                    return Ok(Vec::new());
                }
                let mut next = Vec::with_capacity(results.len() * vals.len());
                for prefix in &results {
                    for v in &vals {
                        let mut s = prefix.clone();
                        s.push_str(v);
                        next.push(s);
                    }
                }
                results = next;
            }
        }
    }
    Ok(results)
}

// Split at the first top-level ':' (outside parens): name+index vs mods.
fn split_top_colon(content: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in content.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return (&content[..i], &content[i + 1..]),
            _ => {}
        }
    }
    (content, "")
}

fn expand_variable(
    state: &mut State,
    content: &str,
    lol: Option<&LolVal>,
) -> Result<Value, ExecError> {
    let (spec, mods_str) = split_top_colon(content);

    // trailing [n], [n-], [n-m]
    let (name_part, index) = match (spec.rfind('['), spec.ends_with(']')) {
        (Some(open), true) => (
            &spec[..open],
            parse_index(&spec[open + 1..spec.len() - 1]),
        ),
        _ => (spec, None),
    };

    let names: Value = if name_part.contains("$(") {
        expand_word_with(state, name_part, lol)?
    } else {
        vec![name_part.to_string()]
    };

    let mods = parse_mods(state, mods_str, lol)?;

    let mut out = Vec::new();
    for name in names {
        let mut vals = lookup_value(state, &name, lol);
        if let Some((start, end)) = index {
            vals = slice_value(vals, start, end);
        }
        out.extend(apply_mods(state, vals, &mods)?);
    }
    Ok(out)
}

fn lookup_value(state: &mut State, name: &str, lol: Option<&LolVal>) -> Value {
    let param_index = match name {
        "<" => Some(0),
        ">" => Some(1),
        _ if name.len() == 1 => name
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .filter(|&n| (1..=9).contains(&n))
            .map(|n| (n - 1) as usize),
        _ => None,
    };

    match param_index {
        Some(i) => match lol {
            Some(l) => l.get(i).cloned().unwrap_or_default(),
            None => state
                .params
                .as_ref()
                .and_then(|p| p.get(i))
                .cloned()
                .unwrap_or_default(),
        },
        None => state.get_var(name),
    }
}

// 1-based, inclusive, clamped
fn parse_index(spec: &str) -> Option<(usize, Option<usize>)> {
    match spec.split_once('-') {
        Some((start, "")) => Some((start.trim().parse().ok()?, None)),
        Some((start, end)) => Some((
            start.trim().parse().ok()?,
            Some(end.trim().parse().ok()?),
        )),
        None => {
            let n: usize = spec.trim().parse().ok()?;
            Some((n, Some(n)))
        }
    }
}

fn slice_value(vals: Value, start: usize, end: Option<usize>) -> Value {
    let len = vals.len();
    let start = start.max(1) - 1;
    if start >= len {
        return Vec::new();
    }
    let end = end.map_or(len, |e| e.min(len));
    if end <= start {
        return Vec::new();
    }
    vals[start..end].to_vec()
}

#[derive(Default)]
struct Mods {
    /// Component selectors in canonical order: grist, parent, dir, base,
    /// suffix, member.
    select_grist: bool,
    select_parent: bool,
    select_dir: bool,
    select_base: bool,
    select_suffix: bool,
    select_member: bool,
    /// `X=value` pathname edits, applied in the order written.
    edits: Vec<(char, String)>,
    default_val: Option<String>,
    join: Option<String>,
    upper: bool,
    lower: bool,
    translate: bool,
    wildcard: bool,
}

impl Mods {
    fn any_selector(&self) -> bool {
        self.select_grist
            || self.select_parent
            || self.select_dir
            || self.select_base
            || self.select_suffix
            || self.select_member
    }

    fn touches_path(&self) -> bool {
        self.any_selector() || !self.edits.is_empty() || self.translate
    }
}

// Split the modifier tail on top-level ':'; each piece is either `X=value`
// or a run of selector/flag letters. Values may themselves expand.
fn parse_mods(
    state: &mut State,
    mods_str: &str,
    lol: Option<&LolVal>,
) -> Result<Mods, ExecError> {
    let mut mods = Mods::default();
    let mut rest = mods_str;

    while !rest.is_empty() {
        let (piece, tail) = split_top_colon(rest);
        rest = tail;
        if piece.is_empty() {
            continue;
        }

        let mut chars = piece.chars();
        let Some(letter) = chars.next() else { continue };
        if chars.next() == Some('=') {
            let value = expand_mod_value(state, &piece[2..], lol)?;
            match letter {
                'E' => mods.default_val = Some(value),
                'J' => mods.join = Some(value),
                'G' | 'R' | 'D' | 'B' | 'S' | 'M' => mods.edits.push((letter, value)),
                _ => {}
            }
            continue;
        }

        for c in piece.chars() {
            match c {
                'G' => mods.select_grist = true,
                'P' => mods.select_parent = true,
                'D' => mods.select_dir = true,
                'B' => mods.select_base = true,
                'S' => mods.select_suffix = true,
                'M' => mods.select_member = true,
                'U' => mods.upper = true,
                'L' => mods.lower = true,
                'T' => mods.translate = true,
                'W' => mods.wildcard = true,
                'E' => mods.default_val = Some(String::new()),
                _ => {}
            }
        }
    }
    Ok(mods)
}

fn expand_mod_value(
    state: &mut State,
    raw: &str,
    lol: Option<&LolVal>,
) -> Result<String, ExecError> {
    if raw.contains("$(") {
        Ok(expand_word_with(state, raw, lol)?.join(" "))
    } else {
        Ok(raw.to_string())
    }
}

fn apply_mods(state: &mut State, vals: Value, mods: &Mods) -> Result<Value, ExecError> {
    let mut vals = vals;
    if vals.is_empty() {
        if let Some(default) = &mods.default_val {
            vals = vec![default.clone()];
        }
    }

    let platform = state.platform;
    let mut out = Vec::new();
    for v in vals {
        let mut s = v;
        if mods.touches_path() {
            let mut p = Pathname::parse(&s);
            for (letter, value) in &mods.edits {
                match letter {
                    'G' => {
                        p.grist = value
                            .trim_start_matches('<')
                            .trim_end_matches('>')
                            .to_string()
                    }
                    'R' => p.root = value.clone(),
                    'D' => p.dir = value.clone(),
                    'B' => p.base = value.clone(),
                    'S' => p.suffix = value.clone(),
                    'M' => p.member = value.clone(),
                    _ => {}
                }
            }
            if mods.any_selector() {
                let mut sel = String::new();
                if mods.select_grist && !p.grist.is_empty() {
                    sel.push('<');
                    sel.push_str(&p.grist);
                    sel.push('>');
                }
                if mods.select_parent {
                    sel.push_str(&p.parent());
                }
                if mods.select_dir {
                    sel.push_str(&p.dir);
                }
                if mods.select_base {
                    sel.push_str(&p.base);
                }
                if mods.select_suffix {
                    sel.push_str(&p.suffix);
                }
                if mods.select_member && !p.member.is_empty() {
                    sel.push('(');
                    sel.push_str(&p.member);
                    sel.push(')');
                }
                s = sel;
            } else {
                s = p.build_for(false, platform);
            }
            if mods.translate && platform.is_vms {
                s = Pathname::parse(&s).build_for(true, platform);
            }
        }
        if mods.upper {
            s = s.to_uppercase();
        }
        if mods.lower {
            s = s.to_lowercase();
        }

        if mods.wildcard {
            out.extend(expand_wildcards(&s));
        } else {
            out.push(s);
        }
    }

    if let Some(sep) = &mods.join {
        return Ok(vec![out.join(sep)]);
    }
    Ok(out)
}

// A pattern with no matches passes through unchanged.
fn expand_wildcards(pattern: &str) -> Value {
    match glob::glob(pattern) {
        Ok(paths) => {
            let mut matches: Value = paths
                .filter_map(|p| p.ok())
                .map(|p| p.display().to_string())
                .collect();
            if matches.is_empty() {
                vec![pattern.to_string()]
            } else {
                matches.sort();
                matches
            }
        }
        Err(_) => vec![pattern.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::state::StateConfig;
    use crate::paths::Platform;
    use pretty_assertions::assert_eq;

    fn test_state() -> State {
        let mut state = State::with_config(StateConfig {
            env: Some(Vec::new()),
            platform: Some(Platform::unix()),
            ..StateConfig::default()
        });
        state.vars.set("X", vec!["a".into(), "b".into()]);
        state.vars.set("Y", vec!["1".into(), "2".into()]);
        state.vars.set("EMPTY", vec![]);
        state.vars.set("FILE", vec!["src/main.c".into()]);
        state
    }

    fn expand1(state: &mut State, word: &str) -> Value {
        expand_word(state, word).unwrap()
    }

    #[test]
    fn test_plain_word() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "hello"), vec!["hello"]);
        assert_eq!(expand1(&mut state, ""), vec![""]);
    }

    #[test]
    fn test_simple_variable() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(X)"), vec!["a", "b"]);
    }

    #[test]
    fn test_product_expansion() {
        let mut state = test_state();
        assert_eq!(
            expand1(&mut state, "$(X)$(Y)"),
            vec!["a1", "a2", "b1", "b2"]
        );
        assert_eq!(expand1(&mut state, "-$(X).o"), vec!["-a.o", "-b.o"]);
    }

    #[test]
    fn test_empty_vanishes_word() {
        let mut state = test_state();
        assert!(expand1(&mut state, "pre$(EMPTY)post").is_empty());
        assert!(expand1(&mut state, "$(UNDEFINED)").is_empty());
    }

    #[test]
    fn test_index() {
        let mut state = test_state();
        state.vars.set("L", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(expand1(&mut state, "$(L[2])"), vec!["b"]);
        assert_eq!(expand1(&mut state, "$(L[2-])"), vec!["b", "c"]);
        assert_eq!(expand1(&mut state, "$(L[1-2])"), vec!["a", "b"]);
        // clamped
        assert_eq!(expand1(&mut state, "$(L[2-9])"), vec!["b", "c"]);
        assert!(expand1(&mut state, "$(L[7])").is_empty());
    }

    #[test]
    fn test_default_modifier() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(UNDEFINED:E=dflt)"), vec!["dflt"]);
        assert_eq!(expand1(&mut state, "$(X:E=dflt)"), vec!["a", "b"]);
        // :E keeps the word alive through products
        assert_eq!(expand1(&mut state, "p$(EMPTY:E=q)s"), vec!["pqs"]);
    }

    #[test]
    fn test_join_modifier() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(X:J=,)"), vec!["a,b"]);
        // joined value takes part in products as one word
        assert_eq!(expand1(&mut state, "$(X:J=,)-$(Y)"), vec!["a,b-1", "a,b-2"]);
    }

    #[test]
    fn test_case_modifiers() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(X:U)"), vec!["A", "B"]);
        state.vars.set("MIXED", vec!["AbC".into()]);
        assert_eq!(expand1(&mut state, "$(MIXED:L)"), vec!["abc"]);
    }

    #[test]
    fn test_path_selectors() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(FILE:D)"), vec!["src"]);
        assert_eq!(expand1(&mut state, "$(FILE:B)"), vec!["main"]);
        assert_eq!(expand1(&mut state, "$(FILE:S)"), vec![".c"]);
        assert_eq!(expand1(&mut state, "$(FILE:BS)"), vec!["main.c"]);
        state.vars.set("G", vec!["<sys>x.h".into()]);
        assert_eq!(expand1(&mut state, "$(G:G)"), vec!["<sys>"]);
        assert_eq!(expand1(&mut state, "$(G:B)"), vec!["x"]);
    }

    #[test]
    fn test_path_edits() {
        let mut state = test_state();
        assert_eq!(expand1(&mut state, "$(FILE:S=.o)"), vec!["src/main.o"]);
        assert_eq!(
            expand1(&mut state, "$(FILE:D=obj)"),
            vec!["obj/main.c"]
        );
        assert_eq!(
            expand1(&mut state, "$(FILE:R=build)"),
            vec!["build/src/main.c"]
        );
    }

    #[test]
    fn test_parent_selector() {
        let mut state = test_state();
        state.vars.set("P", vec!["a/b/c.h".into()]);
        assert_eq!(expand1(&mut state, "$(P:P)"), vec!["a/b"]);
    }

    #[test]
    fn test_positional_params() {
        let mut state = test_state();
        state.params = Some(vec![
            vec!["out.o".into()],
            vec!["in1.c".into(), "in2.c".into()],
            vec!["extra".into()],
        ]);
        assert_eq!(expand1(&mut state, "$(<)"), vec!["out.o"]);
        assert_eq!(expand1(&mut state, "$(>)"), vec!["in1.c", "in2.c"]);
        assert_eq!(expand1(&mut state, "$(1)"), vec!["out.o"]);
        assert_eq!(expand1(&mut state, "$(2)"), vec!["in1.c", "in2.c"]);
        assert_eq!(expand1(&mut state, "$(3)"), vec!["extra"]);
        assert!(expand1(&mut state, "$(4)").is_empty());
    }

    #[test]
    fn test_nested_expansion() {
        let mut state = test_state();
        state.vars.set("NAME", vec!["X".into()]);
        assert_eq!(expand1(&mut state, "$($(NAME))"), vec!["a", "b"]);
        assert_eq!(expand1(&mut state, "$($(NAME):U)"), vec!["A", "B"]);
    }

    #[test]
    fn test_mod_value_expansion() {
        let mut state = test_state();
        state.vars.set("SEP", vec![";".into()]);
        assert_eq!(expand1(&mut state, "$(X:J=$(SEP))"), vec!["a;b"]);
    }

    #[test]
    fn test_join_then_resplit_identity() {
        let mut state = test_state();
        let joined = expand1(&mut state, "$(X:J=,)");
        let resplit: Vec<&str> = joined[0].split(',').collect();
        assert_eq!(resplit, vec!["a", "b"]);
    }

    #[test]
    fn test_var_string() {
        let mut state = test_state();
        let lol: LolVal = vec![vec!["test.c".into()], vec!["test.h".into()]];
        let line = var_string(&mut state, "cp $(>) $(<)", &lol).unwrap();
        assert_eq!(line, "cp test.h test.c");
    }

    #[test]
    fn test_var_string_drops_vanished_words() {
        let mut state = test_state();
        let lol: LolVal = vec![vec!["out".into()], vec![]];
        let line = var_string(&mut state, "link -o $(<) $(>)", &lol).unwrap();
        assert_eq!(line, "link -o out");
    }

    #[test]
    fn test_wildcard_no_match_passes_through() {
        let mut state = test_state();
        state
            .vars
            .set("PAT", vec!["/no/such/dir/*.zzz".into()]);
        assert_eq!(
            expand1(&mut state, "$(PAT:W)"),
            vec!["/no/such/dir/*.zzz"]
        );
    }
}
