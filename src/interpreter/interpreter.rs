//! Evaluator
//!
//! Executes compiled command lists against the `State`: assignments in
//! their four flavours, rule invocation with builtin/user-rule/action
//! dispatch, target-context overlays, includes and control flow.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ast::types::{ActionFlags, Arg, AssignOp, Expr, List, Lol, RuleCall};
use crate::compile::Cmd;
use crate::graph::target::{self, BuildStep, TargetId, UpdatingAction};
use crate::interpreter::builtins;
use crate::interpreter::expand::{expand_arg, expand_list, expand_lol};
use crate::interpreter::state::State;
use crate::interpreter::types::{list_truthy, lol_get, Action, ExecError, Flow, LolVal, Rule, Value};
use crate::pattern;

/// Run a command list. Stops early when control flow escapes.
pub fn run(state: &mut State, cmds: &[Cmd]) -> Result<Flow, ExecError> {
    for cmd in cmds {
        let flow = exec_cmd(state, cmd)?;
        if flow != Flow::Normal {
            return Ok(flow);
        }
    }
    Ok(Flow::Normal)
}

/// Run a command list in a fresh scope.
pub fn exec_block(state: &mut State, cmds: &[Cmd]) -> Result<Flow, ExecError> {
    state.vars.push();
    let result = run(state, cmds);
    state.vars.pop();
    result
}

/// Run under a temporary target-variable overlay.
pub fn under_target<T>(
    state: &mut State,
    tid: TargetId,
    f: impl FnOnce(&mut State) -> T,
) -> T {
    state.current_target.push(tid);
    let result = f(state);
    state.current_target.pop();
    result
}

fn exec_cmd(state: &mut State, cmd: &Cmd) -> Result<Flow, ExecError> {
    match cmd {
        Cmd::Assign { names, op, values } => {
            exec_assign(state, names, *op, values)?;
            Ok(Flow::Normal)
        }
        Cmd::AssignOn {
            names,
            targets,
            op,
            values,
        } => {
            exec_assign_on(state, names, targets, *op, values)?;
            Ok(Flow::Normal)
        }
        Cmd::Local { names, values } => {
            let names = expand_list(state, names)?;
            let value = expand_list(state, values)?;
            for name in names {
                state.vars.set_local(&name, value.clone());
            }
            Ok(Flow::Normal)
        }
        Cmd::Break => Ok(Flow::Break),
        Cmd::Continue => Ok(Flow::Continue),
        Cmd::Return(values) => Ok(Flow::Return(expand_list(state, values)?)),
        Cmd::Block(body) => exec_block(state, body),
        Cmd::Include(path) => {
            exec_include(state, path)?;
            Ok(Flow::Normal)
        }
        Cmd::Invoke { name, args } => {
            exec_rule(state, name, args)?;
            Ok(Flow::Normal)
        }
        Cmd::OnTarget { target, body } => {
            for name in expand_arg(state, target)? {
                let tid = state.targets.bind(&name);
                under_target(state, tid, |state| run(state, body))?;
            }
            Ok(Flow::Normal)
        }
        Cmd::For { var, items, body } => exec_for(state, var, items, body),
        Cmd::While { cond, body } => exec_while(state, cond, body),
        Cmd::If {
            cond,
            then_cmds,
            else_cmds,
        } => {
            if eval_expr(state, cond)?.truthy() {
                exec_block(state, then_cmds)
            } else {
                exec_block(state, else_cmds)
            }
        }
        Cmd::Switch { value, cases } => exec_switch(state, value, cases),
        Cmd::DefineRule { name, params, body } => {
            state.rules.insert(
                name.clone(),
                Rc::new(Rule {
                    name: name.clone(),
                    params: params.clone(),
                    commands: body.clone(),
                }),
            );
            Ok(Flow::Normal)
        }
        Cmd::DefineActions {
            name,
            flags,
            bindlist,
            script,
        } => {
            state.actions.insert(
                name.clone(),
                Rc::new(Action {
                    name: name.clone(),
                    flags: *flags,
                    bindlist: bindlist.clone(),
                    commands: script.clone(),
                }),
            );
            Ok(Flow::Normal)
        }
    }
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

fn exec_assign(
    state: &mut State,
    names: &List,
    op: AssignOp,
    values: &List,
) -> Result<(), ExecError> {
    let names = expand_list(state, names)?;
    let value = expand_list(state, values)?;

    for name in names {
        match op {
            AssignOp::Set => state.vars.set(&name, value.clone()),
            AssignOp::SetDefault => {
                // assign only when unset or empty everywhere
                if state.defined(&name).map_or(true, |v| v.is_empty()) {
                    state.vars.set(&name, value.clone());
                }
            }
            AssignOp::Append => {
                let current = state.get_var(&name);
                if current.is_empty() {
                    state.vars.set(&name, value.clone());
                } else {
                    let mut combined = current;
                    combined.extend(value.iter().cloned());
                    state.vars.set(&name, combined);
                }
            }
        }
    }
    Ok(())
}

fn exec_assign_on(
    state: &mut State,
    names: &List,
    targets: &List,
    op: AssignOp,
    values: &List,
) -> Result<(), ExecError> {
    let target_names = expand_list(state, targets)?;
    let value = expand_list(state, values)?;
    let names = expand_list(state, names)?;

    for varname in &names {
        for target_name in &target_names {
            let tid = state.targets.bind(target_name);
            let vars = &mut state.targets.get_mut(tid).vars;
            match op {
                AssignOp::Set => {
                    vars.insert(varname.clone(), value.clone());
                }
                AssignOp::SetDefault => {
                    vars.entry(varname.clone()).or_insert_with(|| value.clone());
                }
                AssignOp::Append => match vars.get_mut(varname) {
                    Some(current) if !current.is_empty() => {
                        current.extend(value.iter().cloned());
                    }
                    _ => {
                        vars.insert(varname.clone(), value.clone());
                    }
                },
            }
        }
    }
    Ok(())
}

// =============================================================================
// RULE INVOCATION
// =============================================================================

/// Invoke a rule statement: the name may expand to several rule names,
/// whose return values concatenate.
pub fn exec_rule(state: &mut State, name: &Arg, args: &Lol) -> Result<Value, ExecError> {
    let names = expand_arg(state, name)?;
    let params = expand_lol(state, args)?;

    let mut res = Vec::new();
    for name in names {
        res.extend(exec_one_rule(state, &name, &params)?);
    }
    Ok(res)
}

/// `[ rule args ]` and `[ on target rule args ]` expression invocation.
pub fn exec_rule_call(state: &mut State, call: &RuleCall) -> Result<Value, ExecError> {
    match &call.on_target {
        None => exec_rule(state, &call.name, &call.args),
        Some(target) => {
            let mut res = Vec::new();
            for name in expand_arg(state, target)? {
                let tid = state.targets.bind(&name);
                let val =
                    under_target(state, tid, |state| exec_rule(state, &call.name, &call.args))?;
                res.extend(val);
            }
            Ok(res)
        }
    }
}

/// Dispatch one rule name: builtin, then user rule, then a same-named
/// action scheduled from inside a rule body. Unknown rules warn once;
/// `Clean` is silently ignored since ninja owns cleaning.
pub fn exec_one_rule(
    state: &mut State,
    name: &str,
    params: &LolVal,
) -> Result<Value, ExecError> {
    if let Some(result) = builtins::call_builtin(state, name, params) {
        return result;
    }

    let rule = match state.rules.get(name) {
        Some(rule) => rule.clone(),
        None => {
            // a bare actions invocation; the guard keeps a rule body from
            // re-scheduling its own name
            let current_name = state.current_rule.as_ref().map(|r| r.name.clone());
            if state.actions.contains_key(name) && current_name.as_deref() != Some(name) {
                exec_rule_action(state, name, params)?;
                return Ok(Vec::new());
            }
            if name != "Clean" && !state.complained_rules.contains(name) {
                warn!("unknown rule {}", name);
                state.complained_rules.insert(name.to_string());
            }
            return Ok(Vec::new());
        }
    };

    // a rule and an action sharing a name: schedule the action too
    if state.actions.contains_key(name) {
        exec_rule_action(state, name, params)?;
    }

    let old_params = state.params.replace(params.clone());
    let old_rule = state.current_rule.replace(rule.clone());

    state.vars.push();
    for (i, param_name) in rule.params.iter().enumerate() {
        state
            .vars
            .set_local(param_name, params.get(i).cloned().unwrap_or_default());
    }
    let flow = run(state, &rule.commands);
    state.vars.pop();

    state.params = old_params;
    state.current_rule = old_rule;

    match flow? {
        Flow::Return(value) => Ok(value),
        // break/continue never escape a rule body
        _ => Ok(Vec::new()),
    }
}

// =============================================================================
// RULE-ACTION SCHEDULING
// =============================================================================

/// Schedule an action on the targets of the current invocation. Targets
/// already owned by a build step join that step's action chain; the rest
/// share one new step. Bindlist variables naming files get stub steps so
/// generated outputs exposed through variables participate in the graph.
fn exec_rule_action(
    state: &mut State,
    action_name: &str,
    params: &LolVal,
) -> Result<(), ExecError> {
    let target_names = lol_get(params, 0).to_vec();
    let source_names = lol_get(params, 1).to_vec();
    let action = state
        .actions
        .get(action_name)
        .cloned()
        .ok_or_else(|| ExecError::Eval(format!("no action named {}", action_name)))?;

    let sources: Vec<TargetId> = source_names
        .iter()
        .map(|name| state.targets.bind(name))
        .collect();
    let bindvars = action.bindlist.clone();

    let mut prev_step = None;
    let mut build_targets = Vec::new();
    let mut linking_targets = Vec::new();
    let mut bindtargets: Vec<TargetId> = Vec::new();

    for target_name in &target_names {
        let tid = state.targets.bind(target_name);
        state.targets.get_mut(tid).is_output = true;

        if let Some(step) = state.targets.get(tid).build_step {
            // an earlier step already builds this target; chain onto it
            prev_step = Some(step);
            linking_targets.push(tid);
        } else {
            build_targets.push(tid);
        }

        for var in &bindvars {
            let val = state.get_var_on(var, Some(tid));
            if val.is_empty() {
                continue;
            }
            let bound = state.targets.bind(&val[0]);
            let t = state.targets.get_mut(bound);
            t.boundname = Some(val[0].clone());
            t.bind_varname = Some(var.clone());
            if bound != tid {
                state.targets.get_mut(bound).depends.insert(tid);
            }
            if !bindtargets.contains(&bound) {
                bindtargets.push(bound);
            }
        }
    }

    if let Some(step_idx) = prev_step {
        let mut ua = UpdatingAction::new(action.clone(), sources.clone(), params.clone());
        ua.targets = linking_targets;
        ua.bindvars = bindvars.clone();
        state.build_steps[step_idx].action.link(ua);
    }

    if !build_targets.is_empty() {
        // one build step can output several targets
        let mut ua = UpdatingAction::new(action, sources, params.clone());
        ua.targets = build_targets.clone();
        ua.bindvars = bindvars;

        let step_idx = state.build_steps.len();
        for &tid in &build_targets {
            state.targets.get_mut(tid).build_step = Some(step_idx);
        }
        state.build_steps.push(BuildStep {
            targets: build_targets,
            action: ua,
        });
    }

    for bound in bindtargets {
        if state.targets.get(bound).build_step.is_some() {
            continue;
        }
        let t = state.targets.get(bound);
        let stub = Rc::new(Action {
            name: t.bind_varname.clone().unwrap_or_default(),
            flags: ActionFlags::default(),
            bindlist: Vec::new(),
            commands: Rc::new(format!("true # stub for {}", t.name)),
        });
        let mut ua = UpdatingAction::new(stub, Vec::new(), Vec::new());
        ua.targets = vec![bound];
        ua.restat = true;

        let step_idx = state.build_steps.len();
        state.targets.get_mut(bound).build_step = Some(step_idx);
        state.build_steps.push(BuildStep {
            targets: vec![bound],
            action: ua,
        });
    }

    Ok(())
}

// =============================================================================
// INCLUDE
// =============================================================================

fn exec_include(state: &mut State, path: &List) -> Result<(), ExecError> {
    for filename in expand_list(state, path)? {
        let tid = state.targets.bind(&filename);
        let boundname = under_target(state, tid, |state| target::search(state, tid, false));
        state.targets.get_mut(tid).boundname = boundname.clone();

        if state.debug.include {
            debug!("including {:?}, target: {}", boundname, filename);
        }

        let boundname = match boundname {
            Some(b) if state.fs.exists(&b) => b,
            other => return Err(ExecError::IncludeFailed(other.unwrap_or(filename))),
        };

        let contents = state.fs.read(&boundname)?;
        let cmds = state.parse_and_compile(&contents, Some(&boundname))?;
        state.vars.push();
        let result = run(state, &cmds);
        state.vars.pop();
        result?;
    }
    Ok(())
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

fn exec_for(
    state: &mut State,
    var: &Arg,
    items: &List,
    body: &[Cmd],
) -> Result<Flow, ExecError> {
    let items = expand_list(state, items)?;
    let varname = expand_arg(state, var)?
        .into_iter()
        .next()
        .ok_or_else(|| ExecError::Eval("got empty loop variable in for".to_string()))?;

    for item in items {
        state.vars.set(&varname, vec![item]);
        match exec_block(state, body)? {
            Flow::Break => break,
            Flow::Return(value) => return Ok(Flow::Return(value)),
            Flow::Normal | Flow::Continue => {}
        }
    }
    Ok(Flow::Normal)
}

fn exec_while(state: &mut State, cond: &Expr, body: &[Cmd]) -> Result<Flow, ExecError> {
    while eval_expr(state, cond)?.truthy() {
        match exec_block(state, body)? {
            Flow::Break => break,
            Flow::Return(value) => return Ok(Flow::Return(value)),
            Flow::Normal | Flow::Continue => {}
        }
    }
    Ok(Flow::Normal)
}

fn exec_switch(
    state: &mut State,
    value: &List,
    cases: &[(String, Rc<Vec<Cmd>>)],
) -> Result<Flow, ExecError> {
    let value = expand_list(state, value)?;
    if let Some(first) = value.first() {
        for (pattern, body) in cases {
            if pattern::matches(pattern, first) {
                return exec_block(state, body);
            }
        }
    }
    Ok(Flow::Normal)
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

enum Cond {
    Val(Value),
    Flag(bool),
}

impl Cond {
    fn truthy(&self) -> bool {
        match self {
            Cond::Val(value) => list_truthy(value),
            Cond::Flag(flag) => *flag,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Cond::Val(value) => value,
            Cond::Flag(true) => vec!["1".to_string()],
            Cond::Flag(false) => Vec::new(),
        }
    }
}

fn eval_expr(state: &mut State, expr: &Expr) -> Result<Cond, ExecError> {
    match expr {
        Expr::List(list) => Ok(Cond::Val(expand_list(state, list)?)),
        Expr::Not(inner) => Ok(Cond::Flag(!eval_expr(state, inner)?.truthy())),
        Expr::And(left, right) => Ok(Cond::Flag(
            eval_expr(state, left)?.truthy() && eval_expr(state, right)?.truthy(),
        )),
        Expr::Or(left, right) => Ok(Cond::Flag(
            eval_expr(state, left)?.truthy() || eval_expr(state, right)?.truthy(),
        )),
        Expr::In(left, right) => {
            let left = expand_list(state, left)?;
            let right: HashSet<String> = expand_list(state, right)?.into_iter().collect();
            Ok(Cond::Flag(left.iter().all(|item| right.contains(item))))
        }
        Expr::Compare(op, left, right) => {
            let left = eval_expr(state, left)?.into_value();
            let right = eval_expr(state, right)?.into_value();
            use crate::ast::types::CmpOp::*;
            let result = match op {
                Eq => left == right,
                Ne => left != right,
                Lt => left < right,
                Gt => left > right,
                Le => left <= right,
                Ge => left >= right,
            };
            Ok(Cond::Flag(result))
        }
    }
}
