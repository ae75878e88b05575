//! Compiler
//!
//! Lowers the parsed AST into executable command nodes. The pass is purely
//! structural: assignment operators are resolved, rule bodies become shared
//! command lists so definitions are cheap to store and re-enter, and action
//! scripts are interned. No evaluation happens here.

use std::rc::Rc;

use crate::ast::types::{ActionFlags, Arg, AssignOp, Expr, List, Lol, Stmt, Stmt::*};

/// An executable command node.
#[derive(Debug, Clone)]
pub enum Cmd {
    Assign {
        names: List,
        op: AssignOp,
        values: List,
    },
    AssignOn {
        names: List,
        targets: List,
        op: AssignOp,
        values: List,
    },
    Local {
        names: List,
        values: List,
    },
    Break,
    Continue,
    Return(List),
    Block(Rc<Vec<Cmd>>),
    Include(List),
    Invoke {
        name: Arg,
        args: Lol,
    },
    OnTarget {
        target: Arg,
        body: Rc<Vec<Cmd>>,
    },
    For {
        var: Arg,
        items: List,
        body: Rc<Vec<Cmd>>,
    },
    While {
        cond: Expr,
        body: Rc<Vec<Cmd>>,
    },
    If {
        cond: Expr,
        then_cmds: Rc<Vec<Cmd>>,
        else_cmds: Rc<Vec<Cmd>>,
    },
    Switch {
        value: List,
        cases: Vec<(String, Rc<Vec<Cmd>>)>,
    },
    DefineRule {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Cmd>>,
    },
    DefineActions {
        name: String,
        flags: ActionFlags,
        bindlist: Vec<String>,
        script: Rc<String>,
    },
}

/// Lower a statement list into command nodes.
pub fn compile(stmts: &[Stmt]) -> Vec<Cmd> {
    stmts.iter().map(compile_stmt).collect()
}

fn compile_block(stmts: &[Stmt]) -> Rc<Vec<Cmd>> {
    Rc::new(compile(stmts))
}

fn compile_stmt(stmt: &Stmt) -> Cmd {
    match stmt {
        Assign { names, op, values } => Cmd::Assign {
            names: names.clone(),
            op: *op,
            values: values.clone(),
        },
        AssignOn {
            names,
            targets,
            op,
            values,
        } => Cmd::AssignOn {
            names: names.clone(),
            targets: targets.clone(),
            op: *op,
            values: values.clone(),
        },
        Local { names, values } => Cmd::Local {
            names: names.clone(),
            values: values.clone(),
        },
        Stmt::Break => Cmd::Break,
        Stmt::Continue => Cmd::Continue,
        Return { values } => Cmd::Return(values.clone()),
        Block(body) => Cmd::Block(compile_block(body)),
        Include { path } => Cmd::Include(path.clone()),
        Call { name, args } => Cmd::Invoke {
            name: name.clone(),
            args: args.clone(),
        },
        On { target, body } => Cmd::OnTarget {
            target: target.clone(),
            body: compile_block(body),
        },
        For { var, items, body } => Cmd::For {
            var: var.clone(),
            items: items.clone(),
            body: compile_block(body),
        },
        While { cond, body } => Cmd::While {
            cond: cond.clone(),
            body: compile_block(body),
        },
        If {
            cond,
            then_body,
            else_body,
        } => Cmd::If {
            cond: cond.clone(),
            then_cmds: compile_block(then_body),
            else_cmds: else_body
                .as_ref()
                .map(|b| compile_block(b))
                .unwrap_or_else(|| Rc::new(Vec::new())),
        },
        Switch { value, cases } => Cmd::Switch {
            value: value.clone(),
            cases: cases
                .iter()
                .map(|c| (c.pattern.clone(), compile_block(&c.body)))
                .collect(),
        },
        RuleDef { name, params, body } => Cmd::DefineRule {
            name: name.clone(),
            params: params.clone(),
            body: compile_block(body),
        },
        ActionsDef(def) => Cmd::DefineActions {
            name: def.name.clone(),
            flags: def.flags,
            bindlist: def.bindlist.clone(),
            script: Rc::new(def.script.clone()),
        },
    }
}
