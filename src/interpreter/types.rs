//! Interpreter Types
//!
//! The value model (every Jam value is a list of strings), the control-flow
//! result of block execution, and the fatal error type. `break`, `continue`
//! and `return` are ordinary return variants, not errors: they propagate
//! exactly one frame (loops) or out of the enclosing rule body (`return`).

use std::rc::Rc;

use thiserror::Error;

use crate::ast::types::ActionFlags;
use crate::compile::Cmd;
use crate::fs::FsError;
use crate::parser::ParseError;

/// A Jam value: an ordered list of strings. A scalar is a one-element list.
pub type Value = Vec<String>;

/// An expanded list-of-lists: the positional argument vector of a rule.
/// Position 0 is `$(1)` / `$(<)`, position 1 is `$(2)` / `$(>)`.
pub type LolVal = Vec<Value>;

/// Column `i` of a LoL, or the empty list.
pub fn lol_get(lol: &LolVal, i: usize) -> &[String] {
    lol.get(i).map(|v| v.as_slice()).unwrap_or(&[])
}

/// List truth: non-empty and first element non-empty.
pub fn list_truthy(v: &[String]) -> bool {
    !v.is_empty() && !v[0].is_empty()
}

/// How a block finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Fatal evaluation failures. The three warn-continue classes (unknown
/// rule, missing header file, out-of-root include) never surface here.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Eval(String),

    #[error("Jamfile not found")]
    JamfileNotFound,

    #[error("include failed on file: {0}")]
    IncludeFailed(String),

    /// The Jam `EXIT` rule.
    #[error("{message}")]
    Exit { message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A named function body written in Jam.
#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub params: Vec<String>,
    pub commands: Rc<Vec<Cmd>>,
}

/// A named template of shell commands with flags and a bind list.
#[derive(Debug)]
pub struct Action {
    pub name: String,
    pub flags: ActionFlags,
    pub bindlist: Vec<String>,
    pub commands: Rc<String>,
}
