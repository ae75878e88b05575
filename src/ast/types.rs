//! AST Types for Jam
//!
//! Jam is statement-oriented: a script is a statement list, statements
//! carry argument lists, and argument lists group into colon-separated
//! lists-of-lists at rule invocations.

// =============================================================================
// ARGUMENTS
// =============================================================================

/// One argument position: a literal word (possibly containing `$(...)`
/// expansions, resolved at evaluation time) or a bracketed rule invocation
/// whose return value replaces it.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Word(String),
    Call(Box<RuleCall>),
}

impl Arg {
    pub fn word(s: impl Into<String>) -> Self {
        Arg::Word(s.into())
    }
}

/// `[ rule args ]`, or `[ on target rule args ]` which evaluates under the
/// target's variable overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCall {
    pub on_target: Option<Arg>,
    pub name: Arg,
    pub args: Lol,
}

/// A whitespace-separated argument list.
pub type List = Vec<Arg>;

/// Colon-separated argument lists: the positional vector of a rule call.
pub type Lol = Vec<List>;

// =============================================================================
// STATEMENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `?=` and `default =`: assign only when unset or empty
    SetDefault,
    /// `+=`
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name op values ;`
    Assign {
        names: List,
        op: AssignOp,
        values: List,
    },
    /// `name on targets op values ;`
    AssignOn {
        names: List,
        targets: List,
        op: AssignOp,
        values: List,
    },
    /// `local names [ = values ] ;`
    Local { names: List, values: List },
    Break,
    Continue,
    /// `return values ;`
    Return { values: List },
    /// `{ ... }` runs in a fresh scope
    Block(Vec<Stmt>),
    /// `include path ;`
    Include { path: List },
    /// `name args : args ... ;`
    Call { name: Arg, args: Lol },
    /// `on target statement`
    On { target: Arg, body: Vec<Stmt> },
    /// `for var in items { ... }`
    For {
        var: Arg,
        items: List,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    /// `switch value { case pat : ... }`
    Switch {
        value: List,
        cases: Vec<SwitchCase>,
    },
    RuleDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    ActionsDef(ActionsDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub pattern: String,
    pub body: Vec<Stmt>,
}

/// `actions [flags] name [ bind vars ] { raw shell text }`
#[derive(Debug, Clone, PartialEq)]
pub struct ActionsDef {
    pub name: String,
    pub flags: ActionFlags,
    pub bindlist: Vec<String>,
    pub script: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionFlags {
    pub updated: bool,
    pub together: bool,
    pub ignore: bool,
    pub quietly: bool,
    pub piecemeal: bool,
    pub existing: bool,
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Condition expressions for `if` and `while`. A bare list is truthy when
/// it is non-empty and its first element is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    List(List),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// `left in right`: left, as a set, is a subset of right
    In(List, List),
}
