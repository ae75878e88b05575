//! Ninja Output Module
//!
//! A minimal ninja-syntax writer and the emitter that lowers build steps
//! into rules and build statements.

pub mod emit;
pub mod syntax;

pub use emit::ninja_build;
pub use syntax::{RuleOpts, Writer};

/// Sentinel that round-trips a literal `$` past Jam expansion: Jam's own
/// `$` is doubled to `$$` for ninja first, then the sentinel is lowered
/// back to a single `$`.
pub const NINJA_SIGIL: &str = "<NINJA_SIGIL>";
