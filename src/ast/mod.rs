//! Abstract Syntax Tree for the Jam language
//!
//! The parser produces these nodes; the compiler lowers them into
//! executable command nodes.

pub mod types;

pub use types::*;
