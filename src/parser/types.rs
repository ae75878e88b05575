//! Parser Types
//!
//! Shared types used across the lexer and parser.

use std::fmt;
use thiserror::Error;

/// A source-located parse failure. Parse errors are fatal: the driver
/// reports them and exits.
#[derive(Debug, Error, Clone)]
pub struct ParseError {
    pub message: String,
    pub file: String,
    pub line: usize,
    pub token: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)?;
        if let Some(token) = &self.token {
            write!(f, " (near '{}')", token)?;
        }
        Ok(())
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>, file: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            line,
            token: None,
        }
    }

    pub fn with_token(
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        token: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            line,
            token: Some(token.into()),
        }
    }
}
