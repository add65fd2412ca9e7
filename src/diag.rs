//! Diagnostics accumulated by the compiler stages.
//!
//! Every stage collects `Diagnostic`s instead of unwinding; the driver decides
//! what to do with them. `CompileError` is the coarse per-stage failure the
//! driver reports once diagnostics have been printed.

use std::fmt;

use thiserror::Error;

use crate::token::SourceLocation;

/// A single error message with its source position.
///
/// Lowering errors carry no position (the AST stores none); they use line 0
/// and render without the line/column suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn at(location: &SourceLocation, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: location.file.clone(),
            line: location.line,
            column: location.column,
        }
    }

    pub fn unlocated(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: error: {}", self.file, self.message)
        } else {
            write!(
                f,
                "{}:{}:{}: error: {}",
                self.file, self.line, self.column, self.message
            )
        }
    }
}

/// Stage-level failure surfaced by the driver after diagnostics are printed.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0} syntax error(s)")]
    Syntax(usize),
    #[error("{0} semantic error(s)")]
    Semantic(usize),
    #[error("module verification failed: {0}")]
    Verification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_located_and_unlocated() {
        let loc = SourceLocation {
            file: "a.c".into(),
            line: 3,
            column: 9,
        };
        assert_eq!(
            Diagnostic::at(&loc, "Expected ';'").to_string(),
            "a.c:3:9: error: Expected ';'"
        );
        assert_eq!(
            Diagnostic::unlocated("a.c", "Undeclared variable: x").to_string(),
            "a.c: error: Undeclared variable: x"
        );
    }
}
