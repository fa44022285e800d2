//! Source positions carried on AST nodes and values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source position of an AST node or value.
///
/// Line `0` means the position is unknown (synthesised nodes, values built
/// by the evaluator). Spans are carried for diagnostics only; equality of
/// values and comparisons of stripped expressions ignore them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Span for nodes with no source position.
    pub fn unknown() -> Self {
        Self { line: 0, col: 0 }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}", self.line, self.col)
        }
    }
}
