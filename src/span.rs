//! Source positions and spans (C1).
//!
//! A [`Position`] is a `(line, column, offset)` triple; a [`Span`] is the
//! half-open range `[start, end)` between two positions. Every token and
//! every AST node carries a span so that errors and presentation data can
//! be traced back to exact source ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single point in a source buffer.
///
/// `line` and `column` are 1-based, matching how editors and compilers
/// usually report positions to humans. `offset` is the 0-based byte offset
/// into the buffer and is what `Scanner` actually advances; `line`/`column`
/// are recomputed incrementally from a stored "start of current line"
/// offset rather than by rescanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub const fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width span, useful as a placeholder for synthesized nodes
    /// (e.g. override skeletons that never existed in source text).
    pub fn synthetic() -> Self {
        Self {
            start: Position::start(),
            end: Position::start(),
        }
    }

    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
