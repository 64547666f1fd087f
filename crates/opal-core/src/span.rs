use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location carried by nodes and members for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Span for synthetic nodes created by the optimizer
    pub fn dummy() -> Self {
        Span::default()
    }

    pub fn is_dummy(&self) -> bool {
        *self == Span::default()
    }

    /// Smallest span covering both `self` and `other`
    pub fn combine(&self, other: &Span) -> Span {
        if self.is_dummy() {
            return *other;
        }
        if other.is_dummy() {
            return *self;
        }
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
