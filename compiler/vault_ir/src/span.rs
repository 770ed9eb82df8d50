//! Source positions attached to AST nodes and diagnostics.

/// A half-open byte range into a single source file, plus the 1-based line
/// it starts on. Kept deliberately small (`Copy`) since every AST node and
/// every raised exception carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32) -> Self {
        Self { start, end, line }
    }

    /// A zero-width span at a single line, used for synthesized nodes
    /// (implicit `return None`, desugared `for`/`else` clauses) that have
    /// no direct source text of their own.
    pub fn synthetic(line: u32) -> Self {
        Self { start: 0, end: 0, line }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
        }
    }
}
