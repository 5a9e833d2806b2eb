//! Common definitions shared across the assembler and interpreter.

// Use sorted sets and maps for consistent, deterministic output.
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// A single point in the source text, expressed as a 1-based line and
/// 0-based column so the numbers printed in diagnostics line up with what a
/// text editor shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{line}:{column}")]
pub struct CodePosition {
    pub line: usize,
    pub column: usize,
}

impl CodePosition {
    pub fn new(line: usize, column: usize) -> Self {
        CodePosition { line, column }
    }
}

/// A half-open interval of source positions, used to annotate errors back to
/// the lines that caused them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodePositionInterval {
    pub start: CodePosition,
    pub end: CodePosition,
}

impl CodePositionInterval {
    pub fn new(start: CodePosition, end: CodePosition) -> Self {
        CodePositionInterval { start, end }
    }

    pub fn at_line(line: usize) -> Self {
        CodePositionInterval {
            start: CodePosition::new(line, 0),
            end: CodePosition::new(line, usize::MAX),
        }
    }

    /// The smallest interval containing both `self` and `other`.
    pub fn unite(&self, other: &CodePositionInterval) -> CodePositionInterval {
        CodePositionInterval {
            start: (self.start).min(other.start),
            end: (self.end).max(other.end),
        }
    }
}

impl std::fmt::Display for CodePositionInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A string paired with the source interval it was lexed from, threaded
/// through parsing so that any later error can be pinned back to the exact
/// source text that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionedString {
    text: String,
    interval: CodePositionInterval,
}

impl PositionedString {
    pub fn new(text: impl Into<String>, interval: CodePositionInterval) -> Self {
        PositionedString {
            text: text.into(),
            interval,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn interval(&self) -> CodePositionInterval {
        self.interval
    }

    pub fn map_text(&self, text: impl Into<String>) -> PositionedString {
        PositionedString::new(text, self.interval)
    }
}

impl std::fmt::Display for PositionedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
