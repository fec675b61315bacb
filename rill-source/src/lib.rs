//! Source code representation and diagnostic management.
//!
//! A [`Source`] is the compilation context threaded through every phase. It owns the
//! [`Diagnostics`] sink so that independent compilations never share state.

use derive_more::Display;
use std::{cell::RefCell, fmt, ops::Range};

/// A byte range into the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A human readable location. `line` and `column` are 1-based, `column` counts characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{line}:{column}")]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Severity {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
}

/// The compilation phase a [`Diagnostic`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Phase {
    #[display("lexical")]
    Lexical,
    #[display("syntax")]
    Syntax,
    #[display("semantic")]
    Semantic,
    #[display("codegen")]
    Codegen,
}

/// A compiler message with a location.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub phase: Phase,
}

impl Diagnostic {
    pub fn error(phase: Phase, message: impl ToString, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.to_string(),
            span,
            phase,
        }
    }

    pub fn warning(phase: Phase, message: impl ToString, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.to_string(),
            span,
            phase,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Accumulates diagnostics from every phase, in insertion order.
pub struct Diagnostics {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Diagnostics {
    /// Create an empty `Diagnostics` sink.
    pub fn new() -> Self {
        Self {
            diagnostics: RefCell::new(Vec::new()),
        }
    }

    /// Adds a diagnostic.
    /// This method uses the interior mutability pattern. This does not require mutability for ergonomics.
    pub fn add(&self, diagnostic: Diagnostic) {
        // This should be the only place where self.diagnostics is borrowed mutably.
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.is_error())
            .count()
    }

    /// Returns a copy of every diagnostic in insertion order.
    pub fn to_vec(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Returns every diagnostic in source order. Diagnostics at the same offset keep their insertion order.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self.to_vec();
        diagnostics.sort_by_key(|d| d.span.start);
        diagnostics
    }

    /// Returns the messages of all error-severity diagnostics in insertion order.
    pub fn error_messages(&self) -> Vec<String> {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.message.clone())
            .collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| !d.is_error())
            .map(|d| d.message.clone())
            .collect()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Represents source code.
pub struct Source<'a> {
    /// Name used when rendering diagnostics, usually the file path.
    pub name: String,
    /// Original source code.
    pub content: &'a str,
    /// Accumulated diagnostics.
    pub diagnostics: Diagnostics,
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
}

impl<'a> Source<'a> {
    /// Create a new `Source` with the specified `content`.
    pub fn new(content: &'a str) -> Self {
        Self::with_name("<input>", content)
    }

    pub fn with_name(name: impl ToString, content: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            name: name.to_string(),
            content,
            diagnostics: Diagnostics::new(),
            line_starts,
        }
    }

    /// Returns `true` if `Source` has no accumulated errors. Warnings are ignored.
    pub fn has_no_errors(&self) -> bool {
        self.diagnostics.error_count() == 0
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.add(diagnostic);
    }

    /// Converts a byte offset into a line and column.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.content.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .content
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset - line_start);
        Position {
            line: line + 1,
            column: column + 1,
            offset,
        }
    }

    /// Returns the 1-based line number for a byte offset.
    pub fn line(&self, offset: usize) -> usize {
        self.position(offset).line
    }

    /// Returns a value implementing [`fmt::Display`] that renders a single diagnostic.
    pub fn render<'s>(&'s self, diagnostic: &'s Diagnostic) -> Rendered<'s, 'a> {
        Rendered {
            source: self,
            diagnostic,
        }
    }

    /// Renders every diagnostic in source order, one per line.
    pub fn render_all(&self) -> String {
        self.diagnostics
            .sorted()
            .iter()
            .map(|d| format!("{}\n", self.render(d)))
            .collect()
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(content: &'a str) -> Self {
        Source::new(content)
    }
}

/// A diagnostic rendered as `<file>:<line>:<column>: <severity>: <message>`.
pub struct Rendered<'s, 'a> {
    source: &'s Source<'a>,
    diagnostic: &'s Diagnostic,
}

impl fmt::Display for Rendered<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = self.source.position(self.diagnostic.span.start);
        write!(
            f,
            "{}:{}: {}: {}",
            self.source.name, position, self.diagnostic.severity, self.diagnostic.message
        )
    }
}
