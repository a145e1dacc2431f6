use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::cell::RefCell;
use std::fmt;
use std::io;

/// A cursor into the source text.
///
/// `line` and `column` start at one. `offset` counts characters from the
/// beginning of the input and is what the diagnostic renderer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub fn new() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Moves the cursor past `c`.
    pub fn step(&mut self, c: char) {
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Span of a token or of a diagnostic: from its first character up to,
/// but not including, `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexLocation {
    pub start: Position,
    pub end: Position,
}

impl LexLocation {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn single(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    fn range(&self) -> std::ops::Range<usize> {
        if self.end.offset > self.start.offset {
            self.start.offset..self.end.offset
        } else {
            self.start.offset..self.start.offset + 1
        }
    }
}

impl fmt::Display for LexLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    RuntimeError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub location: Option<LexLocation>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, location: LexLocation, message: String) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            location: Some(location),
            message,
        }
    }

    pub fn warning(kind: ErrorKind, location: LexLocation, message: String) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            location: Some(location),
            message,
        }
    }

    pub fn runtime_error(message: String) -> Self {
        Self {
            kind: ErrorKind::RuntimeError,
            severity: Severity::Error,
            location: None,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Renders the diagnostic to stderr against `source`.
    pub fn report(&self, source: &str, filename: Option<&str>) -> io::Result<()> {
        let filename = filename.unwrap_or("<stdin>");

        let color = match (self.severity, self.kind) {
            (Severity::Warning, _) => Color::Blue,
            (_, ErrorKind::LexError) => Color::Red,
            (_, ErrorKind::ParseError) => Color::Yellow,
            (_, ErrorKind::RuntimeError) => Color::Magenta,
        };

        let kind_str = match self.kind {
            ErrorKind::LexError => "Lexical",
            ErrorKind::ParseError => "Syntax",
            ErrorKind::RuntimeError => "Runtime",
        };

        let report_kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let offset = self.location.map_or(0, |loc| loc.start.offset);
        let mut report_builder = Report::build(report_kind, filename, offset)
            .with_message(format!("{}: {}", kind_str.fg(color), self.message));

        if let Some(location) = self.location {
            report_builder = report_builder.with_label(
                Label::new((filename, location.range()))
                    .with_message(&self.message)
                    .with_color(color),
            );
        }

        report_builder
            .finish()
            .eprint((filename, Source::from(source)))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{}: {}", location.start, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Where the scanner, parser and interpreter send their complaints.
///
/// Methods take `&self` so one sink can be shared by every stage of a run.
pub trait ErrorSink {
    fn report_error(&self, kind: ErrorKind, location: LexLocation, message: String);
    fn report_warning(&self, kind: ErrorKind, location: LexLocation, message: String);
    fn report_runtime_error(&self, message: String);

    /// Re-reports a diagnostic collected elsewhere.
    fn report_diagnostic(&self, diagnostic: Diagnostic) {
        let Diagnostic {
            kind,
            severity,
            location,
            message,
        } = diagnostic;
        match (severity, location) {
            (Severity::Warning, Some(location)) => self.report_warning(kind, location, message),
            (_, Some(location)) => self.report_error(kind, location, message),
            (_, None) => self.report_runtime_error(message),
        }
    }
}

/// Keeps every diagnostic in memory, in the order reported.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.borrow().iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| !d.is_error())
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Removes and returns everything collected so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow_mut().drain(..).collect()
    }

    fn push(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}

impl ErrorSink for DiagnosticCollector {
    fn report_error(&self, kind: ErrorKind, location: LexLocation, message: String) {
        self.push(Diagnostic::error(kind, location, message));
    }

    fn report_warning(&self, kind: ErrorKind, location: LexLocation, message: String) {
        self.push(Diagnostic::warning(kind, location, message));
    }

    fn report_runtime_error(&self, message: String) {
        self.push(Diagnostic::runtime_error(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_resets_column_after_newline() {
        let mut pos = Position::new();
        pos.step('a');
        pos.step('b');
        assert_eq!((pos.line, pos.column, pos.offset), (1, 3, 2));
        pos.step('\n');
        assert_eq!((pos.line, pos.column, pos.offset), (2, 1, 3));
    }

    #[test]
    fn collector_counts_by_severity() {
        let sink = DiagnosticCollector::new();
        let loc = LexLocation::single(Position::new());
        sink.report_error(ErrorKind::LexError, loc, "bad".to_string());
        sink.report_warning(ErrorKind::LexError, loc, "meh".to_string());
        sink.report_runtime_error("worse".to_string());

        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
        assert_eq!(sink.diagnostics()[2].location, None);
        assert_eq!(sink.drain().len(), 3);
        assert!(!sink.has_errors());
    }
}
