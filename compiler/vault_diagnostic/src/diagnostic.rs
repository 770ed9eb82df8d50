//! Diagnostic records and their `ariadne` rendering.

use ariadne::{Color, Label, Report, ReportKind, Source};
use std::fmt;
use vault_ir::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn report_kind(self) -> ReportKind<'static> {
        match self {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
            Severity::Note => ReportKind::Advice,
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::Note => Color::Blue,
        }
    }
}

/// A secondary annotation attached to a diagnostic: used to chain
/// `__cause__`/`__context__` exception links when printing a traceback,
/// and to point at a second relevant span in a parse error.
#[derive(Debug, Clone)]
pub struct DiagnosticLabel {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub labels: Vec<DiagnosticLabel>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into(), span: None, labels: Vec::new() }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(DiagnosticLabel { span, message: message.into() });
        self
    }

    /// Render this diagnostic against `source`, writing an `ariadne`
    /// source-pointing report to `writer`. Falls back to a plain one-line
    /// message when no span was recorded (e.g. an I/O-level failure that
    /// never reached a parser).
    pub fn render(
        &self,
        filename: &str,
        source: &str,
        writer: &mut impl std::io::Write,
    ) -> std::io::Result<()> {
        let Some(span) = self.span else {
            return writeln!(writer, "{filename}: {}", self.message);
        };
        let range = span.start as usize..span.end.max(span.start + 1) as usize;
        let mut builder = Report::build(self.severity.report_kind(), filename, range.start)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, range))
                    .with_message(&self.message)
                    .with_color(self.severity.color()),
            );
        for label in &self.labels {
            let lrange = label.span.start as usize..label.span.end.max(label.span.start + 1) as usize;
            builder = builder.with_label(
                Label::new((filename, lrange))
                    .with_message(&label.message)
                    .with_color(Color::Cyan),
            );
        }
        builder
            .finish()
            .write((filename, Source::from(source)), &mut *writer)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A fatal failure to produce a `CodeUnit` from source text: a lex error,
/// a syntax error, or a static-analysis error (e.g. `nonlocal` naming a
/// variable with no enclosing binding). Always pre-execution, per §7
/// "fatal vs. recoverable" — never raised once a module starts running.
#[derive(Debug, Clone)]
pub struct CompileError(pub Diagnostic);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.message)
    }
}

impl std::error::Error for CompileError {}

impl From<Diagnostic> for CompileError {
    fn from(d: Diagnostic) -> Self {
        CompileError(d)
    }
}
