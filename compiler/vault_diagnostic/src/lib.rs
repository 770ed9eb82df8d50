//! Diagnostic and error reporting for the Vault sandboxed interpreter.
//!
//! Splits cleanly along §7's fatal/recoverable line: [`CompileError`] is
//! the fatal, pre-execution tier (lex/parse/static-analysis failures,
//! surfaced before a single statement runs); ordinary runtime exceptions
//! are `vault_patterns::Value` instances and never pass through here.

mod diagnostic;

pub use diagnostic::{CompileError, Diagnostic, DiagnosticLabel, Severity};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_panicking_when_span_present() {
        let diag = Diagnostic::error("unexpected indent").with_span(vault_ir::Span::new(4, 10, 2));
        let mut buf = Vec::new();
        diag.render("test.vlt", "def f():\n    pass\n", &mut buf).unwrap();
        assert!(!buf.is_empty());
    }

    #[test]
    fn renders_plain_message_without_span() {
        let diag = Diagnostic::error("could not read file");
        let mut buf = Vec::new();
        diag.render("missing.vlt", "", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("could not read file"));
    }
}
