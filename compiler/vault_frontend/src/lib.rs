//! Reference frontend for the Vault sandboxed scripting engine: turns
//! source text into the `CodeUnit` (`vault_ir::scope::CodeUnit`)
//! `vault_eval::Interpreter` runs. Three independent stages, each in its
//! own module, wired together by [`compile`]:
//!
//! 1. [`lexer`] — `logos`-driven tokenizing plus an indentation post-pass.
//! 2. [`parser`] — recursive-descent parsing into `vault_ir::ast`.
//! 3. [`analyzer`] — two-pass static scope analysis into a `ScopeTree`.
//!
//! An embedder that wants a different syntax (or a precompiled bytecode
//! cache) can skip this crate entirely and implement
//! `vault_eval::SourceCompiler` directly; this crate is just the reference
//! implementation of that seam.

pub mod analyzer;
pub mod lexer;
pub mod parser;

use vault_diagnostic::CompileError;
use vault_eval::SourceCompiler;
use vault_ir::scope::CodeUnit;
use std::sync::Arc;

/// Lex, parse, and analyze `source` into a fully resolved [`CodeUnit`].
pub fn compile(source: &str, filename: &str) -> Result<CodeUnit, CompileError> {
    let tokens = lexer::tokenize(source, filename)?;
    let (body, scope_count) = parser::parse(&tokens)?;
    let (scopes, root_scope) = analyzer::analyze(&body, scope_count)?;
    Ok(CodeUnit { filename: Arc::from(filename), body, scopes: Arc::new(scopes), root_scope })
}

/// The `vault_eval::SourceCompiler` this crate's pipeline implements,
/// ready to hand to `InterpreterBuilder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Frontend;

impl SourceCompiler for Frontend {
    fn compile(&self, source: &str, filename: &str) -> Result<CodeUnit, CompileError> {
        compile(source, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_trivial_module() {
        let unit = compile("x = 1\nprint(x)\n", "<test>").expect("compiles");
        assert_eq!(unit.body.stmts.len(), 2);
    }

    #[test]
    fn resolves_closure_cellvar() {
        let src = "def outer():\n    x = 1\n    def inner():\n        return x\n    return inner\n";
        let unit = compile(src, "<test>").expect("compiles");
        assert_eq!(unit.body.stmts.len(), 1);
    }

    #[test]
    fn rejects_inconsistent_indentation() {
        let src = "if True:\n    x = 1\n   y = 2\n";
        assert!(compile(src, "<test>").is_err());
    }
}
