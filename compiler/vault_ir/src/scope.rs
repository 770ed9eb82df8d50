//! Static scope information produced by the analyzer and consumed by the
//! interpreter's name-resolution fast path (§4.1–§4.2).
//!
//! Resolving every `Name` node at tree-walk time by searching enclosing
//! scopes would be correct but slow and would require the evaluator to
//! understand binding rules it has no business re-deriving. Instead the
//! analyzer classifies every name once, up front, into the bucket the
//! interpreter mechanically trusts: a local slot, a free variable captured
//! from an enclosing function, a cell a nested function captures from this
//! one, or an implicit/explicit global.

use crate::ast::Block;
use crate::name::Name;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Module,
    Function,
    Lambda,
    Class,
    Comprehension,
    GeneratorExpr,
}

/// Where a `Name` resolves within its own code unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// A plain local slot, not captured by any nested scope.
    Local,
    /// A local slot captured by at least one nested scope: must live in a
    /// `Cell` rather than a bare `Value` so mutations are visible to the
    /// closures that captured it.
    Cellvar,
    /// A name this scope does not bind itself but reads from an enclosing
    /// function scope's cellvar.
    Freevar,
    /// An explicit `global` declaration, or an unbound name at module
    /// scope: resolves against the module's global namespace regardless
    /// of lexical nesting.
    Global,
    /// A name read but never assigned anywhere in the chain of enclosing
    /// function scopes: falls through to builtins at runtime.
    Unresolved,
}

/// The complete static classification of every name bound or read in one
/// code unit (module, function, lambda, or comprehension body).
#[derive(Debug, Clone, Default)]
pub struct ScopeInfo {
    pub kind: Option<ScopeKind>,
    pub bindings: FxHashMap<Name, Binding>,
    /// Names declared `global` anywhere in this scope's body, independent
    /// of whether they are also locally assigned (both are legal prior to
    /// the `global` statement's own enforcement pass).
    pub declared_globals: Vec<Name>,
    /// Cellvars in *enclosing* scopes this scope captures, in the order
    /// its `FunctionDef`/`Lambda` node needs them bound at closure-creation
    /// time.
    pub free_slots: Vec<Name>,
}

impl ScopeInfo {
    pub fn binding_of(&self, name: Name) -> Binding {
        self.bindings.get(&name).copied().unwrap_or(Binding::Unresolved)
    }
}

/// One entry in a module's flattened scope tree: a function, lambda,
/// class body, or comprehension, plus the `ScopeInfo` the analyzer
/// computed for it and a link back to its lexical parent.
#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub info: ScopeInfo,
    pub parent: Option<u32>,
}

/// All code units belonging to one compiled module, flattened into a
/// single indexable tree so `FunctionDef`/`ClassDef`/`Lambda` nodes can
/// carry a plain `u32` (`scope_id`) instead of an owned sub-tree.
///
/// Lookup is normally by `scope_id` set during parsing; `find` is kept for
/// tooling and tests that need to recover a scope from source position,
/// indexed the way `symtable_utils.py`'s `(kind, name, lineno)` triple
/// does, with repeated-lambda-on-one-line disambiguated by declaration
/// order among same-key entries.
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
    index: FxHashMap<(ScopeKind, Name, u32), Vec<u32>>,
}

impl ScopeTree {
    pub fn push(&mut self, name: Name, line: u32, parent: Option<u32>, info: ScopeInfo) -> u32 {
        let id = u32::try_from(self.nodes.len()).expect("scope tree overflow");
        let kind = info.kind.unwrap_or(ScopeKind::Function);
        self.index.entry((kind, name, line)).or_default().push(id);
        self.nodes.push(ScopeNode { info, parent });
        id
    }

    pub fn get(&self, id: u32) -> &ScopeNode {
        &self.nodes[id as usize]
    }

    /// Find the `occurrence`-th scope (0-based, in declaration order)
    /// matching `(kind, name, line)`. Needed because a single source line
    /// can host more than one `lambda`.
    pub fn find(&self, kind: ScopeKind, name: Name, line: u32, occurrence: usize) -> Option<u32> {
        self.index.get(&(kind, name, line))?.get(occurrence).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A fully compiled module or standalone code object: its AST plus the
/// scope tree the analyzer derived from it. This is what a `SourceCompiler`
/// implementation hands the interpreter; the interpreter never parses or
/// analyzes source text itself (§6, "parser and analyzer are external
/// collaborators").
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub filename: Arc<str>,
    pub body: Block,
    pub scopes: Arc<ScopeTree>,
    /// `scope_id` of the module-level scope within `scopes`.
    pub root_scope: u32,
}
