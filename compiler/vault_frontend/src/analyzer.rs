//! Static scope analysis (§4.1–§4.2): classifies every name bound or read
//! in each function/lambda/class body into `Binding::{Local, Cellvar,
//! Freevar, Global, Unresolved}` and threads free-variable slots down to
//! the nested scopes that capture them.
//!
//! Mirrors CPython's own two-pass symbol-table construction: a first pass
//! collects each scope's own bindings (assignment targets, parameters,
//! `global`/`nonlocal` declarations) without looking at nested scopes;
//! cellvars only become knowable once every nested scope has reported
//! which enclosing names it reads, so that step runs bottom-up.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use vault_diagnostic::{CompileError, Diagnostic};
use vault_ir::ast::*;
use vault_ir::scope::{Binding, ScopeInfo, ScopeKind, ScopeTree};
use vault_ir::Name;

struct RawScope {
    kind: ScopeKind,
    parent: Option<u32>,
    /// Names assigned, deleted, or bound as a parameter anywhere in this
    /// scope's own body (not nested scopes).
    assigned: FxHashSet<Name>,
    /// Names read anywhere in this scope's own body.
    read: FxHashSet<Name>,
    declared_globals: Vec<Name>,
    declared_nonlocals: Vec<Name>,
    param_order: Vec<Name>,
}

impl RawScope {
    fn new(kind: ScopeKind, parent: Option<u32>) -> Self {
        Self {
            kind,
            parent,
            assigned: FxHashSet::default(),
            read: FxHashSet::default(),
            declared_globals: Vec::new(),
            declared_nonlocals: Vec::new(),
            param_order: Vec::new(),
        }
    }
}

pub struct Analyzer {
    scopes: Vec<RawScope>,
    /// The id reserved for the module scope: one past every id the parser
    /// handed out to a `def`/`lambda`/`class`, so it can never collide with
    /// a parser-assigned `scope_id`.
    module_id: u32,
}

/// `scope_count` is the total number of `def`/`lambda`/`class` scopes the
/// parser assigned ids to (its own `next_scope_id` counter) — passed in so
/// the module scope's id can be placed safely past all of them rather than
/// guessed.
pub fn analyze(module: &Block, scope_count: u32) -> Result<(ScopeTree, u32), CompileError> {
    let module_id = scope_count;
    let mut analyzer = Analyzer { scopes: Vec::new(), module_id };
    analyzer.ensure_scope(module_id, ScopeKind::Module, None);
    analyzer.walk_block(module, module_id);
    analyzer.finish()
}

impl Analyzer {
    // ---- pass 1: collect bindings per scope, recursing into nested scopes ----

    fn walk_block(&mut self, block: &Block, scope: u32) {
        for stmt in &block.stmts {
            self.walk_stmt(stmt, scope);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, scope: u32) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.walk_expr(e, scope),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.walk_expr(e, scope);
                }
            }
            StmtKind::Delete(targets) => {
                for t in targets {
                    self.bind_target(t, scope);
                }
            }
            StmtKind::Assign { targets, value } => {
                self.walk_expr(value, scope);
                for t in targets {
                    self.bind_target(t, scope);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.walk_expr(target, scope);
                self.walk_expr(value, scope);
                self.bind_target(target, scope);
            }
            StmtKind::AnnAssign { target, annotation, value } => {
                self.walk_expr(annotation, scope);
                if let Some(v) = value {
                    self.walk_expr(v, scope);
                }
                self.bind_target(target, scope);
            }
            StmtKind::If { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::While { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::For { target, iter, body, orelse, .. } => {
                self.walk_expr(iter, scope);
                self.bind_target(target, scope);
                self.walk_block(body, scope);
                self.walk_block(orelse, scope);
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    self.walk_expr(&item.context_expr, scope);
                    if let Some(v) = &item.optional_vars {
                        self.bind_target(v, scope);
                    }
                }
                self.walk_block(body, scope);
            }
            StmtKind::Raise { exc, cause } => {
                if let Some(e) = exc {
                    self.walk_expr(e, scope);
                }
                if let Some(c) = cause {
                    self.walk_expr(c, scope);
                }
            }
            StmtKind::Try { body, handlers, orelse, finalbody, .. } => {
                self.walk_block(body, scope);
                for h in handlers {
                    if let Some(k) = &h.kind {
                        self.walk_expr(k, scope);
                    }
                    if let Some(name) = h.name {
                        self.scopes[scope as usize].assigned.insert(name);
                    }
                    self.walk_block(&h.body, scope);
                }
                self.walk_block(orelse, scope);
                self.walk_block(finalbody, scope);
            }
            StmtKind::Assert { test, msg } => {
                self.walk_expr(test, scope);
                if let Some(m) = msg {
                    self.walk_expr(m, scope);
                }
            }
            StmtKind::Import(aliases) => self.bind_import_aliases(aliases, scope),
            StmtKind::ImportFrom { names, .. } => self.bind_import_aliases(names, scope),
            StmtKind::Global(names) => self.scopes[scope as usize].declared_globals.extend(names.iter().copied()),
            StmtKind::Nonlocal(names) => self.scopes[scope as usize].declared_nonlocals.extend(names.iter().copied()),
            StmtKind::FunctionDef(def) => {
                for deco in &def.decorators {
                    self.walk_expr(deco, scope);
                }
                self.scopes[scope as usize].assigned.insert(def.name);
                self.walk_function(def, scope);
            }
            StmtKind::ClassDef(def) => {
                for deco in &def.decorators {
                    self.walk_expr(deco, scope);
                }
                for base in &def.bases {
                    self.walk_expr(base, scope);
                }
                for kw in &def.keywords {
                    self.walk_expr(&kw.value, scope);
                }
                self.scopes[scope as usize].assigned.insert(def.name);
                self.walk_class(def, scope);
            }
            StmtKind::Match { subject, cases } => {
                self.walk_expr(subject, scope);
                for case in cases {
                    self.walk_pattern(&case.pattern, scope);
                    if let Some(g) = &case.guard {
                        self.walk_expr(g, scope);
                    }
                    self.walk_block(&case.body, scope);
                }
            }
            StmtKind::TypeAlias { name, value, .. } => {
                self.scopes[scope as usize].assigned.insert(*name);
                self.walk_expr(value, scope);
            }
        }
    }

    fn bind_import_aliases(&mut self, aliases: &[ImportAlias], scope: u32) {
        for alias in aliases {
            let bound = alias.asname.unwrap_or_else(|| {
                let text = alias.name.as_str();
                Name::new(text.split('.').next().unwrap_or(text))
            });
            if bound.as_str() != "*" {
                self.scopes[scope as usize].assigned.insert(bound);
            }
        }
    }

    fn walk_pattern(&mut self, pattern: &Pattern, scope: u32) {
        match pattern {
            Pattern::MatchValue(e) => self.walk_expr(e, scope),
            Pattern::MatchSingleton(_) => {}
            Pattern::MatchSequence(items) => items.iter().for_each(|p| self.walk_pattern(p, scope)),
            Pattern::MatchMapping { keys, patterns, rest } => {
                keys.iter().for_each(|k| self.walk_expr(k, scope));
                patterns.iter().for_each(|p| self.walk_pattern(p, scope));
                if let Some(name) = rest {
                    self.scopes[scope as usize].assigned.insert(*name);
                }
            }
            Pattern::MatchClass { cls, patterns, kwd_patterns, .. } => {
                self.walk_expr(cls, scope);
                patterns.iter().for_each(|p| self.walk_pattern(p, scope));
                kwd_patterns.iter().for_each(|p| self.walk_pattern(p, scope));
            }
            Pattern::MatchStar(Some(name)) => {
                self.scopes[scope as usize].assigned.insert(*name);
            }
            Pattern::MatchStar(None) => {}
            Pattern::MatchAs { pattern, name } => {
                if let Some(p) = pattern {
                    self.walk_pattern(p, scope);
                }
                if let Some(name) = name {
                    self.scopes[scope as usize].assigned.insert(*name);
                }
            }
            Pattern::MatchOr(alts) => alts.iter().for_each(|p| self.walk_pattern(p, scope)),
        }
    }

    fn bind_target(&mut self, target: &Expr, scope: u32) {
        match &*target.kind {
            ExprKind::Name(name) => {
                self.scopes[scope as usize].assigned.insert(*name);
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.bind_target(item, scope);
                }
            }
            ExprKind::Starred(inner) => self.bind_target(inner, scope),
            ExprKind::Attribute { value, .. } => self.walk_expr(value, scope),
            ExprKind::Subscript { value, slice } => {
                self.walk_expr(value, scope);
                self.walk_expr(slice, scope);
            }
            _ => self.walk_expr(target, scope),
        }
    }

    fn walk_expr(&mut self, expr: &Expr, scope: u32) {
        match &*expr.kind {
            ExprKind::Constant(_) => {}
            ExprKind::Name(name) => {
                self.scopes[scope as usize].read.insert(*name);
            }
            ExprKind::BoolOp { values, .. } => values.iter().for_each(|v| self.walk_expr(v, scope)),
            ExprKind::NamedExpr { target, value } => {
                self.walk_expr(value, scope);
                // A walrus target binds in the nearest enclosing function
                // or module scope, not a comprehension scope — but since
                // comprehensions here don't get their own `ScopeInfo` node
                // (§ comprehension bodies execute directly against the
                // enclosing frame), binding into `scope` is already correct.
                self.scopes[scope as usize].assigned.insert(*target);
            }
            ExprKind::BinOp { left, right, .. } => {
                self.walk_expr(left, scope);
                self.walk_expr(right, scope);
            }
            ExprKind::UnaryOp { operand, .. } => self.walk_expr(operand, scope),
            ExprKind::Lambda(def) => self.walk_function(def, scope),
            ExprKind::IfExp { test, body, orelse } => {
                self.walk_expr(test, scope);
                self.walk_expr(body, scope);
                self.walk_expr(orelse, scope);
            }
            ExprKind::Dict { keys, values } => {
                for k in keys.iter().flatten() {
                    self.walk_expr(k, scope);
                }
                values.iter().for_each(|v| self.walk_expr(v, scope));
            }
            ExprKind::Set(items) | ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().for_each(|v| self.walk_expr(v, scope));
            }
            ExprKind::ListComp { element, generators }
            | ExprKind::SetComp { element, generators }
            | ExprKind::GeneratorExp { element, generators } => {
                self.walk_comprehension(element, None, generators, scope);
            }
            ExprKind::DictComp { key, value, generators } => {
                self.walk_comprehension(key, Some(value), generators, scope);
            }
            ExprKind::Await(inner) | ExprKind::YieldFrom(inner) => self.walk_expr(inner, scope),
            ExprKind::Yield(inner) => {
                if let Some(e) = inner {
                    self.walk_expr(e, scope);
                }
            }
            ExprKind::Compare { left, comparators, .. } => {
                self.walk_expr(left, scope);
                comparators.iter().for_each(|c| self.walk_expr(c, scope));
            }
            ExprKind::Call { func, args, keywords } => {
                self.walk_expr(func, scope);
                args.iter().for_each(|a| self.walk_expr(a, scope));
                keywords.iter().for_each(|k| self.walk_expr(&k.value, scope));
            }
            ExprKind::Starred(inner) => self.walk_expr(inner, scope),
            ExprKind::JoinedStr(parts) => parts.iter().for_each(|p| self.walk_expr(p, scope)),
            ExprKind::FormattedValue { value, format_spec, .. } => {
                self.walk_expr(value, scope);
                if let Some(spec) = format_spec {
                    self.walk_expr(spec, scope);
                }
            }
            ExprKind::Attribute { value, .. } => self.walk_expr(value, scope),
            ExprKind::Subscript { value, slice } => {
                self.walk_expr(value, scope);
                self.walk_expr(slice, scope);
            }
            ExprKind::Slice { lower, upper, step } => {
                for e in [lower, upper, step].into_iter().flatten() {
                    self.walk_expr(e, scope);
                }
            }
        }
    }

    /// Comprehensions don't get their own `ScopeInfo`/`scope_id` (the
    /// evaluator runs their bodies directly against the enclosing frame,
    /// § comprehension targets as plain locals of the innermost real
    /// scope) — so their `for`/`if` clauses and element expressions are
    /// analyzed as if inlined into `scope`.
    fn walk_comprehension(&mut self, element: &Expr, value: Option<&Expr>, generators: &[Comprehension], scope: u32) {
        for (i, gen) in generators.iter().enumerate() {
            // The first clause's iterable is evaluated in the enclosing
            // scope even in real comprehension-scope semantics; since we
            // don't split comprehensions into their own scope at all here,
            // this distinction doesn't affect classification.
            let _ = i;
            self.walk_expr(&gen.iter, scope);
            self.bind_target(&gen.target, scope);
            for cond in &gen.ifs {
                self.walk_expr(cond, scope);
            }
        }
        self.walk_expr(element, scope);
        if let Some(value) = value {
            self.walk_expr(value, scope);
        }
    }

    fn walk_function(&mut self, def: &Arc<FunctionDef>, parent: u32) {
        for param in def.params.posonly.iter().chain(&def.params.args).chain(&def.params.kwonly) {
            if let Some(d) = &param.default {
                self.walk_expr(d, parent);
            }
            if let Some(a) = &param.annotation {
                self.walk_expr(a, parent);
            }
        }
        if let Some(v) = &def.params.vararg {
            if let Some(a) = &v.annotation {
                self.walk_expr(a, parent);
            }
        }
        if let Some(k) = &def.params.kwarg {
            if let Some(a) = &k.annotation {
                self.walk_expr(a, parent);
            }
        }
        if let Some(r) = &def.returns {
            self.walk_expr(r, parent);
        }

        let kind = if def.name.as_str() == "<lambda>" { ScopeKind::Lambda } else { ScopeKind::Function };
        let id = self.ensure_scope(def.scope_id, kind, Some(parent));
        for param in def.params.posonly.iter().chain(&def.params.args).chain(&def.params.kwonly) {
            self.scopes[id as usize].assigned.insert(param.name);
            self.scopes[id as usize].param_order.push(param.name);
        }
        if let Some(v) = &def.params.vararg {
            self.scopes[id as usize].assigned.insert(v.name);
        }
        if let Some(k) = &def.params.kwarg {
            self.scopes[id as usize].assigned.insert(k.name);
        }
        self.walk_block(&def.body, id);
    }

    fn walk_class(&mut self, def: &Arc<ClassDef>, parent: u32) {
        let id = self.ensure_scope(def.scope_id, ScopeKind::Class, Some(parent));
        self.walk_block(&def.body, id);
    }

    /// Scope ids are pre-assigned by the parser in pre-order; grow the
    /// (otherwise append-only) scope vector out to `id` so nested scopes
    /// encountered before their numerically-earlier siblings still land
    /// at the right index.
    fn ensure_scope(&mut self, id: u32, kind: ScopeKind, parent: Option<u32>) -> u32 {
        while (self.scopes.len() as u32) <= id {
            self.scopes.push(RawScope::new(kind, parent));
        }
        self.scopes[id as usize] = RawScope::new(kind, parent);
        id
    }

    // ---- pass 2: classify bindings, bottom-up for cellvar/freevar -------

    fn finish(self) -> Result<(ScopeTree, u32), CompileError> {
        let module_id = self.module_id;
        let n = self.scopes.len();
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (id, s) in self.scopes.iter().enumerate() {
            if let Some(p) = s.parent {
                children[p as usize].push(id as u32);
            }
        }

        // free_slots[id]: names this scope reads/writes that resolve to an
        // enclosing function scope's local — computed bottom-up so a
        // scope's own free-variable set is known before its parent decides
        // which of its own locals must become cellvars.
        let mut free_slots: Vec<FxHashSet<Name>> = vec![FxHashSet::default(); n];
        let mut order: Vec<u32> = (0..n as u32).collect();
        order.sort_by_key(|&id| std::cmp::Reverse(depth(&self.scopes, id)));

        for &id in &order {
            let scope = &self.scopes[id as usize];
            if scope.kind == ScopeKind::Class {
                // Methods never close over a class body's locals (§ class
                // bodies don't contribute to nested functions' frees); a
                // class scope still forwards its own unresolved reads
                // outward like a function would for its own body's sake.
            }
            let mut unresolved_in_children: FxHashSet<Name> = FxHashSet::default();
            for &child in &children[id as usize] {
                for name in &free_slots[child as usize] {
                    unresolved_in_children.insert(*name);
                }
            }
            // Unresolved_in_children is this scope's candidate frees: names
            // its nested functions read without binding themselves.
            for name in unresolved_in_children {
                if scope.declared_globals.contains(&name) {
                    continue;
                }
                if scope.kind == ScopeKind::Function || scope.kind == ScopeKind::Lambda {
                    if scope.assigned.contains(&name) && !scope.declared_nonlocals.contains(&name) {
                        continue; // becomes a cellvar owned here, not a free here
                    }
                }
                if scope.kind != ScopeKind::Module {
                    free_slots[id as usize].insert(name);
                }
            }
            // This scope's own reads that aren't locally assigned (and
            // aren't declared global) are also potential frees bubbling
            // further up, same rule.
            for name in &scope.read {
                if scope.assigned.contains(name) || scope.declared_globals.contains(name) {
                    continue;
                }
                if scope.kind == ScopeKind::Function || scope.kind == ScopeKind::Lambda || scope.kind == ScopeKind::Class {
                    free_slots[id as usize].insert(*name);
                }
            }
            for name in &scope.declared_nonlocals {
                free_slots[id as usize].insert(*name);
            }
        }

        // `ScopeTree::push` hands out ids in push order starting at 0, and
        // `vault_eval` indexes the tree directly by `FunctionDef`/
        // `ClassDef.scope_id` — so the push order here must exactly
        // reproduce the parser's raw ids: push 0, 1, 2, ... in order, with
        // the module (always the highest raw id, `module_id == n - 1`)
        // pushed last. A scope's parent always has a strictly lower raw id
        // (the parser assigns ids pre-order), so by the time a scope is
        // pushed every ancestor except possibly the module has already been
        // assigned its final, identical id; the module's is known up front
        // without a lookup since it's always `module_id` itself.
        let mut tree = ScopeTree::default();
        let mut id_map: FxHashMap<u32, u32> = FxHashMap::default();

        for id in 0..module_id {
            let scope = &self.scopes[id as usize];
            let mut bindings = FxHashMap::default();
            for name in &scope.assigned {
                if scope.declared_globals.contains(name) {
                    bindings.insert(*name, Binding::Global);
                } else if scope.declared_nonlocals.contains(name) {
                    bindings.insert(*name, Binding::Freevar);
                } else if is_cellvar(&children, &free_slots, id, *name) {
                    bindings.insert(*name, Binding::Cellvar);
                } else {
                    bindings.insert(*name, Binding::Local);
                }
            }
            for name in &scope.read {
                if bindings.contains_key(name) {
                    continue;
                }
                if scope.declared_globals.contains(name) {
                    bindings.insert(*name, Binding::Global);
                } else if free_slots[id as usize].contains(name) {
                    bindings.insert(*name, Binding::Freevar);
                } else if scope.kind == ScopeKind::Module {
                    bindings.insert(*name, Binding::Global);
                } else {
                    bindings.insert(*name, Binding::Unresolved);
                }
            }
            for name in &scope.declared_nonlocals {
                bindings.entry(*name).or_insert(Binding::Freevar);
            }

            let mut ordered_frees: Vec<Name> = free_slots[id as usize].iter().copied().collect();
            ordered_frees.sort_by_key(|n| n.as_str().to_owned());

            let info = ScopeInfo {
                kind: Some(scope.kind),
                bindings,
                declared_globals: scope.declared_globals.clone(),
                free_slots: ordered_frees,
            };
            let parent_new = scope.parent.map(|p| if p == module_id { module_id } else { *id_map.get(&p).expect("parent analyzed before child") });
            let new_id = tree.push(Name::new("<scope>"), 0, parent_new, info);
            debug_assert_eq!(new_id, id);
            id_map.insert(id, new_id);
        }

        let module = &self.scopes[module_id as usize];
        let mut module_bindings = FxHashMap::default();
        for name in &module.assigned {
            module_bindings.insert(*name, Binding::Global);
        }
        for name in &module.read {
            module_bindings.entry(*name).or_insert(Binding::Global);
        }
        let module_info = ScopeInfo {
            kind: Some(ScopeKind::Module),
            bindings: module_bindings,
            declared_globals: Vec::new(),
            free_slots: Vec::new(),
        };
        let root_scope = tree.push(Name::new("<module>"), 0, None, module_info);
        debug_assert_eq!(root_scope, module_id);

        if tree.is_empty() {
            return Err(CompileError::from(Diagnostic::error("empty scope tree")));
        }
        Ok((tree, root_scope))
    }
}

fn depth(scopes: &[RawScope], id: u32) -> u32 {
    let mut d = 0;
    let mut cur = scopes[id as usize].parent;
    while let Some(p) = cur {
        d += 1;
        cur = scopes[p as usize].parent;
    }
    d
}

fn is_cellvar(children: &[Vec<u32>], free_slots: &[FxHashSet<Name>], id: u32, name: Name) -> bool {
    children[id as usize].iter().any(|&c| free_slots[c as usize].contains(&name))
}
