//! Integration tests for the static scope analyzer: lambda scope
//! disambiguation and the cellvar/freevar split between a closure's
//! defining scope and the scope that reads the captured name.

use vault_ir::ast::{ExprKind, StmtKind};
use vault_ir::scope::{Binding, ScopeKind};
use vault_ir::Name;

fn compile(source: &str) -> vault_ir::scope::CodeUnit {
    vault_frontend::compile(source, "<test>").expect("source compiles")
}

#[test]
fn multiple_lambdas_on_one_line_get_distinct_scopes() {
    let unit = compile("fs = [lambda x: x + 1, lambda x: x + 2]\n");
    let StmtKind::Assign { value, .. } = &unit.body.stmts[0].kind else {
        panic!("expected an assignment statement");
    };
    let ExprKind::List(items) = &*value.kind else {
        panic!("expected a list literal");
    };
    let scope_ids: Vec<u32> = items
        .iter()
        .map(|item| {
            let ExprKind::Lambda(def) = &*item.kind else { panic!("expected a lambda") };
            def.scope_id
        })
        .collect();

    assert_eq!(scope_ids.len(), 2);
    assert_ne!(scope_ids[0], scope_ids[1], "each lambda must get its own scope id");
    for id in scope_ids {
        assert_eq!(unit.scopes.get(id).info.kind, Some(ScopeKind::Lambda));
    }
}

#[test]
fn nested_function_captures_its_enclosing_local_as_a_cellvar() {
    let source = "\
def outer():
    x = 1
    def inner():
        return x
    return inner
";
    let unit = compile(source);
    let StmtKind::FunctionDef(outer) = &unit.body.stmts[0].kind else {
        panic!("expected a function definition");
    };
    let outer_scope = &unit.scopes.get(outer.scope_id).info;
    assert_eq!(outer_scope.binding_of(Name::new("x")), Binding::Cellvar);

    let StmtKind::FunctionDef(inner) = &outer.body.stmts[1].kind else {
        panic!("expected the nested function definition");
    };
    let inner_scope = &unit.scopes.get(inner.scope_id).info;
    assert_eq!(inner_scope.binding_of(Name::new("x")), Binding::Freevar);
}

#[test]
fn a_name_only_ever_read_in_a_function_is_classified_as_a_freevar() {
    // A read that is never locally assigned is treated the same way as a
    // real closure capture regardless of whether any enclosing scope
    // actually binds it — nothing here distinguishes "free of an
    // enclosing function" from "free of nothing at all". The distinction
    // only bites at runtime, when the frame finds no live cell for the
    // slot and raises `NameError` (see `vault_eval`'s closures tests).
    let source = "\
def f():
    return undeclared_name
";
    let unit = compile(source);
    let StmtKind::FunctionDef(f) = &unit.body.stmts[0].kind else {
        panic!("expected a function definition");
    };
    let scope = &unit.scopes.get(f.scope_id).info;
    assert_eq!(scope.binding_of(Name::new("undeclared_name")), Binding::Freevar);
}

#[test]
fn module_level_assignment_resolves_as_global() {
    let unit = compile("value = 1\n");
    let module_scope = &unit.scopes.get(unit.root_scope).info;
    assert_eq!(module_scope.binding_of(Name::new("value")), Binding::Global);
}
