//! Statement execution.

use crate::errors;
use crate::expr::{call_value, eval_expr, make_closure, subscript_set};
use crate::guard_access;
use crate::interpreter::Shared;
use crate::operators;
use crate::scopes::Frame;
use std::sync::Arc;
use vault_ir::ast::{Block, Expr, ExprKind, Stmt, StmtKind};
use vault_ir::scope::ScopeTree;
use vault_ir::Name;
use vault_patterns::{exceptions, raise, EvalResult, Flow, Unwind, Value};
use vault_stack::ensure_sufficient_stack;

/// Per-call-frame state that outlives any single statement or expression:
/// the interpreter's shared tables and the `ScopeTree` the currently
/// executing code unit's `scope_id`s index into.
pub struct ExecCtx {
    pub shared: Shared,
    pub scopes: Arc<ScopeTree>,
    /// The exception currently being handled, if any — lets a bare `raise`
    /// inside an `except` block re-raise it (§4.7).
    pub current_exception: Option<Value>,
}

pub fn exec_block(ctx: &mut ExecCtx, frame: &mut Frame, block: &Block) -> EvalResult {
    for stmt in &block.stmts {
        exec_stmt(ctx, frame, stmt)?;
    }
    Ok(Value::None)
}

fn exec_stmt(ctx: &mut ExecCtx, frame: &mut Frame, stmt: &Stmt) -> EvalResult {
    ensure_sufficient_stack(|| exec_stmt_inner(ctx, frame, stmt))
}

fn exec_stmt_inner(ctx: &mut ExecCtx, frame: &mut Frame, stmt: &Stmt) -> EvalResult {
    match &stmt.kind {
        StmtKind::Expr(e) => {
            eval_expr(ctx, frame, e)?;
            Ok(Value::None)
        }
        StmtKind::Pass => Ok(Value::None),
        StmtKind::Break => Err(Unwind::Flow(Flow::Break)),
        StmtKind::Continue => Err(Unwind::Flow(Flow::Continue)),
        StmtKind::Return(value) => {
            let v = match value {
                Some(e) => eval_expr(ctx, frame, e)?,
                None => Value::None,
            };
            Err(Unwind::Flow(Flow::Return(v)))
        }
        StmtKind::Delete(targets) => {
            for target in targets {
                delete_target(ctx, frame, target)?;
            }
            Ok(Value::None)
        }
        StmtKind::Assign { targets, value } => {
            let v = eval_expr(ctx, frame, value)?;
            for target in targets {
                bind_target(ctx, frame, target, v.clone())?;
            }
            Ok(Value::None)
        }
        StmtKind::AugAssign { target, op, value } => exec_aug_assign(ctx, frame, target, *op, value),
        StmtKind::AnnAssign { target, value, .. } => {
            if let Some(value) = value {
                let v = eval_expr(ctx, frame, value)?;
                bind_target(ctx, frame, target, v)?;
            }
            Ok(Value::None)
        }
        StmtKind::If { test, body, orelse } => {
            if eval_expr(ctx, frame, test)?.is_truthy() {
                exec_block(ctx, frame, body)
            } else {
                exec_block(ctx, frame, orelse)
            }
        }
        StmtKind::While { test, body, orelse } => exec_while(ctx, frame, test, body, orelse),
        StmtKind::For { target, iter, body, orelse, .. } => exec_for(ctx, frame, target, iter, body, orelse),
        StmtKind::With { items, body, .. } => exec_with(ctx, frame, items, body),
        StmtKind::Raise { exc, cause } => exec_raise(ctx, frame, exc, cause),
        StmtKind::Try { body, handlers, orelse, finalbody, is_star } => {
            exec_try(ctx, frame, body, handlers, orelse, finalbody, *is_star)
        }
        StmtKind::Assert { test, msg } => {
            if eval_expr(ctx, frame, test)?.is_truthy() {
                Ok(Value::None)
            } else {
                let message = match msg {
                    Some(m) => crate::builtins::display(&eval_expr(ctx, frame, m)?),
                    None => String::new(),
                };
                raise(exceptions::simple_exception(&ctx.shared.classes.assertion_error, message))
            }
        }
        StmtKind::Import(aliases) => exec_import(ctx, frame, aliases),
        StmtKind::ImportFrom { module, level, names } => exec_import_from(ctx, frame, *module, *level, names),
        StmtKind::Global(_) | StmtKind::Nonlocal(_) => Ok(Value::None),
        StmtKind::FunctionDef(def) => {
            let qualname = class_qualname(frame);
            let closure = make_closure(ctx, frame, def, qualname)?;
            frame.store(def.name, closure);
            Ok(Value::None)
        }
        StmtKind::ClassDef(def) => exec_class_def(ctx, frame, def),
        StmtKind::Match { subject, cases } => exec_match(ctx, frame, subject, cases),
        StmtKind::TypeAlias { name, value, .. } => {
            let v = eval_expr(ctx, frame, value)?;
            frame.store(*name, v);
            Ok(Value::None)
        }
    }
}

fn class_qualname(_frame: &Frame) -> Option<&'static str> {
    // Class-body qualname prefixing is applied in `exec_class_def`, which
    // calls `make_closure` after building the class's own qualified name;
    // a plain function statement at module or function scope has no class
    // prefix to apply.
    None
}

pub fn bind_target(ctx: &mut ExecCtx, frame: &mut Frame, target: &Expr, value: Value) -> Result<(), Unwind> {
    match &*target.kind {
        ExprKind::Name(name) => {
            frame.store(*name, value);
            Ok(())
        }
        ExprKind::Attribute { value: obj, attr } => {
            let receiver = eval_expr(ctx, frame, obj)?;
            let attr = crate::guard::mangle(*attr, frame.private_owner.as_deref());
            guard_access::set_attr(&receiver, attr.as_str(), value, &ctx.shared)
        }
        ExprKind::Subscript { value: obj, slice } => {
            let receiver = eval_expr(ctx, frame, obj)?;
            let index = eval_expr(ctx, frame, slice)?;
            subscript_set(ctx, &receiver, &index, value)
        }
        ExprKind::Tuple(items) | ExprKind::List(items) => unpack_targets(ctx, frame, items, value),
        ExprKind::Starred(inner) => bind_target(ctx, frame, inner, value),
        _ => errors::type_error(&ctx.shared.classes, "cannot assign to this expression"),
    }
}

fn unpack_targets(ctx: &mut ExecCtx, frame: &mut Frame, targets: &[Expr], value: Value) -> Result<(), Unwind> {
    let items = crate::builtins::iterable_to_vec(Some(&value));
    let star_pos = targets.iter().position(|t| matches!(&*t.kind, ExprKind::Starred(_)));
    match star_pos {
        None => {
            if items.len() != targets.len() {
                return errors::value_error(
                    &ctx.shared.classes,
                    format!("not enough values to unpack (expected {}, got {})", targets.len(), items.len()),
                );
            }
            for (target, item) in targets.iter().zip(items) {
                bind_target(ctx, frame, target, item)?;
            }
            Ok(())
        }
        Some(pos) => {
            let after = targets.len() - pos - 1;
            if items.len() < pos + after {
                return errors::value_error(&ctx.shared.classes, "not enough values to unpack");
            }
            for (target, item) in targets[..pos].iter().zip(&items) {
                bind_target(ctx, frame, target, item.clone())?;
            }
            let star_items = items[pos..items.len() - after].to_vec();
            bind_target(ctx, frame, &targets[pos], Value::List(Arc::new(parking_lot::Mutex::new(star_items))))?;
            for (target, item) in targets[pos + 1..].iter().zip(&items[items.len() - after..]) {
                bind_target(ctx, frame, target, item.clone())?;
            }
            Ok(())
        }
    }
}

fn delete_target(ctx: &mut ExecCtx, frame: &mut Frame, target: &Expr) -> Result<(), Unwind> {
    match &*target.kind {
        ExprKind::Name(name) => {
            if !frame.delete(*name) {
                return errors::name_error(&ctx.shared.classes, name.as_str());
            }
            Ok(())
        }
        ExprKind::Attribute { value, attr } => {
            let receiver = eval_expr(ctx, frame, value)?;
            let attr = crate::guard::mangle(*attr, frame.private_owner.as_deref());
            match &receiver {
                Value::Instance(instance) => {
                    instance.attrs.lock().remove(&Name::new(attr.as_str()));
                    Ok(())
                }
                _ => Ok(()),
            }
        }
        ExprKind::Subscript { value, slice } => {
            let receiver = eval_expr(ctx, frame, value)?;
            let index = eval_expr(ctx, frame, slice)?;
            match &receiver {
                Value::List(l) => {
                    let mut guard = l.lock();
                    if let Value::Int(i) = index {
                        let len = guard.len();
                        let idx = if i < 0 { i + len as i64 } else { i };
                        if idx >= 0 && (idx as usize) < len {
                            guard.remove(idx as usize);
                            return Ok(());
                        }
                    }
                    errors::index_error(&ctx.shared.classes, "list assignment index out of range")
                }
                Value::Dict(d) => {
                    let mut guard = d.lock();
                    let pos = guard.iter().position(|(k, _)| operators::values_equal(k, &index));
                    match pos {
                        Some(pos) => {
                            guard.remove(pos);
                            Ok(())
                        }
                        None => errors::key_error(&ctx.shared.classes, crate::builtins::repr(&index)),
                    }
                }
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn exec_aug_assign(ctx: &mut ExecCtx, frame: &mut Frame, target: &Expr, op: vault_ir::ast::BinOpKind, value: &Expr) -> EvalResult {
    let rhs = eval_expr(ctx, frame, value)?;
    match &*target.kind {
        ExprKind::Name(name) => {
            let current = match frame.load(*name) {
                Ok(v) => v,
                Err(_) => return errors::unbound_local(&ctx.shared.classes, name.as_str()),
            };
            let result = operators::binop(op, &current, &rhs, &ctx.shared)?;
            frame.store(*name, result);
            Ok(Value::None)
        }
        ExprKind::Attribute { value: obj, attr } => {
            let receiver = eval_expr(ctx, frame, obj)?;
            let attr = crate::guard::mangle(*attr, frame.private_owner.as_deref());
            let current = guard_access::get_attr(&receiver, attr.as_str(), &ctx.shared)?;
            let result = operators::binop(op, &current, &rhs, &ctx.shared)?;
            guard_access::set_attr(&receiver, attr.as_str(), result, &ctx.shared)?;
            Ok(Value::None)
        }
        ExprKind::Subscript { value: obj, slice } => {
            let receiver = eval_expr(ctx, frame, obj)?;
            let index = eval_expr(ctx, frame, slice)?;
            let current = subscript_current(ctx, &receiver, &index)?;
            let result = operators::binop(op, &current, &rhs, &ctx.shared)?;
            subscript_set(ctx, &receiver, &index, result)?;
            Ok(Value::None)
        }
        _ => errors::type_error(&ctx.shared.classes, "cannot assign to this expression"),
    }
}

fn subscript_current(ctx: &mut ExecCtx, receiver: &Value, index: &Value) -> EvalResult {
    match receiver {
        Value::List(l) => {
            let guard = l.lock();
            if let Value::Int(i) = index {
                let len = guard.len();
                let idx = if *i < 0 { *i + len as i64 } else { *i };
                if idx >= 0 && (idx as usize) < len {
                    return Ok(guard[idx as usize].clone());
                }
            }
            errors::index_error(&ctx.shared.classes, "list index out of range")
        }
        Value::Dict(d) => d
            .lock()
            .iter()
            .find(|(k, _)| operators::values_equal(k, index))
            .map(|(_, v)| v.clone())
            .map_or_else(|| errors::key_error(&ctx.shared.classes, crate::builtins::repr(index)), Ok),
        _ => errors::type_error(&ctx.shared.classes, format!("'{}' object is not subscriptable", receiver.type_name())),
    }
}

fn exec_while(ctx: &mut ExecCtx, frame: &mut Frame, test: &Expr, body: &Block, orelse: &Block) -> EvalResult {
    loop {
        if !eval_expr(ctx, frame, test)?.is_truthy() {
            return exec_block(ctx, frame, orelse);
        }
        match exec_block(ctx, frame, body) {
            Ok(_) => {}
            Err(Unwind::Flow(Flow::Break)) => return Ok(Value::None),
            Err(Unwind::Flow(Flow::Continue)) => continue,
            other => return other,
        }
    }
}

fn exec_for(ctx: &mut ExecCtx, frame: &mut Frame, target: &Expr, iter: &Expr, body: &Block, orelse: &Block) -> EvalResult {
    let iterable = eval_expr(ctx, frame, iter)?;
    let items = crate::builtins::iterable_to_vec(Some(&iterable));
    for item in items {
        bind_target(ctx, frame, target, item)?;
        match exec_block(ctx, frame, body) {
            Ok(_) => {}
            Err(Unwind::Flow(Flow::Break)) => return Ok(Value::None),
            Err(Unwind::Flow(Flow::Continue)) => continue,
            other => return other,
        }
    }
    exec_block(ctx, frame, orelse)
}

fn exec_with(ctx: &mut ExecCtx, frame: &mut Frame, items: &[vault_ir::ast::WithItem], body: &Block) -> EvalResult {
    let mut managers = Vec::with_capacity(items.len());
    for item in items {
        let manager = eval_expr(ctx, frame, &item.context_expr)?;
        let entered = guard_access::get_attr(&manager, "__enter__", &ctx.shared)
            .and_then(|enter| call_value(&enter, vec![], vec![], &ctx.shared))?;
        if let Some(target) = &item.optional_vars {
            bind_target(ctx, frame, target, entered)?;
        }
        managers.push(manager);
    }

    let result = exec_block(ctx, frame, body);

    for manager in managers.into_iter().rev() {
        let exit = guard_access::get_attr(&manager, "__exit__", &ctx.shared)?;
        let (exc_type, exc_value, exc_tb) = match &result {
            Err(Unwind::Raise(exc)) => (exceptions_type_of(exc), exc.clone(), Value::None),
            _ => (Value::None, Value::None, Value::None),
        };
        call_value(&exit, vec![exc_type, exc_value, exc_tb], vec![], &ctx.shared)?;
    }

    result
}

fn exceptions_type_of(exc: &Value) -> Value {
    match exc {
        Value::Instance(instance) => Value::Class(instance.class.clone()),
        other => other.clone(),
    }
}

fn exec_raise(ctx: &mut ExecCtx, frame: &mut Frame, exc: &Option<Expr>, _cause: &Option<Expr>) -> EvalResult {
    match exc {
        Some(e) => {
            let value = eval_expr(ctx, frame, e)?;
            let instance = match value {
                Value::Class(class) => crate::expr::call_value(&Value::Class(class), vec![], vec![], &ctx.shared)?,
                other => other,
            };
            raise(instance)
        }
        None => match &ctx.current_exception {
            Some(exc) => raise(exc.clone()),
            None => errors::value_error(&ctx.shared.classes, "No active exception to re-raise"),
        },
    }
}

fn exec_try(
    ctx: &mut ExecCtx,
    frame: &mut Frame,
    body: &Block,
    handlers: &[vault_ir::ast::ExceptHandler],
    orelse: &Block,
    finalbody: &Block,
    is_star: bool,
) -> EvalResult {
    let body_result = exec_block(ctx, frame, body);
    let after_handlers = match body_result {
        Err(Unwind::Raise(exc)) if is_star => run_star_handlers(ctx, frame, exc, handlers),
        Err(Unwind::Raise(exc)) => run_handlers(ctx, frame, &exc, handlers),
        Ok(_) => exec_block(ctx, frame, orelse),
        flow @ Err(Unwind::Flow(_)) => flow,
    };
    let finally_result = exec_block(ctx, frame, finalbody);
    match finally_result {
        Err(unwind) => Err(unwind),
        Ok(_) => after_handlers,
    }
}

fn run_handlers(ctx: &mut ExecCtx, frame: &mut Frame, exc: &Value, handlers: &[vault_ir::ast::ExceptHandler]) -> EvalResult {
    for handler in handlers {
        let matches = match &handler.kind {
            Some(pattern) => {
                let target_classes = eval_expr(ctx, frame, pattern)?;
                matches_exception(exc, &target_classes)
            }
            None => true,
        };
        if !matches {
            continue;
        }
        if let Some(name) = handler.name {
            frame.store(name, exc.clone());
        }
        let previous = ctx.current_exception.replace(exc.clone());
        let result = exec_block(ctx, frame, &handler.body);
        ctx.current_exception = previous;
        if let Some(name) = handler.name {
            frame.delete(name);
        }
        return result;
    }
    raise(exc.clone())
}

/// `except*` (§4.8): the subject is always treated as a group, each
/// handler claims the members of that group matching its type and runs
/// once per non-empty claim, and whatever is left unclaimed — plus
/// anything a handler body itself raises — re-combines into the
/// narrowest fitting shape (nothing, a single exception, or a fresh
/// group) and is re-raised after the statement.
fn run_star_handlers(ctx: &mut ExecCtx, frame: &mut Frame, exc: Value, handlers: &[vault_ir::ast::ExceptHandler]) -> EvalResult {
    let classes = ctx.shared.classes.clone();
    let group = exceptions::ensure_exception_group(&classes, exc);
    let mut remaining = exceptions::exception_group_members(&group);
    let mut raised_by_handlers = Vec::new();

    for handler in handlers {
        let Some(pattern) = &handler.kind else {
            return errors::type_error(&classes, "except* clause must name a type");
        };
        let target_classes = eval_expr(ctx, frame, pattern)?;
        if exceptions::targets_exception_group(&target_classes, &classes) {
            return errors::type_error(&classes, "catching ExceptionGroup with except* is not allowed");
        }

        let mut matched = Vec::new();
        let mut unmatched = Vec::new();
        for member in remaining {
            if matches_exception(&member, &target_classes) {
                matched.push(member);
            } else {
                unmatched.push(member);
            }
        }
        remaining = unmatched;
        if matched.is_empty() {
            continue;
        }

        let bound = exceptions::new_exception_group(&classes, "", matched);
        if let Some(name) = handler.name {
            frame.store(name, bound.clone());
        }
        let previous = ctx.current_exception.replace(bound.clone());
        let result = exec_block(ctx, frame, &handler.body);
        ctx.current_exception = previous;
        if let Some(name) = handler.name {
            frame.delete(name);
        }
        match result {
            Ok(_) => {}
            Err(Unwind::Raise(new_exc)) => raised_by_handlers.push(new_exc),
            flow @ Err(Unwind::Flow(_)) => return flow,
        }
    }

    remaining.extend(raised_by_handlers);
    match remaining.len() {
        0 => Ok(Value::None),
        1 => raise(remaining.swap_remove(0)),
        _ => raise(exceptions::new_exception_group(&classes, "", remaining)),
    }
}

fn matches_exception(exc: &Value, target: &Value) -> bool {
    match target {
        Value::Tuple(classes) => classes.iter().any(|c| matches_exception(exc, c)),
        Value::Class(_) => exceptions::is_instance_of(exc, target),
        _ => false,
    }
}

fn exec_import(ctx: &mut ExecCtx, frame: &mut Frame, aliases: &[vault_ir::ast::ImportAlias]) -> EvalResult {
    for alias in aliases {
        let module = ctx.shared.importer.import(alias.name.as_str(), 0, &ctx.shared.classes)?;
        let bound_name = alias.asname.unwrap_or(alias.name);
        frame.store(bound_name, module);
    }
    Ok(Value::None)
}

fn exec_import_from(ctx: &mut ExecCtx, frame: &mut Frame, module: Option<Name>, level: u32, names: &[vault_ir::ast::ImportAlias]) -> EvalResult {
    let module_name = module.map(|n| n.as_str().to_string()).unwrap_or_default();
    let module_value = ctx.shared.importer.import(&module_name, level, &ctx.shared.classes)?;
    let Value::Module(module_value) = module_value else {
        return errors::type_error(&ctx.shared.classes, "import target is not a module");
    };
    for name in names {
        let value = module_value
            .namespace
            .lock()
            .get(&name.name)
            .cloned()
            .ok_or_else(|| Unwind::Raise(exceptions::simple_exception(&ctx.shared.classes.import_error, format!("cannot import name '{}'", name.name.as_str()))))?;
        let bound_name = name.asname.unwrap_or(name.name);
        frame.store(bound_name, value);
    }
    Ok(Value::None)
}

fn exec_class_def(ctx: &mut ExecCtx, frame: &mut Frame, def: &Arc<vault_ir::ast::ClassDef>) -> EvalResult {
    let mut bases = Vec::with_capacity(def.bases.len());
    for base in &def.bases {
        bases.push(eval_expr(ctx, frame, base)?);
    }

    let node = ctx.scopes.get(def.scope_id);
    let mut class_frame = Frame::new(
        vault_ir::scope::ScopeKind::Class,
        Arc::new(node.info.clone()),
        frame.globals.clone(),
        ctx.shared.builtins.clone(),
    );

    let class_qualname: Arc<str> = Arc::from(def.name.as_str());
    // Attribute references written inside this class's own body (not its
    // methods, which get their owner from `make_closure`) mangle against
    // this class's bare name (§4.2).
    class_frame.private_owner = Some(Arc::from(def.name.as_str()));
    exec_class_body(ctx, &mut class_frame, &def.body, &class_qualname)?;
    let namespace = class_frame.into_namespace();

    let class = crate::classdef::build_class(Arc::from(def.name.as_str()), class_qualname, bases, namespace, &ctx.shared.classes)?;
    frame.store(def.name, class);
    Ok(Value::None)
}

/// Executes a class body with methods qualified as `Outer.method` rather
/// than the bare name a top-level `def` would get (§4.5's qualname rule).
fn exec_class_body(ctx: &mut ExecCtx, frame: &mut Frame, body: &Block, class_qualname: &str) -> EvalResult {
    for stmt in &body.stmts {
        if let StmtKind::FunctionDef(def) = &stmt.kind {
            let closure = make_closure(ctx, frame, def, Some(class_qualname))?;
            frame.store(def.name, closure);
        } else {
            exec_stmt(ctx, frame, stmt)?;
        }
    }
    Ok(Value::None)
}

fn exec_match(ctx: &mut ExecCtx, frame: &mut Frame, subject: &Expr, cases: &[vault_ir::ast::MatchCase]) -> EvalResult {
    let subject_value = eval_expr(ctx, frame, subject)?;
    for case in cases {
        let mut bindings = rustc_hash::FxHashMap::default();
        if match_case_pattern(ctx, frame, &case.pattern, &subject_value, &mut bindings)? {
            for (name, value) in bindings {
                frame.store(name, value);
            }
            if let Some(guard) = &case.guard {
                if !eval_expr(ctx, frame, guard)?.is_truthy() {
                    continue;
                }
            }
            return exec_block(ctx, frame, &case.body);
        }
    }
    Ok(Value::None)
}

/// Bridges the pure structural matcher (`vault_patterns::pattern`) with the
/// three pattern forms that need expression evaluation against the live
/// frame: a matched literal (`MatchValue`), a mapping pattern's keys, and a
/// class pattern's constructor and positional/keyword sub-patterns.
fn match_case_pattern(
    ctx: &mut ExecCtx,
    frame: &mut Frame,
    pattern: &vault_ir::ast::Pattern,
    value: &Value,
    bindings: &mut rustc_hash::FxHashMap<Name, Value>,
) -> Result<bool, Unwind> {
    use vault_ir::ast::Pattern;
    match pattern {
        Pattern::MatchValue(expr) => {
            let target = eval_expr(ctx, frame, expr)?;
            Ok(operators::values_equal(value, &target))
        }
        Pattern::MatchMapping { keys, patterns, rest } => {
            let Value::Dict(dict) = value else { return Ok(false) };
            // Snapshot the entries before evaluating key expressions: a key
            // expression can itself read from `frame`/call back into user
            // code, and holding the dict's lock across that risks deadlock
            // on self-referential structures.
            let entries = dict.lock().clone();
            let mut matched_keys = Vec::new();
            for (key_expr, sub) in keys.iter().zip(patterns) {
                let key = eval_expr(ctx, frame, key_expr)?;
                let Some((_, found)) = entries.iter().find(|(k, _)| operators::values_equal(k, &key)) else {
                    return Ok(false);
                };
                if !match_case_pattern(ctx, frame, sub, found, bindings)? {
                    return Ok(false);
                }
                matched_keys.push(key);
            }
            if let Some(rest_name) = rest {
                let remaining: Vec<(Value, Value)> = entries
                    .iter()
                    .filter(|(k, _)| !matched_keys.iter().any(|mk| operators::values_equal(mk, k)))
                    .cloned()
                    .collect();
                bindings.insert(*rest_name, Value::Dict(Arc::new(parking_lot::Mutex::new(remaining))));
            }
            Ok(true)
        }
        Pattern::MatchClass { cls, patterns, kwd_names, kwd_patterns } => {
            let class_value = eval_expr(ctx, frame, cls)?;
            let Value::Class(_) = &class_value else { return Ok(false) };
            if !exceptions::is_instance_of(value, &class_value) {
                return Ok(false);
            }
            let Value::Instance(instance) = value else { return Ok(false) };
            for (i, sub) in patterns.iter().enumerate() {
                let attr_name = Name::new(&format!("__match_args_{i}"));
                let Some(field) = instance.attrs.lock().get(&attr_name).cloned() else {
                    return Ok(false);
                };
                if !match_case_pattern(ctx, frame, sub, &field, bindings)? {
                    return Ok(false);
                }
            }
            for (name, sub) in kwd_names.iter().zip(kwd_patterns) {
                let Some(field) = instance.attrs.lock().get(name).cloned() else {
                    return Ok(false);
                };
                if !match_case_pattern(ctx, frame, sub, &field, bindings)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        other => Ok(vault_patterns::pattern::match_pattern(other, value, bindings)),
    }
}
