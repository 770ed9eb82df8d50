//! Call binding (§4.4) and qualified-name computation (§4.5).

use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::ast::{FunctionDef, Params};
use vault_ir::Name;
use vault_patterns::{exceptions, raise, Cell, ExceptionClasses, Unwind, Value};

/// `qualname` for a function or class nested directly inside a function
/// body gets a `<locals>` segment the way the reference language's own
/// `__qualname__` does, so two functions both named `helper` defined in
/// two different enclosing functions still print distinguishable
/// qualified names in tracebacks.
pub fn compute_qualname(enclosing_qualname: Option<&str>, name: &str, nested_in_function: bool) -> Arc<str> {
    match enclosing_qualname {
        None => Arc::from(name),
        Some(prefix) if nested_in_function => Arc::from(format!("{prefix}.<locals>.{name}")),
        Some(prefix) => Arc::from(format!("{prefix}.{name}")),
    }
}

/// Capture the cells a new closure needs from its defining frame, in the
/// order `ScopeInfo::free_slots` for the nested function's own scope
/// lists them. Any free slot the defining frame does not itself hold as a
/// cell (only possible if the analyzer and this call disagree about
/// nesting) is bound as a fresh, empty cell rather than panicking —
/// reads against it then fail as an ordinary `UnboundLocalError` at the
/// use site instead of crashing the interpreter.
pub fn capture_closure(defining_frame: &crate::scopes::Frame, free_slots: &[Name]) -> Vec<Cell> {
    free_slots
        .iter()
        .map(|name| defining_frame.cell(*name).cloned().unwrap_or_else(Cell::unbound))
        .collect()
}

pub fn bind_arguments(
    def: &FunctionDef,
    defaults: &[Value],
    kw_defaults: &FxHashMap<Name, Value>,
    mut args: Vec<Value>,
    kwargs: Vec<(Name, Value)>,
    classes: &ExceptionClasses,
) -> Result<FxHashMap<Name, Value>, Unwind> {
    let params = &def.params;
    let mut locals = FxHashMap::default();
    let mut kwargs_by_name: FxHashMap<Name, Value> = kwargs.into_iter().collect();

    let positional_slots: Vec<&vault_ir::ast::Param> =
        params.posonly.iter().chain(params.args.iter()).collect();

    if args.len() > positional_slots.len() && params.vararg.is_none() {
        return arity_error(def, classes, args.len(), positional_slots.len());
    }

    let extra_positional: Vec<Value> = if args.len() > positional_slots.len() {
        args.split_off(positional_slots.len())
    } else {
        Vec::new()
    };

    for (i, param) in positional_slots.iter().enumerate() {
        let value = if i < args.len() {
            args[i].clone()
        } else if !param.name.is_mangling_candidate() && kwargs_by_name.contains_key(&param.name) {
            kwargs_by_name.remove(&param.name).expect("checked above")
        } else {
            default_for(param.name, params, defaults).ok_or_else(|| missing_argument(def, classes, param.name))?
        };
        locals.insert(param.name, value);
    }

    if let Some(vararg) = &params.vararg {
        locals.insert(vararg.name, Value::Tuple(Arc::from(extra_positional)));
    } else if !extra_positional.is_empty() {
        return arity_error(def, classes, args.len() + extra_positional.len(), positional_slots.len());
    }

    for param in &params.kwonly {
        let value = kwargs_by_name
            .remove(&param.name)
            .or_else(|| kw_defaults.get(&param.name).cloned())
            .ok_or_else(|| missing_argument(def, classes, param.name))?;
        locals.insert(param.name, value);
    }

    if let Some(kwarg) = &params.kwarg {
        let rest: Vec<(Value, Value)> = kwargs_by_name
            .drain()
            .map(|(k, v)| (Value::Str(Arc::from(k.as_str())), v))
            .collect();
        locals.insert(kwarg.name, Value::Dict(Arc::new(parking_lot::Mutex::new(rest))));
    } else if !kwargs_by_name.is_empty() {
        let name = kwargs_by_name.keys().next().copied().unwrap_or(Name::new(""));
        return Err(Unwind::Raise(exceptions::simple_exception(
            &classes.type_error,
            format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, name
            ),
        )));
    }

    Ok(locals)
}

fn default_for(name: Name, params: &Params, defaults: &[Value]) -> Option<Value> {
    let positional: Vec<&vault_ir::ast::Param> = params.posonly.iter().chain(params.args.iter()).collect();
    let idx = positional.iter().position(|p| p.name == name)?;
    let first_default_idx = positional.len().checked_sub(defaults.len())?;
    if idx < first_default_idx {
        return None;
    }
    defaults.get(idx - first_default_idx).cloned()
}

fn missing_argument(def: &FunctionDef, classes: &ExceptionClasses, name: Name) -> Unwind {
    Unwind::Raise(exceptions::simple_exception(
        &classes.type_error,
        format!("{}() missing required argument: '{}'", def.name, name),
    ))
}

fn arity_error<T>(
    def: &FunctionDef,
    classes: &ExceptionClasses,
    got: usize,
    expected: usize,
) -> Result<T, Unwind> {
    raise(exceptions::simple_exception(
        &classes.type_error,
        format!(
            "{}() takes {} positional argument{} but {} {} given",
            def.name,
            expected,
            if expected == 1 { "" } else { "s" },
            got,
            if got == 1 { "was" } else { "were" },
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_ir::ast::{Block, Param};
    use vault_ir::Span;

    fn simple_def(names: &[&str]) -> FunctionDef {
        FunctionDef {
            name: Name::new("f"),
            params: Params {
                posonly: vec![],
                args: names
                    .iter()
                    .map(|n| Param { name: Name::new(n), default: None, annotation: None, span: Span::default() })
                    .collect(),
                vararg: None,
                kwonly: vec![],
                kwarg: None,
            },
            body: Block { stmts: vec![] },
            decorators: vec![],
            returns: None,
            type_params: vec![],
            is_async: false,
            is_generator: false,
            span: Span::default(),
            scope_id: 0,
        }
    }

    #[test]
    fn positional_arguments_bind_by_position() {
        let def = simple_def(&["a", "b"]);
        let classes = ExceptionClasses::build();
        let bound = bind_arguments(
            &def,
            &[],
            &FxHashMap::default(),
            vec![Value::Int(1), Value::Int(2)],
            vec![],
            &classes,
        )
        .unwrap();
        assert!(matches!(bound.get(&Name::new("a")), Some(Value::Int(1))));
        assert!(matches!(bound.get(&Name::new("b")), Some(Value::Int(2))));
    }

    #[test]
    fn too_many_positional_arguments_is_type_error() {
        let def = simple_def(&["a"]);
        let classes = ExceptionClasses::build();
        let err = bind_arguments(
            &def,
            &[],
            &FxHashMap::default(),
            vec![Value::Int(1), Value::Int(2)],
            vec![],
            &classes,
        )
        .unwrap_err();
        match err {
            Unwind::Raise(v) => assert!(vault_patterns::exceptions::is_instance_of(&v, &classes.type_error)),
            other => panic!("expected raise, got {other:?}"),
        }
    }

    #[test]
    fn missing_argument_is_type_error() {
        let def = simple_def(&["a", "b"]);
        let classes = ExceptionClasses::build();
        let err = bind_arguments(&def, &[], &FxHashMap::default(), vec![Value::Int(1)], vec![], &classes)
            .unwrap_err();
        match err {
            Unwind::Raise(v) => assert!(vault_patterns::exceptions::is_instance_of(&v, &classes.type_error)),
            other => panic!("expected raise, got {other:?}"),
        }
    }
}
