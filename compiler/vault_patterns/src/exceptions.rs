//! Built-in exception hierarchy.
//!
//! The interpreter needs a small, fixed tree of exception classes to exist
//! before any user code runs (raising a bare `KeyError` must work even in
//! a module that defines no classes of its own). Building that tree is a
//! value-model concern, not an evaluator concern, so it lives here;
//! `vault_eval::Interpreter` constructs one `ExceptionClasses` table per
//! interpreter and installs it into the safe-builtins namespace (§6).

use crate::value::{ClassValue, Instance, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::Name;

macro_rules! exception_tree {
    ($($child:ident < $parent:ident),* $(,)?) => {
        /// Every standard exception class, keyed by its own field name.
        #[derive(Debug, Clone)]
        pub struct ExceptionClasses {
            pub base_exception: Value,
            pub exception: Value,
            $(pub $child: Value,)*
        }
    };
}

exception_tree! {
    system_exit < base_exception,
    generator_exit < base_exception,
    keyboard_interrupt < base_exception,
    stop_iteration < exception,
    stop_async_iteration < exception,
    arithmetic_error < exception,
    zero_division_error < arithmetic_error,
    overflow_error < arithmetic_error,
    assertion_error < exception,
    attribute_error < exception,
    import_error < exception,
    module_not_found_error < import_error,
    lookup_error < exception,
    index_error < lookup_error,
    key_error < lookup_error,
    name_error < exception,
    unbound_local_error < name_error,
    os_error < exception,
    file_not_found_error < os_error,
    permission_error < exception,
    not_implemented_error < runtime_error,
    recursion_error < runtime_error,
    runtime_error < exception,
    syntax_error < exception,
    indentation_error < syntax_error,
    system_error < exception,
    type_error < exception,
    value_error < exception,
    unicode_error < value_error,
    exception_group < exception,
}

fn new_class(name: &str, bases: Vec<Value>) -> Value {
    // Single-inheritance chain only (true of every standard exception
    // class), so the MRO is just this class's bases followed by each
    // base's own MRO, in order.
    let mut mro = bases.clone();
    for base in &bases {
        if let Value::Class(base_class) = base {
            mro.extend(base_class.mro.iter().cloned());
        }
    }
    Value::Class(Arc::new(ClassValue {
        name: Arc::from(name),
        qualname: Arc::from(name),
        bases,
        mro,
        namespace: Arc::new(Mutex::new(FxHashMap::default())),
        metaclass: None,
    }))
}

impl ExceptionClasses {
    /// Build the fixed standard hierarchy. `BaseException` and `Exception`
    /// are constructed first since every other entry derives, directly or
    /// transitively, from `Exception`.
    pub fn build() -> Self {
        let base_exception = new_class("BaseException", vec![]);
        let exception = new_class("Exception", vec![base_exception.clone()]);

        macro_rules! mk {
            ($name:literal, $parent:expr) => {
                new_class($name, vec![$parent.clone()])
            };
        }

        let system_exit = mk!("SystemExit", base_exception);
        let generator_exit = mk!("GeneratorExit", base_exception);
        let keyboard_interrupt = mk!("KeyboardInterrupt", base_exception);
        let stop_iteration = mk!("StopIteration", exception);
        let stop_async_iteration = mk!("StopAsyncIteration", exception);
        let arithmetic_error = mk!("ArithmeticError", exception);
        let zero_division_error = mk!("ZeroDivisionError", arithmetic_error);
        let overflow_error = mk!("OverflowError", arithmetic_error);
        let assertion_error = mk!("AssertionError", exception);
        let attribute_error = mk!("AttributeError", exception);
        let import_error = mk!("ImportError", exception);
        let module_not_found_error = mk!("ModuleNotFoundError", import_error);
        let lookup_error = mk!("LookupError", exception);
        let index_error = mk!("IndexError", lookup_error);
        let key_error = mk!("KeyError", lookup_error);
        let name_error = mk!("NameError", exception);
        let unbound_local_error = mk!("UnboundLocalError", name_error);
        let os_error = mk!("OSError", exception);
        let file_not_found_error = mk!("FileNotFoundError", os_error);
        let permission_error = mk!("PermissionError", os_error);
        let runtime_error = mk!("RuntimeError", exception);
        let not_implemented_error = mk!("NotImplementedError", runtime_error);
        let recursion_error = mk!("RecursionError", runtime_error);
        let syntax_error = mk!("SyntaxError", exception);
        let indentation_error = mk!("IndentationError", syntax_error);
        let system_error = mk!("SystemError", exception);
        let type_error = mk!("TypeError", exception);
        let value_error = mk!("ValueError", exception);
        let unicode_error = mk!("UnicodeError", value_error);
        let exception_group = mk!("ExceptionGroup", exception);

        ExceptionClasses {
            base_exception,
            exception,
            system_exit,
            generator_exit,
            keyboard_interrupt,
            stop_iteration,
            stop_async_iteration,
            arithmetic_error,
            zero_division_error,
            overflow_error,
            assertion_error,
            attribute_error,
            import_error,
            module_not_found_error,
            lookup_error,
            index_error,
            key_error,
            name_error,
            unbound_local_error,
            os_error,
            file_not_found_error,
            permission_error,
            not_implemented_error,
            recursion_error,
            runtime_error,
            syntax_error,
            indentation_error,
            system_error,
            type_error,
            value_error,
            unicode_error,
            exception_group,
        }
    }

    /// Every standard class, for installing into a builtins namespace.
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        macro_rules! list {
            ($($field:ident => $name:literal),* $(,)?) => {
                vec![$(($name, self.$field.clone())),*]
            };
        }
        list! {
            base_exception => "BaseException",
            exception => "Exception",
            system_exit => "SystemExit",
            generator_exit => "GeneratorExit",
            keyboard_interrupt => "KeyboardInterrupt",
            stop_iteration => "StopIteration",
            stop_async_iteration => "StopAsyncIteration",
            arithmetic_error => "ArithmeticError",
            zero_division_error => "ZeroDivisionError",
            overflow_error => "OverflowError",
            assertion_error => "AssertionError",
            attribute_error => "AttributeError",
            import_error => "ImportError",
            module_not_found_error => "ModuleNotFoundError",
            lookup_error => "LookupError",
            index_error => "IndexError",
            key_error => "KeyError",
            name_error => "NameError",
            unbound_local_error => "UnboundLocalError",
            os_error => "OSError",
            file_not_found_error => "FileNotFoundError",
            permission_error => "PermissionError",
            not_implemented_error => "NotImplementedError",
            recursion_error => "RecursionError",
            runtime_error => "RuntimeError",
            syntax_error => "SyntaxError",
            indentation_error => "IndentationError",
            system_error => "SystemError",
            type_error => "TypeError",
            value_error => "ValueError",
            unicode_error => "UnicodeError",
            exception_group => "ExceptionGroup",
        }
    }
}

/// Construct an instance of `class` (expected to be a `Value::Class`
/// belonging to the exception hierarchy) carrying `args` as its `.args`
/// tuple, the way raising `ValueError("bad input")` binds `args =
/// ("bad input",)`.
pub fn new_exception(class: &Value, args: Vec<Value>) -> Value {
    let Value::Class(class_rc) = class else {
        panic!("new_exception called with a non-class value");
    };
    let mut attrs = FxHashMap::default();
    attrs.insert(Name::new("args"), Value::Tuple(Arc::from(args)));
    attrs.insert(Name::new("__cause__"), Value::None);
    attrs.insert(Name::new("__context__"), Value::None);
    attrs.insert(Name::new("__suppress_context__"), Value::Bool(false));
    Value::Instance(Arc::new(Instance {
        class: class_rc.clone(),
        attrs: Arc::new(Mutex::new(attrs)),
    }))
}

/// Shorthand for the common case of a single string-message exception.
pub fn simple_exception(class: &Value, message: impl Into<Arc<str>>) -> Value {
    new_exception(class, vec![Value::Str(message.into())])
}

/// Build an `ExceptionGroup` carrying `exceptions` as its `.exceptions`
/// tuple, the way `ExceptionGroup(message, exceptions)` does (§4.8).
pub fn new_exception_group(classes: &ExceptionClasses, message: impl Into<Arc<str>>, exceptions: Vec<Value>) -> Value {
    let group = new_exception(&classes.exception_group, vec![Value::Str(message.into())]);
    if let Value::Instance(instance) = &group {
        instance.attrs.lock().insert(Name::new("exceptions"), Value::Tuple(Arc::from(exceptions)));
    }
    group
}

/// Wrap `exc` in a fresh single-member `ExceptionGroup` unless it already
/// is one — `except*`'s subject is always a group (§4.8: "the subject is
/// packaged into an exception group if it isn't one").
pub fn ensure_exception_group(classes: &ExceptionClasses, exc: Value) -> Value {
    if is_instance_of(&exc, &classes.exception_group) {
        return exc;
    }
    new_exception_group(classes, "", vec![exc])
}

/// The flat list of exceptions an `ExceptionGroup` carries, or `exc` itself
/// as a single-element list if it is not a group.
pub fn exception_group_members(exc: &Value) -> Vec<Value> {
    if let Value::Instance(instance) = exc {
        if let Some(Value::Tuple(t)) = instance.attrs.lock().get(&Name::new("exceptions")) {
            return t.to_vec();
        }
    }
    vec![exc.clone()]
}

/// Is `target` (an `except*` clause's type, possibly a tuple of types)
/// `ExceptionGroup` itself? Catching exception groups with `except*` would
/// be self-defeating — each split member is already guaranteed not to be a
/// group — so it is rejected outright (§4.8).
pub fn targets_exception_group(target: &Value, classes: &ExceptionClasses) -> bool {
    match target {
        Value::Tuple(types) => types.iter().any(|t| targets_exception_group(t, classes)),
        Value::Class(class) => matches!(&classes.exception_group, Value::Class(eg) if Arc::ptr_eq(class, eg)),
        _ => false,
    }
}

/// Does `value`'s class chain (its MRO) include `class`? Used by `except`
/// clause matching and by `isinstance` over exception types.
pub fn is_instance_of(value: &Value, class: &Value) -> bool {
    let Value::Instance(instance) = value else { return false };
    let Value::Class(target) = class else { return false };
    if Arc::ptr_eq(&instance.class, target) {
        return true;
    }
    instance.class.mro.iter().any(|base| {
        matches!((base, class), (Value::Class(b), Value::Class(t)) if Arc::ptr_eq(b, t))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_division_derives_from_exception() {
        let classes = ExceptionClasses::build();
        let exc = simple_exception(&classes.zero_division_error, "division by zero");
        assert!(is_instance_of(&exc, &classes.zero_division_error));
        assert!(is_instance_of(&exc, &classes.arithmetic_error));
        assert!(is_instance_of(&exc, &classes.exception));
        assert!(!is_instance_of(&exc, &classes.value_error));
    }

    #[test]
    fn system_exit_does_not_derive_from_exception() {
        let classes = ExceptionClasses::build();
        let exc = simple_exception(&classes.system_exit, "bye");
        assert!(is_instance_of(&exc, &classes.base_exception));
        assert!(!is_instance_of(&exc, &classes.exception));
    }

    #[test]
    fn ensure_exception_group_wraps_a_plain_exception_once() {
        let classes = ExceptionClasses::build();
        let value_error = simple_exception(&classes.value_error, "bad");
        let group = ensure_exception_group(&classes, value_error.clone());
        assert!(is_instance_of(&group, &classes.exception_group));
        assert_eq!(exception_group_members(&group).len(), 1);

        let already_group = new_exception_group(&classes, "g", vec![value_error]);
        let Value::Instance(already_instance) = &already_group else { panic!("expected instance") };
        let unchanged = ensure_exception_group(&classes, already_group.clone());
        let Value::Instance(unchanged_instance) = &unchanged else { panic!("expected instance") };
        assert!(Arc::ptr_eq(already_instance, unchanged_instance));
    }

    #[test]
    fn targets_exception_group_rejects_the_group_type_only() {
        let classes = ExceptionClasses::build();
        assert!(targets_exception_group(&classes.exception_group, &classes));
        assert!(!targets_exception_group(&classes.value_error, &classes));
        assert!(targets_exception_group(
            &Value::Tuple(Arc::from(vec![classes.value_error.clone(), classes.exception_group.clone()])),
            &classes
        ));
    }
}
