//! Constructors for the handful of runtime errors the evaluator itself
//! raises (as opposed to ones user code raises explicitly). Centralized
//! here so every call site raises with the same message shape.

use vault_patterns::{raise, exceptions, EvalResult, ExceptionClasses, Value};

pub fn type_error<T>(classes: &ExceptionClasses, message: impl Into<std::sync::Arc<str>>) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.type_error, message))
}

pub fn value_error<T>(classes: &ExceptionClasses, message: impl Into<std::sync::Arc<str>>) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.value_error, message))
}

pub fn name_error<T>(classes: &ExceptionClasses, name: &str) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.name_error, format!("name '{name}' is not defined")))
}

pub fn unbound_local<T>(classes: &ExceptionClasses, name: &str) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(
        &classes.unbound_local_error,
        format!("cannot access local variable '{name}' where it is not associated with a value"),
    ))
}

pub fn attribute_error<T>(classes: &ExceptionClasses, type_name: &str, attr: &str) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(
        &classes.attribute_error,
        format!("'{type_name}' object has no attribute '{attr}'"),
    ))
}

/// Raised when the attribute guard (§4.6) denies access outright, as
/// opposed to the name simply not existing on the object. The wording is
/// load-bearing: interpreted code distinguishes "this name is blocked
/// policy" from "no such attribute" by the exact message text.
pub fn blocked_attribute<T>(classes: &ExceptionClasses, attr: &str) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(
        &classes.attribute_error,
        format!("attribute access to '{attr}' is blocked in this environment"),
    ))
}

pub fn key_error<T>(classes: &ExceptionClasses, key_repr: impl Into<std::sync::Arc<str>>) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.key_error, key_repr))
}

pub fn index_error<T>(classes: &ExceptionClasses, message: impl Into<std::sync::Arc<str>>) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.index_error, message))
}

pub fn zero_division<T>(classes: &ExceptionClasses, message: impl Into<std::sync::Arc<str>>) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(&classes.zero_division_error, message))
}

pub fn recursion_error<T>(classes: &ExceptionClasses) -> Result<T, vault_patterns::Unwind> {
    raise(exceptions::simple_exception(
        &classes.recursion_error,
        "maximum recursion depth exceeded",
    ))
}

pub fn stop_iteration(classes: &ExceptionClasses, value: Value) -> Value {
    exceptions::new_exception(&classes.stop_iteration, vec![value])
}

pub type Res = EvalResult;
