//! Attribute read/write, routed through the guard (§4.6).
//!
//! This is the single place `getattr`/`setattr`/the `Attribute` expression
//! node/the `with`-statement's `__enter__`/`__exit__` lookups/method
//! dispatch all funnel through. Every one of them calls [`get_attr`] or
//! [`set_attr`]; neither ever takes a shortcut that skips [`crate::guard`].

use crate::classdef::mro_lookup;
use crate::errors;
use crate::interpreter::Shared;
use crate::methods;
use std::sync::Arc;
use vault_ir::Name;
use vault_patterns::{BoundMethod, ClassValue, ExceptionClasses, HostObject, NativeFunction, Unwind, Value};

pub fn get_attr(obj: &Value, attr: &str, shared: &Shared) -> Result<Value, Unwind> {
    // `__getattribute__` itself is never looked up and blocked flatly: it
    // is rewritten into a wrapper that re-applies this same guard, so that
    // `object.__getattribute__(e, name)`, `type.__getattribute__(e,
    // name)`, and `super(T, e).__getattribute__(name)` all still end up
    // going through `get_attr` rather than reaching a raw, unguarded
    // dispatch (§4.6).
    if attr == "__getattribute__" {
        return Ok(wrapped_getattribute(obj.clone(), shared.clone()));
    }
    if crate::guard::is_blocked(attr) {
        return errors::blocked_attribute(&shared.classes, attr);
    }
    let name = Name::new(attr);

    match obj {
        Value::Instance(instance) => {
            if let Some(value) = instance.attrs.lock().get(&name).cloned() {
                return Ok(value);
            }
            if let Some(value) = mro_lookup(&instance.class, name) {
                return Ok(bind_if_callable(value, obj.clone()));
            }
            methods::dispatch(obj, attr, shared).ok_or_else(|| {
                errors::attribute_error::<()>(&shared.classes, obj.type_name(), attr).unwrap_err()
            })
        }
        Value::Class(class) => {
            if attr == "__name__" {
                return Ok(Value::Str(class.name.clone()));
            }
            if attr == "__qualname__" {
                return Ok(Value::Str(class.qualname.clone()));
            }
            if let Some(value) = mro_lookup(class, name) {
                return Ok(value);
            }
            errors::attribute_error(&shared.classes, "type", attr)
        }
        Value::Module(module) => module.namespace.lock().get(&name).cloned().ok_or_else(|| {
            errors::attribute_error::<()>(&shared.classes, "module", attr).unwrap_err()
        }),
        Value::Host(host) => host
            .get_attr(name)
            .ok_or_else(|| errors::attribute_error::<()>(&shared.classes, host.type_name(), attr).unwrap_err()),
        other => methods::dispatch(other, attr, shared)
            .ok_or_else(|| errors::attribute_error::<()>(&shared.classes, other.type_name(), attr).unwrap_err()),
    }
}

pub fn set_attr(obj: &Value, attr: &str, value: Value, shared: &Shared) -> Result<(), Unwind> {
    if crate::guard::is_blocked(attr) {
        return errors::blocked_attribute(&shared.classes, attr);
    }
    let name = Name::new(attr);
    match obj {
        Value::Instance(instance) => {
            instance.attrs.lock().insert(name, value);
            Ok(())
        }
        Value::Class(class) => {
            class.namespace.lock().insert(name, value);
            Ok(())
        }
        Value::Module(module) => {
            module.namespace.lock().insert(name, value);
            Ok(())
        }
        _ => errors::type_error(&shared.classes, format!("'{}' object has no attribute assignment", obj.type_name())),
    }
}

fn bind_if_callable(value: Value, receiver: Value) -> Value {
    match value {
        Value::Function(_) | Value::Native(_) => {
            Value::BoundMethod(Arc::new(BoundMethod { receiver, func: value }))
        }
        other => other,
    }
}

fn native(name: &'static str, f: impl Fn(Vec<Value>, Vec<(Name, Value)>) -> Result<Value, Unwind> + Send + Sync + 'static) -> Value {
    Value::Native(Arc::new(NativeFunction { name: Arc::from(name), func: Box::new(f) }))
}

/// Build the callable `object.__getattribute__`/`instance.__getattribute__`
/// resolves to. Accepts both call shapes real code uses interchangeably:
/// `receiver.__getattribute__(name)` (bound — one argument, `receiver` is
/// the implicit target) and `object.__getattribute__(receiver, name)`
/// (unbound — two arguments, the first positional argument is the actual
/// target). Either shape also accepts `name=...` as a keyword, which takes
/// priority over a same-position positional argument if both are present.
fn wrapped_getattribute(receiver: Value, shared: Shared) -> Value {
    native("__getattribute__", move |args, kwargs| {
        let keyword_name = kwargs.iter().find(|(k, _)| k.as_str() == "name").map(|(_, v)| v.clone());
        let mut positional = args.into_iter();
        let (target, name_value) = match (positional.next(), positional.next()) {
            (Some(first), Some(second)) => (first, keyword_name.unwrap_or(second)),
            (Some(first), None) => match keyword_name {
                Some(name_value) => (first, name_value),
                None => (receiver.clone(), first),
            },
            (None, None) => match keyword_name {
                Some(name_value) => (receiver.clone(), name_value),
                None => return errors::type_error(&shared.classes, "__getattribute__() missing required argument: 'name'"),
            },
            (None, Some(_)) => unreachable!("Iterator::next() cannot yield an element after returning None"),
        };
        let Value::Str(attr) = &name_value else {
            return errors::type_error(&shared.classes, "attribute name must be string");
        };
        get_attr(&target, attr, &shared)
    })
}

/// `super(T, e)`'s runtime value (§4.6's `super(T, e).__getattribute__(N)`
/// boundary case). Implements only the explicit two-argument form; the
/// zero-argument `super()` shorthand needs a per-method class cell the
/// rest of the evaluator has no machinery for yet (see `DESIGN.md`).
#[derive(Debug)]
pub struct SuperHandle {
    /// `T`: the MRO search starts just past this class.
    target_class: Arc<ClassValue>,
    /// `e`: resolved methods bind to this, exactly like an ordinary
    /// instance attribute lookup would.
    receiver: Value,
    /// `e`'s own runtime class — the MRO actually walked is this class's,
    /// not `target_class`'s, so a subclass's override further down the
    /// chain is still skipped correctly.
    object_class: Arc<ClassValue>,
    classes: ExceptionClasses,
}

impl SuperHandle {
    pub fn new(target_class: Arc<ClassValue>, receiver: Value, object_class: Arc<ClassValue>, classes: ExceptionClasses) -> Self {
        Self { target_class, receiver, object_class, classes }
    }

    fn mro_chain(&self) -> Vec<Arc<ClassValue>> {
        let mut chain = vec![self.object_class.clone()];
        for ancestor in &self.object_class.mro {
            if let Value::Class(c) = ancestor {
                chain.push(c.clone());
            }
        }
        chain
    }
}

impl HostObject for SuperHandle {
    fn type_name(&self) -> &str {
        "super"
    }

    fn get_attr(&self, name: Name) -> Option<Value> {
        let chain = self.mro_chain();
        let start = chain.iter().position(|c| Arc::ptr_eq(c, &self.target_class))? + 1;
        for class in &chain[start..] {
            if let Some(value) = class.namespace.lock().get(&name).cloned() {
                return Some(bind_if_callable(value, self.receiver.clone()));
            }
        }
        None
    }

    fn call(&self, _args: Vec<Value>, _kwargs: Vec<(Name, Value)>) -> Result<Value, Unwind> {
        errors::type_error(&self.classes, "'super' object is not callable")
    }
}
