//! Structural pattern matching (`match`/`case`), §4.8.
//!
//! Matching is a pure function from a candidate `Value` to either a set of
//! new bindings or failure; it never raises (a `MatchClass` pattern whose
//! class test itself would need to call user `__eq__`/`__instancecheck__`
//! is intentionally out of scope here — see `vault_eval::stmt` for how the
//! `guard` expression, which can call arbitrary code, is evaluated
//! separately once a pattern's own bindings succeed).

use crate::value::Value;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::ast::{Constant, Pattern};
use vault_ir::Name;

pub type Bindings = FxHashMap<Name, Value>;

/// Structural class check used by `MatchClass`/`isinstance`-style tests
/// that do not need to go through user-overridable dunder dispatch: is
/// `value`'s class `target`, or does `target` appear anywhere in its MRO?
pub fn value_is_instance(value: &Value, target: &Value) -> bool {
    let Value::Class(target_class) = target else { return false };
    let actual = match value {
        Value::Instance(i) => &i.class,
        Value::Class(_) => return false,
        _ => return false,
    };
    if Arc::ptr_eq(actual, target_class) {
        return true;
    }
    actual.mro.iter().any(|base| matches!(base, Value::Class(b) if Arc::ptr_eq(b, target_class)))
}

fn literal_eq(value: &Value, constant: &Constant) -> bool {
    match constant {
        Constant::None => matches!(value, Value::None),
        Constant::Bool(b) => matches!(value, Value::Bool(v) if v == b),
        Constant::Int(i) => matches!(value, Value::Int(v) if v == i),
        Constant::Float(f) => matches!(value, Value::Float(v) if v == f),
        Constant::Str(s) => matches!(value, Value::Str(v) if v.as_ref() == s.as_ref()),
        Constant::Bytes(b) => matches!(value, Value::Bytes(v) if v.as_ref() == b.as_ref()),
        Constant::Ellipsis => false,
    }
}

/// Attempt to match `pattern` against `subject`. A `Value` match (an
/// arbitrary expression pattern like `case SOME_CONSTANT:`) is resolved by
/// the caller before calling in; by the time a `Pattern` reaches here
/// every `MatchValue` has already been evaluated to a `Value` by
/// `vault_eval` and reduced into an equality check the caller performs
/// itself, so this module only deals with the structural pattern forms
/// that need no expression evaluation of their own: literals, sequences,
/// mappings, classes, captures, wildcards, and or-patterns.
pub fn match_pattern(pattern: &Pattern, subject: &Value, bindings: &mut Bindings) -> bool {
    match pattern {
        Pattern::MatchValue(_) => {
            // Resolved by the caller; see module docs.
            false
        }
        Pattern::MatchSingleton(c) => literal_eq(subject, c),
        Pattern::MatchSequence(patterns) => match_sequence(patterns, subject, bindings),
        Pattern::MatchMapping { keys: _, patterns: _, rest: _ } => {
            // Key evaluation needs the evaluator (dict keys can be
            // arbitrary hashable expressions); see `vault_eval::stmt`.
            false
        }
        Pattern::MatchClass { .. } => false,
        Pattern::MatchStar(name) => {
            if let Some(name) = name {
                bindings.insert(*name, subject.clone());
            }
            true
        }
        Pattern::MatchAs { pattern: inner, name } => {
            let matched = match inner {
                Some(inner) => match_pattern(inner, subject, bindings),
                None => true,
            };
            if matched {
                if let Some(name) = name {
                    bindings.insert(*name, subject.clone());
                }
            }
            matched
        }
        Pattern::MatchOr(alternatives) => {
            alternatives.iter().any(|alt| {
                let mut local = bindings.clone();
                if match_pattern(alt, subject, &mut local) {
                    *bindings = local;
                    true
                } else {
                    false
                }
            })
        }
    }
}

fn match_sequence(patterns: &[Pattern], subject: &Value, bindings: &mut Bindings) -> bool {
    let Value::List(list) = subject else {
        let Value::Tuple(tuple) = subject else { return false };
        return match_sequence_items(patterns, tuple, bindings);
    };
    let guard = list.lock();
    match_sequence_items(patterns, &guard, bindings)
}

fn match_sequence_items(patterns: &[Pattern], items: &[Value], bindings: &mut Bindings) -> bool {
    let star_pos = patterns.iter().position(|p| matches!(p, Pattern::MatchStar(_)));
    match star_pos {
        None => {
            if patterns.len() != items.len() {
                return false;
            }
            patterns.iter().zip(items).all(|(p, v)| match_pattern(p, v, bindings))
        }
        Some(pos) => {
            if items.len() < patterns.len() - 1 {
                return false;
            }
            let before = &patterns[..pos];
            let after = &patterns[pos + 1..];
            let tail_start = items.len() - after.len();
            if !before.iter().zip(&items[..pos]).all(|(p, v)| match_pattern(p, v, bindings)) {
                return false;
            }
            if !after.iter().zip(&items[tail_start..]).all(|(p, v)| match_pattern(p, v, bindings)) {
                return false;
            }
            let star_slice = Value::List(Arc::new(parking_lot::Mutex::new(
                items[pos..tail_start].to_vec(),
            )));
            match_pattern(&patterns[pos], &star_slice, bindings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use vault_ir::ast::Pattern;

    #[test]
    fn wildcard_capture_binds() {
        let mut bindings = Bindings::default();
        let name = Name::new("x");
        let pattern = Pattern::MatchAs { pattern: None, name: Some(name) };
        assert!(match_pattern(&pattern, &Value::Int(5), &mut bindings));
        assert_eq!(bindings.get(&name), Some(&Value::Int(5)));
    }

    #[test]
    fn sequence_with_star_splits_correctly() {
        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)];
        let subject = Value::List(Arc::new(Mutex::new(items)));
        let rest = Name::new("rest");
        let patterns = vec![
            Pattern::MatchAs { pattern: None, name: Some(Name::new("a")) },
            Pattern::MatchStar(Some(rest)),
            Pattern::MatchAs { pattern: None, name: Some(Name::new("d")) },
        ];
        let mut bindings = Bindings::default();
        assert!(match_sequence(&patterns, &subject, &mut bindings));
        assert_eq!(bindings.get(&Name::new("a")), Some(&Value::Int(1)));
        assert_eq!(bindings.get(&Name::new("d")), Some(&Value::Int(4)));
        match bindings.get(&rest) {
            Some(Value::List(l)) => assert_eq!(&*l.lock(), &[Value::Int(2), Value::Int(3)]),
            other => panic!("unexpected binding {other:?}"),
        }
    }
}
