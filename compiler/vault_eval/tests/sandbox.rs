//! Integration tests for the sandboxed evaluator: attribute guard
//! boundaries, private-name mangling, `except*` group splitting, closure
//! cell semantics, generator draining, and starred-assignment arity.
//!
//! Source text is compiled through the reference frontend rather than
//! hand-built `CodeUnit`s, exercising the same pipeline an embedder would.

use vault_eval::{Interpreter, RunResult};
use vault_ir::Name;
use vault_patterns::{Unwind, Value};

fn run(source: &str) -> Result<RunResult, Value> {
    let interpreter = Interpreter::builder().build();
    let unit = vault_frontend::compile(source, "<test>").expect("source compiles");
    match interpreter.run(&unit) {
        Ok(result) => Ok(result),
        Err(Unwind::Raise(exc)) => Err(exc),
        Err(Unwind::Flow(flow)) => panic!("unhandled control flow escaped the module: {flow:?}"),
    }
}

fn global(result: &RunResult, name: &str) -> Value {
    result.module_namespace.lock().get(&Name::new(name)).cloned().unwrap_or(Value::None)
}

fn exc_message(exc: &Value) -> String {
    let Value::Instance(instance) = exc else { panic!("expected an exception instance, got {exc:?}") };
    let args = instance.attrs.lock().get(&Name::new("args")).cloned();
    match args {
        Some(Value::Tuple(items)) => match items.first() {
            Some(Value::Str(s)) => s.to_string(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

fn exc_class_name(exc: &Value) -> String {
    let Value::Instance(instance) = exc else { panic!("expected an exception instance, got {exc:?}") };
    instance.class.name.to_string()
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        other => panic!("expected an int, got {other:?}"),
    }
}

fn as_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        other => panic!("expected a string, got {other:?}"),
    }
}

fn as_ints(value: &Value) -> Vec<i64> {
    match value {
        Value::List(l) => l.lock().iter().map(as_int).collect(),
        Value::Tuple(t) => t.iter().map(as_int).collect(),
        other => panic!("expected a sequence, got {other:?}"),
    }
}

fn as_tuple(value: &Value) -> Vec<Value> {
    match value {
        Value::Tuple(t) => t.to_vec(),
        other => panic!("expected a tuple, got {other:?}"),
    }
}

mod blocked_attributes {
    use super::*;

    #[test]
    fn direct_attribute_access_is_blocked() {
        let err = run("RESULT = (1).__class__\n").expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__class__' is blocked in this environment");
    }

    #[test]
    fn unbound_object_getattribute_is_blocked() {
        let source = "class Obj:\n    pass\no = Obj()\nRESULT = object.__getattribute__(o, '__dict__')\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__dict__' is blocked in this environment");
    }

    #[test]
    fn unbound_type_getattribute_is_blocked() {
        let source = "class Obj:\n    pass\no = Obj()\nRESULT = type.__getattribute__(o, '__mro__')\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__mro__' is blocked in this environment");
    }

    #[test]
    fn super_getattribute_is_blocked_positional() {
        let source = "class Base:\n    pass\nclass Child(Base):\n    pass\nc = Child()\nRESULT = super(Child, c).__getattribute__('__class__')\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__class__' is blocked in this environment");
    }

    #[test]
    fn super_getattribute_is_blocked_keyword() {
        let source = "class Base:\n    pass\nclass Child(Base):\n    pass\nc = Child()\nRESULT = super(Child, c).__getattribute__(name='__class__')\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__class__' is blocked in this environment");
    }

    #[test]
    fn super_still_resolves_unblocked_methods() {
        let source = "class Base:\n    def greet(self):\n        return 'base'\nclass Child(Base):\n    def greet(self):\n        return super(Child, self).greet() + '+child'\nc = Child()\nRESULT = c.greet()\n";
        let result = run(source).expect("should evaluate");
        assert_eq!(as_str(&global(&result, "RESULT")), "base+child");
    }

    #[test]
    fn escape_attempt_via_tuple_mro_is_blocked() {
        let source = "RESULT = getattr((), '__class__')\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__class__' is blocked in this environment");
    }
}

mod private_mangling {
    use super::*;

    #[test]
    fn self_double_underscore_reads_and_writes_mangled_slot() {
        let source = "class C:\n    def __init__(self):\n        self.__x = 1\n    def get(self):\n        return self.__x\nc = C()\nRESULT = (c.get(), c._C__x)\n";
        let result = run(source).expect("should evaluate");
        let pieces = as_tuple(&global(&result, "RESULT"));
        assert_eq!(as_int(&pieces[0]), 1);
        assert_eq!(as_int(&pieces[1]), 1);
    }

    #[test]
    fn mangled_name_is_not_reachable_unmangled_from_outside() {
        let source = "class C:\n    def __init__(self):\n        self.__x = 1\nc = C()\nRESULT = c.__x\n";
        let err = run(source).expect_err("should raise");
        assert!(exc_message(&err).contains("has no attribute"));
    }

    #[test]
    fn dunder_attribute_is_not_mangled_and_stays_blocked() {
        let source = "class C:\n    def show(self):\n        return self.__dict__\nc = C()\nRESULT = c.show()\n";
        let err = run(source).expect_err("should raise");
        assert_eq!(exc_message(&err), "attribute access to '__dict__' is blocked in this environment");
    }
}

mod exception_groups {
    use super::*;

    #[test]
    fn except_star_splits_a_raised_group_by_matched_type() {
        // A single unmatched member re-raises bare (not re-wrapped in a
        // fresh group) — the outer handler catches it by its own type.
        let source = "\
handled = []
remainder = None
try:
    try:
        raise ExceptionGroup('g', [ValueError('a'), TypeError('b')])
    except* ValueError as e:
        handled = [type(x).__name__ for x in e.exceptions]
except TypeError as rest:
    remainder = type(rest).__name__
RESULT = (handled, remainder)
";
        let result = run(source).expect("should evaluate");
        let pieces = as_tuple(&global(&result, "RESULT"));
        let handled: Vec<String> = match &pieces[0] {
            Value::List(l) => l.lock().iter().map(as_str).collect(),
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(handled, vec!["ValueError".to_string()]);
        assert_eq!(as_str(&pieces[1]), "TypeError");
    }

    #[test]
    fn except_star_wraps_a_single_non_group_exception() {
        let source = "\
handled = None
try:
    raise ValueError('boom')
except* ValueError as e:
    handled = [type(x).__name__ for x in e.exceptions]
RESULT = handled
";
        let result = run(source).expect("should evaluate");
        let handled: Vec<String> = match global(&result, "RESULT") {
            Value::List(l) => l.lock().iter().map(as_str).collect(),
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(handled, vec!["ValueError".to_string()]);
    }
}

mod closures {
    use super::*;

    #[test]
    fn unbound_freevar_raises_name_error_not_unbound_local() {
        let source = "\
def outer():
    def inner():
        return x
    result = inner()
    x = 1
    return result
outer()
";
        let err = run(source).expect_err("should raise");
        // Exactly `NameError`, not its `UnboundLocalError` subclass: the
        // reading scope only ever borrowed this binding from an enclosing
        // one, so it was never "local" to begin with.
        assert_eq!(exc_class_name(&err), "NameError");
    }
}

mod generators {
    use super::*;

    #[test]
    fn for_loop_drains_a_real_generator() {
        let source = "\
def gen():
    yield 1
    yield 2
    yield 3
out = []
for x in gen():
    out.append(x)
RESULT = out
";
        let result = run(source).expect("should evaluate");
        assert_eq!(as_ints(&global(&result, "RESULT")), vec![1, 2, 3]);
    }

    #[test]
    fn list_of_a_generator_collects_its_yields() {
        let source = "\
def gen():
    yield 'a'
    yield 'b'
RESULT = list(gen())
";
        let result = run(source).expect("should evaluate");
        let items: Vec<String> = match global(&result, "RESULT") {
            Value::List(l) => l.lock().iter().map(as_str).collect(),
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn generator_expression_with_nested_for_if() {
        let source = "g = ((i, j) for i in range(2) for j in range(2) if j != i)\nRESULT = list(g)\n";
        let result = run(source).expect("should evaluate");
        let pairs: Vec<(i64, i64)> = match global(&result, "RESULT") {
            Value::List(l) => l
                .lock()
                .iter()
                .map(|v| {
                    let pair = as_tuple(v);
                    (as_int(&pair[0]), as_int(&pair[1]))
                })
                .collect(),
            other => panic!("expected a list, got {other:?}"),
        };
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }
}

mod starred_assignment {
    use super::*;

    #[test]
    fn leading_star_collects_all_but_the_last() {
        let source = "seq = [1, 2, 3, 4]\n*a, b = seq\nRESULT = (a, b)\n";
        let result = run(source).expect("should evaluate");
        let pieces = as_tuple(&global(&result, "RESULT"));
        assert_eq!(as_ints(&pieces[0]), vec![1, 2, 3]);
        assert_eq!(as_int(&pieces[1]), 4);
    }

    #[test]
    fn middle_star_collects_the_interior() {
        let source = "seq = [1, 2, 3, 4]\na, *b, c = seq\nRESULT = (a, b, c)\n";
        let result = run(source).expect("should evaluate");
        let pieces = as_tuple(&global(&result, "RESULT"));
        assert_eq!(as_int(&pieces[0]), 1);
        assert_eq!(as_ints(&pieces[1]), vec![2, 3]);
        assert_eq!(as_int(&pieces[2]), 4);
    }

    #[test]
    fn trailing_star_with_no_other_targets_collects_everything() {
        let source = "seq = [1, 2, 3, 4]\n*a, = seq\nRESULT = a\n";
        let result = run(source).expect("should evaluate");
        assert_eq!(as_ints(&global(&result, "RESULT")), vec![1, 2, 3, 4]);
    }
}

mod fibonacci {
    use super::*;

    #[test]
    fn while_loop_builds_the_expected_sequence() {
        let source = "\
def f(n):
    a, b = 0, 1
    out = []
    i = 0
    while i < n:
        out.append(a)
        a, b = b, a + b
        i += 1
    return out
RESULT = f(7)
";
        let result = run(source).expect("should evaluate");
        assert_eq!(as_ints(&global(&result, "RESULT")), vec![0, 1, 1, 2, 3, 5, 8]);
    }
}
