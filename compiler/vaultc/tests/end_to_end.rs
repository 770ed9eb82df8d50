//! Full-pipeline tests: real source text through the same
//! `build_interpreter`/frontend wiring `main.rs` uses, run to completion,
//! and the resulting module namespace inspected directly.

use vault_eval::Interpreter;
use vault_ir::Name;
use vault_patterns::{exceptions, Unwind, Value};
use vaultc::{build_interpreter, RunConfig};

fn run(interpreter: &Interpreter, source: &str) -> Result<vault_eval::RunResult, Value> {
    let unit = vault_frontend::compile(source, "<test>").expect("source compiles");
    match interpreter.run(&unit) {
        Ok(result) => Ok(result),
        Err(Unwind::Raise(exc)) => Err(exc),
        Err(Unwind::Flow(flow)) => panic!("unhandled control flow escaped the module: {flow:?}"),
    }
}

fn global(result: &vault_eval::RunResult, name: &str) -> Value {
    result.module_namespace.lock().get(&Name::new(name)).cloned().unwrap_or(Value::None)
}

fn as_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        other => panic!("expected an int, got {other:?}"),
    }
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => panic!("expected a bool, got {other:?}"),
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

/// Scenario 1: a `while`-loop Fibonacci builder.
#[test]
fn scenario_fibonacci_via_while_loop() {
    let interpreter = build_interpreter(RunConfig::default());
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
    let result = run(&interpreter, source).expect("should evaluate");
    assert_eq!(as_ints(&global(&result, "RESULT")), vec![0, 1, 1, 2, 3, 5, 8]);
}

/// Scenario 2 (inheritance): the zero-argument `super()`/`__class__` cell
/// form is out of scope (see DESIGN.md's Open Question decision), so this
/// exercises the same inheritance shape through the supported explicit
/// `super(T, e)` form and an explicit class-name reference in place of
/// `__class__`.
#[test]
fn scenario_inheritance_via_explicit_super() {
    let interpreter = build_interpreter(RunConfig::default());
    let source = "\
class B:
    def __init__(self, x):
        self.x = x
class C(B):
    def __init__(self, x):
        super(C, self).__init__(x + 1)
    def k(self):
        return C.__name__
c = C(4)
RESULT = (c.x, c.k())
";
    let result = run(&interpreter, source).expect("should evaluate");
    let pieces = as_tuple(&global(&result, "RESULT"));
    assert_eq!(as_int(&pieces[0]), 5);
    assert_eq!(as_str(&pieces[1]), "C");
}

/// Scenario 3: a generator expression with nested `for`/`if` clauses.
#[test]
fn scenario_generator_expression_nested_for_if() {
    let interpreter = build_interpreter(RunConfig::default());
    let source = "g = ((i, j) for i in range(2) for j in range(2) if j != i)\nRESULT = list(g)\n";
    let result = run(&interpreter, source).expect("should evaluate");
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

/// Scenario 4: draining an async generator via repeated `next()` calls —
/// this interpreter has no `asyncio` event loop, so "the host scheduler"
/// is just the caller resuming the underlying coroutine directly; the
/// third resumption past the last `yield` raises `StopAsyncIteration`,
/// distinct from a plain generator's `StopIteration`.
#[test]
fn scenario_async_generator_drains_then_raises_stop_async_iteration() {
    let interpreter = build_interpreter(RunConfig::default());
    let source = "\
async def a():
    yield 1
    yield 2
g = a()
first = next(g)
second = next(g)
exhausted = False
try:
    next(g)
except StopAsyncIteration:
    exhausted = True
RESULT = (first, second, exhausted)
";
    let result = run(&interpreter, source).expect("should evaluate");
    let pieces = as_tuple(&global(&result, "RESULT"));
    assert_eq!(as_int(&pieces[0]), 1);
    assert_eq!(as_int(&pieces[1]), 2);
    assert!(as_bool(&pieces[2]));
}

/// Scenario 5: `except*` splits a raised exception group by matched type,
/// leaving the rest to propagate to an outer handler.
#[test]
fn scenario_except_star_splits_an_exception_group() {
    let interpreter = build_interpreter(RunConfig::default());
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
    let result = run(&interpreter, source).expect("should evaluate");
    let pieces = as_tuple(&global(&result, "RESULT"));
    let handled: Vec<String> = match &pieces[0] {
        Value::List(l) => l.lock().iter().map(as_str).collect(),
        other => panic!("expected a list, got {other:?}"),
    };
    assert_eq!(handled, vec!["ValueError".to_string()]);
    assert_eq!(as_str(&pieces[1]), "TypeError");
}

/// Scenario 6: escape attempts through the builtin guard. Blocking
/// `__class__` itself (rather than only `__mro__` once reached through
/// it) stops the pivot one step earlier than the narrowest reading of
/// the scenario, which still satisfies it — the attribute chain never
/// gets anywhere near `__mro__`.
mod scenario_escape_attempts {
    use super::*;

    #[test]
    fn tuple_class_mro_pivot_is_blocked() {
        let interpreter = build_interpreter(RunConfig::default());
        let err = run(&interpreter, "RESULT = getattr((), '__class__').__mro__\n").expect_err("should raise");
        let classes = &interpreter.shared().classes;
        assert!(exceptions::is_instance_of(&err, &classes.attribute_error));
    }

    #[test]
    fn dynamically_constructed_blocked_name_is_still_blocked() {
        // The guard compares the plain `&str` extracted from the name
        // argument, never a `Value` that could carry an overridden
        // `__eq__`/`__hash__` — a name built up at runtime rather than
        // written as a literal is just as blocked.
        let interpreter = build_interpreter(RunConfig::default());
        let source = "name = '__cla' + 's' + 's__'\nRESULT = getattr((), name).__mro__\n";
        let err = run(&interpreter, source).expect_err("should raise");
        let classes = &interpreter.shared().classes;
        assert!(exceptions::is_instance_of(&err, &classes.attribute_error));
    }
}

/// Boundary case: `except*` given a single non-group exception still
/// wraps it into a group before any handler claims it.
#[test]
fn boundary_except_star_wraps_a_single_exception() {
    let interpreter = build_interpreter(RunConfig::default());
    let source = "\
handled = None
try:
    raise ValueError('boom')
except* ValueError as e:
    handled = [type(x).__name__ for x in e.exceptions]
RESULT = handled
";
    let result = run(&interpreter, source).expect("should evaluate");
    let handled: Vec<String> = match global(&result, "RESULT") {
        Value::List(l) => l.lock().iter().map(as_str).collect(),
        other => panic!("expected a list, got {other:?}"),
    };
    assert_eq!(handled, vec!["ValueError".to_string()]);
}

// `async for` over something lacking `__aiter__` raising `TypeError`
// before iterating needs the full awaitable/`__aiter__`/`__anext__`
// dispatch protocol, which this evaluator doesn't build out (see
// DESIGN.md's Open Question decision on `async for`/`async with`) — `for`
// and `async for` currently share one synchronous dispatch path. Not
// exercised here rather than asserting behavior the evaluator doesn't
// have.
