//! The safe builtins namespace (§6 "Environment builder").
//!
//! Every name here is one the sandbox considers trusted: no builtin
//! exposes a path to frame/closure/code introspection, which is why the
//! guard (§4.6) only needs to worry about attribute access, not about
//! what functions exist in global scope. Builtins that need to call back
//! into interpreted code (`map`, `filter`, `sorted` with a `key=`) take a
//! `Value::Function`/`Value::Native` and call through the same
//! `crate::expr::call_value` path ordinary `CALL` expressions use.

use crate::expr::call_value;
use crate::interpreter::Shared;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::Name;
use vault_patterns::{exceptions, NativeFunction, Unwind, Value};

use crate::errors;

type NativeResult = Result<Value, Unwind>;

fn native(name: &'static str, f: impl Fn(Vec<Value>, Vec<(Name, Value)>) -> NativeResult + Send + Sync + 'static) -> Value {
    Value::Native(Arc::new(NativeFunction { name: Arc::from(name), func: Box::new(f) }))
}

/// Build the fixed builtins namespace for one interpreter instance. Takes
/// `shared` (the exception classes plus anything else builtins need to
/// raise against) by value since every closure here captures its own
/// clone.
pub fn install(shared: Shared) -> Vec<(Name, Value)> {
    let mut entries = Vec::new();
    macro_rules! add {
        ($name:literal, $value:expr) => {
            entries.push((Name::new($name), $value));
        };
    }

    {
        let shared = shared.clone();
        add!("print", native("print", move |args, _kw| {
            let parts: Vec<String> = args.iter().map(|v| display(v)).collect();
            println!("{}", parts.join(" "));
            let _ = &shared;
            Ok(Value::None)
        }));
    }

    {
        let shared = shared.clone();
        add!("len", native("len", move |args, _kw| {
            let Some(value) = args.first() else {
                return errors::type_error(&shared.classes, "len() takes exactly one argument (0 given)");
            };
            len_of(value, &shared)
        }));
    }

    {
        let shared = shared.clone();
        add!("repr", native("repr", move |args, _kw| {
            let value = args.first().cloned().unwrap_or(Value::None);
            let _ = &shared;
            Ok(Value::Str(Arc::from(repr(&value))))
        }));
    }

    {
        let shared = shared.clone();
        add!("str", native("str", move |args, _kw| {
            let value = args.first().cloned().unwrap_or(Value::None);
            let _ = &shared;
            Ok(Value::Str(Arc::from(display(&value))))
        }));
    }

    {
        let shared = shared.clone();
        add!("bool", native("bool", move |args, _kw| {
            let value = args.first().cloned().unwrap_or(Value::None);
            let _ = &shared;
            Ok(Value::Bool(value.is_truthy()))
        }));
    }

    {
        let shared = shared.clone();
        add!("int", native("int", move |args, _kw| {
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(i)) => Ok(Value::Int(*i)),
                Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
                Some(Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| errors::value_error(&shared.classes, format!("invalid literal for int(): '{s}'"))),
                Some(other) => errors::type_error(
                    &shared.classes,
                    format!("int() argument must be a string or a number, not '{}'", other.type_name()),
                ),
            }
        }));
    }

    {
        let shared = shared.clone();
        add!("float", native("float", move |args, _kw| {
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
                Some(Value::Float(f)) => Ok(Value::Float(*f)),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .or_else(|_| errors::value_error(&shared.classes, format!("could not convert string to float: '{s}'"))),
                Some(other) => errors::type_error(
                    &shared.classes,
                    format!("float() argument must be a string or a number, not '{}'", other.type_name()),
                ),
            }
        }));
    }

    add!("list", native("list", move |args, _kw| Ok(Value::List(Arc::new(Mutex::new(iterable_to_vec(args.first())))))));
    add!("tuple", native("tuple", move |args, _kw| Ok(Value::Tuple(Arc::from(iterable_to_vec(args.first()))))));
    add!("set", native("set", move |args, _kw| Ok(Value::Set(Arc::new(Mutex::new(iterable_to_vec(args.first())))))));
    add!("dict", native("dict", move |_args, kw| {
        let entries = kw.into_iter().map(|(k, v)| (Value::Str(Arc::from(k.as_str())), v)).collect();
        Ok(Value::Dict(Arc::new(Mutex::new(entries))))
    }));

    {
        let shared = shared.clone();
        add!("isinstance", native("isinstance", move |args, _kw| {
            let value = args.first().cloned().unwrap_or(Value::None);
            let class = args.get(1).cloned().unwrap_or(Value::None);
            let _ = &shared;
            Ok(Value::Bool(vault_patterns::pattern::value_is_instance(&value, &class)))
        }));
    }

    {
        let shared = shared.clone();
        add!("issubclass", native("issubclass", move |args, _kw| {
            let (Some(Value::Class(a)), Some(Value::Class(b))) = (args.first(), args.get(1)) else {
                return errors::type_error(&shared.classes, "issubclass() arguments must be classes");
            };
            let is_sub = Arc::ptr_eq(a, b)
                || a.mro.iter().any(|m| matches!(m, Value::Class(c) if Arc::ptr_eq(c, b)));
            Ok(Value::Bool(is_sub))
        }));
    }

    {
        let shared = shared.clone();
        add!("getattr", native("getattr", move |args, _kw| {
            let obj = args.first().cloned().unwrap_or(Value::None);
            let Some(Value::Str(name)) = args.get(1) else {
                return errors::type_error(&shared.classes, "getattr(): attribute name must be string");
            };
            let default = args.get(2).cloned();
            match crate::guard_access::get_attr(&obj, name, &shared) {
                Ok(v) => Ok(v),
                Err(Unwind::Raise(exc)) if exceptions::is_instance_of(&exc, &shared.classes.attribute_error) => {
                    default.ok_or(Unwind::Raise(exc))
                }
                Err(other) => Err(other),
            }
        }));
    }

    {
        let shared = shared.clone();
        add!("hasattr", native("hasattr", move |args, _kw| {
            let obj = args.first().cloned().unwrap_or(Value::None);
            let Some(Value::Str(name)) = args.get(1) else {
                return errors::type_error(&shared.classes, "hasattr(): attribute name must be string");
            };
            Ok(Value::Bool(crate::guard_access::get_attr(&obj, name, &shared).is_ok()))
        }));
    }

    {
        let shared = shared.clone();
        add!("setattr", native("setattr", move |args, _kw| {
            let obj = args.first().cloned().unwrap_or(Value::None);
            let Some(Value::Str(name)) = args.get(1) else {
                return errors::type_error(&shared.classes, "setattr(): attribute name must be string");
            };
            let value = args.get(2).cloned().unwrap_or(Value::None);
            crate::guard_access::set_attr(&obj, name, value, &shared)?;
            Ok(Value::None)
        }));
    }

    {
        let shared = shared.clone();
        add!("range", native("range", move |args, _kw| {
            let (start, stop, step) = match args.as_slice() {
                [Value::Int(stop)] => (0, *stop, 1),
                [Value::Int(start), Value::Int(stop)] => (*start, *stop, 1),
                [Value::Int(start), Value::Int(stop), Value::Int(step)] => (*start, *stop, *step),
                _ => return errors::type_error(&shared.classes, "range() requires int arguments"),
            };
            if step == 0 {
                return errors::value_error(&shared.classes, "range() arg 3 must not be zero");
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                out.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(Arc::new(Mutex::new(out))))
        }));
    }

    {
        let shared = shared.clone();
        add!("enumerate", native("enumerate", move |args, _kw| {
            let items = iterable_to_vec(args.first());
            let start = match args.get(1) {
                Some(Value::Int(i)) => *i,
                _ => 0,
            };
            let _ = &shared;
            let out = items
                .into_iter()
                .enumerate()
                .map(|(i, v)| Value::Tuple(Arc::from(vec![Value::Int(start + i as i64), v])))
                .collect();
            Ok(Value::List(Arc::new(Mutex::new(out))))
        }));
    }

    add!("zip", native("zip", move |args, _kw| {
        let lists: Vec<Vec<Value>> = args.iter().map(|a| iterable_to_vec(Some(a))).collect();
        let len = lists.iter().map(Vec::len).min().unwrap_or(0);
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(Value::Tuple(Arc::from(lists.iter().map(|l| l[i].clone()).collect::<Vec<_>>())));
        }
        Ok(Value::List(Arc::new(Mutex::new(out))))
    }));

    {
        let shared = shared.clone();
        add!("map", native("map", move |args, _kw| {
            let Some(func) = args.first().cloned() else {
                return errors::type_error(&shared.classes, "map() needs at least one iterable");
            };
            let items = iterable_to_vec(args.get(1));
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(call_value(&func, vec![item], vec![], &shared)?);
            }
            Ok(Value::List(Arc::new(Mutex::new(out))))
        }));
    }

    {
        let shared = shared.clone();
        add!("filter", native("filter", move |args, _kw| {
            let func = args.first().cloned();
            let items = iterable_to_vec(args.get(1));
            let mut out = Vec::new();
            for item in items {
                let keep = match &func {
                    None | Some(Value::None) => item.is_truthy(),
                    Some(f) => call_value(f, vec![item.clone()], vec![], &shared)?.is_truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::List(Arc::new(Mutex::new(out))))
        }));
    }

    {
        let shared = shared.clone();
        add!("sorted", native("sorted", move |args, kw| {
            let mut items = iterable_to_vec(args.first());
            let key = kw.iter().find(|(n, _)| n.as_str() == "key").map(|(_, v)| v.clone());
            let reverse = kw
                .iter()
                .find(|(n, _)| n.as_str() == "reverse")
                .map(|(_, v)| v.is_truthy())
                .unwrap_or(false);
            let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
            for item in items.drain(..) {
                let k = match &key {
                    Some(f) => call_value(f, vec![item.clone()], vec![], &shared)?,
                    None => item.clone(),
                };
                keyed.push((k, item));
            }
            keyed.sort_by(|a, b| compare_for_sort(&a.0, &b.0));
            if reverse {
                keyed.reverse();
            }
            Ok(Value::List(Arc::new(Mutex::new(keyed.into_iter().map(|(_, v)| v).collect()))))
        }));
    }

    {
        let shared = shared.clone();
        add!("sum", native("sum", move |args, _kw| {
            let items = iterable_to_vec(args.first());
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in items {
                total = match (&total, &item) {
                    (Value::Int(a), Value::Int(b)) => Value::Int(a + b),
                    (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
                    (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 + b),
                    (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f64),
                    _ => return errors::type_error(&shared.classes, "sum() requires numeric elements"),
                };
            }
            Ok(total)
        }));
    }

    {
        let shared = shared.clone();
        add!("abs", native("abs", move |args, _kw| match args.first() {
            Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
            Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
            _ => errors::type_error(&shared.classes, "abs() requires a numeric argument"),
        }));
    }

    {
        let shared = shared.clone();
        add!("min", native("min", move |args, _kw| reduce_extreme(args, std::cmp::Ordering::Less, &shared)));
    }
    {
        let shared = shared.clone();
        add!("max", native("max", move |args, _kw| reduce_extreme(args, std::cmp::Ordering::Greater, &shared)));
    }

    {
        let shared = shared.clone();
        add!("next", native("next", move |args, _kw| {
            // An async generator exhausting signals `StopAsyncIteration`,
            // not `StopIteration` — the two are distinct classes a caller
            // may tell apart, even though both wrap the same underlying
            // coroutine machinery on this side.
            let (gen, exhausted_class) = match args.first() {
                Some(Value::Generator(gen)) => (gen, &shared.classes.stop_iteration),
                Some(Value::AsyncGenerator(gen)) => (gen, &shared.classes.stop_async_iteration),
                _ => return errors::type_error(&shared.classes, "next() requires a generator"),
            };
            match gen.resume(Value::None) {
                vault_patterns::SuspendOutcome::Yielded(v) => Ok(v),
                vault_patterns::SuspendOutcome::Returned(v) => {
                    Err(Unwind::Raise(exceptions::new_exception(exhausted_class, vec![v])))
                }
                vault_patterns::SuspendOutcome::Raised(exc) => Err(Unwind::Raise(exc)),
            }
        }));
    }

    {
        let shared = shared.clone();
        // `type(x)` itself, not the full three-argument class-creation form
        // (`type(name, bases, ns)`), which is out of scope (§4.5 already
        // covers class construction through the `class` statement). `type`
        // and `object` still need to exist as names at all so that
        // `object.__getattribute__`/`type.__getattribute__` can be reached
        // (§4.6) — the guard's wrapped `__getattribute__` intercepts
        // attribute access on any receiver before the blocklist check, so
        // neither needs its own class machinery for that to work.
        add!("type", native("type", move |args, _kw| match args.as_slice() {
            [value] => Ok(runtime_type_of(value)),
            _ => errors::type_error(&shared.classes, "type() takes 1 argument"),
        }));
    }
    add!("object", native("object", move |_args, _kw| Ok(Value::None)));

    {
        let shared = shared.clone();
        add!("super", native("super", move |args, _kw| {
            let (Some(Value::Class(target_class)), Some(receiver)) = (args.first(), args.get(1)) else {
                return errors::type_error(&shared.classes, "super() takes a type and an instance or subtype as arguments");
            };
            let object_class = match receiver {
                Value::Instance(instance) => instance.class.clone(),
                Value::Class(class) => class.clone(),
                _ => return errors::type_error(&shared.classes, "super() argument 2 must be an instance or subtype of argument 1"),
            };
            Ok(Value::Host(Arc::new(crate::guard_access::SuperHandle::new(
                target_class.clone(),
                receiver.clone(),
                object_class,
                shared.classes.clone(),
            ))))
        }));
    }

    for (name, value) in shared.classes.entries() {
        entries.push((Name::new(name), value));
    }
    add!("None", Value::None);
    add!("True", Value::Bool(true));
    add!("False", Value::Bool(false));

    entries
}

/// `type(x)`'s result: a user instance's actual class, or a cached
/// placeholder class named after the primitive's type name so repeated
/// calls on the same kind of value return the same object (`type(1) is
/// type(2)`).
fn runtime_type_of(value: &Value) -> Value {
    if let Value::Instance(instance) = value {
        return Value::Class(instance.class.clone());
    }
    static REGISTRY: std::sync::OnceLock<Mutex<FxHashMap<String, Value>>> = std::sync::OnceLock::new();
    let registry = REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()));
    let mut guard = registry.lock();
    let type_name = value.type_name();
    if let Some(existing) = guard.get(type_name) {
        return existing.clone();
    }
    let class = Value::Class(Arc::new(vault_patterns::ClassValue {
        name: Arc::from(type_name),
        qualname: Arc::from(type_name),
        bases: vec![],
        mro: vec![],
        namespace: Arc::new(Mutex::new(FxHashMap::default())),
        metaclass: None,
    }));
    guard.insert(type_name.to_string(), class.clone());
    class
}

pub(crate) fn iterable_to_vec(value: Option<&Value>) -> Vec<Value> {
    match value {
        None => Vec::new(),
        Some(Value::List(l)) => l.lock().clone(),
        Some(Value::Tuple(t)) => t.to_vec(),
        Some(Value::Set(s)) => s.lock().clone(),
        Some(Value::Dict(d)) => d.lock().iter().map(|(k, _)| k.clone()).collect(),
        Some(Value::Str(s)) => s.chars().map(|c| Value::Str(Arc::from(c.to_string()))).collect(),
        // A generator (including one built from a generator-expression) is
        // itself iterable: draining it here is what lets `list(g)`, `for x
        // in g`, and starred-unpacking over `g` all see its yielded values
        // rather than the generator object itself. A raised exception stops
        // the drain early; whatever was yielded before it still counts.
        Some(Value::Generator(gen)) => {
            let mut out = Vec::new();
            loop {
                match gen.resume(Value::None) {
                    vault_patterns::SuspendOutcome::Yielded(v) => out.push(v),
                    vault_patterns::SuspendOutcome::Returned(_) | vault_patterns::SuspendOutcome::Raised(_) => break,
                }
            }
            out
        }
        Some(other) => vec![other.clone()],
    }
}

fn len_of(value: &Value, shared: &Shared) -> NativeResult {
    match value {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Bytes(b) => Ok(Value::Int(b.len() as i64)),
        Value::List(l) => Ok(Value::Int(l.lock().len() as i64)),
        Value::Tuple(t) => Ok(Value::Int(t.len() as i64)),
        Value::Set(s) => Ok(Value::Int(s.lock().len() as i64)),
        Value::Dict(d) => Ok(Value::Int(d.lock().len() as i64)),
        other => errors::type_error(&shared.classes, format!("object of type '{}' has no len()", other.type_name())),
    }
}

pub fn display(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(b) => if *b { "True".to_string() } else { "False".to_string() },
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => s.to_string(),
        Value::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
        Value::List(l) => format!("[{}]", l.lock().iter().map(repr).collect::<Vec<_>>().join(", ")),
        Value::Tuple(t) => format!("({})", t.iter().map(repr).collect::<Vec<_>>().join(", ")),
        Value::Set(s) => format!("{{{}}}", s.lock().iter().map(repr).collect::<Vec<_>>().join(", ")),
        Value::Dict(d) => format!(
            "{{{}}}",
            d.lock().iter().map(|(k, v)| format!("{}: {}", repr(k), repr(v))).collect::<Vec<_>>().join(", ")
        ),
        Value::Instance(i) => format!("<{} object>", i.class.name),
        Value::Class(c) => format!("<class '{}'>", c.name),
        Value::Function(f) => format!("<function {}>", f.qualname),
        Value::Native(n) => format!("<built-in function {}>", n.name),
        Value::BoundMethod(m) => format!("<bound method of {}>", display(&m.receiver)),
        Value::Module(m) => format!("<module '{}'>", m.name),
        Value::Cell(_) => "<cell>".to_string(),
        Value::Generator(g) => format!("<generator {}>", g.label()),
        Value::Coroutine(c) => format!("<coroutine {}>", c.label()),
        Value::AsyncGenerator(g) => format!("<async_generator {}>", g.label()),
        Value::Host(h) => format!("<{}>", h.type_name()),
    }
}

pub fn repr(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{s:?}"),
        other => display(other),
    }
}

pub(crate) fn compare_for_sort(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn reduce_extreme(args: Vec<Value>, want: std::cmp::Ordering, shared: &Shared) -> NativeResult {
    let items = iterable_to_vec(args.first());
    items
        .into_iter()
        .reduce(|a, b| if compare_for_sort(&b, &a) == want { b } else { a })
        .map_or_else(|| errors::value_error(&shared.classes, "argument is an empty sequence"), Ok)
}
