//! The runtime value model.
//!
//! `Value` is `Clone + Send + Sync`: every heap-shaped variant wraps its
//! payload in `Arc` (immutable data: strings, tuples, code) or
//! `Arc<Mutex<_>>` (mutable data: lists, dicts, sets, instance
//! dictionaries). This is a deliberate departure from the more common
//! `Rc<RefCell<_>>` tree-walker value model: generator and coroutine
//! bodies run on their own OS thread (`vault_eval::coroutine`) and hand
//! values back across a channel to their caller, so every `Value` that can
//! cross that boundary must be safe to share across threads, not just to
//! alias within one.

use crate::cell::Cell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use vault_ir::ast::FunctionDef;
use vault_ir::scope::{ScopeInfo, ScopeTree};
use vault_ir::Name;

pub type VList = Arc<Mutex<Vec<Value>>>;
pub type VDict = Arc<Mutex<Vec<(Value, Value)>>>;
pub type VSet = Arc<Mutex<Vec<Value>>>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(VList),
    Tuple(Arc<[Value]>),
    Set(VSet),
    /// Association list rather than a hash map: `Value` keys are not
    /// `Eq`/`Hash` in the Rust sense (equality/hashing are host-overridable
    /// dunder methods), so lookups go through `vault_eval`'s equality
    /// dispatch rather than Rust's own `HashMap`.
    Dict(VDict),
    Function(Arc<FunctionValue>),
    BoundMethod(Arc<BoundMethod>),
    Native(Arc<NativeFunction>),
    Class(Arc<ClassValue>),
    Instance(Arc<Instance>),
    Module(Arc<ModuleValue>),
    Cell(Cell),
    Generator(Arc<dyn Suspendable>),
    Coroutine(Arc<dyn Suspendable>),
    AsyncGenerator(Arc<dyn Suspendable>),
    /// An opaque value contributed by the host embedding (§6 "host
    /// objects"); the interpreter never inspects it, only round-trips it
    /// through calls and attribute access via the host's own vtable.
    Host(Arc<dyn HostObject>),
}

/// One step of resuming a generator, coroutine, or async generator body.
/// Generators, coroutines, and `async for`-driven async generators all
/// share this single suspend/resume protocol (§9: "a single evaluator
/// variant suffices") rather than three separate dispatch loops.
#[derive(Debug, Clone)]
pub enum SuspendOutcome {
    Yielded(Value),
    Returned(Value),
    Raised(Value),
}

/// Implemented by the thread-backed generator/coroutine engine in
/// `vault_eval`. Kept as a trait object here so `vault_patterns` does not
/// need to depend on the evaluator (or on `crossbeam`) to describe the
/// shape of a suspended computation.
pub trait Suspendable: Send + Sync {
    fn resume(&self, sent: Value) -> SuspendOutcome;
    fn throw(&self, exc: Value) -> SuspendOutcome;
    fn close(&self);
    fn label(&self) -> &str;
}

/// Implemented by host-embedding objects exposed into the sandbox. The
/// guard (§4.6) still applies to attribute access on these: a host object
/// cannot be used to bypass the blocklist.
pub trait HostObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;
    fn get_attr(&self, name: Name) -> Option<Value>;
    fn call(&self, args: Vec<Value>, kwargs: Vec<(Name, Value)>) -> Result<Value, crate::flow::Unwind>;
}

#[derive(Debug)]
pub struct FunctionValue {
    pub def: Arc<FunctionDef>,
    /// The `ScopeInfo` for `def`'s own body, captured at closure-creation
    /// time so a call can build its `Frame` directly.
    pub scope_info: Arc<ScopeInfo>,
    /// The originating module's full scope tree, kept alive so a call can
    /// still resolve `scope_id`s for any `def`/`class`/`lambda` nested
    /// inside this function's own body, however far this closure travels
    /// from the module that defined it (passed to another module, stored
    /// in a data structure, called back from a builtin).
    pub scopes: Arc<ScopeTree>,
    /// The defining module's global namespace. `Binding::Global` always
    /// resolves against this, not against whatever frame happens to be
    /// calling — a closure handed to `sorted(key=...)` from another module
    /// still sees its own module's globals.
    pub globals: Arc<Mutex<FxHashMap<Name, Value>>>,
    pub defaults: Vec<Value>,
    pub kw_defaults: FxHashMap<Name, Value>,
    pub closure: Vec<Cell>,
    pub module_name: Arc<str>,
    pub qualname: Arc<str>,
    /// The lexically enclosing class's bare name, if this function is a
    /// method or is itself nested inside one — used to mangle `__foo`
    /// attribute references evaluated in its body (§4.2).
    pub private_owner: Option<Arc<str>>,
    pub doc: Option<Arc<str>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub func: Value,
}

pub struct NativeFunction {
    pub name: Arc<str>,
    pub func: Box<dyn Fn(Vec<Value>, Vec<(Name, Value)>) -> Result<Value, crate::flow::Unwind> + Send + Sync>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub struct ClassValue {
    pub name: Arc<str>,
    pub qualname: Arc<str>,
    pub bases: Vec<Value>,
    /// Precomputed C3-linearized MRO (§4.5), base classes first.
    pub mro: Vec<Value>,
    pub namespace: Arc<Mutex<FxHashMap<Name, Value>>>,
    pub metaclass: Option<Value>,
}

#[derive(Debug)]
pub struct Instance {
    pub class: Arc<ClassValue>,
    pub attrs: Arc<Mutex<FxHashMap<Name, Value>>>,
}

#[derive(Debug)]
pub struct ModuleValue {
    pub name: Arc<str>,
    pub namespace: Arc<Mutex<FxHashMap<Name, Value>>>,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.lock().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Set(s) => !s.lock().is_empty(),
            Value::Dict(d) => !d.lock().is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Function(_) | Value::Native(_) => "function",
            Value::BoundMethod(_) => "method",
            Value::Class(_) => "type",
            Value::Instance(i) => &i.class.name,
            Value::Module(_) => "module",
            Value::Cell(_) => "cell",
            Value::Generator(_) => "generator",
            Value::Coroutine(_) => "coroutine",
            Value::AsyncGenerator(_) => "async_generator",
            Value::Host(h) => h.type_name(),
        }
    }
}

impl PartialEq for Value {
    /// Identity/primitive equality only, used internally (cell tests,
    /// dict-key fast paths before falling back to dunder dispatch). Full
    /// language-level `==` goes through `vault_eval`'s operator dispatch,
    /// which honors `__eq__` overrides.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Arc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} value>", self.type_name())
    }
}
