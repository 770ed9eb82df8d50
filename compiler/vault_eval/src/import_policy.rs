//! Import allow-listing, the restricted `__import__`, and module
//! compatibility adapters (§6 Import interface; SPEC_FULL §11).

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use vault_ir::Name;
use vault_patterns::{exceptions, raise, ExceptionClasses, ModuleValue, Unwind, Value};

use crate::scopes::new_namespace;

/// What a host is willing to let imported modules resolve to: either an
/// unrestricted policy (any name may be imported, subject only to the
/// module loader actually having something registered for it) or a fixed
/// allow-list (§6: `allowed_imports: Option<HashSet<String>>`, `None`
/// meaning unrestricted).
#[derive(Debug, Clone, Default)]
pub struct ImportPolicy {
    pub allowed: Option<Vec<String>>,
    pub allow_relative: bool,
}

impl ImportPolicy {
    pub fn is_allowed(&self, module: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(list) => list.iter().any(|m| m == module),
        }
    }
}

/// A registered module, ready to hand back to `import`: either a native
/// module assembled by the host/CLI, or one built from interpreting a
/// second `.vlt` source file (left to the embedder's `ModuleLoader`, not
/// modeled further here since source discovery is host-specific).
pub type ModuleRegistry = FxHashMap<String, Value>;

/// Adapts a small, fixed set of well-known modules so interpreted
/// callables can flow through APIs that otherwise expect a native
/// function object (grounded in `compat.py`'s `dataclasses`/`functools`/
/// `inspect`/`copy` patches). Applied once per module name per
/// interpreter; a second import of the same module is a namespace hit,
/// not a second adaptation pass.
pub struct CompatAdapter {
    pub module_name: &'static str,
    pub adapt: fn(&ModuleValue),
}

pub fn standard_adapters() -> Vec<CompatAdapter> {
    vec![
        CompatAdapter { module_name: "functools", adapt: adapt_functools },
        CompatAdapter { module_name: "dataclasses", adapt: adapt_noop },
        CompatAdapter { module_name: "copy", adapt: adapt_noop },
        CompatAdapter { module_name: "inspect", adapt: adapt_noop },
    ]
}

fn adapt_noop(_module: &ModuleValue) {}

/// `functools.reduce`/`functools.wraps` need to call interpreted
/// callables the same way the evaluator's own `CALL` path does; since
/// native builtins already accept `Value::Function` transparently through
/// `vault_eval::builtins`, there is nothing left to patch once the
/// builtin is registered this way — the adapter exists as the named
/// extension point `compat.py` documents, even though today it is a
/// no-op.
fn adapt_functools(_module: &ModuleValue) {}

pub struct Importer {
    pub policy: ImportPolicy,
    pub registry: Mutex<ModuleRegistry>,
    pub adapted: Mutex<Vec<String>>,
}

impl Importer {
    pub fn new(policy: ImportPolicy, registry: ModuleRegistry) -> Self {
        Self { policy, registry: Mutex::new(registry), adapted: Mutex::new(Vec::new()) }
    }

    pub fn import(&self, name: &str, level: u32, classes: &ExceptionClasses) -> Result<Value, Unwind> {
        if level > 0 && !self.policy.allow_relative {
            debug!(module = name, level, "denied: relative import disabled");
            return raise(exceptions::simple_exception(
                &classes.import_error,
                "relative imports are disabled",
            ));
        }
        if !self.policy.is_allowed(name) {
            debug!(module = name, "denied: not on allow-list");
            return raise(exceptions::simple_exception(
                &classes.module_not_found_error,
                format!("import of '{name}' is not permitted"),
            ));
        }
        let existing = self.registry.lock().get(name).cloned();
        let module = match existing {
            Some(module) => module,
            None => {
                warn!(module = name, "denied: no module registered under this name");
                return raise(exceptions::simple_exception(
                    &classes.module_not_found_error,
                    format!("no module named '{name}'"),
                ));
            }
        };
        self.apply_adapters(name, &module);
        debug!(module = name, "import resolved");
        Ok(module)
    }

    fn apply_adapters(&self, name: &str, module: &Value) {
        let Value::Module(module_val) = module else { return };
        let mut adapted = self.adapted.lock();
        if adapted.iter().any(|m| m == name) {
            return;
        }
        for adapter in standard_adapters() {
            if adapter.module_name == name {
                (adapter.adapt)(module_val);
            }
        }
        adapted.push(name.to_string());
    }

    pub fn register(&self, name: impl Into<String>, module: Value) {
        self.registry.lock().insert(name.into(), module);
    }
}

pub fn new_module(name: impl Into<Arc<str>>) -> Value {
    let name = name.into();
    Value::Module(Arc::new(ModuleValue { name, namespace: new_namespace() }))
}

pub fn set_module_attr(module: &Value, name: Name, value: Value) {
    if let Value::Module(m) = module {
        m.namespace.lock().insert(name, value);
    }
}
