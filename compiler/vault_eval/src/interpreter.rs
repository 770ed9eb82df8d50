//! Interpreter construction and the `run()` entry point (§6).

use crate::import_policy::{ImportPolicy, Importer, ModuleRegistry};
use crate::scopes::{new_namespace, Frame, Namespace};
use rustc_hash::FxHashMap;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{info, info_span};
use vault_diagnostic::CompileError;
use vault_ir::scope::CodeUnit;
use vault_ir::Name;
use vault_patterns::{exceptions, ExceptionClasses, Unwind, Value};

/// State every evaluation call needs and that never changes for the life
/// of one interpreter: the exception hierarchy, the builtins namespace,
/// and the import machinery. Cloning a `Shared` clones an `Arc`, so every
/// generator thread and every recursive evaluator call can hold its own
/// handle cheaply.
pub struct SharedInner {
    pub classes: ExceptionClasses,
    pub builtins: Namespace,
    pub importer: Importer,
}

#[derive(Clone)]
pub struct Shared(Arc<SharedInner>);

impl Deref for Shared {
    type Target = SharedInner;
    fn deref(&self) -> &SharedInner {
        &self.0
    }
}

/// Implemented by whatever turns source text into a `CodeUnit`. The
/// interpreter core depends only on this trait (§6: "the parser and
/// analyzer are external collaborators"); `vault_frontend` is the
/// reference implementation, wired in by `vaultc`, but an embedder is
/// free to substitute their own.
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, source: &str, filename: &str) -> Result<CodeUnit, CompileError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    SystemExit(i32),
}

#[derive(Debug)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub module_namespace: Namespace,
}

/// Configuration surface for one interpreter (§6, SPEC_FULL §10.3).
pub struct InterpreterBuilder {
    policy: ImportPolicy,
    modules: ModuleRegistry,
}

impl Default for InterpreterBuilder {
    fn default() -> Self {
        Self { policy: ImportPolicy::default(), modules: FxHashMap::default() }
    }
}

impl InterpreterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowed_imports(mut self, modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.policy.allowed = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn allow_relative_imports(mut self, allow: bool) -> Self {
        self.policy.allow_relative = allow;
        self
    }

    pub fn register_module(mut self, name: impl Into<String>, module: Value) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn build(self) -> Interpreter {
        let classes = ExceptionClasses::build();
        let builtins = new_namespace();
        let shared = Shared(Arc::new(SharedInner {
            classes,
            builtins: builtins.clone(),
            importer: Importer::new(self.policy, self.modules),
        }));
        for (name, value) in crate::builtins::install(shared.clone()) {
            builtins.lock().insert(name, value);
        }
        info!(
            allow_relative_imports = shared.importer.policy.allow_relative,
            restricted_imports = shared.importer.policy.allowed.is_some(),
            "interpreter constructed"
        );
        Interpreter { shared }
    }
}

pub struct Interpreter {
    shared: Shared,
}

impl Interpreter {
    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Execute `unit` as `__main__`, returning how it terminated.
    /// Exit-code mapping (§6): an uncaught `SystemExit(code)` maps to
    /// `RunOutcome::SystemExit(code)`; any other uncaught exception is
    /// returned as an `Unwind::Raise` for the caller (typically `vaultc`)
    /// to print as a traceback and exit with status 1; a completed run
    /// with no uncaught exception exits 0.
    pub fn run(&self, unit: &CodeUnit) -> Result<RunResult, Unwind> {
        let span = info_span!("run", filename = %unit.filename);
        let _enter = span.enter();

        let module_namespace = new_namespace();
        module_namespace.lock().insert(Name::new("__name__"), Value::Str(Arc::from("__main__")));
        module_namespace
            .lock()
            .insert(Name::new("__file__"), Value::Str(Arc::from(unit.filename.as_ref())));

        let root = unit.scopes.get(unit.root_scope);
        let mut frame = Frame::new(
            root.info.kind.unwrap_or(vault_ir::scope::ScopeKind::Module),
            Arc::new(root.info.clone()),
            module_namespace.clone(),
            self.shared.builtins.clone(),
        );

        let mut ctx = crate::stmt::ExecCtx { shared: self.shared.clone(), scopes: unit.scopes.clone(), current_exception: None };
        let outcome = crate::stmt::exec_block(&mut ctx, &mut frame, &unit.body);

        let run_outcome = match outcome {
            Ok(_) => {
                info!(outcome = "completed", "run finished");
                RunOutcome::Completed
            }
            Err(Unwind::Flow(_)) => {
                // `return` at module level is not legal per the language
                // grammar but is harmless to treat as falling off the end.
                RunOutcome::Completed
            }
            Err(Unwind::Raise(exc)) if exceptions::is_instance_of(&exc, &self.shared.classes.system_exit) => {
                let code = system_exit_code(&exc);
                info!(outcome = "system_exit", code, "run finished");
                return Ok(RunResult { outcome: RunOutcome::SystemExit(code), module_namespace });
            }
            Err(unwind @ Unwind::Raise(_)) => {
                info!(outcome = "uncaught_exception", "run finished");
                return Err(unwind);
            }
        };

        Ok(RunResult { outcome: run_outcome, module_namespace })
    }
}

fn system_exit_code(exc: &Value) -> i32 {
    let Value::Instance(instance) = exc else { return 0 };
    let args = instance.attrs.lock().get(&Name::new("args")).cloned();
    match args {
        Some(Value::Tuple(t)) => match t.first() {
            Some(Value::Int(i)) => *i as i32,
            Some(Value::None) | None => 0,
            Some(_) => 1,
        },
        _ => 0,
    }
}
