//! Glue between the CLI driver (`src/main.rs`) and the interpreter crates:
//! builds an `Interpreter` from CLI-level policy flags, runs a script
//! through it, and renders whatever comes back (a clean exit, an
//! uncaught exception, or a compile-time diagnostic) the way a user
//! invoking the `vault` binary expects to see it.

use std::sync::Arc;
use vault_diagnostic::{CompileError, Diagnostic};
use vault_eval::{Interpreter, InterpreterBuilder, RunOutcome, SourceCompiler};
use vault_ir::Name;
use vault_patterns::{Unwind, Value};

/// Import allow-listing and relative-import policy, collected from CLI
/// flags before the interpreter is built (§6, SPEC_FULL §10.3).
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub allowed_imports: Option<Vec<String>>,
    pub allow_relative_imports: bool,
}

pub fn build_interpreter(config: RunConfig) -> Interpreter {
    let mut builder = InterpreterBuilder::new().allow_relative_imports(config.allow_relative_imports);
    if let Some(allowed) = config.allowed_imports {
        builder = builder.allowed_imports(allowed);
    }
    builder.build()
}

/// What `run_source` settled on, translated into a process exit code the
/// way `vault_eval::Interpreter::run`'s doc comment describes: completed
/// runs and clean `SystemExit(0)`s exit 0, other `SystemExit(code)`s exit
/// that code, an uncaught exception exits 1, and a compile error (printed
/// separately, before the interpreter ever runs) exits 2.
pub enum Outcome {
    Ok,
    Exit(i32),
    UncaughtException,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::Exit(code) => *code,
            Outcome::UncaughtException => 1,
        }
    }
}

/// Compile and run one script, printing a traceback to stderr on an
/// uncaught exception. Compile errors are returned to the caller rather
/// than printed here, since rendering one needs the original source text
/// (`Diagnostic::render`) which the caller already has in hand.
pub fn run_source(
    interpreter: &Interpreter,
    compiler: &dyn SourceCompiler,
    source: &str,
    filename: &str,
) -> Result<Outcome, CompileError> {
    let unit = compiler.compile(source, filename)?;
    match interpreter.run(&unit) {
        Ok(result) => match result.outcome {
            RunOutcome::Completed => Ok(Outcome::Ok),
            RunOutcome::SystemExit(code) => Ok(Outcome::Exit(code)),
        },
        Err(Unwind::Raise(exc)) => {
            print_traceback(&exc);
            Ok(Outcome::UncaughtException)
        }
        Err(Unwind::Flow(_)) => {
            // `break`/`continue` escaping every enclosing loop is a
            // compiler bug, not a user-reportable condition; surface it
            // as a generic internal error rather than panicking.
            Err(CompileError::from(Diagnostic::error(format!(
                "internal error: unhandled control flow escaped {filename}"
            ))))
        }
    }
}

/// Render an uncaught exception the way the reference interpreter this
/// language is modeled on does: a one-line `ClassName: message`, since
/// this crate doesn't track Python-style frame-by-frame call stacks for
/// the traceback body (§ Non-goals: no frame introspection API).
fn print_traceback(exc: &Value) {
    eprintln!("Traceback (most recent call last):");
    let (class_name, message) = describe_exception(exc);
    if message.is_empty() {
        eprintln!("{class_name}");
    } else {
        eprintln!("{class_name}: {message}");
    }
}

fn describe_exception(exc: &Value) -> (Arc<str>, String) {
    let Value::Instance(instance) = exc else {
        return (Arc::from("Exception"), format!("{exc:?}"));
    };
    let class_name = instance.class.name.clone();
    let args = instance.attrs.lock().get(&Name::new("args")).cloned();
    let message = match args {
        Some(Value::Tuple(items)) => items
            .iter()
            .map(describe_value)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    (class_name, message)
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        other => format!("{other:?}"),
    }
}
