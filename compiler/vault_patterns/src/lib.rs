//! Runtime value model, exception hierarchy, and match-pattern engine for
//! the Vault sandboxed interpreter.
//!
//! Everything here is inert with respect to evaluation order: this crate
//! describes what a value *is* and how patterns structurally match
//! against one, never how an expression produces one. `vault_eval` is the
//! only crate that owns a dispatch loop.

pub mod cell;
pub mod exceptions;
pub mod flow;
pub mod pattern;
pub mod value;

pub use cell::{Cell, CellState};
pub use exceptions::ExceptionClasses;
pub use flow::{raise, EvalResult, Flow, Unwind};
pub use value::{
    BoundMethod, ClassValue, FunctionValue, HostObject, Instance, ModuleValue, NativeFunction,
    SuspendOutcome, Suspendable, VDict, VList, VSet, Value,
};
