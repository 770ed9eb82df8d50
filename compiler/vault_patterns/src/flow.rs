//! Non-local control flow.
//!
//! The statement executor signals `break`/`continue`/`return` the same way
//! it signals an exception: by returning early through a `Result`. Keeping
//! both in one `Unwind` type (rather than a side channel or a second
//! return path) means every recursive call site in `vault_eval` only needs
//! one `?` to propagate either kind correctly through `try`/`finally`,
//! loops, and function bodies alike.

use crate::value::Value;

#[derive(Debug, Clone)]
pub enum Flow {
    Break,
    Continue,
    Return(Value),
}

#[derive(Debug, Clone)]
pub enum Unwind {
    Flow(Flow),
    /// An exception in flight: always a `Value` whose class derives from
    /// the base exception type (§3 "Fatal vs. recoverable": this is
    /// always the recoverable tier).
    Raise(Value),
}

impl From<Flow> for Unwind {
    fn from(flow: Flow) -> Self {
        Unwind::Flow(flow)
    }
}

pub type EvalResult = Result<Value, Unwind>;

/// Raise `exc` as the error arm of an `EvalResult`.
pub fn raise<T>(exc: Value) -> Result<T, Unwind> {
    Err(Unwind::Raise(exc))
}
