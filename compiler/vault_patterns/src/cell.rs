//! Closure cells.
//!
//! A cellvar (§4.2 `Binding::Cellvar`/`Binding::Freevar`) is a single
//! mutable slot shared between the function that owns it and every nested
//! function that captures it. It starts `Unbound` whenever the binding
//! occurs after closure creation but before the first assignment runs (a
//! `nonlocal` read before assignment), and reading it in that state is the
//! runtime's `UnboundLocalError` equivalent.

use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CellState {
    Unbound,
    Bound(Value),
}

/// Shared, `Send + Sync` mutable box for one captured variable.
///
/// Threads back a generator or coroutine body (see `vault_eval::coroutine`)
/// may read or write the same cell a caller thread holds, so the inner
/// lock is a real mutex rather than a `RefCell`.
#[derive(Debug, Clone)]
pub struct Cell(Arc<Mutex<CellState>>);

impl Cell {
    pub fn unbound() -> Self {
        Self(Arc::new(Mutex::new(CellState::Unbound)))
    }

    pub fn bound(value: Value) -> Self {
        Self(Arc::new(Mutex::new(CellState::Bound(value))))
    }

    pub fn get(&self) -> Option<Value> {
        match &*self.0.lock() {
            CellState::Unbound => None,
            CellState::Bound(v) => Some(v.clone()),
        }
    }

    pub fn set(&self, value: Value) {
        *self.0.lock() = CellState::Bound(value);
    }

    pub fn unset(&self) {
        *self.0.lock() = CellState::Unbound;
    }

    pub fn ptr_eq(&self, other: &Cell) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn starts_unbound() {
        let cell = Cell::unbound();
        assert!(cell.get().is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let cell = Cell::unbound();
        cell.set(Value::Int(7));
        assert_eq!(cell.get(), Some(Value::Int(7)));
    }

    #[test]
    fn shared_clone_sees_mutation() {
        let cell = Cell::unbound();
        let alias = cell.clone();
        cell.set(Value::Int(1));
        assert_eq!(alias.get(), Some(Value::Int(1)));
        assert!(cell.ptr_eq(&alias));
    }
}
