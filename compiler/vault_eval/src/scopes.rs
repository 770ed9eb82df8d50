//! Name resolution at evaluation time (§4.2).
//!
//! Every name lookup is a single match on the `Binding` the analyzer
//! already computed for it (`vault_ir::scope::ScopeInfo`) — the evaluator
//! never walks a scope chain. `Local`/`Cellvar` read this frame's own
//! storage, `Freevar` reads a cell captured at closure-creation time,
//! `Global` always reads the module namespace regardless of how deeply
//! nested the current function is, and `Unresolved` falls through to
//! builtins.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use vault_ir::scope::{Binding, ScopeInfo, ScopeKind};
use vault_ir::Name;
use vault_patterns::{Cell, Value};

pub type Namespace = Arc<parking_lot::Mutex<FxHashMap<Name, Value>>>;

pub fn new_namespace() -> Namespace {
    Arc::new(parking_lot::Mutex::new(FxHashMap::default()))
}

/// One call frame: a module top level, a function/lambda body, a class
/// body, or a comprehension body.
pub struct Frame {
    pub kind: ScopeKind,
    pub info: Arc<ScopeInfo>,
    locals: FxHashMap<Name, Value>,
    /// Cells for names this frame owns that a nested scope captures
    /// (`Binding::Cellvar`), plus cells captured from an enclosing frame
    /// (`Binding::Freevar`) — both stored the same way since both are
    /// read/written exactly like a local, just boxed.
    cells: FxHashMap<Name, Cell>,
    pub globals: Namespace,
    pub builtins: Namespace,
    /// The lexically enclosing class's bare name, for mangling `__foo`
    /// attribute references evaluated in this frame's body (§4.2). `None`
    /// outside any class's lexical scope.
    pub private_owner: Option<Arc<str>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    UnboundLocal,
    NameError,
}

impl Frame {
    pub fn new(kind: ScopeKind, info: Arc<ScopeInfo>, globals: Namespace, builtins: Namespace) -> Self {
        let mut cells = FxHashMap::default();
        for (name, binding) in &info.bindings {
            if *binding == Binding::Cellvar {
                cells.insert(*name, Cell::unbound());
            }
        }
        Self { kind, info, locals: FxHashMap::default(), cells, globals, builtins, private_owner: None }
    }

    /// Bind the free variables this frame's function captured from its
    /// enclosing scope, in the order `ScopeInfo::free_slots` lists them.
    pub fn bind_free_slots(&mut self, closure: &[Cell]) {
        for (name, cell) in self.info.free_slots.iter().zip(closure) {
            self.cells.insert(*name, cell.clone());
        }
    }

    /// The cell backing `name` in this frame, if any — used both to read
    /// `Cellvar`/`Freevar` names and to hand cells to a nested closure
    /// being created inside this frame.
    pub fn cell(&self, name: Name) -> Option<&Cell> {
        self.cells.get(&name)
    }

    pub fn load(&self, name: Name) -> Result<Value, LoadError> {
        match self.info.binding_of(name) {
            Binding::Local => self.locals.get(&name).cloned().ok_or(LoadError::UnboundLocal),
            Binding::Cellvar => self
                .cells
                .get(&name)
                .and_then(Cell::get)
                .ok_or(LoadError::UnboundLocal),
            // A free variable is captured from an enclosing scope, not
            // owned by this frame, so an unbound cell here is a plain
            // NameError rather than UnboundLocalError (§3).
            Binding::Freevar => self
                .cells
                .get(&name)
                .and_then(Cell::get)
                .ok_or(LoadError::NameError),
            Binding::Global => self
                .globals
                .lock()
                .get(&name)
                .cloned()
                .or_else(|| self.builtins.lock().get(&name).cloned())
                .ok_or(LoadError::NameError),
            Binding::Unresolved => self
                .globals
                .lock()
                .get(&name)
                .cloned()
                .or_else(|| self.builtins.lock().get(&name).cloned())
                .ok_or(LoadError::NameError),
        }
    }

    pub fn store(&mut self, name: Name, value: Value) {
        match self.info.binding_of(name) {
            Binding::Cellvar | Binding::Freevar => {
                if let Some(cell) = self.cells.get(&name) {
                    cell.set(value);
                } else {
                    let cell = Cell::bound(value);
                    self.cells.insert(name, cell);
                }
            }
            Binding::Global => {
                self.globals.lock().insert(name, value);
            }
            Binding::Local | Binding::Unresolved => {
                self.locals.insert(name, value);
            }
        }
    }

    pub fn delete(&mut self, name: Name) -> bool {
        match self.info.binding_of(name) {
            Binding::Cellvar | Binding::Freevar => {
                if let Some(cell) = self.cells.get(&name) {
                    cell.unset();
                    true
                } else {
                    false
                }
            }
            Binding::Global => self.globals.lock().remove(&name).is_some(),
            Binding::Local | Binding::Unresolved => self.locals.remove(&name).is_some(),
        }
    }

    /// Harvest this frame's own locals as a flat namespace — used once a
    /// class body finishes executing to build the class's `namespace`
    /// dict (§4.5).
    pub fn into_namespace(self) -> FxHashMap<Name, Value> {
        self.locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_ir::scope::ScopeInfo;

    fn info_with(bindings: &[(&str, Binding)]) -> Arc<ScopeInfo> {
        let mut info = ScopeInfo::default();
        info.kind = Some(ScopeKind::Function);
        for (name, binding) in bindings {
            info.bindings.insert(Name::new(name), *binding);
        }
        Arc::new(info)
    }

    #[test]
    fn local_round_trips() {
        let info = info_with(&[("x", Binding::Local)]);
        let mut frame = Frame::new(ScopeKind::Function, info, new_namespace(), new_namespace());
        frame.store(Name::new("x"), Value::Int(1));
        assert!(matches!(frame.load(Name::new("x")), Ok(Value::Int(1))));
    }

    #[test]
    fn unset_local_is_unbound_local_error() {
        let info = info_with(&[("x", Binding::Local)]);
        let frame = Frame::new(ScopeKind::Function, info, new_namespace(), new_namespace());
        assert_eq!(frame.load(Name::new("x")), Err(LoadError::UnboundLocal));
    }

    #[test]
    fn global_binding_writes_through_to_module_namespace() {
        let globals = new_namespace();
        let info = info_with(&[("g", Binding::Global)]);
        let mut frame = Frame::new(ScopeKind::Function, info, globals.clone(), new_namespace());
        frame.store(Name::new("g"), Value::Int(9));
        assert!(matches!(globals.lock().get(&Name::new("g")), Some(Value::Int(9))));
    }

    #[test]
    fn unresolved_falls_back_to_builtins() {
        let builtins = new_namespace();
        builtins.lock().insert(Name::new("len"), Value::Int(0));
        let info = info_with(&[]);
        let frame = Frame::new(ScopeKind::Function, info, new_namespace(), builtins);
        assert!(matches!(frame.load(Name::new("len")), Ok(Value::Int(0))));
    }
}
