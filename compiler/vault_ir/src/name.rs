//! Global string interner for identifiers.
//!
//! Every attribute, parameter, and variable name that flows through the
//! interpreter is interned once into a process-wide table and thereafter
//! compared and hashed as a `Copy` `u32`. This mirrors the way the source
//! language's own identifiers are compared by pointer once interned by the
//! host runtime, and keeps scope-lookup maps (`FxHashMap<Name, _>`) cheap.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

/// An interned identifier.
///
/// `Name` is `Copy`, `Eq`, and `Hash` against the raw interned id only —
/// two `Name`s are equal iff they were interned from equal strings.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(u32);

impl Name {
    /// Intern `s`, returning its `Name`. Interning the same text twice
    /// returns the same `Name`.
    pub fn new(s: &str) -> Self {
        interner().intern(s)
    }

    /// Resolve this `Name` back to its text.
    pub fn as_str(self) -> &'static str {
        interner().resolve(self)
    }

    /// `true` if the name, read as text, starts with two underscores and
    /// does not end with two underscores (the source language's
    /// private-name mangling trigger, see §4.2).
    pub fn is_mangling_candidate(self) -> bool {
        let s = self.as_str();
        s.starts_with("__") && !s.ends_with("__")
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Interner {
    table: RwLock<InternerTable>,
}

struct InternerTable {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl Interner {
    fn intern(&self, s: &str) -> Name {
        if let Some(&id) = self.table.read().map.get(s) {
            return Name(id);
        }
        let mut table = self.table.write();
        if let Some(&id) = table.map.get(s) {
            return Name(id);
        }
        // Leak once per distinct identifier. Identifier sets are bounded by
        // source size, not by interpreter runtime, so this does not grow
        // unboundedly over the life of a long-running host process beyond
        // the total vocabulary of every program it has ever compiled.
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let id = u32::try_from(table.strings.len()).expect("identifier table overflow");
        table.strings.push(leaked);
        table.map.insert(leaked, id);
        Name(id)
    }

    fn resolve(&self, name: Name) -> &'static str {
        self.table
            .read()
            .strings
            .get(name.0 as usize)
            .copied()
            .expect("Name not present in interner")
    }
}

fn interner() -> &'static Interner {
    static INTERNER: OnceLock<Interner> = OnceLock::new();
    INTERNER.get_or_init(|| Interner {
        table: RwLock::new(InternerTable {
            map: FxHashMap::default(),
            strings: Vec::new(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_text_returns_same_name() {
        let a = Name::new("hello");
        let b = Name::new("hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "hello");
    }

    #[test]
    fn distinct_text_interns_distinct_names() {
        assert_ne!(Name::new("foo"), Name::new("bar"));
    }

    #[test]
    fn mangling_candidate_rule() {
        assert!(Name::new("__private").is_mangling_candidate());
        assert!(!Name::new("__dunder__").is_mangling_candidate());
        assert!(!Name::new("public").is_mangling_candidate());
        assert!(!Name::new("_single").is_mangling_candidate());
    }
}
