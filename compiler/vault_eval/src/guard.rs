//! The attribute guard: the single chokepoint every attribute read in the
//! sandbox passes through (§4.6).
//!
//! Every reflection pivot out of the sandbox — reaching a frame's
//! `f_globals`, a function's `__globals__`, a class's `__subclasses__`, or
//! reinstalling `__getattribute__`/`__reduce__` to smuggle arbitrary code
//! into a seemingly-innocuous operation — goes through `getattr` on *some*
//! object. Blocking the fixed name set here, in one place, is what makes
//! every other part of the evaluator safe to treat as non-adversarial:
//! nothing downstream needs to re-check "is this name safe to read."
//! Generator/coroutine/async-generator frame pointers (`gi_frame`,
//! `cr_frame`, `ag_frame`) are themselves allowed through; only the frame
//! attributes reachable from them are blocked.

use rustc_hash::FxHashSet;
use std::sync::OnceLock;
use vault_ir::Name;

/// Flat, exact-match blocklist — not a prefix or trie match. A name like
/// `__globals__x` is unrelated text and is not blocked; only the blocked
/// names themselves, compared as plain strings, are denied. This mirrors
/// the guard a reference Python sandbox would install over
/// `object.__getattribute__`.
const BLOCKED: &[&str] = &[
    "__getattribute__",
    "__getattr__",
    "__setattr__",
    "__delattr__",
    "__class__",
    "__bases__",
    "__base__",
    "__mro__",
    "__subclasses__",
    "__globals__",
    "__builtins__",
    "__code__",
    "__closure__",
    "__defaults__",
    "__kwdefaults__",
    "__func__",
    "__self__",
    "__dict__",
    "__reduce__",
    "__reduce_ex__",
    "__getstate__",
    "__setstate__",
    "__init_subclass__",
    "__subclasshook__",
    "__import__",
    "f_globals",
    "f_locals",
    "f_back",
    "f_builtins",
    "f_code",
];

fn blocked_set() -> &'static FxHashSet<&'static str> {
    static SET: OnceLock<FxHashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| BLOCKED.iter().copied().collect())
}

/// Is `name` on the blocklist?
///
/// `name` must already be coerced to its plain string text before this is
/// called — a `str` subclass instance whose own `__eq__`/`__hash__` have
/// been overridden to claim equality with a *different*, unblocked string
/// while still comparing byte-for-byte as one of the blocked names must
/// not slip past a guard that compares the subclass object directly
/// against `BLOCKED`. Calling this with a plain `&str` extracted from the
/// attribute-name value (never the original `Value`) closes that off by
/// construction: there is no custom `__eq__` to consult in the first
/// place.
pub fn is_blocked(name: &str) -> bool {
    blocked_set().contains(name)
}

pub fn is_blocked_name(name: Name) -> bool {
    is_blocked(name.as_str())
}

/// Rewrite a syntactic `__foo` attribute name to its mangled form
/// `_<owner>foo` when `owner` (the lexically enclosing class's bare name)
/// is known (§4.2). Dunder names (`__dict__`) and names read outside any
/// class body pass through unchanged.
pub fn mangle(attr: Name, owner: Option<&str>) -> Name {
    match owner {
        Some(owner) if attr.is_mangling_candidate() => Name::new(&format!("_{owner}{}", attr.as_str())),
        _ => attr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_known_reflection_pivots() {
        assert!(is_blocked("__globals__"));
        assert!(is_blocked("__subclasses__"));
        assert!(is_blocked("__getattr__"));
        assert!(is_blocked("f_globals"));
    }

    #[test]
    fn allows_generator_frame_pointers_but_blocks_their_attributes() {
        assert!(!is_blocked("gi_frame"));
        assert!(!is_blocked("cr_frame"));
        assert!(!is_blocked("ag_frame"));
        assert!(is_blocked("f_globals"));
        assert!(is_blocked("f_locals"));
    }

    #[test]
    fn does_not_block_unrelated_or_prefixed_names() {
        assert!(!is_blocked("__globals__x"));
        assert!(!is_blocked("globals"));
        assert!(!is_blocked("value"));
        assert!(!is_blocked("__init__"));
    }

    #[test]
    fn mangles_private_names_within_owning_class_only() {
        assert_eq!(mangle(Name::new("__x"), Some("C")).as_str(), "_C__x");
        assert_eq!(mangle(Name::new("__x"), None).as_str(), "__x");
        assert_eq!(mangle(Name::new("__dict__"), Some("C")).as_str(), "__dict__");
    }
}
