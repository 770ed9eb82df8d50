//! Built-in method dispatch for the primitive container and string types.
//!
//! These are not user-reachable through the class/MRO machinery (`list`,
//! `dict`, `set`, and `str` are not sandboxed classes with a namespace to
//! search); a fixed Rust-side table is the natural idiom here, the same
//! way `ori_eval`'s own `methods.rs`/`user_methods.rs` pair separates
//! "methods the host defines natively" from "methods user classes
//! define."

use crate::errors;
use crate::interpreter::Shared;
use parking_lot::Mutex;
use std::sync::Arc;
use vault_patterns::{NativeFunction, Unwind, Value};

type Result_ = std::result::Result<Value, Unwind>;

fn native(name: &'static str, f: impl Fn(Vec<Value>, Vec<(vault_ir::Name, Value)>) -> Result_ + Send + Sync + 'static) -> Value {
    Value::Native(Arc::new(NativeFunction { name: Arc::from(name), func: Box::new(f) }))
}

pub fn dispatch(obj: &Value, attr: &str, shared: &Shared) -> Option<Value> {
    match obj {
        Value::List(list) => list_method(list.clone(), attr, shared),
        Value::Dict(dict) => dict_method(dict.clone(), attr, shared),
        Value::Set(set) => set_method(set.clone(), attr, shared),
        Value::Str(s) => str_method(s.clone(), attr, shared),
        _ => None,
    }
}

fn list_method(list: vault_patterns::VList, attr: &str, shared: &Shared) -> Option<Value> {
    let shared = shared.clone();
    Some(match attr {
        "append" => native("append", move |args, _kw| {
            list.lock().push(args.into_iter().next().unwrap_or(Value::None));
            Ok(Value::None)
        }),
        "extend" => {
            let list = list.clone();
            native("extend", move |args, _kw| {
                if let Some(Value::List(other)) = args.first() {
                    list.lock().extend(other.lock().iter().cloned());
                }
                Ok(Value::None)
            })
        }
        "pop" => {
            let shared = shared.clone();
            native("pop", move |args, _kw| {
                let mut guard = list.lock();
                let idx = match args.first() {
                    Some(Value::Int(i)) => normalize_index(*i, guard.len()),
                    _ => guard.len().checked_sub(1),
                };
                match idx.and_then(|i| (i < guard.len()).then_some(i)) {
                    Some(i) => Ok(guard.remove(i)),
                    None => errors::index_error(&shared.classes, "pop from empty list"),
                }
            })
        }
        "index" => {
            let shared = shared.clone();
            native("index", move |args, _kw| {
                let target = args.first().cloned().unwrap_or(Value::None);
                let guard = list.lock();
                guard
                    .iter()
                    .position(|v| *v == target)
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| errors::value_error::<()>(&shared.classes, "value not in list").unwrap_err())
            })
        }
        "count" => native("count", move |args, _kw| {
            let target = args.into_iter().next().unwrap_or(Value::None);
            Ok(Value::Int(list.lock().iter().filter(|v| **v == target).count() as i64))
        }),
        "sort" => native("sort", move |_args, _kw| {
            list.lock().sort_by(crate::builtins::compare_for_sort);
            Ok(Value::None)
        }),
        "reverse" => native("reverse", move |_args, _kw| {
            list.lock().reverse();
            Ok(Value::None)
        }),
        "copy" => native("copy", move |_args, _kw| Ok(Value::List(Arc::new(Mutex::new(list.lock().clone()))))),
        "clear" => native("clear", move |_args, _kw| {
            list.lock().clear();
            Ok(Value::None)
        }),
        "insert" => {
            let shared = shared.clone();
            native("insert", move |args, _kw| {
                let (Some(Value::Int(idx)), Some(value)) = (args.first(), args.get(1)) else {
                    return errors::type_error(&shared.classes, "insert() requires an index and a value");
                };
                let mut guard = list.lock();
                let at = (*idx).clamp(0, guard.len() as i64) as usize;
                guard.insert(at, value.clone());
                Ok(Value::None)
            })
        }
        _ => return None,
    })
}

fn dict_method(dict: vault_patterns::VDict, attr: &str, shared: &Shared) -> Option<Value> {
    let shared = shared.clone();
    Some(match attr {
        "get" => native("get", move |args, _kw| {
            let key = args.first().cloned().unwrap_or(Value::None);
            let default = args.get(1).cloned().unwrap_or(Value::None);
            Ok(dict.lock().iter().find(|(k, _)| *k == key).map_or(default, |(_, v)| v.clone()))
        }),
        "keys" => native("keys", move |_args, _kw| {
            Ok(Value::List(Arc::new(Mutex::new(dict.lock().iter().map(|(k, _)| k.clone()).collect()))))
        }),
        "values" => native("values", move |_args, _kw| {
            Ok(Value::List(Arc::new(Mutex::new(dict.lock().iter().map(|(_, v)| v.clone()).collect()))))
        }),
        "items" => native("items", move |_args, _kw| {
            let pairs = dict
                .lock()
                .iter()
                .map(|(k, v)| Value::Tuple(Arc::from(vec![k.clone(), v.clone()])))
                .collect();
            Ok(Value::List(Arc::new(Mutex::new(pairs))))
        }),
        "pop" => {
            let shared = shared.clone();
            native("pop", move |args, _kw| {
                let key = args.first().cloned().unwrap_or(Value::None);
                let mut guard = dict.lock();
                match guard.iter().position(|(k, _)| *k == key) {
                    Some(i) => Ok(guard.remove(i).1),
                    None => match args.get(1) {
                        Some(default) => Ok(default.clone()),
                        None => errors::key_error(&shared.classes, crate::builtins::repr(&key)),
                    },
                }
            })
        }
        "setdefault" => native("setdefault", move |args, _kw| {
            let key = args.first().cloned().unwrap_or(Value::None);
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut guard = dict.lock();
            if let Some((_, v)) = guard.iter().find(|(k, _)| *k == key) {
                return Ok(v.clone());
            }
            guard.push((key, default.clone()));
            Ok(default)
        }),
        "update" => native("update", move |args, _kw| {
            if let Some(Value::Dict(other)) = args.first() {
                let other_entries = other.lock().clone();
                let mut guard = dict.lock();
                for (k, v) in other_entries {
                    if let Some(slot) = guard.iter_mut().find(|(ek, _)| *ek == k) {
                        slot.1 = v;
                    } else {
                        guard.push((k, v));
                    }
                }
            }
            Ok(Value::None)
        }),
        _ => return None,
    })
}

fn set_method(set: vault_patterns::VSet, attr: &str, _shared: &Shared) -> Option<Value> {
    Some(match attr {
        "add" => native("add", move |args, _kw| {
            let value = args.into_iter().next().unwrap_or(Value::None);
            let mut guard = set.lock();
            if !guard.iter().any(|v| *v == value) {
                guard.push(value);
            }
            Ok(Value::None)
        }),
        "remove" => native("remove", move |args, _kw| {
            let value = args.into_iter().next().unwrap_or(Value::None);
            set.lock().retain(|v| *v != value);
            Ok(Value::None)
        }),
        "union" => native("union", move |args, _kw| {
            let mut out = set.lock().clone();
            if let Some(Value::Set(other)) = args.first() {
                for v in other.lock().iter() {
                    if !out.iter().any(|o| o == v) {
                        out.push(v.clone());
                    }
                }
            }
            Ok(Value::Set(Arc::new(Mutex::new(out))))
        }),
        "intersection" => native("intersection", move |args, _kw| {
            let mine = set.lock().clone();
            let out = if let Some(Value::Set(other)) = args.first() {
                let theirs = other.lock();
                mine.into_iter().filter(|v| theirs.iter().any(|o| o == v)).collect()
            } else {
                Vec::new()
            };
            Ok(Value::Set(Arc::new(Mutex::new(out))))
        }),
        _ => return None,
    })
}

fn str_method(s: Arc<str>, attr: &str, shared: &Shared) -> Option<Value> {
    let shared = shared.clone();
    Some(match attr {
        "upper" => {
            let s = s.clone();
            native("upper", move |_args, _kw| Ok(Value::Str(Arc::from(s.to_uppercase()))))
        }
        "lower" => {
            let s = s.clone();
            native("lower", move |_args, _kw| Ok(Value::Str(Arc::from(s.to_lowercase()))))
        }
        "strip" => {
            let s = s.clone();
            native("strip", move |_args, _kw| Ok(Value::Str(Arc::from(s.trim()))))
        }
        "split" => {
            let s = s.clone();
            native("split", move |args, _kw| {
                let parts: Vec<Value> = match args.first() {
                    Some(Value::Str(sep)) => s.split(sep.as_ref()).map(|p| Value::Str(Arc::from(p))).collect(),
                    _ => s.split_whitespace().map(|p| Value::Str(Arc::from(p))).collect(),
                };
                Ok(Value::List(Arc::new(Mutex::new(parts))))
            })
        }
        "join" => {
            let s = s.clone();
            let shared = shared.clone();
            native("join", move |args, _kw| {
                let Some(Value::List(items)) = args.first() else {
                    return errors::type_error(&shared.classes, "join() requires a list of strings");
                };
                let mut parts = Vec::new();
                for item in items.lock().iter() {
                    let Value::Str(part) = item else {
                        return errors::type_error(&shared.classes, "join() requires a list of strings");
                    };
                    parts.push(part.to_string());
                }
                Ok(Value::Str(Arc::from(parts.join(&s))))
            })
        }
        "startswith" => {
            let s = s.clone();
            native("startswith", move |args, _kw| {
                Ok(Value::Bool(matches!(args.first(), Some(Value::Str(p)) if s.starts_with(p.as_ref()))))
            })
        }
        "endswith" => {
            let s = s.clone();
            native("endswith", move |args, _kw| {
                Ok(Value::Bool(matches!(args.first(), Some(Value::Str(p)) if s.ends_with(p.as_ref()))))
            })
        }
        "replace" => {
            let s = s.clone();
            native("replace", move |args, _kw| {
                if let (Some(Value::Str(from)), Some(Value::Str(to))) = (args.first(), args.get(1)) {
                    Ok(Value::Str(Arc::from(s.replace(from.as_ref(), to))))
                } else {
                    Ok(Value::Str(s.clone()))
                }
            })
        }
        "format" => {
            let s = s.clone();
            native("format", move |args, _kw| {
                let mut out = String::new();
                let mut arg_iter = args.into_iter();
                let mut chars = s.chars().peekable();
                while let Some(c) = chars.next() {
                    if c == '{' && chars.peek() == Some(&'}') {
                        chars.next();
                        out.push_str(&crate::builtins::display(&arg_iter.next().unwrap_or(Value::None)));
                    } else {
                        out.push(c);
                    }
                }
                Ok(Value::Str(Arc::from(out)))
            })
        }
        _ => return None,
    })
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 {
        None
    } else {
        Some(idx as usize)
    }
}
