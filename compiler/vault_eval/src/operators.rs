//! Binary, unary, and comparison operator dispatch over primitive values.
//!
//! Operator overloading through user-defined `__add__`/`__eq__`/etc. is
//! deliberately out of scope here: these functions cover the built-in
//! numeric/sequence semantics every program can rely on regardless of
//! what classes it defines. `vault_eval::expr` falls back to a plain
//! `TypeError` for any combination not covered below rather than
//! attempting dunder dispatch on `Instance` operands.

use crate::errors;
use crate::interpreter::Shared;
use std::sync::Arc;
use vault_ir::ast::{BinOpKind, CmpOpKind, UnaryOpKind};
use vault_patterns::{EvalResult, Value};

pub fn binop(op: BinOpKind, left: &Value, right: &Value, shared: &Shared) -> EvalResult {
    use BinOpKind::*;
    match (op, left, right) {
        (Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Add, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Add, Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Add, Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(Arc::from(format!("{a}{b}")))),
        (Add, Value::List(a), Value::List(b)) => {
            let mut out = a.lock().clone();
            out.extend(b.lock().iter().cloned());
            Ok(Value::List(Arc::new(parking_lot::Mutex::new(out))))
        }
        (Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut out = a.to_vec();
            out.extend(b.iter().cloned());
            Ok(Value::Tuple(Arc::from(out)))
        }
        (Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (Sub, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (Sub, Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
        (Sub, Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
        (Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
        (Mul, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (Mul, Value::Int(a), Value::Float(b)) | (Mul, Value::Float(b), Value::Int(a)) => {
            Ok(Value::Float(*a as f64 * b))
        }
        (Mul, Value::Str(s), Value::Int(n)) | (Mul, Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(Arc::from(s.repeat((*n).max(0) as usize))))
        }
        (Mul, Value::List(l), Value::Int(n)) => {
            let src = l.lock();
            let mut out = Vec::with_capacity(src.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                out.extend(src.iter().cloned());
            }
            Ok(Value::List(Arc::new(parking_lot::Mutex::new(out))))
        }
        (Div, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                errors::zero_division(&shared.classes, "division by zero")
            } else {
                Ok(Value::Float(*a as f64 / *b as f64))
            }
        }
        (Div, a, b) => {
            let (a, b) = (as_f64(a), as_f64(b));
            match (a, b) {
                (Some(_), Some(b)) if b == 0.0 => errors::zero_division(&shared.classes, "float division by zero"),
                (Some(a), Some(b)) => Ok(Value::Float(a / b)),
                _ => type_error_for(shared, op, left, right),
            }
        }
        (FloorDiv, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                errors::zero_division(&shared.classes, "integer division or modulo by zero")
            } else {
                Ok(Value::Int(a.div_euclid(*b)))
            }
        }
        (Mod, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                errors::zero_division(&shared.classes, "integer division or modulo by zero")
            } else {
                Ok(Value::Int(a.rem_euclid(*b)))
            }
        }
        (Mod, Value::Str(fmt), _) => Ok(Value::Str(Arc::from(percent_format(fmt, right)))),
        (Pow, Value::Int(a), Value::Int(b)) if *b >= 0 => Ok(Value::Int(a.pow(*b as u32))),
        (Pow, a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => Ok(Value::Float(a.powf(b))),
            _ => type_error_for(shared, op, left, right),
        },
        (BitAnd, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
        (BitOr, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
        (BitXor, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a ^ b)),
        (LShift, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a << b)),
        (RShift, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a >> b)),
        (MatMul, _, _) => type_error_for(shared, op, left, right),
        _ => type_error_for(shared, op, left, right),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn percent_format(fmt: &str, arg: &Value) -> String {
    let values = match arg {
        Value::Tuple(t) => t.to_vec(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut values = values.into_iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek().is_some() {
            chars.next();
            out.push_str(&crate::builtins::display(&values.next().unwrap_or(Value::None)));
        } else {
            out.push(c);
        }
    }
    out
}

fn type_error_for(shared: &Shared, op: BinOpKind, left: &Value, right: &Value) -> EvalResult {
    errors::type_error(
        &shared.classes,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            left.type_name(),
            right.type_name()
        ),
    )
}

fn op_symbol(op: BinOpKind) -> &'static str {
    use BinOpKind::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        FloorDiv => "//",
        Mod => "%",
        Pow => "**",
        LShift => "<<",
        RShift => ">>",
        BitOr => "|",
        BitXor => "^",
        BitAnd => "&",
        MatMul => "@",
    }
}

pub fn unary(op: UnaryOpKind, operand: &Value, shared: &Shared) -> EvalResult {
    match (op, operand) {
        (UnaryOpKind::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOpKind::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOpKind::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOpKind::Pos, Value::Int(i)) => Ok(Value::Int(*i)),
        (UnaryOpKind::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOpKind::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        _ => errors::type_error(
            &shared.classes,
            format!("bad operand type for unary operator: '{}'", operand.type_name()),
        ),
    }
}

/// Structural/value equality for `==`/`!=`. Like `operators::binop`, this
/// does not consult a user-defined `__eq__`; it covers the primitive and
/// container equality every value in the sandbox supports natively.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.lock(), y.lock());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.lock(), y.lock());
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.iter().any(|(k2, v2)| values_equal(k, k2) && values_equal(v, v2)))
        }
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => x.partial_cmp(y),
        (Value::List(x), Value::List(y)) => x.lock().iter().partial_cmp_by(y.lock().iter(), |a, b| ordering(a, b)),
        (Value::Tuple(x), Value::Tuple(y)) => x.iter().partial_cmp_by(y.iter(), |a, b| ordering(a, b)),
        _ => None,
    }
}

/// `Iterator::partial_cmp_by` is unstable, so inline the lexicographic
/// comparison it would provide for the handful of container comparisons
/// above.
trait PartialCmpBy: Iterator + Sized {
    fn partial_cmp_by<J: Iterator<Item = Self::Item>>(
        self,
        other: J,
        mut cmp: impl FnMut(&Self::Item, &Self::Item) -> Option<std::cmp::Ordering>,
    ) -> Option<std::cmp::Ordering>
    where
        Self::Item: Clone,
    {
        let mut a = self;
        let mut b = other;
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Some(std::cmp::Ordering::Equal),
                (None, Some(_)) => return Some(std::cmp::Ordering::Less),
                (Some(_), None) => return Some(std::cmp::Ordering::Greater),
                (Some(x), Some(y)) => match cmp(&x, &y) {
                    Some(std::cmp::Ordering::Equal) => continue,
                    other => return other,
                },
            }
        }
    }
}

impl<T: Iterator> PartialCmpBy for T {}

pub fn compare(op: CmpOpKind, left: &Value, right: &Value, shared: &Shared) -> EvalResult {
    let result = match op {
        CmpOpKind::Eq => values_equal(left, right),
        CmpOpKind::NotEq => !values_equal(left, right),
        CmpOpKind::Is => identity_equal(left, right),
        CmpOpKind::IsNot => !identity_equal(left, right),
        CmpOpKind::In => contains(right, left),
        CmpOpKind::NotIn => !contains(right, left),
        CmpOpKind::Lt | CmpOpKind::LtE | CmpOpKind::Gt | CmpOpKind::GtE => {
            let Some(order) = ordering(left, right) else {
                return errors::type_error(
                    &shared.classes,
                    format!("'{}' not supported between instances of '{}' and '{}'", op_cmp_symbol(op), left.type_name(), right.type_name()),
                );
            };
            use std::cmp::Ordering::*;
            match (op, order) {
                (CmpOpKind::Lt, Less) | (CmpOpKind::LtE, Less | Equal) => true,
                (CmpOpKind::Gt, Greater) | (CmpOpKind::GtE, Greater | Equal) => true,
                _ => false,
            }
        }
    };
    Ok(Value::Bool(result))
}

fn op_cmp_symbol(op: CmpOpKind) -> &'static str {
    match op {
        CmpOpKind::Lt => "<",
        CmpOpKind::LtE => "<=",
        CmpOpKind::Gt => ">",
        CmpOpKind::GtE => ">=",
        _ => "?",
    }
}

fn identity_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Instance(x), Value::Instance(y)) => Arc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Arc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Arc::ptr_eq(x, y),
        _ => values_equal(a, b) && matches!(a, Value::Int(_) | Value::Str(_) | Value::Float(_)),
    }
}

fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::List(l) => l.lock().iter().any(|v| values_equal(v, item)),
        Value::Tuple(t) => t.iter().any(|v| values_equal(v, item)),
        Value::Set(s) => s.lock().iter().any(|v| values_equal(v, item)),
        Value::Dict(d) => d.lock().iter().any(|(k, _)| values_equal(k, item)),
        Value::Str(s) => {
            if let Value::Str(needle) = item {
                s.contains(needle.as_ref())
            } else {
                false
            }
        }
        _ => false,
    }
}
