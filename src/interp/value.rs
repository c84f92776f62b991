//! Runtime values and the operators defined on them.

// Python mixes ints and floats freely
#![allow(clippy::cast_precision_loss)]

use crate::error::{ExecError, ExecResult};
use crate::interp::builtins::Builtin;
use crate::syntax::{BinaryOp, CmpOp, Ix, Literal};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Longest string or list an operator may build in one step.
pub(crate) const MAX_SEQUENCE: usize = 1 << 20;

/// Deepest list nesting walked by comparisons and conversions.
const MAX_NESTING: usize = 64;

/// Plain data passed into and out of the interpreter.
///
/// Unlike the interpreter's own values, a `Datum` owns everything it holds
/// and can cross threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Str(String),
    /// List.
    List(Vec<Datum>),
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&float_repr(*x)),
            Self::Str(s) => f.write_str(&str_repr(s)),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Interpreter value. Lists are shared and mutable, as in Python.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    /// A `def` statement, by arena index.
    Function(Ix),
    Builtin(Builtin),
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(x) => x,
        }
    }
}

impl Value {
    pub(crate) fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub(crate) fn str(text: &str) -> Self {
        Self::Str(Rc::from(text))
    }

    pub(crate) fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::None => Self::None,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Int(i) => Self::Int(*i),
            Literal::Float(x) => Self::Float(*x),
            Literal::Str(s) => Self::str(s),
        }
    }

    pub(crate) fn from_datum(datum: &Datum) -> Self {
        match datum {
            Datum::None => Self::None,
            Datum::Bool(b) => Self::Bool(*b),
            Datum::Int(i) => Self::Int(*i),
            Datum::Float(x) => Self::Float(*x),
            Datum::Str(s) => Self::str(s),
            Datum::List(items) => Self::list(items.iter().map(Self::from_datum).collect()),
        }
    }

    pub(crate) fn to_datum(&self) -> ExecResult<Datum> {
        self.to_datum_at(0)
    }

    fn to_datum_at(&self, depth: usize) -> ExecResult<Datum> {
        if depth > MAX_NESTING {
            return Err(ExecError::runtime("value nested too deeply"));
        }
        Ok(match self {
            Self::None => Datum::None,
            Self::Bool(b) => Datum::Bool(*b),
            Self::Int(i) => Datum::Int(*i),
            Self::Float(x) => Datum::Float(*x),
            Self::Str(s) => Datum::Str(s.to_string()),
            Self::List(items) => Datum::List(
                items
                    .borrow()
                    .iter()
                    .map(|v| v.to_datum_at(depth + 1))
                    .collect::<ExecResult<_>>()?,
            ),
            Self::Function(_) | Self::Builtin(_) => {
                return Err(ExecError::runtime("functions cannot leave the interpreter"));
            }
        })
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Function(_) | Self::Builtin(_) => "function",
        }
    }

    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Function(_) | Self::Builtin(_) => true,
        }
    }

    fn number(&self) -> Option<Num> {
        match self {
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Int(i) => Some(Num::Int(*i)),
            Self::Float(x) => Some(Num::Float(*x)),
            _ => None,
        }
    }

    /// Integer view used for indices and counts; bools count as integers.
    pub(crate) fn as_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Elements visited by `for`, comprehensions and the iterable builtins.
    pub(crate) fn iterate(&self) -> ExecResult<Vec<Value>> {
        match self {
            Self::List(items) => Ok(items.borrow().clone()),
            Self::Str(s) => Ok(s.chars().map(|c| Self::str(c.encode_utf8(&mut [0; 4]))).collect()),
            other => Err(ExecError::runtime(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Python `str()`.
    pub(crate) fn to_text(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// Python `repr()`.
    pub(crate) fn repr(&self) -> String {
        self.repr_at(0)
    }

    fn repr_at(&self, depth: usize) -> String {
        match self {
            Self::None => "None".into(),
            Self::Bool(true) => "True".into(),
            Self::Bool(false) => "False".into(),
            Self::Int(i) => i.to_string(),
            Self::Float(x) => float_repr(*x),
            Self::Str(s) => str_repr(s),
            Self::List(_) if depth > MAX_NESTING => "[...]".into(),
            Self::List(items) => {
                let inner: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|v| v.repr_at(depth + 1))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Function(_) => "<function>".into(),
            Self::Builtin(b) => format!("<built-in function {}>", b.name()),
        }
    }
}

fn float_repr(x: f64) -> String {
    if !x.is_finite() {
        return if x.is_nan() {
            "nan".into()
        } else if x > 0.0 {
            "inf".into()
        } else {
            "-inf".into()
        };
    }
    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{x:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let exponent: i32 = exponent.parse().unwrap_or(0);
                let sign = if exponent < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exponent.abs())
            }
            None => text,
        };
    }
    if x.fract() == 0.0 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ExecError {
    ExecError::runtime(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> ExecError {
    ExecError::runtime("integer overflow")
}

fn zero_division() -> ExecError {
    ExecError::runtime("division by zero")
}

fn repeat_count(count: &Value, len: usize) -> ExecResult<usize> {
    let count = count
        .as_int()
        .ok_or_else(|| ExecError::runtime("can't multiply sequence by non-int"))?;
    let count = usize::try_from(count.max(0)).unwrap_or(0);
    if len.saturating_mul(count) > MAX_SEQUENCE {
        return Err(ExecError::runtime("sequence too large"));
    }
    Ok(count)
}

/// Apply an arithmetic operator.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> ExecResult<Value> {
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            if a.len() + b.len() > MAX_SEQUENCE {
                return Err(ExecError::runtime("sequence too large"));
            }
            Ok(Value::str(&format!("{a}{b}")))
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            if items.len() > MAX_SEQUENCE {
                return Err(ExecError::runtime("sequence too large"));
            }
            Ok(Value::list(items))
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat_count(n, s.len())?;
            Ok(Value::str(&s.repeat(count)))
        }
        (BinaryOp::Mul, Value::List(items), n) | (BinaryOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => match (left.number(), right.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => int_arithmetic(op, a, b),
            (Some(a), Some(b)) => float_arithmetic(op, a.to_f64(), b.to_f64()),
            _ => Err(unsupported(op.symbol(), left, right)),
        },
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> ExecResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(zero_division());
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division());
            }
            floor_div(a, b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            floor_mod(a, b)
        }
        BinaryOp::Pow => match u32::try_from(b) {
            Ok(exp) => a.checked_pow(exp),
            Err(_) if b < 0 => return float_arithmetic(op, a as f64, b as f64),
            Err(_) => None,
        },
    };
    result.map(Value::Int).ok_or_else(overflow)
}

/// Integer division rounding toward negative infinity.
pub(crate) fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
}

/// Remainder with the sign of the divisor.
pub(crate) fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> ExecResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(zero_division());
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
    };
    if result.is_finite() {
        Ok(Value::Float(result))
    } else {
        Err(ExecError::runtime("float result out of range"))
    }
}

/// Arithmetic negation.
pub(crate) fn negate(value: &Value) -> ExecResult<Value> {
    match value.number() {
        Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Num::Float(x)) => Ok(Value::Float(-x)),
        None => Err(ExecError::runtime(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

/// Unary plus: numbers only; bools become ints.
pub(crate) fn positive(value: &Value) -> ExecResult<Value> {
    match value.number() {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(x)) => Ok(Value::Float(x)),
        None => Err(ExecError::runtime(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

/// Apply a comparison operator.
pub(crate) fn compare(op: CmpOp, left: &Value, right: &Value) -> ExecResult<bool> {
    match op {
        CmpOp::Eq => Ok(equal(left, right, 0)),
        CmpOp::NotEq => Ok(!equal(left, right, 0)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt => Ok(order(left, right, op)? == Ordering::Less),
        CmpOp::Gt => Ok(order(left, right, op)? == Ordering::Greater),
        CmpOp::LtE => Ok(order(left, right, op)? != Ordering::Greater),
        CmpOp::GtE => Ok(order(left, right, op)? != Ordering::Less),
    }
}

pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    equal(left, right, 0)
}

#[allow(clippy::float_cmp)]
fn equal(left: &Value, right: &Value, depth: usize) -> bool {
    if depth > MAX_NESTING {
        return false;
    }
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equal(x, y, depth + 1))
        }
        (Value::Function(a), Value::Function(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        _ => match (left.number(), right.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(a), Some(b)) => a.to_f64() == b.to_f64(),
            _ => false,
        },
    }
}

/// Total order used by `<`, `sorted`, `min` and `max`.
pub(crate) fn ordering(left: &Value, right: &Value) -> ExecResult<Ordering> {
    order_at(left, right, 0).ok_or_else(|| {
        ExecError::runtime(format!(
            "'<' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn order(left: &Value, right: &Value, op: CmpOp) -> ExecResult<Ordering> {
    order_at(left, right, 0).ok_or_else(|| {
        ExecError::runtime(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    })
}

fn order_at(left: &Value, right: &Value, depth: usize) -> Option<Ordering> {
    if depth > MAX_NESTING {
        return None;
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) => {
            let (a, b) = (a.borrow(), b.borrow());
            for (x, y) in a.iter().zip(b.iter()) {
                if !equal(x, y, depth + 1) {
                    return order_at(x, y, depth + 1);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (left.number()?, right.number()?) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        },
    }
}

fn contains(container: &Value, item: &Value) -> ExecResult<bool> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| equal(v, item, 0))),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(&**needle)),
        (Value::Str(_), other) => Err(ExecError::runtime(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        ))),
        (other, _) => Err(ExecError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against a sequence length.
pub(crate) fn resolve_index(index: &Value, len: usize) -> ExecResult<usize> {
    let raw = index.as_int().ok_or_else(|| {
        ExecError::runtime(format!(
            "indices must be integers, not {}",
            index.type_name()
        ))
    })?;
    let len_i = i64::try_from(len).map_err(|_| ExecError::runtime("sequence too large"))?;
    let resolved = if raw < 0 { raw + len_i } else { raw };
    if (0..len_i).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| ExecError::runtime("index out of range"))
    } else {
        Err(ExecError::runtime("index out of range"))
    }
}

/// `container[index]`.
pub(crate) fn subscript(container: &Value, index: &Value) -> ExecResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let at = resolve_index(index, items.len())?;
            Ok(items[at].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let at = resolve_index(index, count)?;
            Ok(s.chars()
                .nth(at)
                .map_or(Value::None, |c| Value::str(c.encode_utf8(&mut [0; 4]))))
        }
        other => Err(ExecError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_semantics_follow_python() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_mod(-7, 2), Some(1));
        assert_eq!(floor_mod(7, -2), Some(-1));
        assert_eq!(floor_div(i64::MIN, -1), None);
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        let err = binary(BinaryOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).unwrap_err();
        assert_eq!(err, ExecError::runtime("integer overflow"));
    }

    #[test]
    fn test_mixed_arithmetic_and_equality() {
        let sum = binary(BinaryOp::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert!(values_equal(&sum, &Value::Float(1.5)));
        assert!(values_equal(&Value::Int(1), &Value::Bool(true)));
        let quotient = binary(BinaryOp::Div, &Value::Int(1), &Value::Int(4)).unwrap();
        assert!(values_equal(&quotient, &Value::Float(0.25)));
        assert!(binary(BinaryOp::Mod, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_sequence_operators() {
        let repeated = binary(BinaryOp::Mul, &Value::str("ab"), &Value::Int(3)).unwrap();
        assert_eq!(repeated.to_text(), "ababab");
        let joined = binary(
            BinaryOp::Add,
            &Value::list(vec![Value::Int(1)]),
            &Value::list(vec![Value::Int(2)]),
        )
        .unwrap();
        assert_eq!(joined.repr(), "[1, 2]");
        assert!(binary(BinaryOp::Mul, &Value::str("a"), &Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_ordering_and_membership() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert!(compare(CmpOp::Lt, &a, &b).unwrap());
        assert!(compare(CmpOp::In, &Value::Int(2), &a).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::str("z"), &Value::str("abc")).unwrap());
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::str("a")).is_err());
    }

    #[test]
    fn test_repr_matches_python() {
        assert_eq!(Value::Float(1.0).repr(), "1.0");
        assert_eq!(Value::Float(0.1).repr(), "0.1");
        assert_eq!(Value::Float(1e20).repr(), "1e+20");
        assert_eq!(Value::Float(1e-5).repr(), "1e-05");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Datum::List(vec![Datum::None, Datum::Str("x".into())]).to_string(), "[None, 'x']");
    }

    #[test]
    fn test_negative_indices() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(values_equal(&subscript(&list, &Value::Int(-1)).unwrap(), &Value::Int(3)));
        assert!(subscript(&list, &Value::Int(3)).is_err());
        assert!(values_equal(&subscript(&Value::str("hey"), &Value::Int(1)).unwrap(), &Value::str("e")));
    }
}
