//! Builtin functions and the list and string methods.
//!
//! Every builtin charges one unit of fuel plus a quarter of the elements it
//! touches, so a single call can never hide unbounded work.

// Python mixes ints and floats freely
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use crate::error::{ExecError, ExecResult};
use crate::interp::Interpreter;
use crate::interp::value::{self, MAX_SEQUENCE, Value};
use crate::syntax::BinaryOp;
use std::cell::RefCell;
use std::cmp::Ordering;

/// A builtin function, resolved by name when no variable shadows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    Len,
    Sum,
    Range,
    Min,
    Max,
    Abs,
    List,
    Sorted,
    Any,
    All,
    Print,
    Int,
    Float,
    Str,
    Bool,
}

const NAMES: [(&str, Builtin); 15] = [
    ("len", Builtin::Len),
    ("sum", Builtin::Sum),
    ("range", Builtin::Range),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("abs", Builtin::Abs),
    ("list", Builtin::List),
    ("sorted", Builtin::Sorted),
    ("any", Builtin::Any),
    ("all", Builtin::All),
    ("print", Builtin::Print),
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("str", Builtin::Str),
    ("bool", Builtin::Bool),
];

impl Builtin {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        NAMES.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub(crate) fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, b)| *b == self)
            .map_or("builtin", |(n, _)| n)
    }
}

/// Fuel charged for touching `n` elements.
fn cost(n: usize) -> u64 {
    1 + u64::try_from(n / 4).unwrap_or(u64::MAX - 1)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ExecResult<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else if min == max {
        Err(ExecError::runtime(format!(
            "{name}() takes exactly {min} argument(s) ({} given)",
            args.len()
        )))
    } else {
        Err(ExecError::runtime(format!(
            "{name}() takes from {min} to {max} arguments ({} given)",
            args.len()
        )))
    }
}

fn int_of(n: usize) -> ExecResult<Value> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| ExecError::runtime("integer overflow"))
}

fn type_error(name: &str, value: &Value) -> ExecError {
    ExecError::runtime(format!(
        "bad argument type for {name}(): '{}'",
        value.type_name()
    ))
}

/// Call a builtin function.
pub(crate) fn call(
    interp: &mut Interpreter<'_>,
    builtin: Builtin,
    args: Vec<Value>,
) -> ExecResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Len => {
            arity(name, &args, 1, 1)?;
            interp.charge(1)?;
            match &args[0] {
                Value::List(items) => int_of(items.borrow().len()),
                Value::Str(s) => int_of(s.chars().count()),
                other => Err(ExecError::runtime(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        Builtin::Sum => {
            arity(name, &args, 1, 2)?;
            let items = args[0].iterate()?;
            interp.charge(cost(items.len()))?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in &items {
                total = value::binary(BinaryOp::Add, &total, item)?;
            }
            Ok(total)
        }
        Builtin::Range => range(interp, &args),
        Builtin::Min | Builtin::Max => extremum(interp, builtin, args),
        Builtin::Abs => {
            arity(name, &args, 1, 1)?;
            interp.charge(1)?;
            match &args[0] {
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => other
                    .as_int()
                    .ok_or_else(|| type_error(name, other))?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ExecError::runtime("integer overflow")),
            }
        }
        Builtin::List => {
            arity(name, &args, 0, 1)?;
            let items = args.first().map(Value::iterate).transpose()?.unwrap_or_default();
            interp.charge(cost(items.len()))?;
            Ok(Value::list(items))
        }
        Builtin::Sorted => {
            arity(name, &args, 1, 1)?;
            let items = args[0].iterate()?;
            interp.charge(cost(items.len()))?;
            Ok(Value::list(sort_values(items)?))
        }
        Builtin::Any | Builtin::All => {
            arity(name, &args, 1, 1)?;
            let items = args[0].iterate()?;
            interp.charge(cost(items.len()))?;
            let result = if builtin == Builtin::Any {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        Builtin::Print => {
            let text: Vec<String> = args.iter().map(Value::to_text).collect();
            let line = text.join(" ");
            interp.charge(cost(line.len()))?;
            interp.write_line(&line);
            Ok(Value::None)
        }
        Builtin::Int => {
            arity(name, &args, 0, 1)?;
            interp.charge(1)?;
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Float(x)) => {
                    if x.is_finite() && x.abs() < 9.2e18 {
                        Ok(Value::Int(x.trunc() as i64))
                    } else {
                        Err(ExecError::runtime("cannot convert float to integer"))
                    }
                }
                Some(Value::Str(s)) => s.trim().replace('_', "").parse().map(Value::Int).map_err(|_| {
                    ExecError::runtime(format!("invalid literal for int(): {}", Value::Str(s.clone()).repr()))
                }),
                Some(other) => other.as_int().map(Value::Int).ok_or_else(|| type_error(name, other)),
            }
        }
        Builtin::Float => {
            arity(name, &args, 0, 1)?;
            interp.charge(1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Float(x)) => Ok(Value::Float(*x)),
                Some(Value::Str(s)) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|x| x.is_finite())
                    .map(Value::Float)
                    .ok_or_else(|| ExecError::runtime("could not convert string to float")),
                Some(other) => other
                    .as_int()
                    .map(|i| Value::Float(i as f64))
                    .ok_or_else(|| type_error(name, other)),
            }
        }
        Builtin::Str => {
            arity(name, &args, 0, 1)?;
            let text = args.first().map(Value::to_text).unwrap_or_default();
            interp.charge(cost(text.len()))?;
            Ok(Value::str(&text))
        }
        Builtin::Bool => {
            arity(name, &args, 0, 1)?;
            interp.charge(1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
    }
}

fn range(interp: &mut Interpreter<'_>, args: &[Value]) -> ExecResult<Value> {
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|arg| {
            arg.as_int().ok_or_else(|| {
                ExecError::runtime(format!(
                    "'{}' object cannot be interpreted as an integer",
                    arg.type_name()
                ))
            })
        })
        .collect::<ExecResult<Vec<i64>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(ExecError::runtime("range() expects 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(ExecError::runtime("range() arg 3 must not be zero"));
    }

    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let len = if span <= 0 {
        0
    } else {
        (span - 1) / step.abs() + 1
    };
    interp.charge(1 + u64::try_from(len / 4).unwrap_or(u64::MAX - 1))?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_SEQUENCE)
        .ok_or_else(|| ExecError::runtime("range too large"))?;

    let mut items = Vec::with_capacity(len);
    let mut current = start;
    for _ in 0..len {
        items.push(Value::Int(current as i64));
        current += step;
    }
    Ok(Value::list(items))
}

fn extremum(interp: &mut Interpreter<'_>, builtin: Builtin, args: Vec<Value>) -> ExecResult<Value> {
    let name = builtin.name();
    let items = match args.len() {
        0 => return Err(ExecError::runtime(format!("{name} expected at least 1 argument"))),
        1 => args[0].iterate()?,
        _ => args,
    };
    interp.charge(cost(items.len()))?;

    let mut items = items.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| ExecError::runtime(format!("{name}() arg is an empty sequence")))?;
    let wanted = if builtin == Builtin::Min {
        Ordering::Less
    } else {
        Ordering::Greater
    };
    for item in items {
        if value::ordering(&item, &best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

/// Stable merge sort that surfaces incomparable elements as errors.
pub(crate) fn sort_values(mut items: Vec<Value>) -> ExecResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = sort_values(items)?;
    let mut right = sort_values(right)?.into_iter().peekable();

    let mut out = Vec::with_capacity(left.len() + right.len());
    for item in left {
        while let Some(next) = right.peek() {
            if value::ordering(next, &item)? != Ordering::Less {
                break;
            }
            if let Some(next) = right.next() {
                out.push(next);
            }
        }
        out.push(item);
    }
    out.extend(right);
    Ok(out)
}

fn no_attribute(receiver: &Value, method: &str) -> ExecError {
    ExecError::runtime(format!(
        "'{}' object has no attribute '{method}'",
        receiver.type_name()
    ))
}

/// Call `receiver.method(args)`.
pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    method: &str,
    args: Vec<Value>,
) -> ExecResult<Value> {
    match receiver {
        Value::List(items) => list_method(interp, items, method, args),
        Value::Str(s) => str_method(interp, s, method, &args),
        other => Err(no_attribute(other, method)),
    }
}

fn list_method(
    interp: &mut Interpreter<'_>,
    items: &RefCell<Vec<Value>>,
    method: &str,
    args: Vec<Value>,
) -> ExecResult<Value> {
    let len = items.borrow().len();
    match method {
        "append" => {
            arity(method, &args, 1, 1)?;
            interp.charge(1)?;
            if len >= MAX_SEQUENCE {
                return Err(ExecError::runtime("list too large"));
            }
            items.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(method, &args, 1, 1)?;
            let extra = args[0].iterate()?;
            interp.charge(cost(extra.len()))?;
            if len + extra.len() > MAX_SEQUENCE {
                return Err(ExecError::runtime("list too large"));
            }
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "pop" => {
            arity(method, &args, 0, 1)?;
            interp.charge(cost(len))?;
            if len == 0 {
                return Err(ExecError::runtime("pop from empty list"));
            }
            let at = match args.first() {
                Some(index) => value::resolve_index(index, len)?,
                None => len - 1,
            };
            Ok(items.borrow_mut().remove(at))
        }
        "insert" => {
            arity(method, &args, 2, 2)?;
            interp.charge(cost(len))?;
            let raw = args[0]
                .as_int()
                .ok_or_else(|| type_error(method, &args[0]))?;
            let len_i = i64::try_from(len).map_err(|_| ExecError::runtime("list too large"))?;
            let at = if raw < 0 { (raw + len_i).max(0) } else { raw.min(len_i) };
            let at = usize::try_from(at).unwrap_or(len);
            let mut args = args;
            let item = args.pop().unwrap_or(Value::None);
            items.borrow_mut().insert(at, item);
            Ok(Value::None)
        }
        "index" | "count" => {
            arity(method, &args, 1, 1)?;
            interp.charge(cost(len))?;
            let items = items.borrow();
            let mut matches = items
                .iter()
                .enumerate()
                .filter(|(_, v)| value::values_equal(v, &args[0]))
                .map(|(i, _)| i);
            if method == "count" {
                int_of(matches.count())
            } else {
                match matches.next() {
                    Some(at) => int_of(at),
                    None => Err(ExecError::runtime(format!(
                        "{} is not in list",
                        args[0].repr()
                    ))),
                }
            }
        }
        "reverse" => {
            arity(method, &args, 0, 0)?;
            interp.charge(cost(len))?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            arity(method, &args, 0, 0)?;
            interp.charge(cost(len))?;
            let snapshot = items.borrow().clone();
            let sorted = sort_values(snapshot)?;
            *items.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "copy" => {
            arity(method, &args, 0, 0)?;
            interp.charge(cost(len))?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => Err(no_attribute(&Value::list(Vec::new()), method)),
    }
}

fn str_arg<'a>(method: &str, arg: &'a Value) -> ExecResult<&'a str> {
    match arg {
        Value::Str(s) => Ok(&**s),
        other => Err(type_error(method, other)),
    }
}

fn str_method(
    interp: &mut Interpreter<'_>,
    s: &str,
    method: &str,
    args: &[Value],
) -> ExecResult<Value> {
    interp.charge(cost(s.len()))?;
    match method {
        "upper" => {
            arity(method, args, 0, 0)?;
            Ok(Value::str(&s.to_uppercase()))
        }
        "lower" => {
            arity(method, args, 0, 0)?;
            Ok(Value::str(&s.to_lowercase()))
        }
        "strip" => {
            arity(method, args, 0, 0)?;
            Ok(Value::str(s.trim()))
        }
        "split" => {
            arity(method, args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(Value::str).collect(),
                Some(sep) => {
                    let sep = str_arg(method, sep)?;
                    if sep.is_empty() {
                        return Err(ExecError::runtime("empty separator"));
                    }
                    s.split(sep).map(Value::str).collect()
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            arity(method, args, 1, 1)?;
            let items = args[0].iterate()?;
            interp.charge(cost(items.len()))?;
            let parts = items
                .iter()
                .map(|item| str_arg(method, item).map(str::to_owned))
                .collect::<ExecResult<Vec<String>>>()?;
            let joined = parts.join(s);
            if joined.len() > MAX_SEQUENCE {
                return Err(ExecError::runtime("string too large"));
            }
            Ok(Value::str(&joined))
        }
        "startswith" | "endswith" => {
            arity(method, args, 1, 1)?;
            let affix = str_arg(method, &args[0])?;
            Ok(Value::Bool(if method == "startswith" {
                s.starts_with(affix)
            } else {
                s.ends_with(affix)
            }))
        }
        "replace" => {
            arity(method, args, 2, 2)?;
            let from = str_arg(method, &args[0])?;
            let to = str_arg(method, &args[1])?;
            if from.is_empty() {
                return Err(ExecError::runtime("empty pattern"));
            }
            let replaced = s.replace(from, to);
            if replaced.len() > MAX_SEQUENCE {
                return Err(ExecError::runtime("string too large"));
            }
            Ok(Value::str(&replaced))
        }
        _ => Err(no_attribute(&Value::str(""), method)),
    }
}
