//! Fuel-metered interpreter for the supported Python subset.
//!
//! The interpreter is the test harness behind fitness scoring: it runs a
//! variant's functions on recorded inputs and reports both the result and
//! the fuel spent producing it.
//!
//! # Metering
//!
//! - every statement, expression node and loop iteration costs one unit
//! - builtins cost one unit plus a quarter of the elements they touch
//! - the deadline and cancellation flag are polled every
//!   [`POLL_INTERVAL`] units
//!
//! Fuel is deterministic, so two runs of the same program on the same input
//! always spend the same amount.

mod builtins;
mod value;

use crate::error::{ExecError, ExecResult};
use crate::gp::CancelToken;
use crate::syntax::{BinaryOp, BoolOp, Ix, NodeKind, SyntaxTree, UnaryOp};
use std::collections::HashMap;
use std::time::Instant;

use builtins::Builtin;
use value::Value;

pub use value::Datum;
pub(crate) use value::{floor_div, floor_mod};

/// Fuel units between deadline and cancellation checks.
pub const POLL_INTERVAL: u64 = 256;

/// Deepest chain of nested user function calls.
pub const MAX_CALL_DEPTH: usize = 48;

/// Upper bound on captured `print` output, in bytes.
const MAX_STDOUT: usize = 64 * 1024;

/// Resource limits for one run.
#[derive(Debug, Clone)]
pub struct Budget {
    /// Maximum fuel units.
    pub fuel: u64,
    /// Wall-clock deadline.
    pub deadline: Option<Instant>,
    /// External cancellation flag.
    pub cancel: Option<CancelToken>,
}

impl Budget {
    /// A budget limited by fuel only.
    #[must_use]
    pub fn with_fuel(fuel: u64) -> Self {
        Self {
            fuel,
            deadline: None,
            cancel: None,
        }
    }
}

/// Result of calling a function to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Returned value.
    pub value: Datum,
    /// Captured `print` output.
    pub stdout: String,
    /// Fuel spent, including loading the module.
    pub fuel_used: u64,
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// A loaded module plus the state of one run.
#[derive(Debug)]
pub struct Interpreter<'t> {
    tree: &'t SyntaxTree,
    globals: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    budget: Budget,
    fuel_used: u64,
    next_poll: u64,
    stdout: String,
}

impl<'t> Interpreter<'t> {
    /// Create an interpreter for `tree`. Nothing runs until [`Self::load`].
    #[must_use]
    pub fn new(tree: &'t SyntaxTree, budget: Budget) -> Self {
        Self {
            tree,
            globals: HashMap::new(),
            frames: Vec::new(),
            budget,
            fuel_used: 0,
            next_poll: POLL_INTERVAL,
            stdout: String::new(),
        }
    }

    /// Fuel spent so far.
    #[must_use]
    pub fn fuel_used(&self) -> u64 {
        self.fuel_used
    }

    /// Output captured from `print`.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Execute the module body, defining its functions and globals.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if the module body fails or exhausts its budget.
    pub fn load(&mut self) -> ExecResult<()> {
        let tree = self.tree;
        if let NodeKind::Module { body } = tree.kind(tree.root_ix()) {
            self.exec_block(body)?;
        }
        Ok(())
    }

    /// Call the global function `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] if `name` is not a function, the call fails, or
    /// the budget runs out.
    pub fn call(&mut self, name: &str, args: &[Datum]) -> ExecResult<Datum> {
        let Some(Value::Function(ix)) = self.globals.get(name).cloned() else {
            return Err(ExecError::runtime(format!("name '{name}' is not a function")));
        };
        let args = args.iter().map(Value::from_datum).collect();
        self.call_function(ix, args)?.to_datum()
    }

    pub(crate) fn charge(&mut self, units: u64) -> ExecResult<()> {
        self.fuel_used = self.fuel_used.saturating_add(units);
        if self.fuel_used > self.budget.fuel {
            return Err(ExecError::OutOfFuel(self.budget.fuel));
        }
        if self.fuel_used >= self.next_poll {
            self.next_poll = self.fuel_used + POLL_INTERVAL;
            if self.budget.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(ExecError::Cancelled);
            }
            if self.budget.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ExecError::Deadline);
            }
        }
        Ok(())
    }

    pub(crate) fn write_line(&mut self, line: &str) {
        if self.stdout.len() + line.len() < MAX_STDOUT {
            self.stdout.push_str(line);
            self.stdout.push('\n');
        }
    }

    fn lookup(&self, name: &str) -> ExecResult<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtin::lookup(name)
            .map(Value::Builtin)
            .ok_or_else(|| ExecError::runtime(format!("name '{name}' is not defined")))
    }

    fn scope(&mut self) -> &mut HashMap<String, Value> {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.globals,
        }
    }

    fn bind(&mut self, name: &str, value: Value) {
        self.scope().insert(name.to_string(), value);
    }

    fn exec_block(&mut self, block: &[Ix]) -> ExecResult<Flow> {
        for &stmt in block {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, ix: Ix) -> ExecResult<Flow> {
        self.charge(1)?;
        let tree = self.tree;
        match tree.kind(ix) {
            NodeKind::FunctionDef { name, .. } => {
                self.bind(name, Value::Function(ix));
            }
            NodeKind::Return { value } => {
                let value = match value {
                    Some(value) => self.eval(*value)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            NodeKind::Assign { target, value } => {
                let value = self.eval(*value)?;
                self.store(*target, value)?;
            }
            NodeKind::AugAssign { target, op, value } => {
                let current = self.eval(*target)?;
                let rhs = self.eval(*value)?;
                if let (BinaryOp::Add, Value::List(items), Value::List(extra)) = (op, &current, &rhs) {
                    // `+=` extends a list in place.
                    let extra = extra.borrow().clone();
                    items.borrow_mut().extend(extra);
                } else {
                    let result = value::binary(*op, &current, &rhs)?;
                    self.store(*target, result)?;
                }
            }
            NodeKind::For { var, iter, body } => {
                let items = self.eval(*iter)?.iterate()?;
                for item in items {
                    self.charge(1)?;
                    self.bind(var, item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            NodeKind::While { test, body } => loop {
                self.charge(1)?;
                if !self.eval(*test)?.is_truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            NodeKind::If { test, body, orelse } => {
                let block = if self.eval(*test)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(block);
            }
            NodeKind::Expr { value } => {
                self.eval(*value)?;
            }
            NodeKind::Pass => {}
            NodeKind::Break => return Ok(Flow::Break),
            NodeKind::Continue => return Ok(Flow::Continue),
            NodeKind::Module { .. } => {
                return Err(ExecError::runtime("module nested inside a block"));
            }
            _ => {
                self.eval(ix)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn store(&mut self, target: Ix, value: Value) -> ExecResult<()> {
        let tree = self.tree;
        match tree.kind(target) {
            NodeKind::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            NodeKind::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(*container)?;
                let index = self.eval(*index)?;
                match container {
                    Value::List(items) => {
                        let len = items.borrow().len();
                        let at = value::resolve_index(&index, len)?;
                        items.borrow_mut()[at] = value;
                        Ok(())
                    }
                    other => Err(ExecError::runtime(format!(
                        "'{}' object does not support item assignment",
                        other.type_name()
                    ))),
                }
            }
            NodeKind::Attribute { .. } => {
                Err(ExecError::runtime("attribute assignment is not supported"))
            }
            _ => Err(ExecError::runtime("cannot assign to expression")),
        }
    }

    fn eval(&mut self, ix: Ix) -> ExecResult<Value> {
        self.charge(1)?;
        let tree = self.tree;
        match tree.kind(ix) {
            NodeKind::Name(name) => self.lookup(name),
            NodeKind::Const(literal) => Ok(Value::from_literal(literal)),
            NodeKind::List(items) => {
                let items = items
                    .iter()
                    .map(|&item| self.eval(item))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            NodeKind::Comprehension {
                elt,
                var,
                iter,
                cond,
                ..
            } => self.comprehension(*elt, var, *iter, *cond),
            NodeKind::Binary { op, left, right } => {
                let left = self.eval(*left)?;
                let right = self.eval(*right)?;
                value::binary(*op, &left, &right)
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.eval(*operand)?;
                match op {
                    UnaryOp::Neg => value::negate(&operand),
                    UnaryOp::Pos => value::positive(&operand),
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
                }
            }
            NodeKind::Bool { op, left, right } => {
                let left = self.eval(*left)?;
                let short_circuit = match op {
                    BoolOp::And => !left.is_truthy(),
                    BoolOp::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(*right)
                }
            }
            NodeKind::Compare { op, left, right } => {
                let left = self.eval(*left)?;
                let right = self.eval(*right)?;
                value::compare(*op, &left, &right).map(Value::Bool)
            }
            NodeKind::Call { func, args } => {
                if let NodeKind::Attribute { value, attr } = tree.kind(*func) {
                    let receiver = self.eval(*value)?;
                    let args = self.eval_all(args)?;
                    return builtins::call_method(self, &receiver, attr, args);
                }
                let callee = self.eval(*func)?;
                let args = self.eval_all(args)?;
                match callee {
                    Value::Function(def) => self.call_function(def, args),
                    Value::Builtin(builtin) => builtins::call(self, builtin, args),
                    other => Err(ExecError::runtime(format!(
                        "'{}' object is not callable",
                        other.type_name()
                    ))),
                }
            }
            NodeKind::Attribute { attr, .. } => Err(ExecError::runtime(format!(
                "attribute '{attr}' can only be called"
            ))),
            NodeKind::Subscript { value, index } => {
                let container = self.eval(*value)?;
                let index = self.eval(*index)?;
                value::subscript(&container, &index)
            }
            _ => Err(ExecError::runtime("statement in expression position")),
        }
    }

    fn eval_all(&mut self, args: &[Ix]) -> ExecResult<Vec<Value>> {
        args.iter().map(|&arg| self.eval(arg)).collect()
    }

    /// Comprehensions keep their loop variable out of the enclosing scope.
    fn comprehension(&mut self, elt: Ix, var: &str, iter: Ix, cond: Option<Ix>) -> ExecResult<Value> {
        let items = self.eval(iter)?.iterate()?;
        let shadowed = self.scope().remove(var);
        let result = self.collect_comprehension(elt, var, items, cond);
        let scope = self.scope();
        match shadowed {
            Some(previous) => scope.insert(var.to_string(), previous),
            None => scope.remove(var),
        };
        result.map(Value::list)
    }

    fn collect_comprehension(
        &mut self,
        elt: Ix,
        var: &str,
        items: Vec<Value>,
        cond: Option<Ix>,
    ) -> ExecResult<Vec<Value>> {
        let mut out = Vec::new();
        for item in items {
            self.charge(1)?;
            self.bind(var, item);
            if let Some(cond) = cond {
                if !self.eval(cond)?.is_truthy() {
                    continue;
                }
            }
            out.push(self.eval(elt)?);
        }
        Ok(out)
    }

    fn call_function(&mut self, def: Ix, args: Vec<Value>) -> ExecResult<Value> {
        let tree = self.tree;
        let NodeKind::FunctionDef { name, params, body } = tree.kind(def) else {
            return Err(ExecError::runtime("called object is not a function"));
        };
        if params.len() != args.len() {
            return Err(ExecError::runtime(format!(
                "{name}() takes {} positional argument(s) but {} were given",
                params.len(),
                args.len()
            )));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ExecError::RecursionLimit(MAX_CALL_DEPTH));
        }

        self.frames
            .push(params.iter().cloned().zip(args).collect());
        let flow = self.exec_block(body);
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

/// Load `tree` and call `function` with `args` under `budget`.
///
/// # Errors
///
/// Returns [`ExecError`] if loading or the call fails, or the budget runs out.
pub fn run_function(
    tree: &SyntaxTree,
    function: &str,
    args: &[Datum],
    budget: Budget,
) -> ExecResult<Execution> {
    let mut interp = Interpreter::new(tree, budget);
    interp.load()?;
    let value = interp.call(function, args)?;
    Ok(Execution {
        value,
        fuel_used: interp.fuel_used,
        stdout: interp.stdout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn run(source: &str, args: &[Datum]) -> ExecResult<Execution> {
        let tree = parse(source).unwrap();
        let name = tree.function_names().remove(0);
        run_function(&tree, &name, args, Budget::with_fuel(100_000))
    }

    fn ints(values: &[i64]) -> Datum {
        Datum::List(values.iter().copied().map(Datum::Int).collect())
    }

    #[test]
    fn test_accumulation_loop() {
        let source = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        let result = run(source, &[ints(&[1, 2, 3, 4])]).unwrap();
        assert_eq!(result.value, Datum::Int(10));
        assert!(result.fuel_used > 0);
    }

    #[test]
    fn test_builtin_rewrite_spends_less_fuel() {
        let looped = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        let builtin = "def f(xs):\n    return sum(xs)\n";
        let input = [ints(&(0..64).collect::<Vec<_>>())];
        let a = run(looped, &input).unwrap();
        let b = run(builtin, &input).unwrap();
        assert_eq!(a.value, b.value);
        assert!(b.fuel_used < a.fuel_used);
    }

    #[test]
    fn test_fuel_is_deterministic() {
        let source = "def f(n):\n    out = []\n    i = 0\n    while i < n:\n        out.append(i * i)\n        i += 1\n    return out\n";
        let a = run(source, &[Datum::Int(20)]).unwrap();
        let b = run(source, &[Datum::Int(20)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_infinite_loop_runs_out_of_fuel() {
        let err = run("def f():\n    while True:\n        pass\n", &[]).unwrap_err();
        assert_eq!(err, ExecError::OutOfFuel(100_000));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_recursion_is_capped() {
        let source = "def f(n):\n    return f(n + 1)\n";
        assert_eq!(
            run(source, &[Datum::Int(0)]).unwrap_err(),
            ExecError::RecursionLimit(MAX_CALL_DEPTH)
        );
        let fact = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n";
        assert_eq!(run(fact, &[Datum::Int(10)]).unwrap().value, Datum::Int(3_628_800));
    }

    #[test]
    fn test_cancellation_is_observed() {
        let tree = parse("def f():\n    while True:\n        pass\n").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let budget = Budget {
            fuel: u64::MAX,
            deadline: None,
            cancel: Some(cancel),
        };
        assert_eq!(run_function(&tree, "f", &[], budget).unwrap_err(), ExecError::Cancelled);
    }

    #[test]
    fn test_deadline_is_observed() {
        let tree = parse("def f():\n    while True:\n        pass\n").unwrap();
        let budget = Budget {
            fuel: u64::MAX,
            deadline: Some(Instant::now()),
            cancel: None,
        };
        assert_eq!(run_function(&tree, "f", &[], budget).unwrap_err(), ExecError::Deadline);
    }

    #[test]
    fn test_comprehension_scope_and_print() {
        let source = "def f(xs):\n    x = 'kept'\n    ys = [x * 2 for x in xs if x % 2 == 0]\n    print(x, len(ys))\n    return ys\n";
        let result = run(source, &[ints(&[1, 2, 3, 4])]).unwrap();
        assert_eq!(result.value, ints(&[4, 8]));
        assert_eq!(result.stdout, "kept 2\n");
    }

    #[test]
    fn test_globals_and_methods() {
        let source = "LIMIT = 3\n\ndef f(words):\n    out = []\n    for w in words:\n        if len(out) < LIMIT:\n            out.append(w.upper())\n    out.sort()\n    return ' '.join(out)\n";
        let words = Datum::List(["b", "a", "d", "c"].iter().map(|s| Datum::Str((*s).into())).collect());
        assert_eq!(run(source, &[words]).unwrap().value, Datum::Str("A B D".into()));
    }

    #[test]
    fn test_runtime_errors_are_reported() {
        assert!(matches!(
            run("def f(xs):\n    return xs[10]\n", &[ints(&[1])]),
            Err(ExecError::Runtime(_))
        ));
        assert!(matches!(
            run("def f():\n    return undefined\n", &[]),
            Err(ExecError::Runtime(_))
        ));
        assert!(matches!(
            run("def f(a):\n    return a\n", &[]),
            Err(ExecError::Runtime(_))
        ));
    }

    #[test]
    fn test_huge_range_is_bounded() {
        let err = run("def f():\n    return len(range(10 ** 12))\n", &[]).unwrap_err();
        assert!(err.is_timeout());
    }
}
