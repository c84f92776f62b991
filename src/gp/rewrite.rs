//! Behaviour-preserving rewrites applied by mutation.
//!
//! Each rule pairs a `find` function, which lists the nodes where the rule
//! matches, with an `apply` function that edits one of those nodes. `apply`
//! re-checks the pattern and fails with [`TreeError::Unmatched`] instead of
//! guessing, so a stale site is never half-rewritten.

use crate::error::{TreeError, TreeResult};
use crate::gp::mutation::MutationKind;
use crate::interp;
use crate::syntax::{BinaryOp, ComprehensionKind, Ix, Literal, NodeKind, SyntaxTree, UnaryOp};
use std::collections::HashSet;
use std::fmt;

/// List methods that change the length of their receiver.
const RESIZING_METHODS: [&str; 6] = ["append", "extend", "pop", "insert", "remove", "clear"];

/// Builtins known not to touch their arguments.
const PURE_BUILTINS: [&str; 15] = [
    "len", "sum", "range", "min", "max", "abs", "list", "sorted", "any", "all", "print", "int",
    "float", "str", "bool",
];

/// One rewrite: where it matches and how to perform it.
#[derive(Clone, Copy)]
pub(crate) struct Rule {
    pub(crate) kind: MutationKind,
    pub(crate) find: fn(&SyntaxTree) -> Vec<Ix>,
    pub(crate) apply: fn(&mut SyntaxTree, Ix) -> TreeResult<()>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rule").field(&self.kind).finish()
    }
}

/// Every rule, in application order.
pub(crate) const RULES: [Rule; 7] = [
    Rule {
        kind: MutationKind::DeadBranch,
        find: find_dead_branches,
        apply: remove_dead_branch,
    },
    Rule {
        kind: MutationKind::UnreachableCode,
        find: find_unreachable,
        apply: remove_unreachable,
    },
    Rule {
        kind: MutationKind::ConstantFold,
        find: find_foldable,
        apply: fold_constant,
    },
    Rule {
        kind: MutationKind::AugmentedAssign,
        find: find_self_assignments,
        apply: augment_assignment,
    },
    Rule {
        kind: MutationKind::AccumulationToSum,
        find: find_accumulations,
        apply: accumulate_with_sum,
    },
    Rule {
        kind: MutationKind::AppendToComprehension,
        find: find_append_loops,
        apply: append_to_comprehension,
    },
    Rule {
        kind: MutationKind::HoistLen,
        find: find_len_in_conditions,
        apply: hoist_len,
    },
];

fn unmatched(tree: &SyntaxTree, ix: Ix) -> TreeError {
    TreeError::Unmatched(tree.handle(ix))
}

/// Integer value of a literal, accepting a negated literal too.
fn int_value(tree: &SyntaxTree, ix: Ix) -> Option<i64> {
    match tree.kind(ix) {
        NodeKind::Const(Literal::Int(v)) => Some(*v),
        NodeKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match tree.kind(*operand) {
            NodeKind::Const(Literal::Int(v)) => v.checked_neg(),
            _ => None,
        },
        _ => None,
    }
}

fn is_name(tree: &SyntaxTree, ix: Ix, name: &str) -> bool {
    matches!(tree.kind(ix), NodeKind::Name(n) if n == name)
}

/// Whether `name` is read anywhere under `ix`.
fn mentions(tree: &SyntaxTree, ix: Ix, name: &str) -> bool {
    tree.subtree(ix).into_iter().any(|ix| is_name(tree, ix, name))
}

// ---- dead branches ----

fn find_dead_branches(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| match tree.kind(ix) {
            NodeKind::If { test, .. } => matches!(tree.kind(*test), NodeKind::Const(_)),
            NodeKind::While { test, .. } => {
                matches!(tree.kind(*test), NodeKind::Const(lit) if !lit.is_truthy())
            }
            _ => false,
        })
        .collect()
}

fn remove_dead_branch(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let survivors = match tree.kind(ix) {
        NodeKind::If { test, body, orelse } => match tree.kind(*test) {
            NodeKind::Const(lit) if lit.is_truthy() => body.clone(),
            NodeKind::Const(_) => orelse.clone(),
            _ => return Err(unmatched(tree, ix)),
        },
        NodeKind::While { test, .. } => match tree.kind(*test) {
            NodeKind::Const(lit) if !lit.is_truthy() => Vec::new(),
            _ => return Err(unmatched(tree, ix)),
        },
        _ => return Err(unmatched(tree, ix)),
    };
    tree.splice(ix, 1, survivors)
}

// ---- unreachable code ----

fn find_unreachable(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| {
            matches!(
                tree.kind(ix),
                NodeKind::Return { .. } | NodeKind::Break | NodeKind::Continue
            ) && !tree.siblings_after(ix).is_empty()
        })
        .collect()
}

fn remove_unreachable(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let dead = tree.siblings_after(ix);
    let Some(&first) = dead.first() else {
        return Err(unmatched(tree, ix));
    };
    tree.splice(first, dead.len(), Vec::new())
}

// ---- constant folding ----

fn fold(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    let value = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::FloorDiv => interp::floor_div(a, b),
        BinaryOp::Mod => interp::floor_mod(a, b),
        BinaryOp::Div | BinaryOp::Pow => None,
    }?;
    // i64::MIN has no literal spelling.
    (value != i64::MIN).then_some(value)
}

fn folded(tree: &SyntaxTree, ix: Ix) -> Option<i64> {
    let NodeKind::Binary { op, left, right } = tree.kind(ix) else {
        return None;
    };
    fold(*op, int_value(tree, *left)?, int_value(tree, *right)?)
}

fn find_foldable(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| folded(tree, ix).is_some())
        .collect()
}

fn fold_constant(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let value = folded(tree, ix).ok_or_else(|| unmatched(tree, ix))?;
    let line = tree.line(ix);
    let constant = tree.alloc(NodeKind::Const(Literal::Int(value)), line);
    tree.replace_with(ix, constant)
}

// ---- augmented assignment ----

fn self_assignment(tree: &SyntaxTree, ix: Ix) -> Option<(Ix, BinaryOp, Ix)> {
    let NodeKind::Assign { target, value } = tree.kind(ix) else {
        return None;
    };
    let NodeKind::Name(name) = tree.kind(*target) else {
        return None;
    };
    let NodeKind::Binary { op, left, right } = tree.kind(*value) else {
        return None;
    };
    let numeric = matches!(
        tree.kind(*right),
        NodeKind::Const(Literal::Int(_) | Literal::Float(_))
    );
    // `*=` repeats a list in place, which aliases can observe.
    let rebinding = !matches!(op, BinaryOp::Pow | BinaryOp::Mul);
    (rebinding && numeric && is_name(tree, *left, name)).then_some((*target, *op, *right))
}

fn find_self_assignments(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| self_assignment(tree, ix).is_some())
        .collect()
}

fn augment_assignment(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let (target, op, value) = self_assignment(tree, ix).ok_or_else(|| unmatched(tree, ix))?;
    let line = tree.line(ix);
    let aug = tree.alloc(NodeKind::AugAssign { target, op, value }, line);
    tree.splice(ix, 1, vec![aug])
}

// ---- loop to builtin ----

/// The function definition containing `ix`, or the module root.
fn enclosing_scope(tree: &SyntaxTree, ix: Ix) -> Ix {
    let mut current = ix;
    while let Some(parent) = tree.parent_of(current) {
        if matches!(tree.kind(parent), NodeKind::FunctionDef { .. }) {
            return parent;
        }
        current = parent;
    }
    tree.root_ix()
}

/// A `for` loop whose body is a single statement, optionally under an
/// `if` without `else`, directly preceded by an assignment to a name.
struct SimpleLoop {
    init: Ix,
    init_target: Ix,
    init_value: Ix,
    name: String,
    var: String,
    iter: Ix,
    inner: Ix,
    cond: Option<Ix>,
}

fn simple_loop(tree: &SyntaxTree, for_ix: Ix) -> Option<SimpleLoop> {
    let NodeKind::For { var, iter, body } = tree.kind(for_ix) else {
        return None;
    };
    let [stmt] = body.as_slice() else {
        return None;
    };
    let (inner, cond) = match tree.kind(*stmt) {
        NodeKind::If { test, body, orelse } if orelse.is_empty() => match body.as_slice() {
            [inner] => (*inner, Some(*test)),
            _ => return None,
        },
        _ => (*stmt, None),
    };

    let init = tree.previous_sibling(for_ix)?;
    let NodeKind::Assign {
        target: init_target,
        value: init_value,
    } = tree.kind(init)
    else {
        return None;
    };
    let NodeKind::Name(name) = tree.kind(*init_target) else {
        return None;
    };
    if name == var || mentions(tree, *iter, name) || cond.is_some_and(|c| mentions(tree, c, name)) {
        return None;
    }
    // The loop variable stays bound after a `for`, but not after a
    // comprehension, so it must not be read anywhere else in its scope.
    let own: HashSet<Ix> = tree.subtree(for_ix).into_iter().collect();
    if tree
        .subtree(enclosing_scope(tree, for_ix))
        .into_iter()
        .any(|ix| !own.contains(&ix) && is_name(tree, ix, var))
    {
        return None;
    }

    Some(SimpleLoop {
        init,
        init_target: *init_target,
        init_value: *init_value,
        name: name.clone(),
        var: var.clone(),
        iter: *iter,
        inner,
        cond,
    })
}

/// `acc = k; for v in it: acc += e` with the summed expression `e`.
fn accumulation(tree: &SyntaxTree, for_ix: Ix) -> Option<(SimpleLoop, i64, Ix)> {
    let found = simple_loop(tree, for_ix)?;
    let start = int_value(tree, found.init_value)?;
    let NodeKind::AugAssign {
        target,
        op: BinaryOp::Add,
        value,
    } = tree.kind(found.inner)
    else {
        return None;
    };
    if !is_name(tree, *target, &found.name) || mentions(tree, *value, &found.name) {
        return None;
    }
    if tree.bound_names(tree.root_ix()).contains("sum") {
        return None;
    }
    let value = *value;
    Some((found, start, value))
}

fn find_accumulations(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| accumulation(tree, ix).is_some())
        .collect()
}

fn accumulate_with_sum(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let (found, start, elt) = accumulation(tree, ix).ok_or_else(|| unmatched(tree, ix))?;
    let line = tree.line(found.init);

    let argument = if found.cond.is_none() && is_name(tree, elt, &found.var) {
        found.iter
    } else {
        tree.alloc(
            NodeKind::Comprehension {
                kind: ComprehensionKind::Generator,
                elt,
                var: found.var.clone(),
                iter: found.iter,
                cond: found.cond,
            },
            line,
        )
    };
    let func = tree.alloc(NodeKind::Name("sum".into()), line);
    let mut value = tree.alloc(
        NodeKind::Call {
            func,
            args: vec![argument],
        },
        line,
    );
    if start != 0 {
        let left = tree.alloc(NodeKind::Const(Literal::Int(start)), line);
        value = tree.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left,
                right: value,
            },
            line,
        );
    }

    let assign = tree.alloc(
        NodeKind::Assign {
            target: found.init_target,
            value,
        },
        line,
    );
    tree.splice(found.init, 2, vec![assign])
}

/// `r = []; for v in it: r.append(e)` with the appended expression `e`.
fn append_loop(tree: &SyntaxTree, for_ix: Ix) -> Option<(SimpleLoop, Ix)> {
    let found = simple_loop(tree, for_ix)?;
    if !matches!(tree.kind(found.init_value), NodeKind::List(items) if items.is_empty()) {
        return None;
    }
    let NodeKind::Expr { value } = tree.kind(found.inner) else {
        return None;
    };
    let NodeKind::Call { func, args } = tree.kind(*value) else {
        return None;
    };
    let [elt] = args.as_slice() else {
        return None;
    };
    let NodeKind::Attribute { value: receiver, attr } = tree.kind(*func) else {
        return None;
    };
    if attr != "append" || !is_name(tree, *receiver, &found.name) || mentions(tree, *elt, &found.name) {
        return None;
    }
    let elt = *elt;
    Some((found, elt))
}

fn find_append_loops(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| append_loop(tree, ix).is_some())
        .collect()
}

fn append_to_comprehension(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let (found, elt) = append_loop(tree, ix).ok_or_else(|| unmatched(tree, ix))?;
    let line = tree.line(found.init);
    let value = tree.alloc(
        NodeKind::Comprehension {
            kind: ComprehensionKind::List,
            elt,
            var: found.var,
            iter: found.iter,
            cond: found.cond,
        },
        line,
    );
    let assign = tree.alloc(
        NodeKind::Assign {
            target: found.init_target,
            value,
        },
        line,
    );
    tree.splice(found.init, 2, vec![assign])
}

// ---- loop-invariant len() ----

/// Nodes under `ix` that run every time `ix` is evaluated. Right operands
/// of `and`/`or` and comprehension bodies are left out.
fn always_evaluated(tree: &SyntaxTree, ix: Ix) -> Vec<Ix> {
    let mut out = Vec::new();
    let mut stack = vec![ix];
    while let Some(ix) = stack.pop() {
        out.push(ix);
        match tree.kind(ix) {
            NodeKind::Bool { left, .. } => stack.push(*left),
            NodeKind::Comprehension { iter, .. } => stack.push(*iter),
            kind => stack.extend(kind.children().into_iter().rev()),
        }
    }
    out
}

/// The name whose length a `while` test recomputes, and every `len(name)`
/// call in the test.
fn invariant_len(tree: &SyntaxTree, while_ix: Ix) -> Option<(String, Vec<Ix>)> {
    let NodeKind::While { test, body } = tree.kind(while_ix) else {
        return None;
    };
    if tree.bound_names(tree.root_ix()).contains("len") {
        return None;
    }

    let len_argument = |ix: Ix| match tree.kind(ix) {
        NodeKind::Call { func, args } if is_name(tree, *func, "len") => match args.as_slice() {
            [arg] => match tree.kind(*arg) {
                NodeKind::Name(name) => Some(name.clone()),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    };
    let name = always_evaluated(tree, *test)
        .into_iter()
        .find_map(&len_argument)?;

    for &stmt in body {
        if tree.bound_names(stmt).contains(&name) {
            return None;
        }
        for ix in tree.subtree(stmt) {
            let NodeKind::Call { func, .. } = tree.kind(ix) else {
                continue;
            };
            let safe = match tree.kind(*func) {
                NodeKind::Name(callee) => PURE_BUILTINS.contains(&callee.as_str()),
                NodeKind::Attribute { attr, .. } => !RESIZING_METHODS.contains(&attr.as_str()),
                _ => false,
            };
            if !safe {
                return None;
            }
        }
    }

    let calls = tree
        .subtree(*test)
        .into_iter()
        .filter(|&ix| len_argument(ix).is_some_and(|n| n == name))
        .collect();
    Some((name, calls))
}

fn find_len_in_conditions(tree: &SyntaxTree) -> Vec<Ix> {
    tree.preorder()
        .into_iter()
        .filter(|&ix| invariant_len(tree, ix).is_some())
        .collect()
}

fn fresh_name(tree: &SyntaxTree, base: &str) -> String {
    let taken = tree.identifiers();
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}{suffix}");
        suffix += 1;
    }
    candidate
}

fn hoist_len(tree: &mut SyntaxTree, ix: Ix) -> TreeResult<()> {
    let (name, calls) = invariant_len(tree, ix).ok_or_else(|| unmatched(tree, ix))?;
    let Some(&first) = calls.first() else {
        return Err(unmatched(tree, ix));
    };
    let hoisted = fresh_name(tree, &format!("n_{name}"));
    let line = tree.line(ix);

    for &call in &calls {
        let reference = tree.alloc(NodeKind::Name(hoisted.clone()), line);
        tree.replace_with(call, reference)?;
    }
    let target = tree.alloc(NodeKind::Name(hoisted), line);
    let assign = tree.alloc(
        NodeKind::Assign {
            target,
            value: first,
        },
        line,
    );
    tree.splice(ix, 1, vec![assign, ix])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, render};

    fn rule(kind: MutationKind) -> Rule {
        RULES.iter().copied().find(|rule| rule.kind == kind).unwrap()
    }

    /// Apply `kind` at its first site, or `None` when it has no site.
    fn rewrite(source: &str, kind: MutationKind) -> Option<String> {
        let mut tree = parse(source).unwrap();
        let rule = rule(kind);
        let site = *(rule.find)(&tree).first()?;
        (rule.apply)(&mut tree, site).unwrap();
        Some(render(&tree))
    }

    #[test]
    fn test_rules_cover_every_kind() {
        for kind in MutationKind::ALL {
            assert_eq!(rule(kind).kind, kind);
        }
    }

    #[test]
    fn test_dead_branch() {
        assert_eq!(
            rewrite("def f(x):\n    if True:\n        x = 1\n    else:\n        x = 2\n    return x\n", MutationKind::DeadBranch).unwrap(),
            "def f(x):\n    x = 1\n    return x\n"
        );
        assert_eq!(
            rewrite("def f(x):\n    if 0:\n        x = 1\n    return x\n", MutationKind::DeadBranch).unwrap(),
            "def f(x):\n    return x\n"
        );
        assert_eq!(
            rewrite("def f(x):\n    while False:\n        x = 1\n", MutationKind::DeadBranch).unwrap(),
            "def f(x):\n    pass\n"
        );
        assert!(rewrite("def f(x):\n    while True:\n        break\n", MutationKind::DeadBranch).is_none());
    }

    #[test]
    fn test_unreachable_code() {
        assert_eq!(
            rewrite("def f(x):\n    return x\n    x = 2\n    print(x)\n", MutationKind::UnreachableCode).unwrap(),
            "def f(x):\n    return x\n"
        );
        assert!(rewrite("def f(x):\n    return x\n", MutationKind::UnreachableCode).is_none());
    }

    #[test]
    fn test_constant_fold() {
        assert_eq!(
            rewrite("x = 2 * 3 + y\n", MutationKind::ConstantFold).unwrap(),
            "x = 6 + y\n"
        );
        assert_eq!(rewrite("x = -7 // 2\n", MutationKind::ConstantFold).unwrap(), "x = -4\n");
        assert!(rewrite("x = 1 // 0\n", MutationKind::ConstantFold).is_none());
        assert!(rewrite("x = 9223372036854775807 + 1\n", MutationKind::ConstantFold).is_none());
        assert!(rewrite("x = -5\n", MutationKind::ConstantFold).is_none());
    }

    #[test]
    fn test_negative_fold_keeps_precedence() {
        assert_eq!(
            rewrite("x = (1 - 3) ** 2\n", MutationKind::ConstantFold).unwrap(),
            "x = (-2) ** 2\n"
        );
    }

    #[test]
    fn test_augmented_assign() {
        assert_eq!(rewrite("x = x + 1\n", MutationKind::AugmentedAssign).unwrap(), "x += 1\n");
        assert!(rewrite("x = y + 1\n", MutationKind::AugmentedAssign).is_none());
        assert!(rewrite("x = x ** 2\n", MutationKind::AugmentedAssign).is_none());
        assert!(rewrite("x = x + y\n", MutationKind::AugmentedAssign).is_none());
        // `xs *= 2` would extend a list in place.
        assert!(rewrite("xs = xs * 2\n", MutationKind::AugmentedAssign).is_none());
    }

    #[test]
    fn test_accumulation_to_sum() {
        let seed = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        assert_eq!(
            rewrite(seed, MutationKind::AccumulationToSum).unwrap(),
            "def f(xs):\n    total = sum(xs)\n    return total\n"
        );

        let guarded = "def f(xs):\n    t = 5\n    for x in xs:\n        if x > 0:\n            t += x * 2\n    return t\n";
        assert_eq!(
            rewrite(guarded, MutationKind::AccumulationToSum).unwrap(),
            "def f(xs):\n    t = 5 + sum(x * 2 for x in xs if x > 0)\n    return t\n"
        );
    }

    #[test]
    fn test_accumulation_guards() {
        // The accumulator feeds back into the summed expression.
        let feedback = "def f(xs):\n    t = 0\n    for x in xs:\n        t += t + x\n    return t\n";
        assert!(rewrite(feedback, MutationKind::AccumulationToSum).is_none());
        // The loop variable is read after the loop.
        let leaked = "def f(xs):\n    t = 0\n    for x in xs:\n        t += x\n    return t + x\n";
        assert!(rewrite(leaked, MutationKind::AccumulationToSum).is_none());
        // `sum` is shadowed.
        let shadowed = "sum = 3\ndef f(xs):\n    t = 0\n    for x in xs:\n        t += x\n    return t\n";
        assert!(rewrite(shadowed, MutationKind::AccumulationToSum).is_none());
    }

    #[test]
    fn test_loop_variable_read_outside_enclosing_block() {
        let nested_sum = "def f(xs):\n    x = 0\n    if True:\n        t = 0\n        for x in xs:\n            t += x\n    return x * 100 + t\n";
        assert!(rewrite(nested_sum, MutationKind::AccumulationToSum).is_none());

        let nested_append = "def f(xs):\n    x = 0\n    while x == 0:\n        out = []\n        for x in xs:\n            out.append(x)\n        x = x + 1\n    return out\n";
        assert!(rewrite(nested_append, MutationKind::AppendToComprehension).is_none());

        // A loop variable only used inside the loop is still rewritten.
        let local = "def f(xs):\n    if True:\n        t = 0\n        for x in xs:\n            t += x\n        return t\n    return 0\n";
        assert_eq!(
            rewrite(local, MutationKind::AccumulationToSum).unwrap(),
            "def f(xs):\n    if True:\n        t = sum(xs)\n        return t\n    return 0\n"
        );
    }

    #[test]
    fn test_append_to_comprehension() {
        let source = "def f(xs):\n    out = []\n    for x in xs:\n        if x % 2 == 0:\n            out.append(x * x)\n    return out\n";
        assert_eq!(
            rewrite(source, MutationKind::AppendToComprehension).unwrap(),
            "def f(xs):\n    out = [x * x for x in xs if x % 2 == 0]\n    return out\n"
        );
        let prefilled = "def f(xs):\n    out = [1]\n    for x in xs:\n        out.append(x)\n    return out\n";
        assert!(rewrite(prefilled, MutationKind::AppendToComprehension).is_none());
    }

    #[test]
    fn test_hoist_len() {
        let source = "def f(xs):\n    i = 0\n    while i < len(xs):\n        i += 1\n    return i\n";
        assert_eq!(
            rewrite(source, MutationKind::HoistLen).unwrap(),
            "def f(xs):\n    i = 0\n    n_xs = len(xs)\n    while i < n_xs:\n        i += 1\n    return i\n"
        );
    }

    #[test]
    fn test_hoist_len_guards() {
        let growing = "def f(xs):\n    i = 0\n    while i < len(xs):\n        xs.append(i)\n        i += 1\n    return i\n";
        assert!(rewrite(growing, MutationKind::HoistLen).is_none());
        let rebinding = "def f(xs):\n    while len(xs) > 0:\n        xs = xs[1]\n    return xs\n";
        assert!(rewrite(rebinding, MutationKind::HoistLen).is_none());
        let opaque = "def g(ys):\n    return 0\ndef f(xs):\n    i = 0\n    while i < len(xs):\n        i += g(xs) + 1\n    return i\n";
        assert!(rewrite(opaque, MutationKind::HoistLen).is_none());
    }

    #[test]
    fn test_hoist_len_skips_short_circuited_calls() {
        let guarded = "def f(x):\n    i = 0\n    while i < 0 and i < len(x):\n        i += 1\n    return i\n";
        assert!(rewrite(guarded, MutationKind::HoistLen).is_none());

        let tree = parse(guarded).unwrap();
        let args = [crate::interp::Datum::Int(5)];
        let run = crate::interp::run_function(&tree, "f", &args, crate::interp::Budget::with_fuel(1_000)).unwrap();
        assert_eq!(run.value, crate::interp::Datum::Int(0));

        let leading = "def f(xs):\n    i = 0\n    while i < len(xs) and i < 10:\n        i += 1\n    return i\n";
        assert_eq!(
            rewrite(leading, MutationKind::HoistLen).unwrap(),
            "def f(xs):\n    i = 0\n    n_xs = len(xs)\n    while i < n_xs and i < 10:\n        i += 1\n    return i\n"
        );
    }

    #[test]
    fn test_hoisted_name_avoids_collisions() {
        let source = "def f(xs):\n    n_xs = 1\n    i = 0\n    while i < len(xs):\n        i += n_xs\n    return i\n";
        let out = rewrite(source, MutationKind::HoistLen).unwrap();
        assert!(out.contains("n_xs2 = len(xs)"));
        assert!(out.contains("while i < n_xs2:"));
    }

    #[test]
    fn test_rewrites_preserve_behaviour() {
        let source = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";
        let before = parse(source).unwrap();
        let after = parse(&rewrite(source, MutationKind::AccumulationToSum).unwrap()).unwrap();
        let args = [crate::interp::Datum::List(vec![
            crate::interp::Datum::Int(3),
            crate::interp::Datum::Int(-1),
            crate::interp::Datum::Int(9),
        ])];
        let budget = || crate::interp::Budget::with_fuel(10_000);
        let a = crate::interp::run_function(&before, "f", &args, budget()).unwrap();
        let b = crate::interp::run_function(&after, "f", &args, budget()).unwrap();
        assert_eq!(a.value, b.value);
        assert!(b.fuel_used < a.fuel_used);
    }
}
