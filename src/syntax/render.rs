//! Canonical source rendering.
//!
//! Output uses four-space indentation and the minimum parentheses the
//! operator precedences require, so `parse(render(tree))` reproduces the
//! tree's structure.

use crate::syntax::tree::{
    BinaryOp, BoolOp, ComprehensionKind, Ix, Literal, NodeKind, SyntaxTree, UnaryOp,
};
use std::fmt::Write;

const INDENT: &str = "    ";

// Binding strength, loosest first.
const PREC_GENERATOR: u8 = 0;
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_POW: u8 = 8;
const PREC_ATOM: u8 = 9;

/// Render a tree as source text.
pub(crate) fn render_tree(tree: &SyntaxTree) -> String {
    let mut out = String::new();
    if let NodeKind::Module { body } = tree.kind(tree.root_ix()) {
        for &stmt in body {
            statement(tree, stmt, 0, &mut out);
        }
    }
    out
}

fn line(out: &mut String, level: usize, text: &str) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn block(tree: &SyntaxTree, body: &[Ix], level: usize, out: &mut String) {
    if body.is_empty() {
        line(out, level, "pass");
    }
    for &stmt in body {
        statement(tree, stmt, level, out);
    }
}

fn statement(tree: &SyntaxTree, ix: Ix, level: usize, out: &mut String) {
    match tree.kind(ix) {
        NodeKind::FunctionDef { name, params, body } => {
            line(out, level, &format!("def {name}({}):", params.join(", ")));
            block(tree, body, level + 1, out);
        }
        NodeKind::Return { value: None } => line(out, level, "return"),
        NodeKind::Return { value: Some(value) } => {
            line(out, level, &format!("return {}", expr(tree, *value, PREC_OR)));
        }
        NodeKind::Assign { target, value } => line(
            out,
            level,
            &format!(
                "{} = {}",
                expr(tree, *target, PREC_OR),
                expr(tree, *value, PREC_OR)
            ),
        ),
        NodeKind::AugAssign { target, op, value } => line(
            out,
            level,
            &format!(
                "{} {}= {}",
                expr(tree, *target, PREC_OR),
                op.symbol(),
                expr(tree, *value, PREC_OR)
            ),
        ),
        NodeKind::For { var, iter, body } => {
            line(out, level, &format!("for {var} in {}:", expr(tree, *iter, PREC_OR)));
            block(tree, body, level + 1, out);
        }
        NodeKind::While { test, body } => {
            line(out, level, &format!("while {}:", expr(tree, *test, PREC_OR)));
            block(tree, body, level + 1, out);
        }
        NodeKind::If { .. } => if_chain(tree, ix, level, "if", out),
        NodeKind::Expr { value } => line(out, level, &expr(tree, *value, PREC_OR)),
        NodeKind::Pass => line(out, level, "pass"),
        NodeKind::Break => line(out, level, "break"),
        NodeKind::Continue => line(out, level, "continue"),
        // Expressions never sit in statement position in a parsed tree.
        _ => line(out, level, &expr(tree, ix, PREC_OR)),
    }
}

fn if_chain(tree: &SyntaxTree, ix: Ix, level: usize, keyword: &str, out: &mut String) {
    let NodeKind::If { test, body, orelse } = tree.kind(ix) else {
        return;
    };
    line(out, level, &format!("{keyword} {}:", expr(tree, *test, PREC_OR)));
    block(tree, body, level + 1, out);
    match orelse.as_slice() {
        [] => {}
        [single] if matches!(tree.kind(*single), NodeKind::If { .. }) => {
            if_chain(tree, *single, level, "elif", out);
        }
        rest => {
            line(out, level, "else:");
            block(tree, rest, level + 1, out);
        }
    }
}

fn expr(tree: &SyntaxTree, ix: Ix, min_prec: u8) -> String {
    let mut out = String::new();
    expression(tree, ix, min_prec, &mut out);
    out
}

fn precedence(tree: &SyntaxTree, ix: Ix) -> u8 {
    match tree.kind(ix) {
        NodeKind::Bool { op: BoolOp::Or, .. } => PREC_OR,
        NodeKind::Bool { op: BoolOp::And, .. } => PREC_AND,
        NodeKind::Unary { op: UnaryOp::Not, .. } => PREC_NOT,
        NodeKind::Compare { .. } => PREC_COMPARE,
        NodeKind::Binary { op, .. } => binary_precedence(*op),
        NodeKind::Unary { .. } => PREC_UNARY,
        NodeKind::Const(Literal::Int(v)) if *v < 0 => PREC_UNARY,
        NodeKind::Const(Literal::Float(v)) if v.is_sign_negative() => PREC_UNARY,
        NodeKind::Comprehension {
            kind: ComprehensionKind::Generator,
            ..
        } => PREC_GENERATOR,
        _ => PREC_ATOM,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add | BinaryOp::Sub => PREC_ADD,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => PREC_MUL,
        BinaryOp::Pow => PREC_POW,
    }
}

fn expression(tree: &SyntaxTree, ix: Ix, min_prec: u8, out: &mut String) {
    let wrap = precedence(tree, ix) < min_prec;
    if wrap {
        out.push('(');
    }
    match tree.kind(ix) {
        NodeKind::Name(name) => out.push_str(name),
        NodeKind::Const(literal) => constant(literal, out),
        NodeKind::List(items) => {
            out.push('[');
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                expression(tree, item, PREC_OR, out);
            }
            out.push(']');
        }
        NodeKind::Comprehension {
            kind,
            elt,
            var,
            iter,
            cond,
        } => {
            if *kind == ComprehensionKind::List {
                out.push('[');
            }
            expression(tree, *elt, PREC_OR, out);
            let _ = write!(out, " for {var} in ");
            expression(tree, *iter, PREC_OR, out);
            if let Some(cond) = cond {
                out.push_str(" if ");
                expression(tree, *cond, PREC_OR, out);
            }
            if *kind == ComprehensionKind::List {
                out.push(']');
            }
        }
        NodeKind::Binary { op, left, right } => {
            let prec = binary_precedence(*op);
            let (left_min, right_min) = if *op == BinaryOp::Pow {
                (PREC_ATOM, PREC_UNARY)
            } else {
                (prec, prec + 1)
            };
            expression(tree, *left, left_min, out);
            let _ = write!(out, " {} ", op.symbol());
            expression(tree, *right, right_min, out);
        }
        NodeKind::Unary { op, operand } => match op {
            UnaryOp::Not => {
                out.push_str("not ");
                expression(tree, *operand, PREC_NOT, out);
            }
            UnaryOp::Neg | UnaryOp::Pos => {
                out.push(if *op == UnaryOp::Neg { '-' } else { '+' });
                expression(tree, *operand, PREC_UNARY, out);
            }
        },
        NodeKind::Bool { op, left, right } => {
            let (prec, word) = match op {
                BoolOp::Or => (PREC_OR, "or"),
                BoolOp::And => (PREC_AND, "and"),
            };
            expression(tree, *left, prec, out);
            let _ = write!(out, " {word} ");
            expression(tree, *right, prec + 1, out);
        }
        NodeKind::Compare { op, left, right } => {
            expression(tree, *left, PREC_COMPARE + 1, out);
            let _ = write!(out, " {} ", op.symbol());
            expression(tree, *right, PREC_COMPARE + 1, out);
        }
        NodeKind::Call { func, args } => {
            expression(tree, *func, PREC_ATOM, out);
            out.push('(');
            let sole_generator = args.len() == 1
                && matches!(
                    tree.kind(args[0]),
                    NodeKind::Comprehension {
                        kind: ComprehensionKind::Generator,
                        ..
                    }
                );
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let min = if sole_generator { PREC_GENERATOR } else { PREC_OR };
                expression(tree, arg, min, out);
            }
            out.push(')');
        }
        NodeKind::Attribute { value, attr } => {
            expression(tree, *value, PREC_ATOM, out);
            let _ = write!(out, ".{attr}");
        }
        NodeKind::Subscript { value, index } => {
            expression(tree, *value, PREC_ATOM, out);
            out.push('[');
            expression(tree, *index, PREC_OR, out);
            out.push(']');
        }
        // Statements never sit in expression position in a parsed tree.
        _ => {}
    }
    if wrap {
        out.push(')');
    }
}

fn constant(literal: &Literal, out: &mut String) {
    match literal {
        Literal::None => out.push_str("None"),
        Literal::Bool(true) => out.push_str("True"),
        Literal::Bool(false) => out.push_str("False"),
        Literal::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Literal::Float(v) => {
            let _ = write!(out, "{v:?}");
        }
        Literal::Str(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    '\0' => out.push_str("\\0"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::{parse, render};

    fn canonical(source: &str) -> String {
        render(&parse(source).unwrap())
    }

    #[test]
    fn test_render_seed_program() {
        let out = canonical("def f(xs):\n total=0\n for x in xs: total+=x\n return total");
        assert_eq!(
            out,
            "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n"
        );
    }

    #[test]
    fn test_render_minimal_parentheses() {
        assert_eq!(canonical("x = (1 + 2) * 3\n"), "x = (1 + 2) * 3\n");
        assert_eq!(canonical("x = 1 + (2 * 3)\n"), "x = 1 + 2 * 3\n");
        assert_eq!(canonical("x = a - (b - c)\n"), "x = a - (b - c)\n");
        assert_eq!(canonical("x = (a - b) - c\n"), "x = a - b - c\n");
        assert_eq!(canonical("x = (-2) ** 2\n"), "x = (-2) ** 2\n");
        assert_eq!(canonical("x = 2 ** -1\n"), "x = 2 ** -1\n");
        assert_eq!(canonical("x = not (a and b)\n"), "x = not (a and b)\n");
        assert_eq!(canonical("x = (a < b) == c\n"), "x = (a < b) == c\n");
    }

    #[test]
    fn test_render_generators() {
        assert_eq!(canonical("s = sum((x for x in xs))\n"), "s = sum(x for x in xs)\n");
        assert_eq!(canonical("s = max((x for x in xs), 0)\n"), "s = max((x for x in xs), 0)\n");
        assert_eq!(
            canonical("s = [x for x in xs if x % 2 == 0]\n"),
            "s = [x for x in xs if x % 2 == 0]\n"
        );
    }

    #[test]
    fn test_render_elif_and_strings() {
        let source = "if a:\n    s = 'it\\'s'\nelif b:\n    pass\nelse:\n    s = \"q\\\"\"\n";
        assert_eq!(
            canonical(source),
            "if a:\n    s = \"it's\"\nelif b:\n    pass\nelse:\n    s = \"q\\\"\"\n"
        );
    }

    #[test]
    fn test_render_is_fixed_point() {
        let source = "def g(a, b):\n    while a < len(b) and not b[a] in [1, 2.5, None]:\n        a += 1\n    return -a ** 2\n";
        let once = canonical(source);
        assert_eq!(canonical(&once), once);
    }
}
