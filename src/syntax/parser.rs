//! Recursive-descent parser producing an arena tree.

use crate::error::ParseError;
use crate::syntax::lexer::{tokenize, Tok, Token};
use crate::syntax::tree::{
    BinaryOp, BoolOp, CmpOp, ComprehensionKind, Ix, Literal, Node, NodeKind, SyntaxTree, UnaryOp,
};

/// Maximum nesting of blocks and sub-expressions.
pub(crate) const MAX_NESTING: usize = 100;

/// Parse source text into a syntax tree.
pub(crate) fn parse_module(source: &str) -> Result<SyntaxTree, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        nodes: Vec::new(),
        depth: 0,
    };
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        if parser.eat(&Tok::Newline) {
            continue;
        }
        parser.statement(&mut body)?;
    }
    let root = parser.alloc(NodeKind::Module { body }, 1);
    Ok(SyntaxTree::from_parts(parser.nodes, root))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nodes: Vec<Node>,
    depth: usize,
}

impl Parser {
    // ---- token helpers ----

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn line(&self) -> usize {
        self.current().line
    }

    fn at(&self, tok: &Tok) -> bool {
        &self.current().tok == tok
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.current().tok, Tok::Sym(s) if s == sym)
    }

    fn peek_sym(&self, offset: usize, sym: &str) -> bool {
        matches!(
            self.tokens.get(self.pos + offset).map(|t| &t.tok),
            Some(Tok::Sym(s)) if *s == sym
        )
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.at_sym(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.current();
        ParseError::new(token.line, token.column, message)
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ParseError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{sym}', found {}", describe(&self.current().tok))))
        }
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), ParseError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", describe(&self.current().tok))))
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        match &self.current().tok {
            Tok::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", describe(other)))),
        }
    }

    fn alloc(&mut self, kind: NodeKind, line: usize) -> Ix {
        self.nodes.push(Node { kind, line });
        self.nodes.len() - 1
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            Err(self.error("nesting too deep"))
        } else {
            Ok(())
        }
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- statements ----

    /// Parse one logical statement line (which may hold several `;`-separated
    /// simple statements) and append the results to `out`.
    fn statement(&mut self, out: &mut Vec<Ix>) -> Result<(), ParseError> {
        let tok = self.current().tok.clone();
        let compound = match tok {
            Tok::Sym("def") => Some(self.function_def()?),
            Tok::Sym("if") => Some(self.if_statement()?),
            Tok::Sym("while") => Some(self.while_statement()?),
            Tok::Sym("for") => Some(self.for_statement()?),
            Tok::Sym(kw @ ("class" | "import" | "from" | "with" | "try" | "lambda" | "yield"
            | "global" | "del" | "assert" | "raise")) => {
                return Err(self.error(format!("'{kw}' is not supported")));
            }
            Tok::Indent => return Err(self.error("unexpected indent")),
            _ => None,
        };
        if let Some(stmt) = compound {
            out.push(stmt);
            return Ok(());
        }
        self.simple_statements(out)
    }

    fn simple_statements(&mut self, out: &mut Vec<Ix>) -> Result<(), ParseError> {
        loop {
            let stmt = self.simple_statement()?;
            out.push(stmt);
            if !self.eat_sym(";") || self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                break;
            }
        }
        if !self.eat(&Tok::Newline) && !self.at(&Tok::Eof) {
            return Err(self.error(format!(
                "expected end of statement, found {}",
                describe(&self.current().tok)
            )));
        }
        Ok(())
    }

    fn simple_statement(&mut self) -> Result<Ix, ParseError> {
        let line = self.line();
        if self.eat_sym("pass") {
            return Ok(self.alloc(NodeKind::Pass, line));
        }
        if self.eat_sym("break") {
            return Ok(self.alloc(NodeKind::Break, line));
        }
        if self.eat_sym("continue") {
            return Ok(self.alloc(NodeKind::Continue, line));
        }
        if self.eat_sym("return") {
            let value = if self.at(&Tok::Newline) || self.at(&Tok::Eof) || self.at_sym(";") {
                None
            } else {
                Some(self.expression()?)
            };
            return Ok(self.alloc(NodeKind::Return { value }, line));
        }

        let expr = self.expression()?;
        if self.at_sym(",") {
            return Err(self.error("tuples are not supported"));
        }
        if self.eat_sym("=") {
            self.check_target(expr)?;
            let value = self.expression()?;
            if self.at_sym("=") {
                return Err(self.error("chained assignment is not supported"));
            }
            return Ok(self.alloc(NodeKind::Assign { target: expr, value }, line));
        }
        let augmented = match self.current().tok {
            Tok::Sym("+=") => Some(BinaryOp::Add),
            Tok::Sym("-=") => Some(BinaryOp::Sub),
            Tok::Sym("*=") => Some(BinaryOp::Mul),
            Tok::Sym("/=") => Some(BinaryOp::Div),
            Tok::Sym("//=") => Some(BinaryOp::FloorDiv),
            Tok::Sym("%=") => Some(BinaryOp::Mod),
            _ => None,
        };
        if let Some(op) = augmented {
            self.advance();
            self.check_target(expr)?;
            let value = self.expression()?;
            return Ok(self.alloc(NodeKind::AugAssign { target: expr, op, value }, line));
        }
        Ok(self.alloc(NodeKind::Expr { value: expr }, line))
    }

    fn check_target(&self, target: Ix) -> Result<(), ParseError> {
        if self.nodes[target].kind.is_assignable() {
            Ok(())
        } else {
            Err(ParseError::new(
                self.nodes[target].line,
                1,
                "cannot assign to expression",
            ))
        }
    }

    /// `':' (simple_statements | NEWLINE INDENT statement+ DEDENT)`
    fn suite(&mut self) -> Result<Vec<Ix>, ParseError> {
        self.expect_sym(":")?;
        self.enter()?;
        let mut body = Vec::new();
        if self.eat(&Tok::Newline) {
            self.expect(&Tok::Indent, "an indented block")?;
            while !self.eat(&Tok::Dedent) {
                if self.at(&Tok::Eof) {
                    break;
                }
                self.statement(&mut body)?;
            }
        } else {
            self.simple_statements(&mut body)?;
        }
        self.leave();
        Ok(body)
    }

    fn function_def(&mut self) -> Result<Ix, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.name()?;
        self.expect_sym("(")?;
        let mut params = Vec::new();
        while !self.at_sym(")") {
            let param = self.name()?;
            if params.contains(&param) {
                return Err(self.error(format!("duplicate argument '{param}'")));
            }
            if self.at_sym("=") || self.at_sym(":") {
                return Err(self.error("defaults and annotations are not supported"));
            }
            params.push(param);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        let body = self.suite()?;
        Ok(self.alloc(NodeKind::FunctionDef { name, params, body }, line))
    }

    fn if_statement(&mut self) -> Result<Ix, ParseError> {
        let line = self.line();
        self.advance();
        let test = self.expression()?;
        let body = self.suite()?;
        let orelse = if self.at_sym("elif") {
            vec![self.if_statement()?]
        } else if self.eat_sym("else") {
            self.suite()?
        } else {
            Vec::new()
        };
        Ok(self.alloc(NodeKind::If { test, body, orelse }, line))
    }

    fn while_statement(&mut self) -> Result<Ix, ParseError> {
        let line = self.line();
        self.advance();
        let test = self.expression()?;
        let body = self.suite()?;
        if self.at_sym("else") {
            return Err(self.error("loop 'else' clauses are not supported"));
        }
        Ok(self.alloc(NodeKind::While { test, body }, line))
    }

    fn for_statement(&mut self) -> Result<Ix, ParseError> {
        let line = self.line();
        self.advance();
        let var = self.name()?;
        if self.at_sym(",") {
            return Err(self.error("tuple unpacking is not supported"));
        }
        self.expect_sym("in")?;
        let iter = self.expression()?;
        let body = self.suite()?;
        if self.at_sym("else") {
            return Err(self.error("loop 'else' clauses are not supported"));
        }
        Ok(self.alloc(NodeKind::For { var, iter, body }, line))
    }

    // ---- expressions, lowest precedence first ----

    fn expression(&mut self) -> Result<Ix, ParseError> {
        self.enter()?;
        let result = self.or_expr();
        self.leave();
        result
    }

    fn or_expr(&mut self) -> Result<Ix, ParseError> {
        let mut left = self.and_expr()?;
        while self.at_sym("or") {
            let line = self.line();
            self.advance();
            let right = self.and_expr()?;
            left = self.alloc(NodeKind::Bool { op: BoolOp::Or, left, right }, line);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Ix, ParseError> {
        let mut left = self.not_expr()?;
        while self.at_sym("and") {
            let line = self.line();
            self.advance();
            let right = self.not_expr()?;
            left = self.alloc(NodeKind::Bool { op: BoolOp::And, left, right }, line);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Ix, ParseError> {
        if self.at_sym("not") {
            let line = self.line();
            self.advance();
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            let operand = operand?;
            return Ok(self.alloc(NodeKind::Unary { op: UnaryOp::Not, operand }, line));
        }
        self.comparison()
    }

    fn comparison_op(&self) -> Option<(CmpOp, usize)> {
        let op = match self.current().tok {
            Tok::Sym("<") => CmpOp::Lt,
            Tok::Sym(">") => CmpOp::Gt,
            Tok::Sym("<=") => CmpOp::LtE,
            Tok::Sym(">=") => CmpOp::GtE,
            Tok::Sym("==") => CmpOp::Eq,
            Tok::Sym("!=") => CmpOp::NotEq,
            Tok::Sym("in") => CmpOp::In,
            Tok::Sym("not") if self.peek_sym(1, "in") => return Some((CmpOp::NotIn, 2)),
            _ => return None,
        };
        Some((op, 1))
    }

    fn comparison(&mut self) -> Result<Ix, ParseError> {
        let left = self.arith()?;
        let Some((op, width)) = self.comparison_op() else {
            return Ok(left);
        };
        let line = self.line();
        for _ in 0..width {
            self.advance();
        }
        let right = self.arith()?;
        if self.comparison_op().is_some() {
            return Err(self.error("chained comparisons are not supported"));
        }
        if self.at_sym("is") {
            return Err(self.error("'is' is not supported"));
        }
        Ok(self.alloc(NodeKind::Compare { op, left, right }, line))
    }

    fn arith(&mut self) -> Result<Ix, ParseError> {
        let mut left = self.term()?;
        loop {
            let op = match self.current().tok {
                Tok::Sym("+") => BinaryOp::Add,
                Tok::Sym("-") => BinaryOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.term()?;
            left = self.alloc(NodeKind::Binary { op, left, right }, line);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Ix, ParseError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.current().tok {
                Tok::Sym("*") => BinaryOp::Mul,
                Tok::Sym("/") => BinaryOp::Div,
                Tok::Sym("//") => BinaryOp::FloorDiv,
                Tok::Sym("%") => BinaryOp::Mod,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.factor()?;
            left = self.alloc(NodeKind::Binary { op, left, right }, line);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Ix, ParseError> {
        let op = match self.current().tok {
            Tok::Sym("-") => Some(UnaryOp::Neg),
            Tok::Sym("+") => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let line = self.line();
            self.advance();
            self.enter()?;
            let operand = self.factor();
            self.leave();
            let operand = operand?;
            return Ok(self.alloc(NodeKind::Unary { op, operand }, line));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Ix, ParseError> {
        let base = self.postfix()?;
        if self.at_sym("**") {
            let line = self.line();
            self.advance();
            self.enter()?;
            let exponent = self.factor();
            self.leave();
            let exponent = exponent?;
            return Ok(self.alloc(
                NodeKind::Binary {
                    op: BinaryOp::Pow,
                    left: base,
                    right: exponent,
                },
                line,
            ));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Ix, ParseError> {
        let mut value = self.atom()?;
        loop {
            let line = self.line();
            if self.eat_sym("(") {
                let args = self.call_args()?;
                value = self.alloc(NodeKind::Call { func: value, args }, line);
            } else if self.eat_sym("[") {
                if self.at_sym(":") {
                    return Err(self.error("slices are not supported"));
                }
                let index = self.expression()?;
                if self.at_sym(":") {
                    return Err(self.error("slices are not supported"));
                }
                self.expect_sym("]")?;
                value = self.alloc(NodeKind::Subscript { value, index }, line);
            } else if self.eat_sym(".") {
                let attr = self.name()?;
                value = self.alloc(NodeKind::Attribute { value, attr }, line);
            } else {
                return Ok(value);
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Ix>, ParseError> {
        let mut args = Vec::new();
        while !self.at_sym(")") {
            let arg = self.expression()?;
            if args.is_empty() && self.at_sym("for") {
                let generator = self.comprehension(arg, ComprehensionKind::Generator)?;
                self.expect_sym(")")?;
                return Ok(vec![generator]);
            }
            if self.at_sym("=") {
                return Err(self.error("keyword arguments are not supported"));
            }
            args.push(arg);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        Ok(args)
    }

    /// `for NAME in or_expr [if or_expr]`, after the element expression.
    fn comprehension(&mut self, elt: Ix, kind: ComprehensionKind) -> Result<Ix, ParseError> {
        let line = self.line();
        self.expect_sym("for")?;
        let var = self.name()?;
        if self.at_sym(",") {
            return Err(self.error("tuple unpacking is not supported"));
        }
        self.expect_sym("in")?;
        self.enter()?;
        let iter = self.or_expr();
        let iter = iter.and_then(|iter| {
            let cond = if self.eat_sym("if") {
                Some(self.or_expr()?)
            } else {
                None
            };
            Ok((iter, cond))
        });
        self.leave();
        let (iter, cond) = iter?;
        if self.at_sym("for") || self.at_sym("if") {
            return Err(self.error("only one 'for' and one 'if' clause are supported"));
        }
        Ok(self.alloc(
            NodeKind::Comprehension {
                kind,
                elt,
                var,
                iter,
                cond,
            },
            line,
        ))
    }

    fn atom(&mut self) -> Result<Ix, ParseError> {
        let token = self.advance();
        let line = token.line;
        let kind = match token.tok {
            Tok::Name(name) => NodeKind::Name(name),
            Tok::Int(value) => NodeKind::Const(Literal::Int(value)),
            Tok::Float(value) => NodeKind::Const(Literal::Float(value)),
            Tok::Str(mut value) => {
                // Adjacent string literals concatenate.
                while let Tok::Str(next) = &self.current().tok {
                    value.push_str(next);
                    self.advance();
                }
                NodeKind::Const(Literal::Str(value))
            }
            Tok::Sym("True") => NodeKind::Const(Literal::Bool(true)),
            Tok::Sym("False") => NodeKind::Const(Literal::Bool(false)),
            Tok::Sym("None") => NodeKind::Const(Literal::None),
            Tok::Sym("(") => return self.parenthesized(),
            Tok::Sym("[") => return self.list_display(line),
            Tok::Sym("lambda") => {
                return Err(ParseError::new(line, token.column, "'lambda' is not supported"));
            }
            Tok::Sym("{") => {
                return Err(ParseError::new(line, token.column, "dicts and sets are not supported"));
            }
            other => {
                return Err(ParseError::new(
                    line,
                    token.column,
                    format!("unexpected {}", describe(&other)),
                ));
            }
        };
        Ok(self.alloc(kind, line))
    }

    fn parenthesized(&mut self) -> Result<Ix, ParseError> {
        if self.at_sym(")") {
            return Err(self.error("tuples are not supported"));
        }
        let inner = self.expression()?;
        let inner = if self.at_sym("for") {
            self.comprehension(inner, ComprehensionKind::Generator)?
        } else {
            inner
        };
        if self.at_sym(",") {
            return Err(self.error("tuples are not supported"));
        }
        self.expect_sym(")")?;
        Ok(inner)
    }

    fn list_display(&mut self, line: usize) -> Result<Ix, ParseError> {
        let mut items = Vec::new();
        while !self.at_sym("]") {
            let item = self.expression()?;
            if items.is_empty() && self.at_sym("for") {
                let comprehension = self.comprehension(item, ComprehensionKind::List)?;
                self.expect_sym("]")?;
                return Ok(comprehension);
            }
            items.push(item);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym("]")?;
        Ok(self.alloc(NodeKind::List(items), line))
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Name(name) => format!("identifier '{name}'"),
        Tok::Int(value) => format!("number {value}"),
        Tok::Float(value) => format!("number {value}"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::Sym(sym) => format!("'{sym}'"),
        Tok::Newline => "end of line".to_string(),
        Tok::Indent => "indent".to_string(),
        Tok::Dedent => "dedent".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Category;

    #[test]
    fn test_parse_inline_suite() {
        let tree = parse_module("def f(xs):\n total=0\n for x in xs: total+=x\n return total").unwrap();
        assert_eq!(tree.find_nodes_by_category(Category::For).len(), 1);
        assert_eq!(tree.find_nodes_by_category(Category::AugAssign).len(), 1);
        assert_eq!(tree.function_names(), vec!["f".to_string()]);
    }

    #[test]
    fn test_parse_elif_chain() {
        let tree = parse_module("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n").unwrap();
        assert_eq!(tree.find_nodes_by_category(Category::If).len(), 2);
    }

    #[test]
    fn test_parse_comprehensions() {
        let tree = parse_module("a = [x * 2 for x in xs if x > 0]\nb = sum(x for x in xs)\nc = (y for y in a)\n").unwrap();
        assert_eq!(tree.find_nodes_by_category(Category::Comprehension).len(), 3);
    }

    #[test]
    fn test_parse_precedence() {
        let tree = parse_module("x = 1 + 2 * 3 ** -2\n").unwrap();
        let ops: Vec<_> = tree
            .find_nodes_by_category(Category::BinaryOp)
            .into_iter()
            .map(|id| tree.kind(tree.locate(id).unwrap()).clone())
            .collect();
        assert!(matches!(ops[0], NodeKind::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(ops[1], NodeKind::Binary { op: BinaryOp::Mul, .. }));
        assert!(matches!(ops[2], NodeKind::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "def f(:\n    pass\n",
            "x = = 1\n",
            "1 = x\n",
            "import os\n",
            "a < b < c\n",
            "if x:\npass\n",
            "x = (1, 2)\n",
            "f(a=1)\n",
            "a = b = 1\n",
            "x = 'unterminated\n",
        ] {
            assert!(parse_module(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_parse_error_location() {
        let err = parse_module("x = 1\ny = )\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("x = {}1{}\n", "(".repeat(150), ")".repeat(150));
        assert!(parse_module(&deep).is_err());
        let shallow = format!("x = {}1{}\n", "(".repeat(20), ")".repeat(20));
        assert!(parse_module(&shallow).is_ok());
    }

    #[test]
    fn test_empty_source() {
        let tree = parse_module("").unwrap();
        assert_eq!(tree.node_count(), 1);
    }
}
