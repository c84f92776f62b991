//! Tokenizer with Python-style indentation tracking.

use crate::error::ParseError;

/// Token payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Keyword or operator spelling.
    Sym(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) tok: Tok,
    pub(crate) line: usize,
    pub(crate) column: usize,
}

const KEYWORDS: &[&str] = &[
    "def", "return", "if", "elif", "else", "while", "for", "in", "not", "and", "or", "pass",
    "break", "continue", "True", "False", "None", "class", "import", "from", "lambda", "is",
    "with", "try", "except", "yield", "global", "del", "assert", "raise",
];

// Longest spellings first so that `//=` wins over `//` and `/`.
const OPERATORS: &[&str] = &[
    "//=", "**", "//", "+=", "-=", "*=", "/=", "%=", "==", "!=", "<=", ">=", "->", "+", "-", "*",
    "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

const TAB_WIDTH: usize = 8;

/// Split source text into tokens, emitting `Indent`/`Dedent` around blocks.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    indents: Vec<usize>,
    depth: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            indents: vec![0],
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, self.column(), message)
    }

    fn push(&mut self, tok: Tok, column: usize) {
        self.tokens.push(Token {
            tok,
            line: self.line,
            column,
        });
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let Some(c) = self.peek(0) else { break };
            match c {
                '\n' => {
                    self.newline();
                    at_line_start = self.depth == 0;
                }
                '\r' | ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                    self.line_start = self.pos;
                }
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                '"' | '\'' => self.string(c)?,
                _ => self.operator()?,
            }
        }
        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Dedent))
        {
            let column = self.column();
            self.push(Tok::Newline, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent, 1);
        }
        let column = self.column();
        self.push(Tok::Eof, column);
        Ok(self.tokens)
    }

    /// Measure leading whitespace. Returns `true` when the line was blank or
    /// comment-only and has been consumed.
    fn indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                self.line_start = self.pos;
                return Ok(true);
            }
            Some('\r') if self.peek(1) == Some('\n') => {
                self.pos += 2;
                self.line += 1;
                self.line_start = self.pos;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek(0) == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                    self.line_start = self.pos;
                }
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent, 1);
        } else {
            while width < self.indents.last().copied().unwrap_or(0) {
                self.indents.pop();
                self.push(Tok::Dedent, 1);
            }
            if width != self.indents.last().copied().unwrap_or(0) {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn newline(&mut self) {
        if self.depth == 0
            && self
                .tokens
                .last()
                .is_some_and(|t| !matches!(t.tok, Tok::Newline | Tok::Indent | Tok::Dedent))
        {
            let column = self.column();
            self.push(Tok::Newline, column);
        }
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;
    }

    fn skip_comment(&mut self) {
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let column = self.column();
        let start = self.pos;
        let mut is_float = false;
        let digits = |lexer: &mut Self| {
            while lexer
                .peek(0)
                .is_some_and(|c| c.is_ascii_digit() || c == '_')
            {
                lexer.pos += 1;
            }
        };
        digits(self);
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            digits(self);
        } else if self.peek(0) == Some('.') && !self.peek(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
            // `1.` is a float; `1.real` is attribute access.
            is_float = true;
            self.pos += 1;
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                digits(self);
            }
        }
        if self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error("invalid number literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let tok = if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::new(self.line, column, "invalid float literal"))?;
            if !value.is_finite() {
                return Err(ParseError::new(self.line, column, "float literal out of range"));
            }
            Tok::Float(value)
        } else {
            Tok::Int(
                text.parse()
                    .map_err(|_| ParseError::new(self.line, column, "integer literal too large"))?,
            )
        };
        self.push(tok, column);
        Ok(())
    }

    fn word(&mut self) {
        let column = self.column();
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        let tok = match KEYWORDS.iter().find(|&&k| k == word) {
            Some(keyword) => Tok::Sym(*keyword),
            None => Tok::Name(word),
        };
        self.push(tok, column);
    }

    fn string(&mut self, quote: char) -> Result<(), ParseError> {
        let column = self.column();
        if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
            return Err(self.error("triple-quoted strings are not supported"));
        }
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    let escaped = match self.peek(1) {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(c @ ('\\' | '\'' | '"')) => c,
                        _ => return Err(self.error("unsupported escape sequence")),
                    };
                    out.push(escaped);
                    self.pos += 2;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        self.push(Tok::Str(out), column);
        Ok(())
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        let column = self.column();
        let op = OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, c)| self.peek(i) == Some(c))
        });
        let Some(op) = op else {
            return Err(self.error(format!(
                "unexpected character {:?}",
                self.peek(0).unwrap_or(' ')
            )));
        };
        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(Tok::Sym(op), column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_indent_dedent() {
        let toks = kinds("if x:\n  y = 1\nz = 2\n");
        assert_eq!(
            toks,
            vec![
                Tok::Sym("if"),
                Tok::Name("x".into()),
                Tok::Sym(":"),
                Tok::Newline,
                Tok::Indent,
                Tok::Name("y".into()),
                Tok::Sym("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Dedent,
                Tok::Name("z".into()),
                Tok::Sym("="),
                Tok::Int(2),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_blank_lines_and_comments_ignored() {
        let toks = kinds("# header\n\nx = 1  # trailing\n\n   \n");
        assert_eq!(
            toks,
            vec![
                Tok::Name("x".into()),
                Tok::Sym("="),
                Tok::Int(1),
                Tok::Newline,
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_brackets_join_lines() {
        let toks = kinds("x = [1,\n     2]\n");
        assert!(!toks[..toks.len() - 2].contains(&Tok::Newline));
    }

    #[test]
    fn test_numbers_and_operators() {
        let toks = kinds("a //= 1_000 ** 2.5e1\n");
        assert_eq!(
            toks[..5],
            [
                Tok::Name("a".into()),
                Tok::Sym("//="),
                Tok::Int(1000),
                Tok::Sym("**"),
                Tok::Float(25.0),
            ]
        );
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_missing_trailing_newline_closes_blocks() {
        let toks = kinds("def f():\n    return 1");
        assert_eq!(&toks[toks.len() - 3..], &[Tok::Newline, Tok::Dedent, Tok::Eof]);
    }
}
