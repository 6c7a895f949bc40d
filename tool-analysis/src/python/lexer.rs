//! Tokenizer producing Python's logical-line token stream.
//!
//! Comments and string bodies are dropped, except f-string replacement
//! fields, which are tokenized and attached to their string token. Brackets
//! suppress newlines; indentation changes become `Indent`/`Dedent` tokens.

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Name,
    Number,
    Str,
    Op,
    Newline,
    Indent,
    Dedent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    /// Expressions of an f-string's replacement fields, one entry per field.
    pub fields: Vec<Vec<Token>>,
}

impl Token {
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }
}

/// Syntax error with a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn at(token: &Token, message: impl Into<String>) -> Self {
        Self::new(token.line, token.column, message)
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Syntax error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

const THREE_CHAR_OPS: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const TWO_CHAR_OPS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "->", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "<<", ">>", ":=", "@=",
];
const ONE_CHAR_OPS: &str = "+-*/%@&|^~<>=.,:;";
const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];
const TAB_STOP: usize = 8;

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let normalized = source.replace("\r\n", "\n").replace('\r', "\n");
    Lexer::new(&normalized).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    line_start: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: Vec<(char, usize, usize)>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            line_start: 0,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn column(&self) -> usize {
        self.pos - self.line_start + 1
    }

    fn advance_line(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            text: text.into(),
            line,
            column,
            fields: Vec::new(),
        });
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.brackets.is_empty() {
                at_line_start = false;
                if !self.indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let Some(c) = self.peek() else { break };
            let (line, column) = (self.line, self.column());
            match c {
                '\n' => {
                    if self.brackets.is_empty() {
                        self.push(TokenKind::Newline, "", line, column);
                        at_line_start = true;
                    }
                    self.advance_line();
                }
                ' ' | '\t' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos += 1;
                        self.advance_line();
                    } else {
                        return Err(SyntaxError::new(
                            line,
                            column,
                            "unexpected character after line continuation character",
                        ));
                    }
                }
                '\'' | '"' => self.string(line, column, false)?,
                c if c.is_alphabetic() || c == '_' => self.name(line, column)?,
                c if c.is_ascii_digit() => self.number(line, column),
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => {
                    self.number(line, column);
                }
                '(' | '[' | '{' => {
                    self.brackets.push((c, line, column));
                    self.pos += 1;
                    self.push(TokenKind::Op, c, line, column);
                }
                ')' | ']' | '}' => {
                    self.close_bracket(c, line, column)?;
                    self.pos += 1;
                    self.push(TokenKind::Op, c, line, column);
                }
                _ => self.operator(line, column)?,
            }
        }

        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(SyntaxError::new(
                line,
                column,
                format!("'{open}' was never closed"),
            ));
        }
        let (line, column) = (self.line, self.column());
        if self
            .tokens
            .last()
            .is_some_and(|token| token.kind != TokenKind::Newline)
        {
            self.push(TokenKind::Newline, "", line, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, "", line, column);
        }
        Ok(self.tokens)
    }

    /// Measures leading whitespace. Returns `false` for blank and
    /// comment-only lines, which are consumed whole.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_STOP + 1) * TAB_STOP,
                '\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None => return Ok(false),
            Some('#') => self.skip_comment(),
            Some('\n') => {}
            Some(_) => {
                self.apply_indent(width)?;
                return Ok(true);
            }
        }
        if self.peek() == Some('\n') {
            self.advance_line();
        }
        Ok(false)
    }

    fn apply_indent(&mut self, width: usize) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column());
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, "", line, column);
            return Ok(());
        }
        while self.indents.last().is_some_and(|&level| level > width) {
            self.indents.pop();
            self.push(TokenKind::Dedent, "", line, column);
        }
        if self.indents.last().copied().unwrap_or(0) != width {
            return Err(SyntaxError::new(
                line,
                column,
                "unindent does not match any outer indentation level",
            ));
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    fn name(&mut self, line: usize, column: usize) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let prefix = text.to_ascii_lowercase();
        if matches!(self.peek(), Some('\'' | '"')) && STRING_PREFIXES.contains(&prefix.as_str()) {
            return self.string(line, column, prefix.contains('f'));
        }
        self.push(TokenKind::Name, text, line, column);
        Ok(())
    }

    fn number(&mut self, line: usize, column: usize) {
        let start = self.pos;
        let hex = self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        while let Some(c) = self.peek() {
            let after_exponent = !hex
                && self.pos > start
                && matches!(self.chars[self.pos - 1], 'e' | 'E')
                && matches!(c, '+' | '-');
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || after_exponent {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::Number, text, line, column);
    }

    /// Consumes a string literal whose opening quote is at `self.pos`.
    fn string(&mut self, line: usize, column: usize, formatted: bool) -> Result<(), SyntaxError> {
        let Some(quote) = self.peek() else {
            return Err(SyntaxError::new(line, column, "unexpected end of input"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut fields = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(SyntaxError::new(line, column, message));
            };
            match c {
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some('\n') => self.advance_line(),
                        Some(_) => self.pos += 1,
                        None => {}
                    }
                }
                '\n' if !triple => {
                    return Err(SyntaxError::new(
                        line,
                        column,
                        "unterminated string literal",
                    ));
                }
                '\n' => self.advance_line(),
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                '{' if formatted && self.peek_at(1) == Some('{') => self.pos += 2,
                '{' if formatted => {
                    let (field_line, field_column) = (self.line, self.column());
                    let expression = self.replacement_field(quote, triple);
                    fields.push(embedded(&expression, field_line, field_column));
                }
                _ => self.pos += 1,
            }
        }
        self.push(TokenKind::Str, "", line, column);
        if let Some(token) = self.tokens.last_mut() {
            token.fields = fields;
        }
        Ok(())
    }

    /// Consumes one f-string replacement field starting at its `{` and
    /// returns the expression, without conversion or format spec.
    ///
    /// Stops short, leaving the position on the offending character, at the
    /// end of the enclosing string so that `string` reports it.
    fn replacement_field(&mut self, quote: char, triple: bool) -> String {
        self.pos += 1;
        let mut expression = String::new();
        let mut depth = 0usize;
        let mut inner: Option<char> = None;
        let mut in_spec = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                if !triple {
                    break;
                }
                if !in_spec {
                    expression.push(' ');
                }
                self.advance_line();
                continue;
            }
            let closes_string = c == quote
                && (!triple || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote)));
            if let Some(open) = inner {
                if c == open {
                    inner = None;
                } else if closes_string {
                    break;
                }
                expression.push(c);
                self.pos += 1;
                continue;
            }
            if closes_string {
                break;
            }
            if in_spec {
                match c {
                    '{' => depth += 1,
                    '}' if depth == 0 => {
                        self.pos += 1;
                        break;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
                self.pos += 1;
                continue;
            }
            match c {
                '}' if depth == 0 => {
                    self.pos += 1;
                    break;
                }
                '!' if depth == 0 && self.peek_at(1) != Some('=') => in_spec = true,
                ':' if depth == 0 => in_spec = true,
                _ => {
                    match c {
                        '\'' | '"' => inner = Some(c),
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    expression.push(c);
                }
            }
            self.pos += 1;
        }
        expression
    }

    fn close_bracket(&mut self, close: char, line: usize, column: usize) -> Result<(), SyntaxError> {
        let expected = match close {
            ')' => '(',
            ']' => '[',
            _ => '{',
        };
        match self.brackets.pop() {
            Some((open, _, _)) if open == expected => Ok(()),
            Some((open, _, _)) => Err(SyntaxError::new(
                line,
                column,
                format!("closing parenthesis '{close}' does not match opening parenthesis '{open}'"),
            )),
            None => Err(SyntaxError::new(line, column, format!("unmatched '{close}'"))),
        }
    }

    fn operator(&mut self, line: usize, column: usize) -> Result<(), SyntaxError> {
        let rest: String = self.chars[self.pos..self.chars.len().min(self.pos + 3)]
            .iter()
            .collect();
        let matched = THREE_CHAR_OPS
            .iter()
            .chain(TWO_CHAR_OPS)
            .find(|op| rest.starts_with(**op))
            .map(|op| (*op).to_owned())
            .or_else(|| {
                rest.chars()
                    .next()
                    .filter(|c| ONE_CHAR_OPS.contains(*c))
                    .map(String::from)
            });
        match matched {
            Some(op) => {
                self.pos += op.chars().count();
                self.push(TokenKind::Op, op, line, column);
                Ok(())
            }
            None => {
                let c = rest.chars().next().unwrap_or('?');
                Err(SyntaxError::new(
                    line,
                    column,
                    format!("invalid character '{c}'"),
                ))
            }
        }
    }
}

/// Tokens of one replacement-field expression, positioned inside the
/// enclosing string. Fields that do not tokenize yield no tokens.
fn embedded(expression: &str, line: usize, column: usize) -> Vec<Token> {
    let Ok(tokens) = tokenize(&format!("({expression})")) else {
        return Vec::new();
    };
    let inner = tokens
        .len()
        .checked_sub(2)
        .map_or(&[][..], |end| &tokens[1..end]);
    inner
        .iter()
        .filter(|token| token.kind != TokenKind::Newline)
        .cloned()
        .map(|mut token| {
            if token.line == 1 {
                token.column = column + token.column - 1;
            }
            token.line = line + token.line - 1;
            token
        })
        .collect()
}
