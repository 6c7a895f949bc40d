//! Statement tree built from the token stream.
//!
//! Only block structure and statement heads are checked; expressions stay
//! as flat token runs.

use super::lexer::{SyntaxError, Token, TokenKind};

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "try", "except", "finally", "with", "def", "class",
];
const SOFT_COMPOUND_KEYWORDS: &[&str] = &["match", "case"];

#[derive(Debug, Clone)]
pub(crate) struct Statement {
    /// Whole statement for simple statements; the header before `:` for
    /// compound ones.
    pub tokens: Vec<Token>,
    /// Suite of a compound statement.
    pub body: Vec<Statement>,
}

impl Statement {
    pub fn line(&self) -> usize {
        self.tokens.first().map_or(0, |token| token.line)
    }

    /// Leading keyword, looking through `async`.
    pub fn keyword(&self) -> Option<&str> {
        let first = self.tokens.first()?;
        let head = if first.is_name("async") {
            self.tokens.get(1)?
        } else {
            first
        };
        (head.kind == TokenKind::Name).then_some(head.text.as_str())
    }

    /// Name declared by a `def` or `class` statement.
    pub fn declared_name(&self) -> Option<&str> {
        let offset = usize::from(self.tokens.first()?.is_name("async"));
        let name = self.tokens.get(offset + 1)?;
        (name.kind == TokenKind::Name).then_some(name.text.as_str())
    }
}

pub(crate) fn parse(tokens: &[Token]) -> Result<Vec<Statement>, SyntaxError> {
    Parser { tokens, pos: 0 }.block(false)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn block(&mut self, nested: bool) -> Result<Vec<Statement>, SyntaxError> {
        let mut statements = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Dedent if nested => {
                    self.pos += 1;
                    return Ok(statements);
                }
                TokenKind::Dedent => return Err(SyntaxError::at(token, "unexpected unindent")),
                TokenKind::Indent => return Err(SyntaxError::at(token, "unexpected indent")),
                TokenKind::Newline => self.pos += 1,
                _ => self.logical_line(&mut statements)?,
            }
        }
        Ok(statements)
    }

    fn logical_line(&mut self, out: &mut Vec<Statement>) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|token| token.kind != TokenKind::Newline)
        {
            self.pos += 1;
        }
        let line = &self.tokens[start..self.pos];
        self.pos += 1;

        if is_compound(line) {
            let statement = self.compound(line)?;
            out.push(statement);
        } else {
            out.extend(simple_statements(line)?);
        }
        Ok(())
    }

    fn compound(&mut self, line: &[Token]) -> Result<Statement, SyntaxError> {
        let head = &line[usize::from(line[0].is_name("async"))];
        let keyword = head.text.as_str();
        let Some(colon) = header_colon(line) else {
            let last = line.last().unwrap_or(head);
            return Err(SyntaxError::at(last, "expected ':'"));
        };
        let header = &line[..colon];
        check_header(keyword, header)?;

        let rest = &line[colon + 1..];
        let body = if rest.is_empty() {
            match self.peek() {
                Some(token) if token.kind == TokenKind::Indent => {
                    self.pos += 1;
                    self.block(true)?
                }
                next => {
                    let (line_no, column) =
                        next.map_or((head.line + 1, 1), |token| (token.line, token.column));
                    return Err(SyntaxError::new(
                        line_no,
                        column,
                        format!(
                            "expected an indented block after '{keyword}' statement on line {}",
                            head.line
                        ),
                    ));
                }
            }
        } else {
            simple_statements(rest)?
        };

        Ok(Statement {
            tokens: header.to_vec(),
            body,
        })
    }
}

fn is_compound(line: &[Token]) -> bool {
    let Some(first) = line.first() else {
        return false;
    };
    let head = if first.is_name("async") {
        match line.get(1) {
            Some(next) => next,
            None => return false,
        }
    } else {
        first
    };
    if head.kind != TokenKind::Name {
        return false;
    }
    if COMPOUND_KEYWORDS.contains(&head.text.as_str()) {
        return true;
    }
    if SOFT_COMPOUND_KEYWORDS.contains(&head.text.as_str()) {
        let ends_with_colon = line.last().is_some_and(|token| token.is_op(":"));
        let subject_follows = line.get(1).is_some_and(|token| {
            token.kind != TokenKind::Op || ["(", "[", "{", "-", "*"].contains(&token.text.as_str())
        });
        return ends_with_colon && subject_follows && line.len() > 2;
    }
    false
}

/// Index of the `:` that ends a compound header, skipping colons that
/// belong to brackets or to `lambda` expressions.
fn header_colon(line: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    let mut lambdas = 0usize;
    for (idx, token) in line.iter().enumerate() {
        match token.kind {
            TokenKind::Op => match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                ":" if depth == 0 && lambdas > 0 => lambdas -= 1,
                ":" if depth == 0 => return Some(idx),
                _ => {}
            },
            TokenKind::Name if depth == 0 && token.text == "lambda" => lambdas += 1,
            _ => {}
        }
    }
    None
}

fn check_header(keyword: &str, header: &[Token]) -> Result<(), SyntaxError> {
    let offset = usize::from(header[0].is_name("async"));
    let after = |n: usize| header.get(offset + n);
    let invalid_at = |token: Option<&Token>| {
        let token = token.unwrap_or(&header[header.len() - 1]);
        Err(SyntaxError::at(token, "invalid syntax"))
    };
    match keyword {
        "def" => {
            let named = after(1).is_some_and(|token| token.kind == TokenKind::Name);
            let opens = after(2).is_some_and(|token| token.is_op("(") || token.is_op("["));
            if !named {
                return invalid_at(after(1));
            }
            if !opens {
                return invalid_at(after(2));
            }
        }
        "class" => {
            if !after(1).is_some_and(|token| token.kind == TokenKind::Name) {
                return invalid_at(after(1));
            }
        }
        "else" | "try" | "finally" => {
            if header.len() > offset + 1 {
                return invalid_at(after(1));
            }
        }
        "if" | "elif" | "while" | "with" => {
            if header.len() < offset + 2 {
                return invalid_at(after(1));
            }
        }
        "for" => {
            if !header.iter().any(|token| token.is_name("in")) || header.len() < offset + 4 {
                return invalid_at(after(1));
            }
        }
        _ => {}
    }
    Ok(())
}

fn simple_statements(tokens: &[Token]) -> Result<Vec<Statement>, SyntaxError> {
    let mut statements = Vec::new();
    let segments: Vec<&[Token]> = tokens.split(|token| token.is_op(";")).collect();
    let last = segments.len().saturating_sub(1);
    for (idx, segment) in segments.into_iter().enumerate() {
        if segment.is_empty() {
            if idx == last && idx > 0 {
                continue;
            }
            let anchor = tokens.iter().find(|token| token.is_op(";")).or(tokens.first());
            return Err(match anchor {
                Some(token) => SyntaxError::at(token, "invalid syntax"),
                None => SyntaxError::new(0, 0, "invalid syntax"),
            });
        }
        check_simple(segment)?;
        statements.push(Statement {
            tokens: segment.to_vec(),
            body: Vec::new(),
        });
    }
    Ok(statements)
}

fn check_simple(segment: &[Token]) -> Result<(), SyntaxError> {
    let first = &segment[0];
    if first.kind == TokenKind::Name && COMPOUND_KEYWORDS.contains(&first.text.as_str()) {
        return Err(SyntaxError::at(first, "invalid syntax"));
    }
    if first.is_name("import") {
        match segment.get(1) {
            Some(token) if token.kind == TokenKind::Name => {}
            other => return Err(SyntaxError::at(other.unwrap_or(first), "invalid syntax")),
        }
    }
    if first.is_name("from") {
        let Some(import_at) = segment.iter().position(|token| token.is_name("import")) else {
            let last = segment.last().unwrap_or(first);
            return Err(SyntaxError::at(last, "invalid syntax"));
        };
        let module_ok = import_at > 1
            && segment[1..import_at].iter().all(|token| {
                token.kind == TokenKind::Name || token.is_op(".") || token.is_op("...")
            });
        if !module_ok || import_at + 1 >= segment.len() {
            return Err(SyntaxError::at(
                segment.get(import_at).unwrap_or(first),
                "invalid syntax",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn tree(source: &str) -> Result<Vec<Statement>, SyntaxError> {
        parse(&tokenize(source)?)
    }

    #[test]
    fn nests_suites() {
        let statements = tree("def f(n):\n    for i in n:\n        pass\nx = 1\n").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].keyword(), Some("def"));
        assert_eq!(statements[0].declared_name(), Some("f"));
        assert_eq!(statements[0].body[0].keyword(), Some("for"));
        assert_eq!(statements[0].body[0].body.len(), 1);
    }

    #[test]
    fn inline_suites_and_semicolons() {
        let statements = tree("def f(n): return f(n - 1)\na = 1; b = 2\n").unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].body.len(), 1);
        assert_eq!(statements[0].body[0].keyword(), Some("return"));
    }

    #[test]
    fn lambda_and_slice_colons_are_not_headers() {
        let statements = tree("if (lambda: x)() and y[1:2]:\n    pass\n").unwrap();
        assert_eq!(statements[0].body.len(), 1);
    }

    #[test]
    fn missing_colon_is_reported() {
        let err = tree("def f(x)\n    return x\n").unwrap_err();
        assert_eq!(err.message, "expected ':'");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn missing_block_is_reported() {
        let err = tree("if x:\ny = 1\n").unwrap_err();
        assert!(err.message.starts_with("expected an indented block after 'if'"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unexpected_indent_is_reported() {
        let err = tree("x = 1\n    y = 2\n").unwrap_err();
        assert_eq!(err.message, "unexpected indent");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn malformed_heads_are_rejected() {
        assert!(tree("def (x):\n    pass\n").is_err());
        assert!(tree("from import x\n").is_err());
        assert!(tree("import\n").is_err());
        assert!(tree("else x:\n    pass\n").is_err());
    }

    #[test]
    fn soft_keywords_stay_identifiers() {
        let statements = tree("match = 1\nmatch.group()\n").unwrap();
        assert!(statements.iter().all(|statement| statement.body.is_empty()));
        let statements = tree("match cmd:\n    case 1:\n        pass\n").unwrap();
        assert_eq!(statements[0].body[0].keyword(), Some("case"));
    }
}
