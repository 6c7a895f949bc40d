//! Python analyzer.
//!
//! Builds a statement tree, reports prohibited imports and builtin calls,
//! and estimates resources from loops, recursion and nesting.

mod lexer;
mod tree;

use std::collections::{HashMap, HashSet};

use tool_primitives::Language;
use tracing::debug;

use crate::estimate::ResourceEstimate;
use crate::finding::{Finding, line_snippet};
use crate::result::ValidationResult;
use crate::rules::AnalyzerRules;

use self::lexer::{Token, TokenKind};
use self::tree::Statement;

/// Structural analyzer for Python source.
#[derive(Debug, Clone, Default)]
pub struct PythonAnalyzer {
    rules: AnalyzerRules,
}

impl PythonAnalyzer {
    /// Creates an analyzer using the given prohibited-name tables.
    #[must_use]
    pub fn new(rules: AnalyzerRules) -> Self {
        Self { rules }
    }

    /// Analyzes `source`. A syntax error produces a single positioned error
    /// and no findings or estimate.
    #[must_use]
    pub fn analyze(&self, source: &str) -> ValidationResult {
        let mut result = ValidationResult::new(Language::Python, source);
        let statements = match lexer::tokenize(source).and_then(|tokens| tree::parse(&tokens)) {
            Ok(statements) => statements,
            Err(err) => {
                debug!(line = err.line, column = err.column, "python source failed to parse");
                result.push_error(err.to_string());
                return result;
            }
        };

        let mut walker = Walker::new(&self.rules, source);
        walker.walk(&statements, 0);
        let estimate = ResourceEstimate::from_counts(
            walker.loops,
            walker.recursive_functions(),
            walker.max_depth,
        );
        for finding in walker.findings {
            result.push_finding(finding);
        }
        result.estimate = Some(estimate);
        result
    }
}

struct Walker<'a> {
    rules: &'a AnalyzerRules,
    source: &'a str,
    findings: Vec<Finding>,
    loops: u32,
    max_depth: u32,
    declared: Vec<String>,
    call_sites: HashMap<String, u32>,
}

impl<'a> Walker<'a> {
    fn new(rules: &'a AnalyzerRules, source: &'a str) -> Self {
        Self {
            rules,
            source,
            findings: Vec::new(),
            loops: 0,
            max_depth: 0,
            declared: Vec::new(),
            call_sites: HashMap::new(),
        }
    }

    /// Declared functions whose name appears as a call site more than once.
    ///
    /// The `def` head counts as one appearance, so a function that is
    /// defined and then called once from anywhere is flagged too. This
    /// over-approximation is deliberate and shared with the JS analyzer.
    fn recursive_functions(&self) -> u32 {
        let flagged = self
            .declared
            .iter()
            .filter(|name| self.call_sites.get(name.as_str()).copied().unwrap_or(0) > 1)
            .count();
        u32::try_from(flagged).unwrap_or(u32::MAX)
    }

    fn walk(&mut self, statements: &[Statement], depth: u32) {
        for statement in statements {
            self.max_depth = self.max_depth.max(depth);
            self.visit(statement);
            self.walk(&statement.body, depth + 1);
        }
    }

    fn visit(&mut self, statement: &Statement) {
        match statement.keyword() {
            Some("import") => self.check_import(statement),
            Some("from") => self.check_from_import(statement),
            Some("for" | "while") if !statement.body.is_empty() => self.loops += 1,
            Some("def") => {
                if let Some(name) = statement.declared_name()
                    && !self.declared.iter().any(|known| known == name)
                {
                    self.declared.push(name.to_owned());
                }
            }
            _ => {}
        }
        self.check_calls(&statement.tokens);
    }

    fn check_import(&mut self, statement: &Statement) {
        let mut seen = HashSet::new();
        for (module, line) in imported_modules(&statement.tokens[1..]) {
            if self.rules.python_module_prohibited(&module) && seen.insert(module.clone()) {
                self.findings.push(
                    Finding::prohibited_import(&module).at_line(line, line_snippet(self.source, line)),
                );
            }
        }
    }

    fn check_from_import(&mut self, statement: &Statement) {
        let tokens = &statement.tokens;
        let Some(import_at) = tokens.iter().position(|token| token.is_name("import")) else {
            return;
        };
        let module_tokens = &tokens[1..import_at];
        // Relative imports resolve inside the tool's own package.
        if module_tokens
            .first()
            .is_none_or(|token| token.kind != TokenKind::Name)
        {
            return;
        }
        let module: String = module_tokens.iter().map(|token| token.text.as_str()).collect();
        if self.rules.python_module_prohibited(&module) {
            let line = statement.line();
            self.findings.push(
                Finding::prohibited_import(&module).at_line(line, line_snippet(self.source, line)),
            );
        }
    }

    fn check_calls(&mut self, tokens: &[Token]) {
        for (idx, token) in tokens.iter().enumerate() {
            for field in &token.fields {
                self.check_calls(field);
            }
            if is_call_site(tokens, idx) {
                *self.call_sites.entry(token.text.clone()).or_default() += 1;
            }
            if !is_bare_call(tokens, idx) {
                continue;
            }
            if self.rules.python_builtin_prohibited(&token.text) {
                self.findings.push(
                    Finding::prohibited_builtin(&token.text)
                        .at_line(token.line, line_snippet(self.source, token.line)),
                );
            }
        }
    }
}

/// `tokens[idx]` is a bare name followed by `(`, including `def` heads.
fn is_call_site(tokens: &[Token], idx: usize) -> bool {
    let token = &tokens[idx];
    token.kind == TokenKind::Name
        && tokens.get(idx + 1).is_some_and(|next| next.is_op("("))
        && !idx
            .checked_sub(1)
            .is_some_and(|prev| tokens[prev].is_op("."))
}

/// A call site that is an actual call rather than a `def`/`class` head.
fn is_bare_call(tokens: &[Token], idx: usize) -> bool {
    is_call_site(tokens, idx)
        && !idx
            .checked_sub(1)
            .is_some_and(|prev| tokens[prev].is_name("def") || tokens[prev].is_name("class"))
}

/// Dotted module names in the tail of an `import` statement.
fn imported_modules(tokens: &[Token]) -> Vec<(String, usize)> {
    let mut modules = Vec::new();
    let mut current = String::new();
    let mut line = 0;
    let mut aliasing = false;
    for token in tokens {
        if token.is_op(",") {
            if !current.is_empty() {
                modules.push((std::mem::take(&mut current), line));
            }
            aliasing = false;
        } else if token.is_name("as") {
            aliasing = true;
        } else if !aliasing && (token.kind == TokenKind::Name || token.is_op(".")) {
            if current.is_empty() {
                line = token.line;
            }
            current.push_str(&token.text);
        }
    }
    if !current.is_empty() {
        modules.push((current, line));
    }
    modules
}
