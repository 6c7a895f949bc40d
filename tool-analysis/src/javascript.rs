//! Lexical analyzer shared by JavaScript and TypeScript.
//!
//! There is no parser here: syntax checking is bracket balance over a
//! scan that skips comments and string literals, and the security checks
//! are line-oriented pattern matches.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tool_primitives::{Language, Severity};

use crate::estimate::ResourceEstimate;
use crate::finding::{Finding, FindingKind};
use crate::result::ValidationResult;
use crate::rules::AnalyzerRules;

static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("require pattern compiles")
});
static IMPORT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+.*\s+from\s+['"]([^'"]+)['"]"#).expect("import pattern compiles")
});
static SIDE_EFFECT_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).expect("side-effect import pattern compiles")
});

static DANGEROUS_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\beval\s*\(", "eval() usage detected"),
        (r"\bFunction\s*\(", "Function constructor usage detected"),
        (r#"\bsetTimeout\s*\(\s*['"`]"#, "setTimeout with string argument"),
        (r#"\bsetInterval\s*\(\s*['"`]"#, "setInterval with string argument"),
        (r"__proto__", "Prototype pollution risk"),
        (r"constructor\s*\[", "Constructor access detected"),
    ]
    .into_iter()
    .map(|(pattern, message)| (Regex::new(pattern).expect("dangerous pattern compiles"), message))
    .collect()
});

static LOOP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\bfor\s*\(", r"\bwhile\s*\(", r"\bdo\s*\{"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("loop pattern compiles"))
        .collect()
});
static FUNCTION_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfunction\s*\*?\s*(\w+)\s*\(").expect("function pattern compiles")
});
static ARROW_DECL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>")
        .expect("arrow pattern compiles")
});

/// Lexical analyzer for JavaScript and TypeScript.
#[derive(Debug, Clone)]
pub struct JavaScriptAnalyzer {
    rules: AnalyzerRules,
    globals: Vec<(String, Regex)>,
}

impl Default for JavaScriptAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerRules::default())
    }
}

impl JavaScriptAnalyzer {
    /// Creates an analyzer using the given prohibited-name tables.
    #[must_use]
    pub fn new(rules: AnalyzerRules) -> Self {
        let globals = rules
            .js_globals()
            .filter_map(|name| {
                Regex::new(&format!(r"\b{}\b", regex::escape(name)))
                    .ok()
                    .map(|re| (name.to_owned(), re))
            })
            .collect();
        Self { rules, globals }
    }

    /// Analyzes `source` as `language` (JavaScript or TypeScript).
    #[must_use]
    pub fn analyze(&self, source: &str, language: Language) -> ValidationResult {
        let mut result = ValidationResult::new(language, source);
        let scan = Scan::run(source);
        for error in scan.balance_errors() {
            result.push_error(error);
        }

        for (idx, line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let snippet = line.trim();
            self.check_imports(line, line_no, snippet, &mut result);
            for (name, re) in &self.globals {
                if re.is_match(line) {
                    result.push_finding(
                        Finding::new(
                            Severity::Critical,
                            FindingKind::ProhibitedGlobal,
                            format!("Prohibited global usage: {name}"),
                        )
                        .with_subject(name.as_str())
                        .at_line(line_no, snippet),
                    );
                }
            }
            for (re, message) in DANGEROUS_PATTERNS.iter() {
                if re.is_match(line) {
                    result.push_finding(
                        Finding::new(Severity::Critical, FindingKind::DangerousPattern, *message)
                            .at_line(line_no, snippet),
                    );
                }
            }
        }

        result.estimate = Some(estimate(source, scan.max_depth));
        result
    }

    fn check_imports(&self, line: &str, line_no: usize, snippet: &str, result: &mut ValidationResult) {
        let specifiers = REQUIRE_RE
            .captures_iter(line)
            .chain(IMPORT_FROM_RE.captures_iter(line))
            .chain(SIDE_EFFECT_IMPORT_RE.captures_iter(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()));
        for module in specifiers {
            if self.rules.js_module_prohibited(module) {
                result.push_finding(Finding::prohibited_import(module).at_line(line_no, snippet));
            }
        }
    }
}

fn estimate(source: &str, max_depth: u32) -> ResourceEstimate {
    // Each loop kind (`for`, `while`, `do`) counts once, however often it occurs.
    let loops: u32 = LOOP_PATTERNS
        .iter()
        .map(|re| u32::from(re.is_match(source)))
        .sum();

    let mut declared: Vec<&str> = FUNCTION_DECL_RE
        .captures_iter(source)
        .chain(ARROW_DECL_RE.captures_iter(source))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    declared.sort_unstable();
    declared.dedup();

    // A name that appears as `name(` more than once anywhere is flagged.
    // The declaration itself counts once, so this over-approximates.
    let mut call_counts: HashMap<&str, usize> = HashMap::new();
    for name in &declared {
        if let Ok(call) = Regex::new(&format!(r"\b{}\s*\(", regex::escape(name))) {
            call_counts.insert(*name, call.find_iter(source).count());
        }
    }
    let recursive = declared
        .iter()
        .filter(|name| call_counts.get(*name).copied().unwrap_or(0) > 1)
        .count();

    ResourceEstimate::from_counts(
        loops,
        u32::try_from(recursive).unwrap_or(u32::MAX),
        max_depth,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

/// Bracket counts over code regions only.
#[derive(Debug, Default)]
struct Scan {
    braces: i64,
    parens: i64,
    brackets: i64,
    max_depth: u32,
}

impl Scan {
    fn run(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut scan = Self::default();
        let mut state = ScanState::Code;
        let mut idx = 0;
        while idx < chars.len() {
            let c = chars[idx];
            let next = chars.get(idx + 1).copied();
            match state {
                ScanState::Code => match c {
                    '/' if next == Some('/') => {
                        state = ScanState::LineComment;
                        idx += 1;
                    }
                    '/' if next == Some('*') => {
                        state = ScanState::BlockComment;
                        idx += 1;
                    }
                    '\'' | '"' | '`' => state = ScanState::Str(c),
                    '{' => {
                        scan.braces += 1;
                        let depth = u32::try_from(scan.braces).unwrap_or(u32::MAX);
                        scan.max_depth = scan.max_depth.max(depth);
                    }
                    '}' => scan.braces -= 1,
                    '(' => scan.parens += 1,
                    ')' => scan.parens -= 1,
                    '[' => scan.brackets += 1,
                    ']' => scan.brackets -= 1,
                    _ => {}
                },
                ScanState::LineComment => {
                    if c == '\n' {
                        state = ScanState::Code;
                    }
                }
                ScanState::BlockComment => {
                    if c == '*' && next == Some('/') {
                        state = ScanState::Code;
                        idx += 1;
                    }
                }
                ScanState::Str(quote) => {
                    if c == '\\' {
                        idx += 1;
                    } else if c == quote || (c == '\n' && quote != '`') {
                        state = ScanState::Code;
                    }
                }
            }
            idx += 1;
        }
        scan
    }

    fn balance_errors(&self) -> Vec<String> {
        [
            ("braces", self.braces),
            ("parentheses", self.parens),
            ("brackets", self.brackets),
        ]
        .into_iter()
        .filter(|(_, count)| *count != 0)
        .map(|(what, count)| {
            if count > 0 {
                format!("Unbalanced {what}: {count} unclosed")
            } else {
                format!("Unbalanced {what}: {} unexpected closing", -count)
            }
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> ValidationResult {
        JavaScriptAnalyzer::default().analyze(source, Language::JavaScript)
    }

    #[test]
    fn plain_code_is_valid() {
        let result = analyze("const add = (a, b) => a + b;\nmodule.exports = { add };\n");
        assert!(result.is_valid, "{:?}", result.all_issues());
        assert!(result.findings.is_empty());
        assert_eq!(result.estimate.unwrap().nesting_depth, 1);
    }

    #[test]
    fn require_of_prohibited_module_is_critical() {
        let result = analyze("const fs = require('fs');\n");
        assert!(!result.is_valid);
        let import = result
            .findings
            .iter()
            .find(|finding| finding.kind() == &FindingKind::ProhibitedImport)
            .unwrap();
        assert_eq!(import.subject(), Some("fs"));
        assert_eq!(import.line(), Some(1));
    }

    #[test]
    fn es_import_of_node_prefixed_module_is_caught() {
        let result = analyze("import { exec } from \"node:child_process\";\n");
        assert!(
            result
                .findings
                .iter()
                .any(|finding| finding.subject() == Some("node:child_process"))
        );
    }

    #[test]
    fn eval_hits_global_and_pattern_tables() {
        let result = analyze("const x = eval('1 + 1');\n");
        let kinds: Vec<_> = result.findings.iter().map(Finding::kind).collect();
        assert!(kinds.contains(&&FindingKind::ProhibitedGlobal));
        assert!(kinds.contains(&&FindingKind::DangerousPattern));
        assert!(!result.is_valid);
    }

    #[test]
    fn string_timer_and_proto_are_critical() {
        let result = analyze("setTimeout(\"tick()\", 10);\nobj.__proto__.x = 1;\n");
        let messages: Vec<_> = result.findings.iter().map(Finding::message).collect();
        assert_eq!(
            messages,
            ["setTimeout with string argument", "Prototype pollution risk"]
        );
        assert!(result.findings.iter().all(Finding::is_critical));
        assert!(!result.is_valid);
    }

    #[test]
    fn brackets_inside_strings_and_comments_are_ignored() {
        let source = "// {{\nconst s = \"(\";\n/* [ */\nconst t = `}`;\n";
        assert!(analyze(source).errors.is_empty());
    }

    #[test]
    fn reports_each_imbalance() {
        let result = analyze("function f( {\n  return [1;\n");
        assert_eq!(
            result.errors,
            [
                "Unbalanced braces: 1 unclosed",
                "Unbalanced parentheses: 1 unclosed",
                "Unbalanced brackets: 1 unclosed",
            ]
        );
        let result = analyze("}\n");
        assert_eq!(result.errors, ["Unbalanced braces: 1 unexpected closing"]);
    }

    #[test]
    fn loops_recursion_and_depth() {
        let source = "\
function fib(n) {
  if (n < 2) { return n; }
  return fib(n - 1) + fib(n - 2);
}
function sum(xs) {
  let t = 0;
  for (const x of xs) { t += x; }
  while (t > 100) { t -= 1; }
  return t;
}
";
        let estimate = analyze(source).estimate.unwrap();
        assert_eq!(estimate.recursive_functions, 1);
        assert_eq!(estimate.loops, 2);
        assert_eq!(estimate.nesting_depth, 2);
    }

    #[test]
    fn repeated_loops_of_one_kind_score_once() {
        let source = "\
function walk(rows) {
  for (const a of rows) { log(a); }
  for (const b of rows) { log(b); }
  for (const c of rows) { log(c); }
  for (const d of rows) { log(d); }
}
";
        let estimate = analyze(source).estimate.unwrap();
        assert_eq!(estimate.loops, 1);
        assert_eq!(estimate.complexity, 3);
        assert!(estimate.has_loops());

        let mixed = analyze("for (;;) { break; }\nwhile (x) { x--; }\ndo { x++; } while (x < 3);\n");
        assert_eq!(mixed.estimate.unwrap().complexity, 7);
    }

    #[test]
    fn arrow_functions_count_call_sites_only() {
        let once = analyze("const down = (n) => n && down(n - 1);\n");
        assert_eq!(once.estimate.unwrap().recursive_functions, 0);
        let twice = analyze("const down = (n) => n && down(n - 1);\ndown(3);\n");
        assert_eq!(twice.estimate.unwrap().recursive_functions, 1);
    }

    #[test]
    fn typescript_uses_the_same_rules() {
        let result = JavaScriptAnalyzer::default()
            .analyze("import * as net from 'net';\n", Language::TypeScript);
        assert_eq!(result.language, Language::TypeScript);
        assert!(!result.is_valid);
    }
}
