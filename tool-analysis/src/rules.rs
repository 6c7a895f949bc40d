//! Prohibited-name tables consulted by the analyzers.

use std::collections::BTreeSet;

/// Python modules whose import is rejected.
pub const PYTHON_PROHIBITED_MODULES: &[&str] = &[
    "os",
    "subprocess",
    "socket",
    "urllib",
    "urllib2",
    "urllib3",
    "requests",
    "http",
    "httplib",
    "ftplib",
    "telnetlib",
    "smtplib",
    "poplib",
    "imaplib",
    "__import__",
    "importlib",
    "sys",
    "ctypes",
    "multiprocessing",
    "threading",
    "asyncio",
];

/// Python builtins whose call is rejected.
pub const PYTHON_PROHIBITED_BUILTINS: &[&str] =
    &["eval", "exec", "compile", "__import__", "open", "input"];

/// JavaScript modules whose `require`/`import` is rejected.
pub const JS_PROHIBITED_MODULES: &[&str] = &[
    "fs",
    "child_process",
    "net",
    "http",
    "https",
    "dgram",
    "dns",
    "tls",
    "crypto",
    "os",
    "process",
    "cluster",
    "worker_threads",
    "vm",
];

/// JavaScript globals whose use is rejected.
pub const JS_PROHIBITED_GLOBALS: &[&str] = &[
    "eval",
    "Function",
    "require",
    "import",
    "XMLHttpRequest",
    "fetch",
    "WebSocket",
];

/// Per-language prohibited names.
///
/// The defaults are the tables above. A security policy narrows them with
/// [`AnalyzerRules::restricted_to`], so removing a name from the policy
/// stops the analyzers from flagging it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerRules {
    python_modules: BTreeSet<String>,
    python_builtins: BTreeSet<String>,
    js_modules: BTreeSet<String>,
    js_globals: BTreeSet<String>,
}

fn owned(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

impl Default for AnalyzerRules {
    fn default() -> Self {
        Self {
            python_modules: owned(PYTHON_PROHIBITED_MODULES),
            python_builtins: owned(PYTHON_PROHIBITED_BUILTINS),
            js_modules: owned(JS_PROHIBITED_MODULES),
            js_globals: owned(JS_PROHIBITED_GLOBALS),
        }
    }
}

impl AnalyzerRules {
    /// Keeps only the default entries that also appear in the given sets.
    #[must_use]
    pub fn restricted_to(modules: &BTreeSet<String>, functions: &BTreeSet<String>) -> Self {
        let defaults = Self::default();
        let keep = |set: BTreeSet<String>, allowed: &BTreeSet<String>| {
            set.into_iter()
                .filter(|name| allowed.contains(name))
                .collect()
        };
        Self {
            python_modules: keep(defaults.python_modules, modules),
            python_builtins: keep(defaults.python_builtins, functions),
            js_modules: keep(defaults.js_modules, modules),
            js_globals: keep(defaults.js_globals, functions),
        }
    }

    /// Returns `true` when a Python import of `module` (or a submodule of
    /// it) is prohibited.
    #[must_use]
    pub fn python_module_prohibited(&self, module: &str) -> bool {
        self.python_modules.contains(module) || self.python_modules.contains(root_of(module))
    }

    /// Returns `true` when calling the Python builtin `name` is prohibited.
    #[must_use]
    pub fn python_builtin_prohibited(&self, name: &str) -> bool {
        self.python_builtins.contains(name)
    }

    /// Returns `true` when requiring or importing `module` is prohibited.
    ///
    /// `node:`-prefixed specifiers and subpaths (`fs/promises`) resolve to
    /// their base module.
    #[must_use]
    pub fn js_module_prohibited(&self, module: &str) -> bool {
        let bare = module.strip_prefix("node:").unwrap_or(module);
        let base = bare.split('/').next().unwrap_or(bare);
        self.js_modules.contains(bare) || self.js_modules.contains(base)
    }

    /// Prohibited JavaScript globals.
    pub fn js_globals(&self) -> impl Iterator<Item = &str> {
        self.js_globals.iter().map(String::as_str)
    }
}

fn root_of(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}
