//! Submission languages.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Language a tool's source is written in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// CPython-compatible source.
    Python,
    /// ECMAScript source.
    JavaScript,
    /// TypeScript source, analyzed with the same lexical rules as JavaScript.
    TypeScript,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Self; 3] = [Self::Python, Self::JavaScript, Self::TypeScript];

    /// Returns the canonical tag used in hashes and storage keys.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
        }
    }

    /// Returns the file extension used for raw code blobs.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
        }
    }

    /// Returns `true` for languages handled by the lexical JS/TS analyzer.
    #[must_use]
    pub const fn is_ecmascript(self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript)
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            "javascript" | "js" => Ok(Self::JavaScript),
            "typescript" | "ts" => Ok(Self::TypeScript),
            other => Err(Error::UnsupportedLanguage {
                language: other.to_owned(),
            }),
        }
    }
}
