//! Content addressing for submitted source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{Error, Language};

/// SHA-256 digest over `language-tag ":" trimmed-source`.
///
/// Identical `(language, trimmed source)` pairs hash identically from any
/// caller; there is no salt or per-request input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Computes the content hash for `source` submitted as `language`.
    #[must_use]
    pub fn compute(language: Language, source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(language.tag().as_bytes());
        hasher.update(b":");
        hasher.update(source.trim().as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidContentHash {
            value: s.to_owned(),
        };
        let bytes = hex::decode(s).map_err(|_| invalid())?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_ignores_surrounding_whitespace() {
        let source = "def f():\n    return 1\n\n  ";
        assert_eq!(
            ContentHash::compute(Language::Python, source),
            ContentHash::compute(Language::Python, source.trim())
        );
    }

    #[test]
    fn hashing_is_language_sensitive() {
        let source = "const x = 1;";
        assert_ne!(
            ContentHash::compute(Language::JavaScript, source),
            ContentHash::compute(Language::TypeScript, source)
        );
    }

    #[test]
    fn display_parse_and_serde_agree() {
        let hash = ContentHash::compute(Language::Python, "x = 1");
        let hex = hash.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<ContentHash>().unwrap(), hash);

        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hex}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!("abcd".parse::<ContentHash>().is_err());
        assert!("zz".repeat(32).parse::<ContentHash>().is_err());
    }

    #[test]
    fn digest_matches_tagged_sha256() {
        let hash = ContentHash::compute(Language::Python, "  print(1)  ");
        let expected = hex::encode(Sha256::digest(b"python:print(1)"));
        assert_eq!(hash.to_hex(), expected);
    }
}
