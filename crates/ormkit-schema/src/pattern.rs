//! Wildcard name patterns.
//!
//! Patterns support a leading and/or trailing `*` anchor; interior
//! asterisks match literally. Matching is case-sensitive. The pattern is
//! classified once at construction so matching is a plain string
//! comparison.

use serde::{Deserialize, Serialize};

/// A parsed wildcard name pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamePattern {
    /// `*` - matches every name at its level.
    Any,
    /// No anchors - matches the exact name.
    Exact(String),
    /// `head*` - matches names starting with `head`.
    Prefix(String),
    /// `*tail` - matches names ending with `tail`.
    Suffix(String),
    /// `*mid*` - matches names containing `mid`.
    Contains(String),
}

impl NamePattern {
    /// Parse a pattern from its source string.
    pub fn parse(source: &str) -> Self {
        if source == "*" {
            return NamePattern::Any;
        }
        let leading = source.starts_with('*');
        let trailing = source.ends_with('*');
        match (leading, trailing) {
            (true, true) => {
                let mid = &source[1..source.len() - 1];
                if mid.is_empty() {
                    // `**` degenerates to match-anything.
                    NamePattern::Any
                } else {
                    NamePattern::Contains(mid.to_string())
                }
            }
            (true, false) => NamePattern::Suffix(source[1..].to_string()),
            (false, true) => NamePattern::Prefix(source[..source.len() - 1].to_string()),
            (false, false) => NamePattern::Exact(source.to_string()),
        }
    }

    /// Check whether a name matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(exact) => name == exact,
            NamePattern::Prefix(prefix) => name.starts_with(prefix),
            NamePattern::Suffix(suffix) => name.ends_with(suffix),
            NamePattern::Contains(mid) => name.contains(mid),
        }
    }
}

impl From<&str> for NamePattern {
    fn from(source: &str) -> Self {
        NamePattern::parse(source)
    }
}

impl std::fmt::Display for NamePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamePattern::Any => write!(f, "*"),
            NamePattern::Exact(exact) => write!(f, "{exact}"),
            NamePattern::Prefix(prefix) => write!(f, "{prefix}*"),
            NamePattern::Suffix(suffix) => write!(f, "*{suffix}"),
            NamePattern::Contains(mid) => write!(f, "*{mid}*"),
        }
    }
}
