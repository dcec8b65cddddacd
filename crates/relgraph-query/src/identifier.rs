//! Validated SQL identifiers.
//!
//! Every user-supplied name that ends up in SQL text (aliases, output column
//! names, table names) goes through [`Identifier::new`] first.

use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum identifier length (PostgreSQL's NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier regex is valid")
});

/// Keywords rejected as identifiers in both dialects.
///
/// Sorted so lookups can binary search.
const RESERVED_KEYWORDS: &[&str] = &[
    "all", "alter", "analyze", "and", "any", "array", "as", "asc", "between", "both", "by",
    "case", "cast", "check", "collate", "column", "constraint", "create", "cross", "current",
    "current_date", "current_time", "current_timestamp", "default", "delete", "desc",
    "distinct", "do", "drop", "else", "end", "except", "exists", "false", "fetch", "for",
    "foreign", "from", "full", "grant", "group", "having", "in", "index", "inner", "insert",
    "intersect", "into", "is", "join", "leading", "left", "like", "limit", "natural", "not",
    "null", "offset", "on", "or", "order", "outer", "primary", "recursive", "references",
    "returning", "right", "select", "set", "some", "table", "then", "to", "trailing", "true",
    "union", "unique", "update", "using", "values", "when", "where", "window", "with",
];

/// A name that passed the identifier grammar and keyword denylist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate a name.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    /// Wrap a compile-time constant known to satisfy the grammar.
    pub(crate) fn new_unchecked(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form with embedded quotes doubled.
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// Check a name against the identifier grammar and the keyword denylist.
pub fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "identifier must not be empty",
        });
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "identifier exceeds 63 characters",
        });
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(ConfigError::InvalidIdentifier {
            name: name.to_string(),
            reason: "must start with a letter or underscore and contain only letters, digits, '_' or '$'",
        });
    }
    if is_reserved_keyword(name) {
        return Err(ConfigError::ReservedKeyword {
            name: name.to_string(),
        });
    }
    Ok(())
}

pub fn is_reserved_keyword(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    RESERVED_KEYWORDS.binary_search(&lowered.as_str()).is_ok()
}

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
