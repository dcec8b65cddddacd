//! Structured SQL fragments.
//!
//! Generated SQL is assembled from [`Sql`] values rather than formatted
//! strings. A fragment can only contain:
//! - static text written in this crate (`&'static str`)
//! - text the compiler derived from validated identifiers or numbers
//!   ([`Sql::trusted`], crate-private)
//! - quoted identifiers and escaped string literals
//! - parameter placeholders, rendered per dialect
//!
//! Owned caller strings have no `Into<Sql>` conversion, so they cannot be
//! spliced into the text by accident.

use crate::dialect::DialectAdapter;
use crate::identifier::{quote_literal, Identifier};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// Concatenate fragments: `sql!["SELECT ", cols, " FROM ", table]`.
macro_rules! sql {
    ($($part:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut fragment = $crate::sql::Sql::new();
        $( fragment.push($part); )*
        fragment
    }};
}
pub(crate) use sql;

/// Rewrite applied to a named parameter's value at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamTransform {
    Identity,
    /// `%value%` with wildcards escaped
    Contains,
    /// `value%` with wildcards escaped
    StartsWith,
    /// `%value` with wildcards escaped
    EndsWith,
    /// wildcards escaped, no wrapping
    Escaped,
    /// LIKE pattern converted to a GLOB pattern
    LikeToGlob,
}

impl ParamTransform {
    /// Apply to a string value. Returns `None` when the transform needs a
    /// string and got something else.
    pub fn apply(self, value: &Value) -> Option<Value> {
        if self == ParamTransform::Identity {
            return Some(value.clone());
        }
        let Value::String(s) = value else {
            return None;
        };
        let transformed = match self {
            ParamTransform::Identity => s.clone(),
            ParamTransform::Contains => format!("%{}%", escape_like(s)),
            ParamTransform::StartsWith => format!("{}%", escape_like(s)),
            ParamTransform::EndsWith => format!("%{}", escape_like(s)),
            ParamTransform::Escaped => escape_like(s),
            ParamTransform::LikeToGlob => like_to_glob(s),
        };
        Some(Value::String(transformed))
    }
}

/// A value slot in the compiled statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundParam {
    /// Known at compile time
    Value { value: Value },
    /// Supplied later through `CompiledQuery::bind`
    Named {
        name: String,
        transform: ParamTransform,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum SqlPart {
    Text(Cow<'static, str>),
    Param(BoundParam),
}

/// A SQL fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    parts: Vec<SqlPart>,
}

impl From<&'static str> for Sql {
    fn from(text: &'static str) -> Self {
        Sql::raw(text)
    }
}

impl From<&Sql> for Sql {
    fn from(fragment: &Sql) -> Self {
        fragment.clone()
    }
}

impl Sql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(text: &'static str) -> Self {
        Self {
            parts: vec![SqlPart::Text(Cow::Borrowed(text))],
        }
    }

    /// Text generated by the compiler from validated identifiers, numbers
    /// or dialect constants. Never pass caller-supplied strings here.
    pub(crate) fn trusted(text: String) -> Self {
        Self {
            parts: vec![SqlPart::Text(Cow::Owned(text))],
        }
    }

    pub fn ident(identifier: &Identifier) -> Self {
        Self::trusted(identifier.quoted())
    }

    /// Escaped single-quoted string literal.
    pub fn string_literal(value: &str) -> Self {
        Self::trusted(quote_literal(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::trusted(value.to_string())
    }

    pub fn param(value: impl Into<Value>) -> Self {
        Self {
            parts: vec![SqlPart::Param(BoundParam::Value {
                value: value.into(),
            })],
        }
    }

    pub fn named_param(name: impl Into<String>, transform: ParamTransform) -> Self {
        Self {
            parts: vec![SqlPart::Param(BoundParam::Named {
                name: name.into(),
                transform,
            })],
        }
    }

    pub fn push(&mut self, fragment: impl Into<Sql>) {
        self.parts.extend(fragment.into().parts);
    }

    /// Join fragments with a static separator.
    pub fn join<I>(fragments: I, separator: &'static str) -> Sql
    where
        I: IntoIterator<Item = Sql>,
    {
        let mut out = Sql::new();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push(fragment);
        }
        out
    }

    /// `(fragment)`
    pub fn parens(self) -> Sql {
        sql!["(", self, ")"]
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            SqlPart::Text(text) => text.is_empty(),
            SqlPart::Param(_) => false,
        })
    }

    pub fn param_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, SqlPart::Param(_)))
            .count()
    }

    /// Render with dialect placeholders, returning text and params in
    /// placeholder order.
    pub fn render(&self, dialect: &dyn DialectAdapter) -> (String, Vec<BoundParam>) {
        let mut text = String::new();
        let mut params = Vec::new();
        for part in &self.parts {
            match part {
                SqlPart::Text(t) => text.push_str(t),
                SqlPart::Param(param) => {
                    params.push(param.clone());
                    text.push_str(&dialect.placeholder(params.len()));
                }
            }
        }
        (text, params)
    }

    /// Render with literal values substituted, for logs and tests only.
    pub fn render_inline(&self, dialect: &dyn DialectAdapter) -> String {
        let mut text = String::new();
        for part in &self.parts {
            match part {
                SqlPart::Text(t) => text.push_str(t),
                SqlPart::Param(BoundParam::Value { value }) => {
                    text.push_str(&inline_value(&dialect.bind_value(value.clone())));
                }
                SqlPart::Param(BoundParam::Named { name, .. }) => {
                    text.push(':');
                    text.push_str(name);
                }
            }
        }
        text
    }
}

fn inline_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_literal(s),
        Value::Array(_) | Value::Object(_) => quote_literal(&value.to_string()),
    }
}

/// Escape LIKE wildcards with a backslash (paired with `ESCAPE '\'`).
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Convert a LIKE pattern into an equivalent case-sensitive GLOB pattern.
pub fn like_to_glob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '\\' => match chars.next() {
                Some(next) => push_glob_literal(&mut out, next),
                None => push_glob_literal(&mut out, '\\'),
            },
            other => push_glob_literal(&mut out, other),
        }
    }
    out
}

fn push_glob_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' | ']' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        other => out.push(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};

    #[test]
    fn test_placeholders_per_dialect() {
        let fragment = sql!["a = ", Sql::param(1), " AND b = ", Sql::param("x")];

        let (sqlite, params) = fragment.render(&SqliteDialect);
        assert_eq!(sqlite, "a = ? AND b = ?");
        assert_eq!(params.len(), 2);

        let (postgres, _) = fragment.render(&PostgresDialect);
        assert_eq!(postgres, "a = $1 AND b = $2");
    }

    #[test]
    fn test_inline_rendering_escapes_strings() {
        let fragment = sql!["name = ", Sql::param("O'Brien")];
        assert_eq!(fragment.render_inline(&SqliteDialect), "name = 'O''Brien'");
    }

    #[test]
    fn test_inline_rendering_binds_booleans_per_dialect() {
        let fragment = sql!["flag = ", Sql::param(true)];
        assert_eq!(fragment.render_inline(&SqliteDialect), "flag = 1");
        assert_eq!(fragment.render_inline(&PostgresDialect), "flag = TRUE");
    }

    #[test]
    fn test_join_and_parens() {
        let joined = Sql::join(vec![Sql::raw("a"), Sql::raw("b"), Sql::raw("c")], " OR ").parens();
        assert_eq!(joined.render(&SqliteDialect).0, "(a OR b OR c)");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_param_transforms() {
        let v = Value::String("a_b".to_string());
        assert_eq!(
            ParamTransform::Contains.apply(&v),
            Some(Value::String("%a\\_b%".to_string()))
        );
        assert_eq!(
            ParamTransform::StartsWith.apply(&v),
            Some(Value::String("a\\_b%".to_string()))
        );
        assert_eq!(ParamTransform::Contains.apply(&Value::Bool(true)), None);
        assert_eq!(ParamTransform::Identity.apply(&Value::Bool(true)), Some(Value::Bool(true)));
    }

    #[test]
    fn test_like_to_glob() {
        assert_eq!(like_to_glob("Ab%"), "Ab*");
        assert_eq!(like_to_glob("a_c"), "a?c");
        assert_eq!(like_to_glob("what?*"), "what[?][*]");
        assert_eq!(like_to_glob("100\\%"), "100%");
    }
}
