//! Dialect adapters.
//!
//! Every SQL-text difference between engines lives behind
//! [`DialectAdapter`]. The compiler passes never branch on the dialect
//! directly; they ask the adapter for a fragment or consult its
//! [`DialectCapabilities`]. Adding a dialect means implementing this trait.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::ast::{ValueType, VectorMetric};
use crate::error::CompileResult;
use crate::identifier::Identifier;
use crate::json_pointer::JsonPointer;
use crate::sql::{ParamTransform, Sql};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;

impl Dialect {
    /// Shared adapter instance for this dialect.
    pub fn adapter(self) -> &'static dyn DialectAdapter {
        match self {
            Dialect::Sqlite => &SQLITE,
            Dialect::Postgres => &POSTGRES,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.adapter().name())
    }
}

/// How a typed value is pulled out of a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractAs {
    Text,
    Number,
    Boolean,
    Date,
    /// JSON value itself (arrays, objects)
    Raw,
}

impl From<ValueType> for ExtractAs {
    fn from(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String | ValueType::Unknown => ExtractAs::Text,
            ValueType::Number => ExtractAs::Number,
            ValueType::Boolean => ExtractAs::Boolean,
            ValueType::Date => ExtractAs::Date,
            ValueType::Array | ValueType::Object | ValueType::Embedding => ExtractAs::Raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardQueryStrategy {
    /// One CTE per alias joined in the final SELECT
    CteChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursiveQueryStrategy {
    /// Single `WITH RECURSIVE` worktable carrying start and target columns;
    /// inverse edge kinds add a second recursive member
    RecursiveCte,
    /// Only one recursive member is allowed, so inverse edge kinds are
    /// folded into the step's join condition
    SingleRecursiveMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperationStrategy {
    /// Compound members cannot be parenthesized; branch CTEs are merged into
    /// one top-level `WITH` list
    FlattenCtes,
    /// Each branch is a complete parenthesized statement
    ParenthesizedBranches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStrategy {
    /// sqlite-vec scalar distance functions
    SqliteVec,
    /// pgvector distance operators
    PgVector,
}

/// Static description of what a dialect can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectCapabilities {
    pub standard_query_strategy: StandardQueryStrategy,
    pub recursive_query_strategy: RecursiveQueryStrategy,
    pub set_operation_strategy: SetOperationStrategy,
    /// Emit `AS MATERIALIZED` on intermediate traversal CTEs
    pub materialize_intermediate_ctes: bool,
    /// Planner mishandles correlated recursive joins; force worktable-first
    /// join order
    pub force_recursive_join_order: bool,
    pub vector_strategy: VectorStrategy,
    pub vector_metrics: &'static [VectorMetric],
}

/// Dialect-specific SQL fragment construction.
///
/// Methods take already-built fragments for columns and values and return
/// new fragments; none of them see caller strings except through
/// [`JsonPointer`] segments, which adapters emit as escaped literals.
pub trait DialectAdapter: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &DialectCapabilities;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn quote_identifier(&self, identifier: &Identifier) -> Sql {
        Sql::ident(identifier)
    }

    /// Path literal in the dialect's JSON path syntax.
    fn json_path(&self, pointer: &JsonPointer) -> Sql;

    /// Extract the value at `pointer` from a JSON column.
    fn json_extract(&self, column: &Sql, pointer: &JsonPointer, extract: ExtractAs) -> Sql;

    fn array_length(&self, column: &Sql, pointer: &JsonPointer) -> Sql;

    fn array_contains(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        value: Sql,
        value_type: ValueType,
    ) -> Sql;

    fn array_contains_all(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        values: Vec<Sql>,
        value_type: ValueType,
    ) -> Sql {
        Sql::join(
            values
                .into_iter()
                .map(|v| self.array_contains(column, pointer, v, value_type)),
            " AND ",
        )
        .parens()
    }

    fn array_contains_any(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        values: Vec<Sql>,
        value_type: ValueType,
    ) -> Sql {
        Sql::join(
            values
                .into_iter()
                .map(|v| self.array_contains(column, pointer, v, value_type)),
            " OR ",
        )
        .parens()
    }

    fn object_has_path(&self, column: &Sql, pointer: &JsonPointer) -> Sql;

    fn object_path_equals(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        value: Sql,
        value_type: ValueType,
    ) -> Sql {
        crate::sql::sql![
            self.json_extract(column, pointer, ExtractAs::from(value_type)),
            " = ",
            value
        ]
    }

    fn object_path_contains(
        &self,
        column: &Sql,
        pointer: &JsonPointer,
        value: Sql,
        value_type: ValueType,
    ) -> Sql {
        self.array_contains(column, pointer, value, value_type)
    }

    /// `IS NULL` (or `IS NOT NULL` when `negated`) for a JSON path; a JSON
    /// `null` counts as null.
    fn object_path_is_null(&self, column: &Sql, pointer: &JsonPointer, negated: bool) -> Sql;

    /// Case-insensitive LIKE with `\` as escape character.
    fn ilike(&self, lhs: Sql, pattern: Sql) -> Sql;

    /// Case-sensitive pattern match for a caller-controlled LIKE pattern.
    fn like(&self, lhs: Sql, pattern: Sql) -> Sql;

    /// Rewrite applied to the pattern value passed to [`Self::like`].
    fn like_pattern_transform(&self) -> ParamTransform;

    /// Initial path value for a recursive traversal.
    fn path_init(&self, id: Sql) -> Sql;

    fn path_extend(&self, path: Sql, id: Sql) -> Sql;

    /// True when `id` is not yet on `path`.
    fn cycle_check(&self, path: Sql, id: Sql) -> Sql;

    fn current_timestamp(&self) -> Sql;

    /// Convert a value to what the driver expects for this engine.
    fn bind_value(&self, value: Value) -> Value;

    /// Distance between an embedding column and a query embedding. Fails for
    /// metrics the dialect does not support.
    fn vector_distance(&self, column: Sql, query: Sql, metric: VectorMetric) -> CompileResult<Sql>;

    /// Parameter value carrying a query embedding.
    fn format_embedding(&self, embedding: &[f32]) -> Value {
        let parts: Vec<String> = embedding.iter().map(|x| x.to_string()).collect();
        Value::String(format!("[{}]", parts.join(",")))
    }

    /// `LIMIT n OFFSET m` clause body; at least one of the two is present.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Sql {
        let mut clause = Vec::new();
        if let Some(limit) = limit {
            clause.push(crate::sql::sql!["LIMIT ", Sql::integer(clamp_i64(limit))]);
        }
        if let Some(offset) = offset {
            clause.push(crate::sql::sql!["OFFSET ", Sql::integer(clamp_i64(offset))]);
        }
        Sql::join(clause, " ")
    }
}

pub(crate) fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Shared check for metric support.
pub(crate) fn ensure_metric(
    adapter: &dyn DialectAdapter,
    metric: VectorMetric,
) -> CompileResult<()> {
    if adapter.capabilities().vector_metrics.contains(&metric) {
        Ok(())
    } else {
        Err(crate::error::CompileError::unsupported(format!(
            "vector metric '{}' is not supported by the {} dialect (supported: {})",
            metric.name(),
            adapter.name(),
            adapter
                .capabilities()
                .vector_metrics
                .iter()
                .map(|m| m.name())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_lookup() {
        assert_eq!(Dialect::Sqlite.adapter().name(), "sqlite");
        assert_eq!(Dialect::Postgres.adapter().name(), "postgres");
        assert_eq!(Dialect::Postgres.adapter().dialect(), Dialect::Postgres);
    }

    #[test]
    fn test_capabilities_differ_where_engines_differ() {
        let sqlite = Dialect::Sqlite.adapter().capabilities();
        let postgres = Dialect::Postgres.adapter().capabilities();

        assert_eq!(sqlite.set_operation_strategy, SetOperationStrategy::FlattenCtes);
        assert_eq!(
            postgres.set_operation_strategy,
            SetOperationStrategy::ParenthesizedBranches
        );
        assert!(sqlite.force_recursive_join_order);
        assert!(!postgres.force_recursive_join_order);
        assert!(postgres.materialize_intermediate_ctes);
        assert!(!sqlite.vector_metrics.contains(&VectorMetric::InnerProduct));
        assert!(postgres.vector_metrics.contains(&VectorMetric::InnerProduct));
    }

    #[test]
    fn test_embedding_format() {
        let value = Dialect::Sqlite.adapter().format_embedding(&[0.5, -1.0, 0.25]);
        assert_eq!(value, Value::String("[0.5,-1,0.25]".to_string()));
    }

    #[test]
    fn test_dialect_deserializes() {
        let dialect: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(dialect, Dialect::Postgres);
    }
}
