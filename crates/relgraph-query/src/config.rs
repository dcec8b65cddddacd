//! Compile options
//!
//! Dialect, table layout and an optional pinned clock.

use crate::dialect::Dialect;
use crate::schema::SqlSchema;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Options for a single compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    pub schema: SqlSchema,
    /// Pinned "now" for temporal filters; `None` uses the database clock
    pub now: Option<DateTime<Utc>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            schema: SqlSchema::default(),
            now: None,
        }
    }
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    pub fn sqlite() -> Self {
        Self::new(Dialect::Sqlite)
    }

    pub fn postgres() -> Self {
        Self::new(Dialect::Postgres)
    }

    pub fn with_schema(mut self, schema: SqlSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Pinned clock in the ISO-8601 form the store writes.
    pub(crate) fn pinned_now(&self) -> Option<String> {
        self.now
            .map(|now| now.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert_eq!(options.dialect, Dialect::Sqlite);
        assert_eq!(options.schema, SqlSchema::default());
        assert!(options.now.is_none());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let options: CompileOptions = serde_json::from_str(
            r#"{"dialect": "postgres", "schema": {"nodes_table": "graph_nodes"}}"#,
        )
        .unwrap();
        assert_eq!(options.dialect, Dialect::Postgres);
        assert_eq!(options.schema.nodes_table.as_str(), "graph_nodes");
        assert_eq!(options.schema.edges_table.as_str(), "edges");
    }

    #[test]
    fn test_pinned_now_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let options = CompileOptions::sqlite().with_now(now);
        assert_eq!(options.pinned_now().as_deref(), Some("2024-05-01T12:30:00.000Z"));
    }
}
