//! Relational layout the compiler targets.
//!
//! Assumes the following tables (names configurable through [`SqlSchema`]):
//! ```sql
//! CREATE TABLE nodes (
//!     graph_id TEXT NOT NULL, kind TEXT NOT NULL, id TEXT NOT NULL,
//!     props JSON NOT NULL, version INTEGER NOT NULL,
//!     valid_from TEXT, valid_to TEXT,
//!     created_at TEXT NOT NULL, updated_at TEXT NOT NULL, deleted_at TEXT,
//!     PRIMARY KEY (graph_id, kind, id)
//! );
//!
//! CREATE TABLE edges (
//!     graph_id TEXT NOT NULL, id TEXT NOT NULL, kind TEXT NOT NULL,
//!     from_kind TEXT NOT NULL, from_id TEXT NOT NULL,
//!     to_kind TEXT NOT NULL, to_id TEXT NOT NULL,
//!     props JSON NOT NULL, valid_from TEXT, valid_to TEXT,
//!     created_at TEXT NOT NULL, updated_at TEXT NOT NULL, deleted_at TEXT,
//!     PRIMARY KEY (graph_id, id)
//! );
//!
//! CREATE TABLE embeddings (
//!     graph_id TEXT NOT NULL, node_kind TEXT NOT NULL, node_id TEXT NOT NULL,
//!     field_path TEXT NOT NULL, embedding BLOB NOT NULL, dimensions INTEGER NOT NULL,
//!     created_at TEXT NOT NULL, updated_at TEXT NOT NULL
//! );
//! ```

use crate::ast::ValueType;
use crate::error::ConfigError;
use crate::identifier::Identifier;
use serde::{Deserialize, Serialize};

/// A system column of the nodes or edges table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Id,
    Kind,
    FromKind,
    FromId,
    ToKind,
    ToId,
    Props,
    Version,
    ValidFrom,
    ValidTo,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

/// Node columns in projection order.
pub const NODE_COLUMNS: &[Column] = &[
    Column::Id,
    Column::Kind,
    Column::Props,
    Column::Version,
    Column::ValidFrom,
    Column::ValidTo,
    Column::CreatedAt,
    Column::UpdatedAt,
    Column::DeletedAt,
];

/// Edge columns in projection order.
pub const EDGE_COLUMNS: &[Column] = &[
    Column::Id,
    Column::Kind,
    Column::FromKind,
    Column::FromId,
    Column::ToKind,
    Column::ToId,
    Column::Props,
    Column::ValidFrom,
    Column::ValidTo,
    Column::CreatedAt,
    Column::UpdatedAt,
    Column::DeletedAt,
];

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Kind => "kind",
            Column::FromKind => "from_kind",
            Column::FromId => "from_id",
            Column::ToKind => "to_kind",
            Column::ToId => "to_id",
            Column::Props => "props",
            Column::Version => "version",
            Column::ValidFrom => "valid_from",
            Column::ValidTo => "valid_to",
            Column::CreatedAt => "created_at",
            Column::UpdatedAt => "updated_at",
            Column::DeletedAt => "deleted_at",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        let column = match name {
            "id" => Column::Id,
            "kind" => Column::Kind,
            "from_kind" | "fromKind" => Column::FromKind,
            "from_id" | "fromId" => Column::FromId,
            "to_kind" | "toKind" => Column::ToKind,
            "to_id" | "toId" => Column::ToId,
            "props" => Column::Props,
            "version" => Column::Version,
            "valid_from" | "validFrom" => Column::ValidFrom,
            "valid_to" | "validTo" => Column::ValidTo,
            "created_at" | "createdAt" => Column::CreatedAt,
            "updated_at" | "updatedAt" => Column::UpdatedAt,
            "deleted_at" | "deletedAt" => Column::DeletedAt,
            _ => return None,
        };
        Some(column)
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Column::Id
            | Column::Kind
            | Column::FromKind
            | Column::FromId
            | Column::ToKind
            | Column::ToId => ValueType::String,
            Column::Props => ValueType::Object,
            Column::Version => ValueType::Number,
            Column::ValidFrom
            | Column::ValidTo
            | Column::CreatedAt
            | Column::UpdatedAt
            | Column::DeletedAt => ValueType::Date,
        }
    }

    /// Whether the column exists on the edges (`true`) or nodes table.
    pub fn exists_on(self, edge: bool) -> bool {
        if edge {
            EDGE_COLUMNS.contains(&self)
        } else {
            NODE_COLUMNS.contains(&self)
        }
    }

    /// Columns every alias keeps even when pruning.
    pub fn join_keys(edge: bool) -> &'static [Column] {
        if edge {
            &[Column::Id]
        } else {
            &[Column::Id, Column::Kind]
        }
    }

    pub fn all(edge: bool) -> &'static [Column] {
        if edge {
            EDGE_COLUMNS
        } else {
            NODE_COLUMNS
        }
    }
}

/// Validated table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlSchema {
    pub nodes_table: Identifier,
    pub edges_table: Identifier,
    pub embeddings_table: Identifier,
}

impl SqlSchema {
    /// Build a schema from raw table names, validating each.
    pub fn new(
        nodes_table: impl Into<String>,
        edges_table: impl Into<String>,
        embeddings_table: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            nodes_table: Identifier::new(nodes_table)?,
            edges_table: Identifier::new(edges_table)?,
            embeddings_table: Identifier::new(embeddings_table)?,
        })
    }
}

impl Default for SqlSchema {
    fn default() -> Self {
        Self {
            nodes_table: Identifier::new_unchecked("nodes"),
            edges_table: Identifier::new_unchecked("edges"),
            embeddings_table: Identifier::new_unchecked("embeddings"),
        }
    }
}
