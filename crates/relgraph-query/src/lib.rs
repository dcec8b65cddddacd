//! Graph query compiler for relgraph
//!
//! Compiles property-graph queries (typed node scans, edge traversals,
//! variable-length paths, vector search, set operations) into parameterized
//! SQL for relational storage.
//!
//! ## Features
//!
//! - **Two dialects**: SQLite (JSON1 + sqlite-vec) and PostgreSQL (jsonb + pgvector)
//! - **Pass pipeline**: validation, temporal filters, column pruning, limit
//!   pushdown and a grouped-count fast path
//! - **Recursive paths**: `WITH RECURSIVE` with depth bounds and cycle prevention
//! - **Safe output**: only validated identifiers, compiler tokens and bound
//!   parameters reach the SQL text
//!
//! ## Usage
//!
//! ```rust
//! use relgraph_query::ast::{FieldRef, PredicateExpression, QueryAst, Traversal};
//! use relgraph_query::{CompileOptions, QueryCompiler};
//!
//! let query = QueryAst::from_kind("p", "Person")
//!     .traverse(Traversal::out("p", "e", "worksAt", "c", "Company"))
//!     .filter("p", PredicateExpression::eq(FieldRef::prop("p", "name"), "Alice"));
//!
//! let compiled = QueryCompiler::new(CompileOptions::sqlite())
//!     .compile(&query, "graph-1")
//!     .unwrap();
//!
//! assert!(compiled.sql().contains("JOIN \"edges\" e"));
//! assert_eq!(compiled.sql().matches('?').count(), compiled.params().len());
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod identifier;
pub mod json_pointer;
pub mod plan;
pub mod schema;
pub mod sql;

mod emitter;

// Re-exports
pub use compiler::{compile_query, CompiledQuery, QueryCompiler};
pub use config::CompileOptions;
pub use dialect::{Dialect, DialectAdapter};
pub use error::{BindError, CompileError, CompileResult, ConfigError};
pub use schema::SqlSchema;
pub use sql::{BoundParam, ParamTransform};
