//! Query compilation entry points.
//!
//! [`QueryCompiler`] picks one of three paths by inspecting the input:
//! variable-length traversals go through the recursive compiler, set
//! operations through the set-operation compiler, everything else through
//! the standard CTE-chain compiler. Each path runs its pass pipeline, builds
//! a statement and hands it to the emitter together with the lowered plan.

mod context;
mod passes;
mod predicate;
mod recursive;
mod set_ops;
mod standard;
mod temporal;
mod validate;

pub use recursive::{DEFAULT_MAX_DEPTH, MAX_DEPTH_LIMIT};

use crate::ast::{QueryAst, SetOperation, ValueType};
use crate::config::CompileOptions;
use crate::dialect::{Dialect, DialectAdapter};
use crate::emitter::{emit, Statement};
use crate::error::{BindError, CompileError, CompileResult};
use crate::plan::LogicalPlan;
use crate::sql::{BoundParam, Sql};
use passes::{PassPipeline, PassState};
use predicate::SubqueryCompiler;
use recursive::RecursiveCompiler;
use serde_json::Value;
use set_ops::BranchCompiler;
use standard::StandardCompiler;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Output of a compilation
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// SQL text with dialect placeholders
    sql: String,
    /// One entry per placeholder, in order
    params: Vec<BoundParam>,
    dialect: Dialect,
    fragment: Sql,
    plan: LogicalPlan,
}

impl CompiledQuery {
    fn new(fragment: Sql, plan: LogicalPlan, adapter: &dyn DialectAdapter) -> Self {
        let (sql, params) = fragment.render(adapter);
        trace!(
            dialect = adapter.name(),
            sql_len = sql.len(),
            params = params.len(),
            "Compiled query"
        );
        Self {
            sql,
            params,
            dialect: adapter.dialect(),
            fragment,
            plan,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BoundParam] {
        &self.params
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The logical plan the statement was checked against.
    pub fn plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Names of the deferred parameters, in placeholder order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|param| match param {
                BoundParam::Named { name, .. } => Some(name.as_str()),
                BoundParam::Value { .. } => None,
            })
            .collect()
    }

    /// Values for every placeholder, resolving named parameters from
    /// `values`.
    pub fn bind(&self, values: &HashMap<String, Value>) -> Result<Vec<Value>, BindError> {
        let adapter = self.dialect.adapter();
        self.params
            .iter()
            .map(|param| match param {
                BoundParam::Value { value } => Ok(adapter.bind_value(value.clone())),
                BoundParam::Named { name, transform } => {
                    let value = values.get(name).ok_or_else(|| BindError::MissingParameter {
                        name: name.clone(),
                    })?;
                    let value =
                        transform
                            .apply(value)
                            .ok_or_else(|| BindError::ExpectedString {
                                name: name.clone(),
                                found: ValueType::of_json(value).name().to_string(),
                            })?;
                    Ok(adapter.bind_value(value))
                }
            })
            .collect()
    }

    /// SQL with literal values inlined, for logs and debugging only.
    pub fn inline_sql(&self) -> String {
        self.fragment.render_inline(self.dialect.adapter())
    }
}

/// Compiles graph queries to SQL for one dialect and schema.
///
/// Holds no state between calls; one instance can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    options: CompileOptions,
}

impl QueryCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    fn adapter(&self) -> &'static dyn DialectAdapter {
        self.options.dialect.adapter()
    }

    /// Compile a query against the graph `graph_id`.
    pub fn compile(&self, ast: &QueryAst, graph_id: &str) -> CompileResult<CompiledQuery> {
        debug!(
            dialect = %self.options.dialect,
            start = %ast.start.alias,
            traversals = ast.traversals.len(),
            "Compiling query"
        );
        let (statement, plan) = self.compile_fragment(ast, graph_id, "")?;
        let fragment = emit(statement, &plan)?;
        Ok(CompiledQuery::new(fragment, plan, self.adapter()))
    }

    /// Compile a UNION / INTERSECT / EXCEPT over queries on `graph_id`.
    pub fn compile_set_operation(
        &self,
        operation: &SetOperation,
        graph_id: &str,
    ) -> CompileResult<CompiledQuery> {
        let branches = GraphBranches {
            compiler: self,
            graph_id,
        };
        let (fragment, plan) = set_ops::compile(operation, self.adapter(), &branches)?;
        Ok(CompiledQuery::new(fragment, plan, self.adapter()))
    }

    /// Statement and plan for `ast` with CTE names prefixed by `prefix`.
    pub(crate) fn compile_fragment(
        &self,
        ast: &QueryAst,
        graph_id: &str,
        prefix: &str,
    ) -> CompileResult<(Statement, LogicalPlan)> {
        if recursive::is_single_hop(ast) {
            let lowered = recursive::lower_single_hop(ast);
            return self.compile_fragment(&lowered, graph_id, prefix);
        }

        let adapter = self.adapter();
        let mut state = PassState::new(ast, graph_id, adapter, &self.options).with_prefix(prefix);
        let statement = if ast.has_variable_length() {
            debug!(path = "recursive", "Selected compilation path");
            PassPipeline::recursive().run(&mut state)?;
            RecursiveCompiler::new(&state, self)?.build()?
        } else {
            debug!(path = "standard", "Selected compilation path");
            PassPipeline::standard().run(&mut state)?;
            StandardCompiler::new(&state, self).build()?
        };
        let plan = state.plan()?.clone();
        Ok((statement, plan))
    }
}

impl SubqueryCompiler for QueryCompiler {
    fn compile_subquery(&self, ast: &QueryAst) -> CompileResult<Sql> {
        let graph_id = ast.graph_id.as_deref().ok_or_else(|| {
            CompileError::unsupported(format!(
                "subquery starting at '{}' must carry a graph id",
                ast.start.alias
            ))
        })?;
        let (statement, plan) = self.compile_fragment(ast, graph_id, "")?;
        emit(statement, &plan)
    }
}

struct GraphBranches<'c> {
    compiler: &'c QueryCompiler,
    graph_id: &'c str,
}

impl BranchCompiler for GraphBranches<'_> {
    fn compile_branch(
        &self,
        ast: &QueryAst,
        prefix: &str,
    ) -> CompileResult<(Statement, LogicalPlan)> {
        let graph_id = ast.graph_id.as_deref().unwrap_or(self.graph_id);
        self.compiler.compile_fragment(ast, graph_id, prefix)
    }
}

/// Compile `ast` with `options`.
pub fn compile_query(
    ast: &QueryAst,
    graph_id: &str,
    options: &CompileOptions,
) -> CompileResult<CompiledQuery> {
    QueryCompiler::new(options.clone()).compile(ast, graph_id)
}
