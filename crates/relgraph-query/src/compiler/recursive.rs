//! Variable-length traversal compilation.
//!
//! A single `WITH RECURSIVE` worktable carries the start node's columns, the
//! current target node's columns, the depth and (when cycles are tracked) the
//! path of visited ids. The base member emits every start node at depth 0;
//! each recursive member follows one more edge.

use super::context::{carried_name, CteScope, TableScope};
use super::passes::{
    finish_plan, CompilerPass, PassPipeline, PassState, TemporalPass, VectorDetectionPass,
};
use super::predicate::{PredicateCompiler, SubqueryCompiler};
use super::standard::{
    and_all, compile_all, hop_join, kind_filter, quoted, table, Endpoints, FinalQuery,
};
use super::validate::ValidationPass;
use crate::ast::{CyclePolicy, QueryAst, Traversal, VariableLengthSpec};
use crate::dialect::RecursiveQueryStrategy;
use crate::emitter::{Cte, Statement, StatementBody};
use crate::error::{CompileError, CompileResult};
use crate::plan::{LogicalOp, LogicalPlan, PlanNode, ScanSource};
use crate::schema::Column;
use crate::sql::{sql, Sql};
use tracing::debug;

/// Depth bound used for `max_depth = -1`.
pub const DEFAULT_MAX_DEPTH: u32 = 100;
/// Largest explicit `max_depth` accepted.
pub const MAX_DEPTH_LIMIT: u32 = 1000;

const WORKTABLE: &str = "recursive_cte";

/// Resolved depth range of a variable-length traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DepthBounds {
    pub min: u32,
    pub max: u32,
}

impl DepthBounds {
    pub fn resolve(spec: &VariableLengthSpec) -> CompileResult<Self> {
        let max = match spec.max_depth {
            -1 => DEFAULT_MAX_DEPTH,
            depth if depth > i64::from(MAX_DEPTH_LIMIT) => {
                return Err(CompileError::unsupported(format!(
                    "max_depth {} exceeds the limit of {}",
                    depth, MAX_DEPTH_LIMIT
                )))
            }
            depth if depth < 1 => {
                return Err(CompileError::unsupported(format!(
                    "max_depth must be at least 1 or -1 for unbounded, got {}",
                    depth
                )))
            }
            depth => depth as u32,
        };
        if spec.min_depth > max {
            return Err(CompileError::unsupported(format!(
                "min_depth {} is greater than max_depth {}",
                spec.min_depth, max
            )));
        }
        Ok(Self {
            min: spec.min_depth,
            max,
        })
    }
}

/// A visited-id path is carried when cycles are prevented or the path is
/// projected.
fn tracks_path(spec: &VariableLengthSpec) -> bool {
    spec.cycle_policy == CyclePolicy::Prevent || spec.path_alias.is_some()
}

/// `min = max = 1` without path or depth outputs is a plain traversal.
pub(crate) fn is_single_hop(ast: &QueryAst) -> bool {
    match ast.traversals.as_slice() {
        [traversal] => traversal.variable_length.as_ref().is_some_and(|spec| {
            spec.min_depth == 1
                && spec.max_depth == 1
                && spec.path_alias.is_none()
                && spec.depth_alias.is_none()
        }),
        _ => false,
    }
}

/// Copy of `ast` with the single-hop variable-length spec removed.
pub(crate) fn lower_single_hop(ast: &QueryAst) -> QueryAst {
    let mut lowered = ast.clone();
    for traversal in &mut lowered.traversals {
        traversal.variable_length = None;
    }
    debug!(alias = %lowered.start.alias, "Lowering single-hop recursive traversal");
    lowered
}

fn variable_traversal(ast: &QueryAst) -> CompileResult<(&Traversal, &VariableLengthSpec)> {
    match ast.traversals.as_slice() {
        [traversal] => match &traversal.variable_length {
            Some(spec) => Ok((traversal, spec)),
            None => Err(CompileError::invariant(
                "recursive",
                "recursive compilation without a variable-length traversal",
                format!("traversal '{}'", traversal.node_alias),
            )),
        },
        traversals => Err(CompileError::unsupported(format!(
            "variable-length traversals must be the only traversal in a query, found {}",
            traversals.len()
        ))),
    }
}

/// Shape checks specific to recursive queries.
pub(crate) struct RecursiveValidationPass;

impl CompilerPass for RecursiveValidationPass {
    fn name(&self) -> &'static str {
        "recursive_validation"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let (traversal, spec) = variable_traversal(state.ast)?;
        if traversal.optional {
            return Err(CompileError::unsupported(format!(
                "variable-length traversal '{}' cannot be optional",
                traversal.node_alias
            )));
        }
        DepthBounds::resolve(spec)?;
        if state.vector.is_some() {
            return Err(CompileError::unsupported(
                "vector similarity cannot be combined with variable-length traversals",
            ));
        }
        Ok(())
    }
}

/// Lowers a recursive query into a logical plan.
pub(crate) struct RecursivePlanPass;

impl CompilerPass for RecursivePlanPass {
    fn name(&self) -> &'static str {
        "recursive_plan"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let (traversal, spec) = variable_traversal(ast)?;
        let bounds = DepthBounds::resolve(spec)?;
        let start = ast.start.alias.as_str();

        let mut node = PlanNode::new(LogicalOp::Scan {
            alias: start.to_string(),
            source: ScanSource::Nodes,
        });
        let start_predicates = state.owned_predicates(start).len();
        if start_predicates > 0 {
            node = node.then(LogicalOp::Filter {
                alias: start.to_string(),
                predicates: start_predicates,
            });
        }
        node = node.then(LogicalOp::RecursiveExpand {
            alias: traversal.node_alias.clone(),
            min_depth: bounds.min,
            max_depth: bounds.max,
            cycle_check: tracks_path(spec),
        });
        node = finish_plan(node, ast, state.final_predicates().len(), true, false);
        state.plan = Some(LogicalPlan::new(node));
        Ok(())
    }
}

impl PassPipeline {
    /// Pipeline for variable-length queries.
    pub fn recursive() -> Self {
        Self::new(vec![
            Box::new(ValidationPass),
            Box::new(VectorDetectionPass),
            Box::new(RecursiveValidationPass),
            Box::new(TemporalPass),
            Box::new(RecursivePlanPass),
        ])
    }
}

pub(crate) struct RecursiveCompiler<'s, 'a> {
    state: &'s PassState<'a>,
    subqueries: &'s dyn SubqueryCompiler,
    traversal: &'a Traversal,
    spec: &'a VariableLengthSpec,
    bounds: DepthBounds,
    worktable: String,
}

impl<'s, 'a> RecursiveCompiler<'s, 'a> {
    pub fn new(
        state: &'s PassState<'a>,
        subqueries: &'s dyn SubqueryCompiler,
    ) -> CompileResult<Self> {
        let ast: &'a QueryAst = state.ast;
        let (traversal, spec) = variable_traversal(ast)?;
        Ok(Self {
            state,
            subqueries,
            traversal,
            spec,
            bounds: DepthBounds::resolve(spec)?,
            worktable: format!("{}{}", state.prefix, WORKTABLE),
        })
    }

    pub fn build(&self) -> CompileResult<Statement> {
        let state = self.state;
        let ast = state.ast;
        let start = ast.start.alias.as_str();
        let target = self.traversal.node_alias.as_str();

        let mut members = vec![self.base_member()?];
        let strategy = state.adapter.capabilities().recursive_query_strategy;
        let inverse = &self.traversal.inverse_edge_kinds;
        match strategy {
            RecursiveQueryStrategy::SingleRecursiveMember => {
                members.push(self.step_member(self.traversal, None)?);
            }
            RecursiveQueryStrategy::RecursiveCte => {
                let mut direct = self.traversal.clone();
                direct.inverse_edge_kinds.clear();
                if !direct.edge_kinds.is_empty() {
                    members.push(self.step_member(&direct, None)?);
                }
                if !inverse.is_empty() {
                    let reversed = Traversal {
                        edge_kinds: inverse.clone(),
                        inverse_edge_kinds: Vec::new(),
                        direction: self.traversal.direction.reversed(),
                        ..self.traversal.clone()
                    };
                    let both: Vec<String> = inverse
                        .iter()
                        .filter(|kind| self.traversal.edge_kinds.contains(kind))
                        .cloned()
                        .collect();
                    let guard = (!both.is_empty()).then(|| {
                        sql![
                            "NOT (e.from_id = e.to_id AND e.from_kind = e.to_kind AND ",
                            kind_filter("e.kind", &both),
                            ")"
                        ]
                    });
                    members.push(self.step_member(&reversed, guard)?);
                }
            }
        }

        let mut scope = CteScope::new();
        scope.carry(start, &self.worktable, false, &state.carried_columns(start));
        scope.carry(target, &self.worktable, false, &state.carried_columns(target));
        scope.mark_unavailable(
            &self.traversal.edge_alias,
            format!(
                "edge alias '{}' is only available in predicates on the variable-length traversal",
                self.traversal.edge_alias
            ),
        );

        let query = FinalQuery::new(state.adapter, ast, &scope, self.subqueries, None)
            .with_aliases(vec![start, target]);
        let mut columns = query.projection(|_| None)?;
        if let Some(alias) = &self.spec.depth_alias {
            columns.push(sql!["depth AS ", quoted(alias)]);
        }
        if let Some(alias) = &self.spec.path_alias {
            columns.push(sql!["path AS ", quoted(alias)]);
        }

        let mut post_filter = Vec::new();
        if self.bounds.min > 0 {
            post_filter.push(Sql::trusted(format!("depth >= {}", self.bounds.min)));
        }

        let mut statement = Statement::select(
            Sql::join(columns, ", "),
            Sql::trusted(self.worktable.clone()),
        );
        statement.recursive = true;
        statement.ctes = vec![Cte::new(
            self.worktable.clone(),
            Sql::join(members, "\nUNION ALL\n"),
        )];
        if let StatementBody::Select { where_clause, .. } = &mut statement.body {
            *where_clause = query.where_clause(&state.final_predicates(), post_filter)?;
        }
        statement.group_by = query.group_by()?;
        statement.having = query.having()?;
        statement.order_by = query.order_by()?;
        statement.limit_offset = query.limit_offset();
        Ok(statement)
    }

    fn node_columns(&self, alias: &str, table: &'static str) -> Vec<Sql> {
        self.state
            .carried_columns(alias)
            .into_iter()
            .map(|column| {
                Sql::trusted(format!(
                    "{}.{} AS {}",
                    table,
                    column.name(),
                    carried_name(alias, column)
                ))
            })
            .collect()
    }

    fn base_member(&self) -> CompileResult<Sql> {
        let state = self.state;
        let ast = state.ast;
        let start = ast.start.alias.as_str();

        let mut columns = self.node_columns(start, "n");
        columns.extend(self.node_columns(&self.traversal.node_alias, "n"));
        columns.push(Sql::raw("0 AS depth"));
        if tracks_path(self.spec) {
            columns.push(sql![state.adapter.path_init(Sql::raw("n.id")), " AS path"]);
        }

        let mut conditions = vec![
            sql!["n.graph_id = ", Sql::param(state.graph_id)],
            kind_filter("n.kind", &ast.start.kinds),
        ];
        conditions.extend(state.temporal_for(start).cloned());
        let scope = TableScope::new().node(start, "n");
        let compiler = PredicateCompiler::new(state.adapter, &scope, self.subqueries);
        conditions.extend(compile_all(&compiler, &state.owned_predicates(start))?);

        Ok(sql![
            "SELECT ",
            Sql::join(columns, ", "),
            " FROM ",
            table(state.adapter, &state.options.schema.nodes_table, "n"),
            " WHERE ",
            Sql::join(conditions, " AND ")
        ])
    }

    /// One recursive member following `hop` from the current target.
    fn step_member(&self, hop: &Traversal, guard: Option<Sql>) -> CompileResult<Sql> {
        let state = self.state;
        let ast = state.ast;
        let start = ast.start.alias.as_str();
        let target = self.traversal.node_alias.as_str();

        let mut columns: Vec<Sql> = state
            .carried_columns(start)
            .into_iter()
            .map(|column| {
                let name = carried_name(start, column);
                Sql::trusted(format!("r.{0} AS {0}", name))
            })
            .collect();
        columns.extend(self.node_columns(target, "n"));
        columns.push(Sql::raw("r.depth + 1 AS depth"));
        if tracks_path(self.spec) {
            columns.push(sql![
                state.adapter.path_extend(Sql::raw("r.path"), Sql::raw("n.id")),
                " AS path"
            ]);
        }

        let join_keyword = if state.adapter.capabilities().force_recursive_join_order {
            " CROSS JOIN "
        } else {
            " JOIN "
        };
        let (joins, mut conditions) = hop_join(
            state,
            hop,
            &Endpoints::new(hop.direction),
            Sql::trusted(format!("r.{}", carried_name(target, Column::Id))),
            Sql::trusted(format!("r.{}", carried_name(target, Column::Kind))),
            join_keyword,
        );

        if !hop.node_kinds.is_empty() {
            conditions.push(kind_filter("n.kind", &hop.node_kinds));
        }
        conditions.extend(state.temporal_for(&self.traversal.edge_alias).cloned());
        conditions.extend(state.temporal_for(target).cloned());
        let scope = TableScope::new()
            .edge(&self.traversal.edge_alias, "e")
            .node(target, "n");
        let compiler = PredicateCompiler::new(state.adapter, &scope, self.subqueries);
        conditions.extend(compile_all(&compiler, &state.owned_predicates(target))?);
        conditions.push(Sql::trusted(format!("r.depth < {}", self.bounds.max)));
        if tracks_path(self.spec) {
            conditions.push(
                state
                    .adapter
                    .cycle_check(Sql::raw("r.path"), Sql::raw("n.id")),
            );
        }
        conditions.extend(guard);

        let mut member = sql![
            "SELECT ",
            Sql::join(columns, ", "),
            " FROM ",
            Sql::trusted(self.worktable.clone()),
            " r",
            joins
        ];
        if let Some(conditions) = and_all(conditions) {
            member.push(sql![" WHERE ", conditions]);
        }
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn spec(min: u32, max: i64) -> VariableLengthSpec {
        VariableLengthSpec::new(min, max)
    }

    #[test_case(1, -1 => Ok(DepthBounds { min: 1, max: 100 }); "unbounded is capped")]
    #[test_case(0, 3 => Ok(DepthBounds { min: 0, max: 3 }); "zero min")]
    #[test_case(2, 1000 => Ok(DepthBounds { min: 2, max: 1000 }); "at the limit")]
    fn test_depth_bounds(min: u32, max: i64) -> CompileResult<DepthBounds> {
        DepthBounds::resolve(&spec(min, max))
    }

    #[test]
    fn test_depth_bound_errors() {
        let err = DepthBounds::resolve(&spec(1, 5000)).unwrap_err();
        assert_eq!(
            err,
            CompileError::unsupported("max_depth 5000 exceeds the limit of 1000")
        );

        assert!(DepthBounds::resolve(&spec(1, 0)).is_err());
        assert!(DepthBounds::resolve(&spec(4, 3))
            .unwrap_err()
            .to_string()
            .contains("min_depth 4"));
    }

    #[test]
    fn test_path_tracking() {
        assert!(tracks_path(&spec(1, 3).cycle_policy(CyclePolicy::Prevent)));
        assert!(!tracks_path(&spec(1, 3).cycle_policy(CyclePolicy::Allow)));
        assert!(tracks_path(
            &spec(1, 3).cycle_policy(CyclePolicy::Allow).with_path("trail")
        ));
    }

    #[test]
    fn test_single_hop_detection() {
        let hop = |spec: VariableLengthSpec| {
            QueryAst::from_kind("p", "Person")
                .traverse(Traversal::out("p", "e", "knows", "f", "Person").variable_length(spec))
        };

        assert!(is_single_hop(&hop(spec(1, 1))));
        assert!(!is_single_hop(&hop(spec(1, 2))));
        assert!(!is_single_hop(&hop(spec(1, 1).with_depth("hops"))));

        let lowered = lower_single_hop(&hop(spec(1, 1)));
        assert!(!lowered.has_variable_length());
    }
}
