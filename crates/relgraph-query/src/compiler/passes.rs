//! Compiler pass pipeline.
//!
//! Each pass reads the AST and the decisions of earlier passes from a shared
//! [`PassState`] and records its own. SQL text is only built after the
//! pipeline has run; the final pass lowers the decisions into a
//! [`LogicalPlan`] that the emitter checks the statement against.

use super::context::cte_name;
use super::temporal;
use super::validate::ValidationPass;
use crate::ast::{
    AggregateFunction, AliasKind, ComparisonOp, FieldTarget, PredicateExpression,
    ProjectionSource, QueryAst, ValueOperand, VectorSimilarity,
};
use crate::config::CompileOptions;
use crate::dialect::{ensure_metric, DialectAdapter};
use crate::error::{CompileError, CompileResult};
use crate::json_pointer::JsonPointer;
use crate::plan::{JoinKind, LogicalOp, LogicalPlan, PlanNode, ScanSource};
use crate::schema::Column;
use crate::sql::Sql;
use std::collections::BTreeMap;
use tracing::debug;

/// Multiplier applied to the final LIMIT when pushed into traversal CTEs.
const PUSHDOWN_FACTOR: u64 = 8;
const PUSHDOWN_CAP: u64 = 10_000;

/// One step of the compilation pipeline.
pub(crate) trait CompilerPass {
    fn name(&self) -> &'static str;

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()>;
}

/// The single vector search of a query.
#[derive(Debug, Clone)]
pub(crate) struct VectorSearch {
    pub alias: String,
    pub pointer: JsonPointer,
    pub similarity: VectorSimilarity,
}

/// Grouped-count rewrite of a single traversal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CountFastPath {
    pub node_alias: String,
    /// `(projection index, COUNT DISTINCT)` per counted column
    pub counts: Vec<(usize, bool)>,
}

impl CountFastPath {
    pub fn cte_alias(&self) -> String {
        format!("{}_counts", self.node_alias)
    }
}

/// Everything the passes know about one compilation.
pub(crate) struct PassState<'a> {
    pub ast: &'a QueryAst,
    pub graph_id: &'a str,
    pub adapter: &'a dyn DialectAdapter,
    pub options: &'a CompileOptions,
    /// Prefix for generated CTE names (set-operation branches)
    pub prefix: String,

    /// Owning alias per predicate; `None` evaluates it in the final WHERE
    pub placements: Vec<Option<String>>,
    pub vector: Option<VectorSearch>,
    pub temporal: BTreeMap<String, Sql>,

    pub pruning: bool,
    pub carried: BTreeMap<String, Vec<Column>>,
    pub collapse: bool,
    pub pushdown_limit: Option<u64>,
    pub count_fast_path: Option<CountFastPath>,

    pub plan: Option<LogicalPlan>,
}

impl<'a> PassState<'a> {
    pub fn new(
        ast: &'a QueryAst,
        graph_id: &'a str,
        adapter: &'a dyn DialectAdapter,
        options: &'a CompileOptions,
    ) -> Self {
        Self {
            ast,
            graph_id,
            adapter,
            options,
            prefix: String::new(),
            placements: Vec::new(),
            vector: None,
            temporal: BTreeMap::new(),
            pruning: false,
            carried: BTreeMap::new(),
            collapse: false,
            pushdown_limit: None,
            count_fast_path: None,
            plan: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn cte(&self, alias: &str) -> String {
        cte_name(&self.prefix, alias)
    }

    /// Predicates evaluated inside the CTE owned by `owner`.
    pub fn owned_predicates(&self, owner: &str) -> Vec<&'a PredicateExpression> {
        let ast: &'a QueryAst = self.ast;
        ast.predicates
            .iter()
            .zip(&self.placements)
            .filter(|(_, placement)| placement.as_deref() == Some(owner))
            .map(|(predicate, _)| &predicate.expression)
            .collect()
    }

    /// Predicates spanning CTEs, evaluated after the joins.
    pub fn final_predicates(&self) -> Vec<&'a PredicateExpression> {
        let ast: &'a QueryAst = self.ast;
        ast.predicates
            .iter()
            .zip(&self.placements)
            .filter(|(_, placement)| placement.is_none())
            .map(|(predicate, _)| &predicate.expression)
            .collect()
    }

    /// Carried columns of `alias`, every column when nothing was pruned.
    pub fn carried_columns(&self, alias: &str) -> Vec<Column> {
        if let Some(columns) = self.carried.get(alias) {
            return columns.clone();
        }
        let edge = self.ast.alias_kind(alias).is_some_and(AliasKind::is_edge);
        Column::all(edge).to_vec()
    }

    pub fn temporal_for(&self, alias: &str) -> Option<&Sql> {
        self.temporal.get(alias)
    }

    pub fn plan(&self) -> CompileResult<&LogicalPlan> {
        self.plan.as_ref().ok_or_else(|| {
            CompileError::invariant("lower", "no logical plan was produced", "pipeline")
        })
    }

    /// True when a later traversal joins from traversal `index`.
    pub fn is_intermediate(&self, index: usize) -> bool {
        let node_alias = &self.ast.traversals[index].node_alias;
        self.ast.traversals[index + 1..]
            .iter()
            .any(|t| &t.join_from_alias == node_alias)
    }
}

/// Ordered list of passes.
pub(crate) struct PassPipeline {
    passes: Vec<Box<dyn CompilerPass>>,
}

impl PassPipeline {
    pub fn new(passes: Vec<Box<dyn CompilerPass>>) -> Self {
        Self { passes }
    }

    /// Pipeline for fixed-length queries.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(ValidationPass),
            Box::new(VectorDetectionPass),
            Box::new(TemporalPass),
            Box::new(ColumnPruningPass),
            Box::new(CollapsePass),
            Box::new(LimitPushdownPass),
            Box::new(CountFastPathPass),
            Box::new(PlanLoweringPass),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        debug!(passes = ?self.names(), "Running pass pipeline");
        for pass in &self.passes {
            debug!(pass = pass.name(), "Running compiler pass");
            pass.run(state)?;
        }
        Ok(())
    }
}

/// Finds the vector predicate, if any.
pub(crate) struct VectorDetectionPass;

impl CompilerPass for VectorDetectionPass {
    fn name(&self) -> &'static str {
        "vector_detection"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let mut found = Vec::new();
        for predicate in &ast.predicates {
            if predicate.expression.has_nested_vector() {
                return Err(CompileError::unsupported(
                    "vector similarity may only appear at top level or under AND",
                ));
            }
            found.extend(predicate.expression.top_level_vectors());
        }
        if let Some(having) = &ast.having {
            if having.contains_vector_similarity() {
                return Err(CompileError::unsupported(
                    "vector similarity is not allowed in HAVING",
                ));
            }
        }

        let similarity = match found.as_slice() {
            [] => return Ok(()),
            [single] => (*single).clone(),
            _ => {
                return Err(CompileError::unsupported(format!(
                    "only one vector similarity predicate is supported per query, found {}",
                    found.len()
                )))
            }
        };

        let alias = similarity.field.alias.clone();
        if ast.alias_kind(&alias).map_or(true, AliasKind::is_edge) {
            return Err(CompileError::unsupported(format!(
                "vector similarity must target a node alias, got '{}'",
                alias
            )));
        }
        let pointer = match similarity.field.target().map_err(CompileError::unsupported)? {
            FieldTarget::Prop(pointer) if !pointer.is_root() => pointer,
            _ => {
                return Err(CompileError::unsupported(format!(
                    "vector similarity needs an embedding property, got '{}'",
                    similarity.field.describe()
                )))
            }
        };
        if similarity.k == 0 {
            return Err(CompileError::unsupported("vector similarity k must be at least 1"));
        }
        ensure_metric(state.adapter, similarity.metric)?;

        debug!(alias = %alias, metric = similarity.metric.name(), k = similarity.k, "Vector search detected");
        state.vector = Some(VectorSearch {
            alias,
            pointer,
            similarity,
        });
        Ok(())
    }
}

/// Builds one temporal filter per alias around a shared "now".
pub(crate) struct TemporalPass;

impl CompilerPass for TemporalPass {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let mode = &ast.temporal_mode;
        let now = temporal::now_expression(mode, state.adapter, state.options);
        for alias in ast.aliases() {
            let table = if ast.alias_kind(alias).is_some_and(AliasKind::is_edge) {
                "e"
            } else {
                "n"
            };
            if let Some(condition) = temporal::condition(table, mode, now.as_ref()) {
                state.temporal.insert(alias.to_string(), condition);
            }
        }
        Ok(())
    }
}

/// Narrows the columns each CTE carries to what the final SELECT reads.
pub(crate) struct ColumnPruningPass;

impl ColumnPruningPass {
    fn applies(ast: &QueryAst) -> bool {
        ast.selective_fields.is_some()
            || !ast.group_by.is_empty()
            || ast.having.is_some()
            || ast.has_aggregate_projection()
    }
}

impl CompilerPass for ColumnPruningPass {
    fn name(&self) -> &'static str {
        "column_pruning"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        if !Self::applies(ast) {
            return Ok(());
        }

        let mut carried: BTreeMap<String, Vec<Column>> = BTreeMap::new();
        for alias in ast.aliases() {
            let edge = ast.alias_kind(alias).is_some_and(AliasKind::is_edge);
            carried.insert(alias.to_string(), Column::join_keys(edge).to_vec());
        }
        let mut need = |alias: &str, columns: &[Column]| {
            if let Some(list) = carried.get_mut(alias) {
                for column in columns {
                    if !list.contains(column) {
                        list.push(*column);
                    }
                }
            }
        };

        let mut fields = Vec::new();
        for projection in &ast.projection {
            match &projection.source {
                ProjectionSource::Field { field } => fields.push(field),
                ProjectionSource::Aggregate { aggregate } => {
                    // COUNT(alias) reads the id only
                    if aggregate.field.target() != Ok(FieldTarget::WholeAlias) {
                        fields.push(&aggregate.field);
                    }
                }
            }
        }
        fields.extend(&ast.group_by);
        if let Some(having) = &ast.having {
            fields.extend(having.field_refs());
        }
        fields.extend(ast.order_by.iter().map(|o| &o.field));
        fields.extend(ast.selective_fields.iter().flatten().map(|s| &s.field));
        for predicate in state.final_predicates() {
            fields.extend(predicate.field_refs());
        }

        for field in fields {
            let edge = ast.alias_kind(&field.alias).is_some_and(AliasKind::is_edge);
            match field.target().map_err(CompileError::unsupported)? {
                FieldTarget::WholeAlias => need(&field.alias, Column::all(edge)),
                FieldTarget::System(column) => need(&field.alias, &[column]),
                FieldTarget::Prop(_) => need(&field.alias, &[Column::Props]),
            }
        }

        for columns in carried.values_mut() {
            columns.sort();
        }
        debug!(aliases = carried.len(), "Column pruning applied");
        state.pruning = true;
        state.carried = carried;
        Ok(())
    }
}

/// Reads the final rows straight from the last traversal CTE when the chain
/// is linear and only selective fields are projected.
pub(crate) struct CollapsePass;

impl CompilerPass for CollapsePass {
    fn name(&self) -> &'static str {
        "collapse"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let linear = ast.traversals.iter().enumerate().all(|(i, t)| {
            let previous = match i {
                0 => &ast.start.alias,
                _ => &ast.traversals[i - 1].node_alias,
            };
            &t.join_from_alias == previous
        });
        state.collapse = !ast.traversals.is_empty()
            && linear
            && ast.traversals.iter().all(|t| !t.optional)
            && ast.group_by.is_empty()
            && ast.having.is_none()
            && !ast.has_aggregate_projection()
            && ast.selective_fields.is_some()
            && ast.projection.is_empty();
        if state.collapse {
            debug!(traversals = ast.traversals.len(), "Collapsing traversal rowsets");
        }
        Ok(())
    }
}

/// Pushes a bounded LIMIT into intermediate traversal CTEs.
pub(crate) struct LimitPushdownPass;

impl LimitPushdownPass {
    /// Start predicates pin the start node with `id = <literal>`.
    fn start_is_bound(state: &PassState<'_>) -> bool {
        let start = state.ast.start.alias.as_str();
        state
            .owned_predicates(start)
            .into_iter()
            .any(|expr| pins_id(expr, start))
    }
}

fn pins_id(expr: &PredicateExpression, alias: &str) -> bool {
    match expr {
        PredicateExpression::Comparison {
            field,
            op: ComparisonOp::Eq,
            value: ValueOperand::Literal { value, .. },
        } => {
            field.alias == alias
                && !value.is_null()
                && field.target() == Ok(FieldTarget::System(Column::Id))
        }
        PredicateExpression::And { operands } => operands.iter().any(|op| pins_id(op, alias)),
        _ => false,
    }
}

impl CompilerPass for LimitPushdownPass {
    fn name(&self) -> &'static str {
        "limit_pushdown"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let Some(limit) = ast.limit else {
            return Ok(());
        };
        let eligible = ast.offset.is_none()
            && ast.group_by.is_empty()
            && ast.having.is_none()
            && ast.order_by.is_empty()
            && !ast.has_aggregate_projection()
            && ast.traversals.len() >= 2
            && ast.traversals.iter().all(|t| !t.optional)
            && state.vector.is_none()
            && Self::start_is_bound(state);
        if eligible {
            let pushed = limit.saturating_mul(PUSHDOWN_FACTOR).min(PUSHDOWN_CAP);
            debug!(limit, pushed, "Pushing LIMIT into traversal CTEs");
            state.pushdown_limit = Some(pushed);
        }
        Ok(())
    }
}

/// Replaces a grouped single traversal with a pre-aggregated count CTE.
pub(crate) struct CountFastPathPass;

impl CountFastPathPass {
    fn detect(state: &PassState<'_>) -> Option<CountFastPath> {
        let ast = state.ast;
        let [traversal] = ast.traversals.as_slice() else {
            return None;
        };
        let start = ast.start.alias.as_str();
        let group_by_start_id = match ast.group_by.as_slice() {
            [field] => {
                field.alias == start && field.target() == Ok(FieldTarget::System(Column::Id))
            }
            _ => false,
        };
        if !group_by_start_id
            || ast.having.is_some()
            || !traversal.inverse_edge_kinds.is_empty()
            || state.vector.is_some()
            || state.placements.iter().any(Option::is_none)
            || ast.order_by.iter().any(|o| o.field.alias != start)
        {
            return None;
        }

        let node = traversal.node_alias.as_str();
        let mut counts = Vec::new();
        for (i, projection) in ast.projection.iter().enumerate() {
            match &projection.source {
                ProjectionSource::Field { field } if field.alias == start => {}
                ProjectionSource::Aggregate { aggregate }
                    if aggregate.function.is_count()
                        && aggregate.field.alias == node
                        && matches!(
                            aggregate.field.target(),
                            Ok(FieldTarget::WholeAlias | FieldTarget::System(Column::Id))
                        ) =>
                {
                    counts.push((i, aggregate.function == AggregateFunction::CountDistinct));
                }
                _ => return None,
            }
        }
        if counts.is_empty() {
            return None;
        }
        Some(CountFastPath {
            node_alias: node.to_string(),
            counts,
        })
    }
}

impl CompilerPass for CountFastPathPass {
    fn name(&self) -> &'static str {
        "count_fast_path"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        state.count_fast_path = Self::detect(state);
        if let Some(fast_path) = &state.count_fast_path {
            debug!(alias = %fast_path.node_alias, counts = fast_path.counts.len(), "Using count fast path");
        }
        Ok(())
    }
}

/// Lowers the decisions into a logical plan.
pub(crate) struct PlanLoweringPass;

impl CompilerPass for PlanLoweringPass {
    fn name(&self) -> &'static str {
        "plan_lowering"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        let start = &ast.start.alias;

        let mut node = filtered_scan(state, start, ScanSource::Nodes);
        for traversal in &ast.traversals {
            let kind = if traversal.optional {
                JoinKind::Left
            } else {
                JoinKind::Inner
            };
            let alias = match &state.count_fast_path {
                Some(fast_path) if fast_path.node_alias == traversal.node_alias => {
                    fast_path.cte_alias()
                }
                _ => traversal.node_alias.clone(),
            };
            let right = filtered_scan(state, &traversal.node_alias, ScanSource::Edges);
            node = PlanNode::with_inputs(LogicalOp::Join { alias, kind }, vec![node, right]);
        }

        if let Some(vector) = &state.vector {
            node = node.then(LogicalOp::VectorKnn {
                alias: vector.alias.clone(),
                metric: vector.similarity.metric,
                k: vector.similarity.k,
            });
        }
        node = finish_plan(
            node,
            ast,
            state.final_predicates().len(),
            state.count_fast_path.is_none(),
            state.vector.is_some(),
        );
        state.plan = Some(LogicalPlan::new(node));
        Ok(())
    }
}

fn filtered_scan(state: &PassState<'_>, alias: &str, source: ScanSource) -> PlanNode {
    let scan = PlanNode::new(LogicalOp::Scan {
        alias: alias.to_string(),
        source,
    });
    match state.owned_predicates(alias).len() {
        0 => scan,
        predicates => scan.then(LogicalOp::Filter {
            alias: alias.to_string(),
            predicates,
        }),
    }
}

/// Filter, aggregate, sort, limit and project operators above the row
/// source, shared by the standard and recursive paths.
pub(crate) fn finish_plan(
    mut node: PlanNode,
    ast: &QueryAst,
    final_predicates: usize,
    aggregate: bool,
    vector: bool,
) -> PlanNode {
    if final_predicates > 0 {
        node = node.then(LogicalOp::Filter {
            alias: "*".to_string(),
            predicates: final_predicates,
        });
    }
    let grouped =
        !ast.group_by.is_empty() || ast.having.is_some() || ast.has_aggregate_projection();
    if aggregate && grouped {
        node = node.then(LogicalOp::Aggregate {
            group_keys: ast.group_by.len(),
            aggregates: ast
                .projection
                .iter()
                .filter(|p| matches!(p.source, ProjectionSource::Aggregate { .. }))
                .count(),
            having: ast.having.is_some(),
        });
    }
    if !ast.order_by.is_empty() || vector {
        node = node.then(LogicalOp::Sort {
            keys: ast.order_by.len() + usize::from(vector),
        });
    }
    if ast.limit.is_some() || ast.offset.is_some() || vector {
        node = node.then(LogicalOp::LimitOffset {
            limit: ast.limit,
            offset: ast.offset,
        });
    }
    let columns = if !ast.projection.is_empty() {
        Some(ast.projection.len())
    } else {
        ast.selective_fields.as_ref().map(Vec::len)
    };
    node.then(LogicalOp::Project { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldRef, Traversal, VectorMetric};
    use crate::dialect::{PostgresDialect, SqliteDialect};

    fn run_standard<'a>(
        ast: &'a QueryAst,
        options: &'a CompileOptions,
        adapter: &'a dyn DialectAdapter,
    ) -> CompileResult<PassState<'a>> {
        let mut state = PassState::new(ast, "g1", adapter, options);
        PassPipeline::standard().run(&mut state)?;
        Ok(state)
    }

    fn chain() -> QueryAst {
        QueryAst::from_kind("p", "Person")
            .traverse(Traversal::out("p", "e1", "knows", "f", "Person"))
            .traverse(Traversal::out("f", "e2", "worksAt", "c", "Company"))
    }

    fn vector(alias: &str, metric: VectorMetric) -> PredicateExpression {
        PredicateExpression::VectorSimilarity(VectorSimilarity {
            field: FieldRef::prop(alias, "embedding"),
            query_embedding: vec![0.1, 0.2],
            metric,
            k: 5,
            min_score: None,
        })
    }

    #[test]
    fn test_pipeline_order() {
        assert_eq!(
            PassPipeline::standard().names(),
            vec![
                "validate",
                "vector_detection",
                "temporal",
                "column_pruning",
                "collapse",
                "limit_pushdown",
                "count_fast_path",
                "plan_lowering"
            ]
        );
    }

    #[test]
    fn test_two_vector_predicates_rejected() {
        let options = CompileOptions::default();
        let ast = QueryAst::from_kind("p", "Doc")
            .filter("p", vector("p", VectorMetric::Cosine))
            .filter("p", vector("p", VectorMetric::Cosine));
        let err = run_standard(&ast, &options, &SqliteDialect).err().unwrap();
        assert!(err.to_string().contains("only one vector similarity"));
    }

    #[test]
    fn test_vector_metric_checked_per_dialect() {
        let options = CompileOptions::default();
        let ast = QueryAst::from_kind("p", "Doc").filter("p", vector("p", VectorMetric::InnerProduct));

        assert!(run_standard(&ast, &options, &SqliteDialect).is_err());
        let state = run_standard(&ast, &options, &PostgresDialect).unwrap();
        assert_eq!(state.vector.map(|v| v.alias), Some("p".to_string()));
    }

    #[test]
    fn test_temporal_filters_per_alias() {
        let options = CompileOptions::default();
        let ast = chain();
        let state = run_standard(&ast, &options, &SqliteDialect).unwrap();

        assert_eq!(state.temporal.len(), 5);
        let edge = state.temporal_for("e1").unwrap().render_inline(&SqliteDialect);
        assert!(edge.starts_with("e.deleted_at IS NULL"));
    }

    #[test]
    fn test_pruning_keeps_join_keys_and_references() {
        let options = CompileOptions::default();
        let ast = QueryAst::from_kind("p", "Person")
            .traverse(Traversal::out("p", "e", "worksAt", "c", "Company"))
            .project("name", ProjectionSource::field(FieldRef::prop("c", "name")))
            .project(
                "people",
                ProjectionSource::aggregate(AggregateFunction::Count, FieldRef::alias("p")),
            );
        let mut ast = ast;
        ast.group_by.push(FieldRef::prop("c", "name"));

        let state = run_standard(&ast, &options, &SqliteDialect).unwrap();

        assert!(state.pruning);
        assert_eq!(state.carried_columns("p"), vec![Column::Id, Column::Kind]);
        assert_eq!(
            state.carried_columns("c"),
            vec![Column::Id, Column::Kind, Column::Props]
        );
        assert_eq!(state.carried_columns("e"), vec![Column::Id]);
    }

    #[test]
    fn test_no_pruning_without_trigger() {
        let options = CompileOptions::default();
        let ast = chain();
        let state = run_standard(&ast, &options, &SqliteDialect).unwrap();

        assert!(!state.pruning);
        assert_eq!(state.carried_columns("e1").len(), 12);
    }

    #[test]
    fn test_collapse_requires_linear_selective_query() {
        let options = CompileOptions::default();
        let mut ast = chain();
        ast.selective_fields = Some(vec![crate::ast::SelectiveField::new(
            FieldRef::prop("c", "name"),
            "company",
        )]);
        assert!(run_standard(&ast, &options, &SqliteDialect).unwrap().collapse);

        let optional = {
            let mut ast = ast.clone();
            ast.traversals[1].optional = true;
            ast
        };
        assert!(!run_standard(&optional, &options, &SqliteDialect).unwrap().collapse);

        let branching = {
            let mut ast = ast.clone();
            ast.traversals[1].join_from_alias = "p".to_string();
            ast
        };
        assert!(!run_standard(&branching, &options, &SqliteDialect).unwrap().collapse);
    }

    #[test]
    fn test_limit_pushdown_needs_bound_start() {
        let options = CompileOptions::default();
        let bound = chain()
            .filter("p", PredicateExpression::eq(FieldRef::system("p", "id"), "p1"))
            .limit(10);
        let state = run_standard(&bound, &options, &SqliteDialect).unwrap();
        assert_eq!(state.pushdown_limit, Some(80));

        let huge = bound.clone().limit(5_000);
        let state = run_standard(&huge, &options, &SqliteDialect).unwrap();
        assert_eq!(state.pushdown_limit, Some(10_000));

        let unbound = chain().limit(10);
        let state = run_standard(&unbound, &options, &SqliteDialect).unwrap();
        assert_eq!(state.pushdown_limit, None);

        let with_offset = bound.offset(5);
        let state = run_standard(&with_offset, &options, &SqliteDialect).unwrap();
        assert_eq!(state.pushdown_limit, None);
    }

    #[test]
    fn test_count_fast_path_detection() {
        let options = CompileOptions::default();
        let mut ast = QueryAst::from_kind("p", "Person")
            .traverse(Traversal::out("p", "e", "knows", "f", "Person"))
            .project("person", ProjectionSource::field(FieldRef::alias("p")))
            .project(
                "friends",
                ProjectionSource::aggregate(AggregateFunction::CountDistinct, FieldRef::system("f", "id")),
            );
        ast.group_by.push(FieldRef::system("p", "id"));

        let state = run_standard(&ast, &options, &SqliteDialect).unwrap();
        let fast_path = state.count_fast_path.clone().unwrap();
        assert_eq!(fast_path.counts, vec![(1, true)]);
        assert!(!state.plan().unwrap().has_group_by());
        assert!(state
            .plan()
            .unwrap()
            .contains(|op| matches!(op, LogicalOp::Join { alias, .. } if alias == "f_counts")));

        let mut summed = ast.clone();
        summed.projection[1].source =
            ProjectionSource::aggregate(AggregateFunction::Sum, FieldRef::prop("f", "age"));
        let state = run_standard(&summed, &options, &SqliteDialect).unwrap();
        assert!(state.count_fast_path.is_none());
        assert!(state.plan().unwrap().has_group_by());
    }

    #[test]
    fn test_plan_for_vector_query_sorts_and_limits() {
        let options = CompileOptions::default();
        let ast = QueryAst::from_kind("p", "Doc").filter("p", vector("p", VectorMetric::Cosine));
        let state = run_standard(&ast, &options, &SqliteDialect).unwrap();
        let plan = state.plan().unwrap();

        assert!(plan.has_sort());
        assert!(plan.has_limit_offset());
        assert!(plan.contains(|op| matches!(op, LogicalOp::VectorKnn { k: 5, .. })));
    }
}
