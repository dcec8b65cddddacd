//! Fixed-length query compilation.
//!
//! One CTE per binding: the start CTE scans nodes, each traversal CTE joins
//! edges and nodes onto the rows of the alias it starts from. The final
//! SELECT joins the CTEs back together on the carried `<alias>_id` and
//! `<alias>_kind` columns.

use super::context::{carried_name, distance_name, CteScope, FieldScope, TableScope};
use super::passes::{CountFastPath, PassState, VectorSearch};
use super::predicate::{reject_container, PredicateCompiler, SubqueryCompiler};
use crate::ast::{
    AliasKind, Direction, FieldRef, FieldTarget, NullsOrder, PredicateExpression,
    ProjectionSource, QueryAst, SortDirection, Traversal,
};
use crate::dialect::DialectAdapter;
use crate::emitter::{Cte, Statement, StatementBody};
use crate::error::{CompileError, CompileResult};
use crate::identifier::{quote_identifier, Identifier};
use crate::schema::Column;
use crate::sql::{sql, Sql};

/// `"table" alias`
pub(crate) fn table(adapter: &dyn DialectAdapter, name: &Identifier, alias: &'static str) -> Sql {
    sql![adapter.quote_identifier(name), " ", alias]
}

/// `column = ?` for one kind, `column IN (?, ...)` for several.
pub(crate) fn kind_filter(column: &'static str, kinds: &[String]) -> Sql {
    match kinds {
        [single] => sql![column, " = ", Sql::param(single.as_str())],
        _ => sql![
            column,
            " IN (",
            Sql::join(kinds.iter().map(|k| Sql::param(k.as_str())), ", "),
            ")"
        ],
    }
}

pub(crate) fn and_all(conditions: Vec<Sql>) -> Option<Sql> {
    if conditions.is_empty() {
        None
    } else {
        Some(Sql::join(conditions, " AND "))
    }
}

pub(crate) fn quoted(name: &str) -> Sql {
    Sql::trusted(quote_identifier(name))
}

pub(crate) fn compile_all(
    compiler: &PredicateCompiler<'_>,
    predicates: &[&PredicateExpression],
) -> CompileResult<Vec<Sql>> {
    predicates
        .iter()
        .map(|predicate| compiler.compile(predicate))
        .collect()
}

/// Edge columns on the side a traversal leaves from and the side it reaches.
pub(crate) struct Endpoints {
    pub near_id: &'static str,
    pub near_kind: &'static str,
    pub far_id: &'static str,
    pub far_kind: &'static str,
}

impl Endpoints {
    pub fn new(direction: Direction) -> Self {
        match direction {
            Direction::Out => Self {
                near_id: "e.from_id",
                near_kind: "e.from_kind",
                far_id: "e.to_id",
                far_kind: "e.to_kind",
            },
            Direction::In => Self {
                near_id: "e.to_id",
                near_kind: "e.to_kind",
                far_id: "e.from_id",
                far_kind: "e.from_kind",
            },
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            near_id: self.far_id,
            near_kind: self.far_kind,
            far_id: self.near_id,
            far_kind: self.near_kind,
        }
    }

    /// The edge leaves from `(id, kind)`.
    pub fn leaves_from(&self, id: &Sql, kind: &Sql) -> Sql {
        sql![self.near_id, " = ", id, " AND ", self.near_kind, " = ", kind]
    }
}

/// Join of the edges and nodes tables for one hop from `(id, kind)`.
///
/// Returns the `JOIN ... JOIN ...` text and the conditions that belong in
/// the WHERE clause (edge kind filter, unless inverse kinds moved it into
/// the join).
pub(crate) fn hop_join(
    state: &PassState<'_>,
    traversal: &Traversal,
    endpoints: &Endpoints,
    id: Sql,
    kind: Sql,
    join_keyword: &'static str,
) -> (Sql, Vec<Sql>) {
    let schema = &state.options.schema;
    let edges = table(state.adapter, &schema.edges_table, "e");
    let nodes = table(state.adapter, &schema.nodes_table, "n");
    let graph = Sql::param(state.graph_id);

    if traversal.inverse_edge_kinds.is_empty() {
        let join = sql![
            join_keyword,
            edges,
            " ON e.graph_id = ",
            graph,
            " AND ",
            endpoints.leaves_from(&id, &kind),
            " JOIN ",
            nodes,
            " ON n.graph_id = e.graph_id AND n.id = ",
            endpoints.far_id,
            " AND n.kind = ",
            endpoints.far_kind
        ];
        return (join, vec![kind_filter("e.kind", &traversal.edge_kinds)]);
    }

    let reversed = endpoints.reversed();
    let backward = sql![
        "(",
        kind_filter("e.kind", &traversal.inverse_edge_kinds),
        " AND ",
        reversed.leaves_from(&id, &kind),
        ")"
    ];
    let (condition, far_id, far_kind) = if traversal.edge_kinds.is_empty() {
        (backward, Sql::raw(reversed.far_id), Sql::raw(reversed.far_kind))
    } else {
        let forward = sql![
            "(",
            kind_filter("e.kind", &traversal.edge_kinds),
            " AND ",
            endpoints.leaves_from(&id, &kind),
            ")"
        ];
        let pick = |forward_column: &'static str, backward_column: &'static str| {
            sql![
                "CASE WHEN ",
                &forward,
                " THEN ",
                forward_column,
                " ELSE ",
                backward_column,
                " END"
            ]
        };
        let far_id = pick(endpoints.far_id, reversed.far_id);
        let far_kind = pick(endpoints.far_kind, reversed.far_kind);
        (sql!["(", &forward, " OR ", backward, ")"], far_id, far_kind)
    };
    let join = sql![
        join_keyword,
        edges,
        " ON e.graph_id = ",
        graph,
        " AND ",
        condition,
        " JOIN ",
        nodes,
        " ON n.graph_id = e.graph_id AND n.id = ",
        far_id,
        " AND n.kind = ",
        far_kind
    ];
    (join, Vec::new())
}

/// Embedding join, distance expression and optional threshold for the
/// vector search on the node aliased `n`.
struct VectorParts {
    join: Sql,
    distance: Sql,
    threshold: Option<Sql>,
}

fn vector_parts(state: &PassState<'_>, vector: &VectorSearch) -> CompileResult<VectorParts> {
    let similarity = &vector.similarity;
    let embeddings = table(state.adapter, &state.options.schema.embeddings_table, "emb");
    let join = sql![
        " JOIN ",
        embeddings,
        " ON emb.graph_id = n.graph_id AND emb.node_kind = n.kind AND emb.node_id = n.id \
         AND emb.field_path = ",
        Sql::param(vector.pointer.to_string())
    ];
    let query = Sql::param(state.adapter.format_embedding(&similarity.query_embedding));
    let distance = state
        .adapter
        .vector_distance(Sql::raw("emb.embedding"), query, similarity.metric)?;
    let threshold = similarity.min_score.map(|score| {
        sql![
            &distance,
            " <= ",
            Sql::param(similarity.metric.distance_threshold(score))
        ]
    });
    Ok(VectorParts {
        join,
        distance,
        threshold,
    })
}

/// Builds the statement for a fixed-length query from the pass decisions.
pub(crate) struct StandardCompiler<'s, 'a> {
    state: &'s PassState<'a>,
    subqueries: &'s dyn SubqueryCompiler,
}

impl<'s, 'a> StandardCompiler<'s, 'a> {
    pub fn new(state: &'s PassState<'a>, subqueries: &'s dyn SubqueryCompiler) -> Self {
        Self { state, subqueries }
    }

    pub fn build(&self) -> CompileResult<Statement> {
        let state = self.state;
        let ast = state.ast;

        let mut ctes = vec![self.start_cte()?];
        for (i, traversal) in ast.traversals.iter().enumerate() {
            let cte = match &state.count_fast_path {
                Some(fast_path) if fast_path.node_alias == traversal.node_alias => {
                    self.counts_cte(traversal, fast_path)?
                }
                _ => self.traversal_cte(i, traversal)?,
            };
            ctes.push(cte);
        }

        let scope = self.final_scope();
        let vector = state.vector.as_ref().map(|v| (v.alias.as_str(), v.similarity.k));
        let query = FinalQuery::new(state.adapter, ast, &scope, self.subqueries, vector);

        let columns = query.projection(|index| self.fast_path_column(index))?;
        let mut statement = Statement::select(Sql::join(columns, ", "), self.from_clause());
        statement.ctes = ctes;
        if let StatementBody::Select { where_clause, .. } = &mut statement.body {
            *where_clause = query.where_clause(&state.final_predicates(), Vec::new())?;
        }
        if state.count_fast_path.is_none() {
            statement.group_by = query.group_by()?;
            statement.having = query.having()?;
        }
        statement.order_by = query.order_by()?;
        statement.limit_offset = query.limit_offset();
        Ok(statement)
    }

    fn node_columns(&self, alias: &str) -> Vec<Sql> {
        self.state
            .carried_columns(alias)
            .into_iter()
            .map(|column| {
                Sql::trusted(format!(
                    "{}.{} AS {}",
                    if alias_is_edge(self.state.ast, alias) { "e" } else { "n" },
                    column.name(),
                    carried_name(alias, column)
                ))
            })
            .collect()
    }

    fn vector_for(&self, alias: &str) -> CompileResult<Option<VectorParts>> {
        match &self.state.vector {
            Some(vector) if vector.alias == alias => vector_parts(self.state, vector).map(Some),
            _ => Ok(None),
        }
    }

    fn start_cte(&self) -> CompileResult<Cte> {
        let state = self.state;
        let ast = state.ast;
        let alias = ast.start.alias.as_str();

        let mut columns = self.node_columns(alias);
        let mut from = table(state.adapter, &state.options.schema.nodes_table, "n");
        let mut conditions = vec![
            sql!["n.graph_id = ", Sql::param(state.graph_id)],
            kind_filter("n.kind", &ast.start.kinds),
        ];
        conditions.extend(state.temporal_for(alias).cloned());

        let scope = TableScope::new().node(alias, "n");
        let compiler = PredicateCompiler::new(state.adapter, &scope, self.subqueries);
        conditions.extend(compile_all(&compiler, &state.owned_predicates(alias))?);

        if let Some(vector) = self.vector_for(alias)? {
            columns.push(sql![vector.distance, " AS ", Sql::trusted(distance_name(alias))]);
            from.push(vector.join);
            conditions.extend(vector.threshold);
        }

        let body = sql![
            "SELECT ",
            Sql::join(columns, ", "),
            " FROM ",
            from,
            " WHERE ",
            Sql::join(conditions, " AND ")
        ];
        Ok(Cte::new(state.cte(alias), body))
    }

    fn traversal_cte(&self, index: usize, traversal: &Traversal) -> CompileResult<Cte> {
        let state = self.state;
        let previous = traversal.join_from_alias.as_str();
        let previous_cte = state.cte(previous);
        let previous_id = carried_name(previous, Column::Id);
        let previous_kind = carried_name(previous, Column::Kind);

        let (source, mut columns) = if state.collapse {
            (sql![Sql::trusted(previous_cte), " src"], vec![Sql::raw("src.*")])
        } else {
            let source = if previous == state.ast.start.alias {
                sql![Sql::trusted(previous_cte), " src"]
            } else {
                // one row per reachable node, so later joins do not multiply
                Sql::trusted(format!(
                    "(SELECT DISTINCT {}, {} FROM {}) src",
                    previous_id, previous_kind, previous_cte
                ))
            };
            let keys = vec![
                Sql::trusted(format!("src.{0} AS {0}", previous_id)),
                Sql::trusted(format!("src.{0} AS {0}", previous_kind)),
            ];
            (source, keys)
        };
        columns.extend(self.node_columns(&traversal.edge_alias));
        columns.extend(self.node_columns(&traversal.node_alias));

        let endpoints = Endpoints::new(traversal.direction);
        let (joins, mut conditions) = hop_join(
            state,
            traversal,
            &endpoints,
            Sql::trusted(format!("src.{}", previous_id)),
            Sql::trusted(format!("src.{}", previous_kind)),
            " JOIN ",
        );
        let mut from = sql![source, joins];

        if !traversal.node_kinds.is_empty() {
            conditions.push(kind_filter("n.kind", &traversal.node_kinds));
        }
        conditions.extend(state.temporal_for(&traversal.edge_alias).cloned());
        conditions.extend(state.temporal_for(&traversal.node_alias).cloned());

        let scope = TableScope::new()
            .edge(&traversal.edge_alias, "e")
            .node(&traversal.node_alias, "n");
        let compiler = PredicateCompiler::new(state.adapter, &scope, self.subqueries);
        conditions.extend(compile_all(
            &compiler,
            &state.owned_predicates(&traversal.node_alias),
        )?);

        if let Some(vector) = self.vector_for(&traversal.node_alias)? {
            columns.push(sql![
                vector.distance,
                " AS ",
                Sql::trusted(distance_name(&traversal.node_alias))
            ]);
            from.push(vector.join);
            conditions.extend(vector.threshold);
        }

        let mut body = sql!["SELECT ", Sql::join(columns, ", "), " FROM ", from];
        if let Some(conditions) = and_all(conditions) {
            body.push(sql![" WHERE ", conditions]);
        }
        let intermediate = state.is_intermediate(index);
        if let (Some(limit), true) = (state.pushdown_limit, intermediate) {
            body.push(" ");
            body.push(state.adapter.limit_offset(Some(limit), None));
        }

        let materialized =
            intermediate && state.adapter.capabilities().materialize_intermediate_ctes;
        Ok(Cte::new(state.cte(&traversal.node_alias), body).materialized(materialized))
    }

    /// Per-start-node counts over the traversal, grouped before the join.
    fn counts_cte(&self, traversal: &Traversal, fast_path: &CountFastPath) -> CompileResult<Cte> {
        let state = self.state;
        let ast = state.ast;
        let start = ast.start.alias.as_str();
        let endpoints = Endpoints::new(traversal.direction);
        let schema = &state.options.schema;

        let mut columns = vec![
            Sql::trusted(format!("{} AS {}", endpoints.near_id, carried_name(start, Column::Id))),
            Sql::trusted(format!(
                "{} AS {}",
                endpoints.near_kind,
                carried_name(start, Column::Kind)
            )),
        ];
        for (index, distinct) in &fast_path.counts {
            columns.push(Sql::trusted(format!(
                "COUNT({}n.id) AS agg_{}",
                if *distinct { "DISTINCT " } else { "" },
                index
            )));
        }

        let from = sql![
            table(state.adapter, &schema.edges_table, "e"),
            " JOIN ",
            table(state.adapter, &schema.nodes_table, "n"),
            " ON n.graph_id = e.graph_id AND n.id = ",
            endpoints.far_id,
            " AND n.kind = ",
            endpoints.far_kind
        ];
        let mut conditions = vec![
            sql!["e.graph_id = ", Sql::param(state.graph_id)],
            kind_filter(endpoints.near_kind, &ast.start.kinds),
            kind_filter("e.kind", &traversal.edge_kinds),
        ];
        if !traversal.node_kinds.is_empty() {
            conditions.push(kind_filter("n.kind", &traversal.node_kinds));
        }
        conditions.extend(state.temporal_for(&traversal.edge_alias).cloned());
        conditions.extend(state.temporal_for(&traversal.node_alias).cloned());

        let scope = TableScope::new()
            .edge(&traversal.edge_alias, "e")
            .node(&traversal.node_alias, "n");
        let compiler = PredicateCompiler::new(state.adapter, &scope, self.subqueries);
        conditions.extend(compile_all(
            &compiler,
            &state.owned_predicates(&traversal.node_alias),
        )?);

        let body = sql![
            "SELECT ",
            Sql::join(columns, ", "),
            " FROM ",
            from,
            " WHERE ",
            Sql::join(conditions, " AND "),
            Sql::trusted(format!(
                " GROUP BY {}, {}",
                endpoints.near_id, endpoints.near_kind
            ))
        ];
        Ok(Cte::new(state.cte(&fast_path.cte_alias()), body))
    }

    fn fast_path_column(&self, index: usize) -> Option<Sql> {
        let fast_path = self.state.count_fast_path.as_ref()?;
        fast_path.counts.iter().find(|(i, _)| *i == index)?;
        let optional = self.state.ast.traversals.first().is_some_and(|t| t.optional);
        let column = format!("{}.agg_{}", self.state.cte(&fast_path.cte_alias()), index);
        Some(if optional {
            Sql::trusted(format!("COALESCE({}, 0)", column))
        } else {
            Sql::trusted(column)
        })
    }

    fn final_scope(&self) -> CteScope {
        let state = self.state;
        let ast = state.ast;
        let last = ast
            .traversals
            .last()
            .map_or(ast.start.alias.as_str(), |t| t.node_alias.as_str());

        let mut scope = CteScope::new();
        for alias in ast.aliases() {
            let edge = alias_is_edge(ast, alias);
            let owner = match ast.alias_kind(alias) {
                Some(AliasKind::TraversalNode(i) | AliasKind::TraversalEdge(i)) => {
                    ast.traversals[i].node_alias.as_str()
                }
                _ => ast.start.alias.as_str(),
            };
            let counted = state
                .count_fast_path
                .as_ref()
                .is_some_and(|fast_path| fast_path.node_alias == owner);
            if counted {
                scope.mark_unavailable(
                    alias,
                    format!("alias '{}' is only available through COUNT aggregates", alias),
                );
                continue;
            }
            let relation = if state.collapse { last } else { owner };
            scope.carry(alias, &state.cte(relation), edge, &state.carried_columns(alias));
        }
        scope
    }

    fn from_clause(&self) -> Sql {
        let state = self.state;
        let ast = state.ast;
        if state.collapse {
            let last = ast
                .traversals
                .last()
                .map_or(ast.start.alias.as_str(), |t| t.node_alias.as_str());
            return Sql::trusted(state.cte(last));
        }

        let mut from = Sql::trusted(state.cte(&ast.start.alias));
        for traversal in &ast.traversals {
            let previous = traversal.join_from_alias.as_str();
            let right = match &state.count_fast_path {
                Some(fast_path) if fast_path.node_alias == traversal.node_alias => {
                    state.cte(&fast_path.cte_alias())
                }
                _ => state.cte(&traversal.node_alias),
            };
            let left = state.cte(previous);
            let keyword = if traversal.optional {
                "\nLEFT JOIN "
            } else {
                "\nJOIN "
            };
            let id = carried_name(previous, Column::Id);
            let kind = carried_name(previous, Column::Kind);
            from.push(keyword);
            from.push(Sql::trusted(format!(
                "{right} ON {right}.{id} = {left}.{id} AND {right}.{kind} = {left}.{kind}"
            )));
        }
        from
    }
}

fn alias_is_edge(ast: &QueryAst, alias: &str) -> bool {
    ast.alias_kind(alias).is_some_and(AliasKind::is_edge)
}

/// Clauses of the outermost SELECT over carried CTE columns.
pub(crate) struct FinalQuery<'q> {
    adapter: &'q dyn DialectAdapter,
    ast: &'q QueryAst,
    scope: &'q CteScope,
    aggregate_scope: CteScope,
    subqueries: &'q dyn SubqueryCompiler,
    /// Alias and k of the vector search
    vector: Option<(&'q str, u64)>,
    /// Aliases projected when neither a projection nor selective fields
    /// are given
    aliases: Vec<&'q str>,
}

impl<'q> FinalQuery<'q> {
    pub fn new(
        adapter: &'q dyn DialectAdapter,
        ast: &'q QueryAst,
        scope: &'q CteScope,
        subqueries: &'q dyn SubqueryCompiler,
        vector: Option<(&'q str, u64)>,
    ) -> Self {
        Self {
            adapter,
            ast,
            scope,
            aggregate_scope: scope.clone().with_aggregates(true),
            subqueries,
            vector,
            aliases: ast.aliases(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<&'q str>) -> Self {
        self.aliases = aliases;
        self
    }

    fn compiler(&self) -> PredicateCompiler<'_> {
        PredicateCompiler::new(self.adapter, self.scope, self.subqueries)
    }

    fn aggregate_compiler(&self) -> PredicateCompiler<'_> {
        PredicateCompiler::new(self.adapter, &self.aggregate_scope, self.subqueries)
    }

    fn distance_column(&self, alias: &str) -> CompileResult<Sql> {
        let relation = self.scope.relation(alias).ok_or_else(|| {
            CompileError::invariant(
                "final_select",
                format!("vector alias '{}' has no relation", alias),
                "scope",
            )
        })?;
        Ok(Sql::trusted(format!("{}.{}", relation, distance_name(alias))))
    }

    /// Output columns for one field, expanding a whole alias to
    /// `<output>_<column>`.
    fn field_columns(&self, field: &FieldRef, output: &str) -> CompileResult<Vec<Sql>> {
        match field.target().map_err(CompileError::unsupported)? {
            FieldTarget::WholeAlias => {
                let mut columns = Vec::new();
                for (column, expr) in self.scope.all_columns(&field.alias)? {
                    columns.push(sql![
                        expr,
                        " AS ",
                        quoted(&format!("{}_{}", output, column.name()))
                    ]);
                }
                if let Some((alias, _)) = self.vector.filter(|(alias, _)| *alias == field.alias) {
                    columns.push(sql![
                        self.distance_column(alias)?,
                        " AS ",
                        quoted(&format!("{}_distance", output))
                    ]);
                }
                Ok(columns)
            }
            FieldTarget::System(_) | FieldTarget::Prop(_) => Ok(vec![sql![
                self.compiler().typed_field_expr(field)?,
                " AS ",
                quoted(output)
            ]]),
        }
    }

    /// SELECT list: the projection, else the selective fields, else every
    /// carried column. `replace` supplies precomputed projection columns.
    pub fn projection(&self, replace: impl Fn(usize) -> Option<Sql>) -> CompileResult<Vec<Sql>> {
        let mut columns = Vec::new();
        if !self.ast.projection.is_empty() {
            for (index, projection) in self.ast.projection.iter().enumerate() {
                if let Some(column) = replace(index) {
                    columns.push(sql![column, " AS ", quoted(&projection.output_name)]);
                    continue;
                }
                match &projection.source {
                    ProjectionSource::Field { field } => {
                        columns.extend(self.field_columns(field, &projection.output_name)?)
                    }
                    ProjectionSource::Aggregate { aggregate } => columns.push(sql![
                        self.aggregate_compiler().aggregate(aggregate)?,
                        " AS ",
                        quoted(&projection.output_name)
                    ]),
                }
            }
        } else if let Some(selective) = &self.ast.selective_fields {
            for field in selective {
                columns.extend(self.field_columns(&field.field, &field.output_name)?);
            }
        } else {
            for &alias in &self.aliases {
                columns.extend(self.scope.all_columns(alias)?.into_iter().map(|(_, expr)| expr));
                if let Some((vector_alias, _)) = self.vector.filter(|(a, _)| *a == alias) {
                    columns.push(self.distance_column(vector_alias)?);
                }
            }
        }
        Ok(columns)
    }

    pub fn where_clause(
        &self,
        predicates: &[&PredicateExpression],
        mut extra: Vec<Sql>,
    ) -> CompileResult<Option<Sql>> {
        extra.extend(compile_all(&self.compiler(), predicates)?);
        Ok(and_all(extra))
    }

    pub fn group_by(&self) -> CompileResult<Option<Sql>> {
        if self.ast.group_by.is_empty() {
            return Ok(None);
        }
        let mut keys = Vec::new();
        for field in &self.ast.group_by {
            match field.target().map_err(CompileError::unsupported)? {
                FieldTarget::WholeAlias => keys.extend(
                    self.scope
                        .all_columns(&field.alias)?
                        .into_iter()
                        .map(|(_, expr)| expr),
                ),
                FieldTarget::System(_) | FieldTarget::Prop(_) => {
                    keys.push(self.compiler().typed_field_expr(field)?)
                }
            }
        }
        Ok(Some(Sql::join(keys, ", ")))
    }

    pub fn having(&self) -> CompileResult<Option<Sql>> {
        self.ast
            .having
            .as_ref()
            .map(|having| self.aggregate_compiler().compile(having))
            .transpose()
    }

    pub fn order_by(&self) -> CompileResult<Option<Sql>> {
        let mut keys = Vec::new();
        if let Some((alias, _)) = self.vector {
            keys.push(sql![self.distance_column(alias)?, " ASC"]);
        }
        for order in &self.ast.order_by {
            let field = &order.field;
            let expr = match field.target().map_err(CompileError::unsupported)? {
                FieldTarget::WholeAlias => self.scope.column(&field.alias, Column::Id)?,
                FieldTarget::System(_) | FieldTarget::Prop(_) => {
                    if let Some(value_type) = field.declared_type() {
                        reject_container("ORDER BY", value_type, field)?;
                    }
                    self.compiler().typed_field_expr(field)?
                }
            };
            keys.push(order_key(expr, order.direction, order.nulls));
        }
        Ok(and_none(keys))
    }

    pub fn limit_offset(&self) -> Option<Sql> {
        let limit = match self.vector {
            Some((_, k)) => Some(self.ast.limit.map_or(k, |limit| limit.min(k))),
            None => self.ast.limit,
        };
        match (limit, self.ast.offset) {
            (None, None) => None,
            (limit, offset) => Some(self.adapter.limit_offset(limit, offset)),
        }
    }
}

pub(crate) fn order_key(expr: Sql, direction: SortDirection, nulls: Option<NullsOrder>) -> Sql {
    let mut key = sql![
        expr,
        match direction {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        }
    ];
    match nulls {
        Some(NullsOrder::First) => key.push(" NULLS FIRST"),
        Some(NullsOrder::Last) => key.push(" NULLS LAST"),
        None => {}
    }
    key
}

fn and_none(keys: Vec<Sql>) -> Option<Sql> {
    if keys.is_empty() {
        None
    } else {
        Some(Sql::join(keys, ", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Traversal;
    use crate::dialect::{PostgresDialect, SqliteDialect};

    fn render(fragment: Sql) -> String {
        fragment.render_inline(&SqliteDialect)
    }

    #[test]
    fn test_kind_filter() {
        assert_eq!(render(kind_filter("n.kind", &["Person".to_string()])), "n.kind = 'Person'");
        assert_eq!(
            render(kind_filter(
                "n.kind",
                &["Person".to_string(), "Robot".to_string()]
            )),
            "n.kind IN ('Person', 'Robot')"
        );
    }

    #[test]
    fn test_endpoints_follow_direction() {
        let out = Endpoints::new(Direction::Out);
        assert_eq!(out.near_id, "e.from_id");
        assert_eq!(out.far_kind, "e.to_kind");

        let inbound = Endpoints::new(Direction::In);
        assert_eq!(inbound.near_id, "e.to_id");
        assert_eq!(inbound.reversed().near_id, "e.from_id");
    }

    #[test]
    fn test_hop_join_with_inverse_kinds_uses_case() {
        let ast = QueryAst::from_kind("p", "Person");
        let options = crate::config::CompileOptions::default();
        let state = PassState::new(&ast, "g1", &SqliteDialect, &options);
        let traversal = Traversal::out("p", "e", "manages", "q", "Person")
            .with_inverse_kinds(["reportsTo"]);

        let (join, where_conditions) = hop_join(
            &state,
            &traversal,
            &Endpoints::new(Direction::Out),
            Sql::raw("src.p_id"),
            Sql::raw("src.p_kind"),
            " JOIN ",
        );
        let join = render(join);

        assert!(where_conditions.is_empty());
        assert!(join.contains(
            "((e.kind = 'manages' AND e.from_id = src.p_id AND e.from_kind = src.p_kind) \
             OR (e.kind = 'reportsTo' AND e.to_id = src.p_id AND e.to_kind = src.p_kind))"
        ));
        assert!(join.contains("n.id = CASE WHEN (e.kind = 'manages'"));
        assert!(join.contains("THEN e.to_id ELSE e.from_id END"));
    }

    #[test]
    fn test_order_key_with_nulls() {
        let key = order_key(Sql::raw("cte_p.p_id"), SortDirection::Desc, Some(NullsOrder::Last));
        assert_eq!(key.render_inline(&PostgresDialect), "cte_p.p_id DESC NULLS LAST");
    }
}
