//! UNION / INTERSECT / EXCEPT compilation.
//!
//! Branches are compiled by the regular query paths through a
//! [`BranchCompiler`]. How they are combined depends on the dialect: SQLite
//! cannot parenthesize compound members, so every branch's CTEs are hoisted
//! into one `WITH` list (renamed per branch) and the bare SELECTs are joined;
//! PostgreSQL keeps each branch a complete parenthesized statement.

use super::standard::{order_key, quoted};
use crate::ast::{
    OrderSpec, PredicateExpression, ProjectionSource, QueryAst, SetOperand, SetOperation,
};
use crate::dialect::{DialectAdapter, SetOperationStrategy};
use crate::emitter::{emit, Cte, Statement};
use crate::error::{CompileError, CompileResult};
use crate::plan::{LogicalOp, LogicalPlan, PlanNode};
use crate::sql::{sql, Sql};
use std::collections::BTreeSet;
use tracing::debug;

/// Compiles one branch of a set operation.
pub(crate) trait BranchCompiler {
    /// Statement and plan for `ast`, with generated CTE names prefixed by
    /// `prefix`.
    fn compile_branch(&self, ast: &QueryAst, prefix: &str)
        -> CompileResult<(Statement, LogicalPlan)>;
}

/// Restrictions on branches whose CTEs get hoisted into one `WITH` list.
fn flatten_violations(ast: &QueryAst) -> Vec<&'static str> {
    let predicates = || {
        ast.predicates
            .iter()
            .map(|p| &p.expression)
            .chain(ast.having.as_ref())
    };
    let mut violations = Vec::new();
    if !ast.traversals.is_empty() {
        violations.push("traversals");
    }
    if predicates().any(PredicateExpression::contains_subquery) {
        violations.push("EXISTS/IN subqueries");
    }
    if predicates().any(PredicateExpression::contains_vector_similarity) {
        violations.push("vector similarity");
    }
    if !ast.group_by.is_empty() || ast.having.is_some() {
        violations.push("GROUP BY/HAVING");
    }
    if !ast.order_by.is_empty() || ast.limit.is_some() || ast.offset.is_some() {
        violations.push("per-branch ORDER BY/LIMIT/OFFSET");
    }
    violations
}

fn check_flattenable(operation: &SetOperation, adapter: &dyn DialectAdapter) -> CompileResult<()> {
    let problems: Vec<String> = operation
        .leaves()
        .into_iter()
        .enumerate()
        .flat_map(|(i, leaf)| {
            flatten_violations(leaf)
                .into_iter()
                .map(move |violation| format!("{} (branch {})", violation, i + 1))
        })
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(CompileError::unsupported(format!(
            "set operations on {} do not support: {}",
            adapter.name(),
            problems.join(", ")
        )))
    }
}

fn check_projection_widths(operation: &SetOperation) -> CompileResult<()> {
    let widths: BTreeSet<usize> = operation
        .leaves()
        .into_iter()
        .map(|leaf| leaf.projection.len())
        .filter(|width| *width > 0)
        .collect();
    if widths.len() > 1 {
        return Err(CompileError::unsupported(format!(
            "set operation branches project different column counts: {}",
            widths
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }
    Ok(())
}

/// ORDER BY keys of a set operation, resolved against the output names of
/// its leftmost branch.
fn resolve_order_by(
    order_by: &[OrderSpec],
    left: &QueryAst,
) -> CompileResult<Option<Sql>> {
    if order_by.is_empty() {
        return Ok(None);
    }
    if left.projection.is_empty() {
        return Err(CompileError::unsupported(
            "ORDER BY on a set operation requires explicit field projection in the left branch",
        ));
    }

    let mut keys = Vec::new();
    for order in order_by {
        let wanted = order.field.target().map_err(CompileError::unsupported)?;
        let output = left.projection.iter().find(|projection| match &projection.source {
            ProjectionSource::Field { field } => {
                field.alias == order.field.alias && field.target().as_ref() == Ok(&wanted)
            }
            ProjectionSource::Aggregate { .. } => false,
        });
        let Some(output) = output else {
            let available = left
                .projection
                .iter()
                .map(|p| p.output_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(CompileError::unsupported(format!(
                "ORDER BY field '{}' is not projected by the set operation; available columns: {}",
                order.field.describe(),
                available
            )));
        };
        keys.push(order_key(
            quoted(&output.output_name),
            order.direction,
            order.nulls,
        ));
    }
    Ok(Some(Sql::join(keys, ", ")))
}

struct SetOpCompiler<'c> {
    adapter: &'c dyn DialectAdapter,
    branches: &'c dyn BranchCompiler,
    strategy: SetOperationStrategy,
    /// Hoisted branch CTEs (flattening dialects)
    ctes: Vec<Cte>,
    next_branch: usize,
}

impl<'c> SetOpCompiler<'c> {
    fn branch(&mut self, ast: &QueryAst) -> CompileResult<(Sql, PlanNode)> {
        let index = self.next_branch;
        self.next_branch += 1;
        match self.strategy {
            SetOperationStrategy::FlattenCtes => {
                let (mut statement, plan) =
                    self.branches.compile_branch(ast, &format!("s{}_", index))?;
                self.ctes.append(&mut statement.ctes);
                Ok((emit(statement, &plan)?, plan.root))
            }
            SetOperationStrategy::ParenthesizedBranches => {
                let (statement, plan) = self.branches.compile_branch(ast, "")?;
                Ok((emit(statement, &plan)?.parens(), plan.root))
            }
        }
    }

    fn operand(&mut self, operand: &SetOperand, right: bool) -> CompileResult<(Sql, PlanNode)> {
        match operand {
            SetOperand::Query { query } => self.branch(query),
            SetOperand::SetOperation { operation } => {
                let (body, plan) = self.operation(operation)?;
                let clauses = !operation.order_by.is_empty()
                    || operation.limit.is_some()
                    || operation.offset.is_some();
                let body = match self.strategy {
                    SetOperationStrategy::ParenthesizedBranches => body.parens(),
                    // compound members chain left to right; anything else is
                    // read through a subquery
                    SetOperationStrategy::FlattenCtes if right || clauses => {
                        sql!["SELECT * FROM (", body, ")"]
                    }
                    SetOperationStrategy::FlattenCtes => body,
                };
                Ok((body, plan))
            }
        }
    }

    fn operation(&mut self, operation: &SetOperation) -> CompileResult<(Sql, PlanNode)> {
        let (left, left_plan) = self.operand(&operation.left, false)?;
        let (right, right_plan) = self.operand(&operation.right, true)?;

        let mut statement = Statement::compound(sql![
            left,
            "\n",
            operation.op.sql(),
            "\n",
            right
        ]);
        statement.order_by = resolve_order_by(&operation.order_by, operation.left.leftmost())?;
        if operation.limit.is_some() || operation.offset.is_some() {
            statement.limit_offset = Some(self.adapter.limit_offset(operation.limit, operation.offset));
        }

        let mut node = PlanNode::with_inputs(
            LogicalOp::SetOp { op: operation.op },
            vec![left_plan, right_plan],
        );
        if !operation.order_by.is_empty() {
            node = node.then(LogicalOp::Sort {
                keys: operation.order_by.len(),
            });
        }
        if operation.limit.is_some() || operation.offset.is_some() {
            node = node.then(LogicalOp::LimitOffset {
                limit: operation.limit,
                offset: operation.offset,
            });
        }

        let plan = LogicalPlan::new(node);
        let body = emit(statement, &plan)?;
        Ok((body, plan.root))
    }
}

/// Compile `operation`, returning the statement SQL and its plan.
pub(crate) fn compile(
    operation: &SetOperation,
    adapter: &dyn DialectAdapter,
    branches: &dyn BranchCompiler,
) -> CompileResult<(Sql, LogicalPlan)> {
    let strategy = adapter.capabilities().set_operation_strategy;
    debug!(
        op = operation.op.sql(),
        branches = operation.leaves().len(),
        strategy = ?strategy,
        "Compiling set operation"
    );

    check_projection_widths(operation)?;
    if strategy == SetOperationStrategy::FlattenCtes {
        check_flattenable(operation, adapter)?;
    }

    let mut compiler = SetOpCompiler {
        adapter,
        branches,
        strategy,
        ctes: Vec::new(),
        next_branch: 0,
    };
    let (body, root) = compiler.operation(operation)?;
    let plan = LogicalPlan::new(root);

    if compiler.ctes.is_empty() {
        return Ok((body, plan));
    }
    // hoisted CTEs go in front of the already validated compound body
    let mut statement = Statement::compound(body);
    statement.ctes = compiler.ctes;
    let unchecked = LogicalPlan::new(PlanNode::new(LogicalOp::Project { columns: None }));
    Ok((emit(statement, &unchecked)?, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldRef, SetOperator, SortDirection, Traversal};
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::json_pointer::JsonPointer;

    /// Emits `SELECT <alias>` from a single CTE per branch.
    struct FakeBranches;

    impl BranchCompiler for FakeBranches {
        fn compile_branch(
            &self,
            ast: &QueryAst,
            prefix: &str,
        ) -> CompileResult<(Statement, LogicalPlan)> {
            let cte = format!("{}cte_{}", prefix, ast.start.alias);
            let mut statement = Statement::select(Sql::raw("*"), Sql::trusted(cte.clone()));
            statement.ctes.push(Cte::new(cte, Sql::raw("SELECT 1")));
            let plan = LogicalPlan::new(PlanNode::new(LogicalOp::Project { columns: None }));
            Ok((statement, plan))
        }
    }

    fn named(alias: &str) -> QueryAst {
        QueryAst::from_kind(alias, "Person").project(
            "name",
            ProjectionSource::field(FieldRef::prop(alias, "name")),
        )
    }

    #[test]
    fn test_sqlite_hoists_branch_ctes() {
        let operation = SetOperation::of_queries(SetOperator::Union, named("a"), named("b"));

        let (sql, plan) = compile(&operation, &SqliteDialect, &FakeBranches).unwrap();

        assert_eq!(
            sql.render(&SqliteDialect).0,
            "WITH s0_cte_a AS (SELECT 1),\ns1_cte_b AS (SELECT 1)\n\
             SELECT *\nFROM s0_cte_a\nUNION\nSELECT *\nFROM s1_cte_b"
        );
        assert!(plan.contains(|op| matches!(op, LogicalOp::SetOp { .. })));
    }

    #[test]
    fn test_postgres_parenthesizes_branches() {
        let operation = SetOperation::of_queries(SetOperator::Except, named("a"), named("b"));

        let (sql, _) = compile(&operation, &PostgresDialect, &FakeBranches).unwrap();

        assert_eq!(
            sql.render(&PostgresDialect).0,
            "(WITH cte_a AS (SELECT 1)\nSELECT *\nFROM cte_a)\nEXCEPT\n\
             (WITH cte_b AS (SELECT 1)\nSELECT *\nFROM cte_b)"
        );
    }

    #[test]
    fn test_right_nested_operation_is_wrapped_on_sqlite() {
        let inner = SetOperation::of_queries(SetOperator::Intersect, named("b"), named("c"));
        let operation = SetOperation::new(
            SetOperator::UnionAll,
            SetOperand::query(named("a")),
            SetOperand::operation(inner),
        );

        let (sql, _) = compile(&operation, &SqliteDialect, &FakeBranches).unwrap();
        let text = sql.render(&SqliteDialect).0;

        assert!(text.contains("UNION ALL\nSELECT * FROM (SELECT *\nFROM s1_cte_b\nINTERSECT"));
        assert!(text.contains("s2_cte_c AS (SELECT 1)"));
    }

    #[test]
    fn test_order_by_resolves_pointer_and_path_forms() {
        let mut operation = SetOperation::of_queries(SetOperator::Union, named("a"), named("b"));
        operation.order_by.push(OrderSpec {
            field: FieldRef::pointer("a", JsonPointer::parse("/name").unwrap()),
            direction: SortDirection::Desc,
            nulls: None,
        });
        operation.limit = Some(10);

        let (sql, plan) = compile(&operation, &SqliteDialect, &FakeBranches).unwrap();
        let text = sql.render(&SqliteDialect).0;

        assert!(text.ends_with("ORDER BY \"name\" DESC\nLIMIT 10"));
        assert!(plan.has_sort());
        assert!(plan.has_limit_offset());
    }

    #[test]
    fn test_order_by_unknown_field_lists_outputs() {
        let mut operation = SetOperation::of_queries(SetOperator::Union, named("a"), named("b"));
        operation.order_by.push(OrderSpec {
            field: FieldRef::prop("a", "age"),
            direction: SortDirection::Asc,
            nulls: None,
        });

        let err = compile(&operation, &SqliteDialect, &FakeBranches).unwrap_err();

        assert!(err.to_string().contains("available columns: name"));
    }

    #[test]
    fn test_order_by_requires_projection() {
        let mut operation = SetOperation::of_queries(
            SetOperator::Union,
            QueryAst::from_kind("a", "Person"),
            QueryAst::from_kind("b", "Person"),
        );
        operation.order_by.push(OrderSpec {
            field: FieldRef::prop("a", "name"),
            direction: SortDirection::Asc,
            nulls: None,
        });

        let err = compile(&operation, &PostgresDialect, &FakeBranches).unwrap_err();

        assert!(err.to_string().contains("requires explicit field projection"));
    }

    #[test]
    fn test_sqlite_restrictions_are_aggregated() {
        let left = named("a")
            .traverse(Traversal::out("a", "e", "knows", "f", "Person"))
            .limit(5);
        let right = named("b").order(FieldRef::prop("b", "name"), SortDirection::Asc);
        let operation = SetOperation::of_queries(SetOperator::Union, left, right);

        let err = compile(&operation, &SqliteDialect, &FakeBranches).unwrap_err();

        insta::assert_snapshot!(err.to_string(), @"unsupported predicate: set operations on sqlite do not support: traversals (branch 1), per-branch ORDER BY/LIMIT/OFFSET (branch 1), per-branch ORDER BY/LIMIT/OFFSET (branch 2)");
    }

    #[test]
    fn test_mismatched_projection_widths() {
        let wide = named("b").project("id", ProjectionSource::field(FieldRef::system("b", "id")));
        let operation = SetOperation::of_queries(SetOperator::Union, named("a"), wide);

        let err = compile(&operation, &PostgresDialect, &FakeBranches).unwrap_err();

        assert!(err.to_string().contains("different column counts: 1, 2"));
    }
}
