//! Statement assembly.
//!
//! The compiler paths hand the emitter a [`Statement`] with every clause
//! already built, together with the [`LogicalPlan`] lowered for the same
//! query. Optional clauses must line up with plan nodes exactly; a clause
//! without its node (or a node without its clause) is a compiler bug and is
//! reported instead of emitted.

use crate::error::{CompileError, CompileResult};
use crate::plan::LogicalPlan;
use crate::sql::{sql, Sql};

/// A named common table expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Cte {
    /// Generated from validated aliases
    pub name: String,
    pub materialized: bool,
    pub body: Sql,
}

impl Cte {
    pub fn new(name: impl Into<String>, body: Sql) -> Self {
        Self {
            name: name.into(),
            materialized: false,
            body,
        }
    }

    pub fn materialized(mut self, materialized: bool) -> Self {
        self.materialized = materialized;
        self
    }

    fn render(&self) -> Sql {
        let keyword = if self.materialized {
            " AS MATERIALIZED ("
        } else {
            " AS ("
        };
        sql![Sql::trusted(self.name.clone()), keyword, &self.body, ")"]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StatementBody {
    Select {
        distinct: bool,
        columns: Sql,
        from: Sql,
        where_clause: Option<Sql>,
    },
    /// Branches already joined by their set operators
    Compound(Sql),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub ctes: Vec<Cte>,
    pub recursive: bool,
    pub body: StatementBody,
    pub group_by: Option<Sql>,
    pub having: Option<Sql>,
    pub order_by: Option<Sql>,
    pub limit_offset: Option<Sql>,
}

impl Statement {
    pub fn select(columns: Sql, from: Sql) -> Self {
        Self {
            ctes: Vec::new(),
            recursive: false,
            body: StatementBody::Select {
                distinct: false,
                columns,
                from,
                where_clause: None,
            },
            group_by: None,
            having: None,
            order_by: None,
            limit_offset: None,
        }
    }

    pub fn compound(body: Sql) -> Self {
        Self {
            body: StatementBody::Compound(body),
            ..Self::select(Sql::new(), Sql::new())
        }
    }
}

/// Clause presence as seen by the plan, used in error context.
fn describe_plan(plan: &LogicalPlan) -> String {
    format!(
        "plan: sort={} limit_offset={} group_by={} having={}",
        plan.has_sort(),
        plan.has_limit_offset(),
        plan.has_group_by(),
        plan.has_having()
    )
}

fn check_clause(
    clause: &'static str,
    emitted: bool,
    planned: bool,
    plan: &LogicalPlan,
) -> CompileResult<()> {
    match (emitted, planned) {
        (true, false) => Err(CompileError::invariant(
            "emit",
            format!("{} clause emitted without a matching plan node", clause),
            describe_plan(plan),
        )),
        (false, true) => Err(CompileError::invariant(
            "emit",
            format!("plan requires {} but no clause was emitted", clause),
            describe_plan(plan),
        )),
        _ => Ok(()),
    }
}

/// Validate `statement` against `plan` and assemble the final SQL.
pub(crate) fn emit(statement: Statement, plan: &LogicalPlan) -> CompileResult<Sql> {
    check_clause("ORDER BY", statement.order_by.is_some(), plan.has_sort(), plan)?;
    check_clause(
        "LIMIT/OFFSET",
        statement.limit_offset.is_some(),
        plan.has_limit_offset(),
        plan,
    )?;
    check_clause("GROUP BY", statement.group_by.is_some(), plan.has_group_by(), plan)?;
    check_clause("HAVING", statement.having.is_some(), plan.has_having(), plan)?;

    Ok(assemble(statement))
}

fn assemble(statement: Statement) -> Sql {
    let mut out = Sql::new();

    if !statement.ctes.is_empty() {
        out.push(if statement.recursive {
            "WITH RECURSIVE "
        } else {
            "WITH "
        });
        out.push(Sql::join(statement.ctes.iter().map(Cte::render), ",\n"));
        out.push("\n");
    }

    match statement.body {
        StatementBody::Select {
            distinct,
            columns,
            from,
            where_clause,
        } => {
            out.push(if distinct { "SELECT DISTINCT " } else { "SELECT " });
            out.push(columns);
            out.push("\nFROM ");
            out.push(from);
            if let Some(where_clause) = where_clause {
                out.push("\nWHERE ");
                out.push(where_clause);
            }
        }
        StatementBody::Compound(body) => out.push(body),
    }

    if let Some(group_by) = statement.group_by {
        out.push(sql!["\nGROUP BY ", group_by]);
    }
    if let Some(having) = statement.having {
        out.push(sql!["\nHAVING ", having]);
    }
    if let Some(order_by) = statement.order_by {
        out.push(sql!["\nORDER BY ", order_by]);
    }
    if let Some(limit_offset) = statement.limit_offset {
        out.push("\n");
        out.push(limit_offset);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::plan::{LogicalOp, PlanNode, ScanSource};

    fn scan_plan() -> PlanNode {
        PlanNode::new(LogicalOp::Scan {
            alias: "p".to_string(),
            source: ScanSource::Nodes,
        })
    }

    #[test]
    fn test_emit_matching_statement() {
        let plan = LogicalPlan::new(scan_plan().then(LogicalOp::Sort { keys: 1 }));
        let mut statement = Statement::select(Sql::raw("cte_p.p_id"), Sql::raw("cte_p"));
        statement.ctes.push(Cte::new("cte_p", Sql::raw("SELECT 1")));
        statement.order_by = Some(Sql::raw("cte_p.p_id ASC"));

        let sql = emit(statement, &plan).unwrap();

        assert_eq!(
            sql.render(&SqliteDialect).0,
            "WITH cte_p AS (SELECT 1)\nSELECT cte_p.p_id\nFROM cte_p\nORDER BY cte_p.p_id ASC"
        );
    }

    #[test]
    fn test_clause_without_plan_node_is_invariant_error() {
        let plan = LogicalPlan::new(scan_plan());
        let mut statement = Statement::select(Sql::raw("*"), Sql::raw("cte_p"));
        statement.limit_offset = Some(Sql::raw("LIMIT 5"));

        let err = emit(statement, &plan).unwrap_err();

        assert!(matches!(err, CompileError::CompilerInvariant { phase: "emit", .. }));
        assert!(err.to_string().contains("LIMIT/OFFSET clause emitted"));
    }

    #[test]
    fn test_plan_node_without_clause_is_invariant_error() {
        let plan = LogicalPlan::new(scan_plan().then(LogicalOp::Sort { keys: 1 }));
        let statement = Statement::select(Sql::raw("*"), Sql::raw("cte_p"));

        let err = emit(statement, &plan).unwrap_err();

        assert!(err.to_string().contains("plan requires ORDER BY"));
    }

    #[test]
    fn test_materialized_cte() {
        let plan = LogicalPlan::new(scan_plan());
        let mut statement = Statement::select(Sql::raw("*"), Sql::raw("cte_c"));
        statement
            .ctes
            .push(Cte::new("cte_c", Sql::raw("SELECT 2")).materialized(true));

        let sql = emit(statement, &plan).unwrap();

        assert!(sql
            .render(&SqliteDialect)
            .0
            .starts_with("WITH cte_c AS MATERIALIZED (SELECT 2)"));
    }
}
