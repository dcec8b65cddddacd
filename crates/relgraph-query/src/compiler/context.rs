//! Field scopes.
//!
//! A [`FieldScope`] decides which SQL expression a system column of an alias
//! resolves to at a given point of the statement: a base-table column inside
//! the alias's own CTE, or a carried `<alias>_<column>` column once the CTE
//! is read back.

use crate::error::{CompileError, CompileResult};
use crate::schema::Column;
use crate::sql::Sql;
use std::collections::BTreeMap;

/// Name of the carried column for `alias.column`.
pub(crate) fn carried_name(alias: &str, column: Column) -> String {
    format!("{}_{}", alias, column.name())
}

/// Name of the carried vector distance column for `alias`.
pub(crate) fn distance_name(alias: &str) -> String {
    format!("{}_distance", alias)
}

pub(crate) fn cte_name(prefix: &str, alias: &str) -> String {
    format!("{}cte_{}", prefix, alias)
}

/// Resolves system columns of aliases to SQL expressions.
pub(crate) trait FieldScope {
    fn column(&self, alias: &str, column: Column) -> CompileResult<Sql>;

    /// Aggregate functions are only valid in projection and HAVING.
    fn allows_aggregates(&self) -> bool {
        false
    }
}

/// Base-table columns inside a single CTE (`n.id`, `e.from_id`).
#[derive(Debug, Default)]
pub(crate) struct TableScope {
    /// alias -> (table alias, is edge)
    tables: Vec<(String, &'static str, bool)>,
}

impl TableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, alias: &str, table: &'static str) -> Self {
        self.tables.push((alias.to_string(), table, false));
        self
    }

    pub fn edge(mut self, alias: &str, table: &'static str) -> Self {
        self.tables.push((alias.to_string(), table, true));
        self
    }
}

impl FieldScope for TableScope {
    fn column(&self, alias: &str, column: Column) -> CompileResult<Sql> {
        let Some((_, table, edge)) = self.tables.iter().find(|(a, _, _)| a == alias) else {
            return Err(CompileError::invariant(
                "predicate",
                format!("alias '{}' is not visible in this CTE", alias),
                format!(
                    "visible: {}",
                    self.tables
                        .iter()
                        .map(|(a, _, _)| a.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        };
        check_column(alias, column, *edge)?;
        Ok(Sql::trusted(format!("{}.{}", table, column.name())))
    }
}

fn check_column(alias: &str, column: Column, edge: bool) -> CompileResult<()> {
    if column.exists_on(edge) {
        Ok(())
    } else {
        Err(CompileError::unsupported(format!(
            "column '{}' does not exist on {} alias '{}'",
            column.name(),
            if edge { "edge" } else { "node" },
            alias
        )))
    }
}

#[derive(Debug, Clone)]
struct CarriedAlias {
    relation: String,
    edge: bool,
    columns: Vec<Column>,
}

/// Carried columns read back from CTEs (`cte_p.p_id`).
#[derive(Debug, Clone, Default)]
pub(crate) struct CteScope {
    aliases: BTreeMap<String, CarriedAlias>,
    /// alias -> reason it cannot be referenced here
    unavailable: BTreeMap<String, String>,
    aggregates: bool,
}

impl CteScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `alias` readable from `relation` with the given carried columns.
    pub fn carry(&mut self, alias: &str, relation: &str, edge: bool, columns: &[Column]) {
        self.aliases.insert(
            alias.to_string(),
            CarriedAlias {
                relation: relation.to_string(),
                edge,
                columns: columns.to_vec(),
            },
        );
    }

    pub fn mark_unavailable(&mut self, alias: &str, reason: impl Into<String>) {
        self.unavailable.insert(alias.to_string(), reason.into());
    }

    pub fn with_aggregates(mut self, aggregates: bool) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn relation(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(|a| a.relation.as_str())
    }

    /// Every carried column of `alias` with the expression reading it.
    pub fn all_columns(&self, alias: &str) -> CompileResult<Vec<(Column, Sql)>> {
        let carried = self.lookup(alias)?;
        Ok(carried
            .columns
            .iter()
            .map(|column| {
                (
                    *column,
                    Sql::trusted(format!(
                        "{}.{}",
                        carried.relation,
                        carried_name(alias, *column)
                    )),
                )
            })
            .collect())
    }

    fn lookup(&self, alias: &str) -> CompileResult<&CarriedAlias> {
        if let Some(reason) = self.unavailable.get(alias) {
            return Err(CompileError::unsupported(reason.clone()));
        }
        self.aliases.get(alias).ok_or_else(|| {
            CompileError::unsupported(format!("unknown alias '{}'", alias))
        })
    }
}

impl FieldScope for CteScope {
    fn column(&self, alias: &str, column: Column) -> CompileResult<Sql> {
        let carried = self.lookup(alias)?;
        check_column(alias, column, carried.edge)?;
        if !carried.columns.contains(&column) {
            return Err(CompileError::invariant(
                "column_pruning",
                format!(
                    "column '{}' of alias '{}' is referenced but was pruned",
                    column.name(),
                    alias
                ),
                format!(
                    "carried: {}",
                    carried
                        .columns
                        .iter()
                        .map(|c| c.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }
        Ok(Sql::trusted(format!(
            "{}.{}",
            carried.relation,
            carried_name(alias, column)
        )))
    }

    fn allows_aggregates(&self) -> bool {
        self.aggregates
    }
}
