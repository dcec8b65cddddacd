//! Validation pass.
//!
//! Checks alias references and identifier grammar before any SQL is built,
//! then decides which CTE each alias predicate is evaluated in.

use super::context::{carried_name, distance_name};
use super::passes::{CompilerPass, PassState};
use crate::ast::{AliasKind, FieldRef, QueryAst, TargetType};
use crate::error::{CompileError, CompileResult};
use crate::identifier::validate_identifier;
use crate::schema::Column;
use std::collections::{BTreeMap, BTreeSet};

pub(crate) struct ValidationPass;

impl CompilerPass for ValidationPass {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn run(&self, state: &mut PassState<'_>) -> CompileResult<()> {
        let ast = state.ast;
        validate_bindings(ast)?;
        validate_references(ast)?;
        validate_output_names(ast)?;
        validate_carried_names(ast)?;

        state.placements = ast
            .predicates
            .iter()
            .map(|predicate| {
                let mut owners = BTreeSet::new();
                owners.insert(owner_alias(ast, &predicate.target_alias));
                for field in predicate.expression.field_refs() {
                    owners.insert(owner_alias(ast, &field.alias));
                }
                match (owners.len(), owners.into_iter().next()) {
                    (1, Some(Some(owner))) => Some(owner.to_string()),
                    _ => None,
                }
            })
            .collect();
        Ok(())
    }
}

/// The alias whose CTE evaluates predicates on `alias`: the start alias, or
/// the node alias of the traversal binding it.
pub(crate) fn owner_alias<'a>(ast: &'a QueryAst, alias: &str) -> Option<&'a str> {
    match ast.alias_kind(alias)? {
        AliasKind::Start => Some(ast.start.alias.as_str()),
        AliasKind::TraversalNode(i) | AliasKind::TraversalEdge(i) => {
            Some(ast.traversals[i].node_alias.as_str())
        }
    }
}

fn validate_bindings(ast: &QueryAst) -> CompileResult<()> {
    validate_identifier(&ast.start.alias)?;
    if ast.start.kinds.is_empty() {
        return Err(CompileError::unsupported(format!(
            "start alias '{}' has no node kinds",
            ast.start.alias
        )));
    }

    let mut seen = BTreeSet::new();
    let mut bind = |alias: &str| -> CompileResult<()> {
        validate_identifier(alias)?;
        if !seen.insert(alias.to_ascii_lowercase()) {
            return Err(CompileError::unsupported(format!("duplicate alias '{}'", alias)));
        }
        Ok(())
    };
    bind(&ast.start.alias)?;

    let mut joinable = vec![ast.start.alias.as_str()];
    for traversal in &ast.traversals {
        bind(&traversal.edge_alias)?;
        bind(&traversal.node_alias)?;
        if traversal.edge_kinds.is_empty() && traversal.inverse_edge_kinds.is_empty() {
            return Err(CompileError::unsupported(format!(
                "traversal '{}' has no edge kinds",
                traversal.edge_alias
            )));
        }
        if !joinable.contains(&traversal.join_from_alias.as_str()) {
            return Err(CompileError::unsupported(format!(
                "traversal '{}' joins from '{}', which is not the start alias or an earlier node alias",
                traversal.node_alias, traversal.join_from_alias
            )));
        }
        if let Some(spec) = &traversal.variable_length {
            for output in [&spec.path_alias, &spec.depth_alias].into_iter().flatten() {
                bind(output.as_str())?;
            }
        }
        joinable.push(traversal.node_alias.as_str());
    }
    Ok(())
}

fn check_field(ast: &QueryAst, field: &FieldRef, context: &str) -> CompileResult<()> {
    if ast.alias_kind(&field.alias).is_none() {
        return Err(CompileError::unsupported(format!(
            "unknown alias '{}' in {}",
            field.alias, context
        )));
    }
    field.target().map(|_| ()).map_err(CompileError::unsupported)
}

fn validate_references(ast: &QueryAst) -> CompileResult<()> {
    for predicate in &ast.predicates {
        let kind = ast.alias_kind(&predicate.target_alias).ok_or_else(|| {
            CompileError::unsupported(format!(
                "predicate targets unknown alias '{}'",
                predicate.target_alias
            ))
        })?;
        match (predicate.target_type, kind.is_edge()) {
            (TargetType::Node, true) => {
                return Err(CompileError::unsupported(format!(
                    "predicate targets '{}' as a node, but it is an edge alias",
                    predicate.target_alias
                )))
            }
            (TargetType::Edge, false) => {
                return Err(CompileError::unsupported(format!(
                    "predicate targets '{}' as an edge, but it is a node alias",
                    predicate.target_alias
                )))
            }
            _ => {}
        }
        for field in predicate.expression.field_refs() {
            check_field(ast, field, "predicate")?;
        }
    }

    for projection in &ast.projection {
        check_field(ast, projection.source.field_ref(), "projection")?;
    }
    for field in &ast.group_by {
        check_field(ast, field, "GROUP BY")?;
    }
    if let Some(having) = &ast.having {
        for field in having.field_refs() {
            check_field(ast, field, "HAVING")?;
        }
    }
    for order in &ast.order_by {
        check_field(ast, &order.field, "ORDER BY")?;
    }
    for selective in ast.selective_fields.iter().flatten() {
        check_field(ast, &selective.field, "selective fields")?;
    }
    Ok(())
}

fn validate_output_names(ast: &QueryAst) -> CompileResult<()> {
    let projection = ast.projection.iter().map(|p| p.output_name.as_str());
    let selective = ast
        .selective_fields
        .iter()
        .flatten()
        .map(|s| s.output_name.as_str());

    for (what, names) in [
        ("projection", projection.collect::<Vec<_>>()),
        ("selective field", selective.collect::<Vec<_>>()),
    ] {
        let mut seen = BTreeSet::new();
        for name in names {
            validate_identifier(name)?;
            if !seen.insert(name) {
                return Err(CompileError::unsupported(format!(
                    "duplicate {} output name '{}'",
                    what, name
                )));
            }
        }
    }
    Ok(())
}

/// Carried column names share one namespace across aliases.
fn validate_carried_names(ast: &QueryAst) -> CompileResult<()> {
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    for alias in ast.aliases() {
        let edge = ast.alias_kind(alias).is_some_and(AliasKind::is_edge);
        let names = Column::all(edge)
            .iter()
            .map(|column| carried_name(alias, *column))
            .chain(std::iter::once(distance_name(alias)));
        for name in names {
            if let Some(other) = owners.insert(name.clone(), alias) {
                if other != alias {
                    return Err(CompileError::unsupported(format!(
                        "aliases '{}' and '{}' both produce the column name '{}'",
                        other, alias, name
                    )));
                }
            }
        }
    }
    Ok(())
}
