//! Predicate compilation.
//!
//! Turns a [`PredicateExpression`] into a boolean SQL fragment. Column
//! lookups go through a [`FieldScope`]; JSON and pattern operations go
//! through the dialect adapter.

use super::context::FieldScope;
use crate::ast::{
    AggregateExpr, AggregateFunction, ArrayOp, ComparisonOp, FieldRef, FieldTarget, NullCheckOp,
    ObjectOp, PredicateExpression, ProjectionSource, QueryAst, StringOp, ValueOperand, ValueType,
};
use crate::dialect::{DialectAdapter, ExtractAs};
use crate::error::{CompileError, CompileResult};
use crate::json_pointer::JsonPointer;
use crate::schema::Column;
use crate::sql::{sql, ParamTransform, Sql};
use serde_json::Value;

/// Compiles nested queries for EXISTS / IN subqueries.
pub(crate) trait SubqueryCompiler {
    fn compile_subquery(&self, ast: &QueryAst) -> CompileResult<Sql>;
}

const ALWAYS_TRUE: &str = "1 = 1";
const ALWAYS_FALSE: &str = "1 = 0";

pub(crate) struct PredicateCompiler<'a> {
    adapter: &'a dyn DialectAdapter,
    scope: &'a dyn FieldScope,
    subqueries: &'a dyn SubqueryCompiler,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(
        adapter: &'a dyn DialectAdapter,
        scope: &'a dyn FieldScope,
        subqueries: &'a dyn SubqueryCompiler,
    ) -> Self {
        Self {
            adapter,
            scope,
            subqueries,
        }
    }

    pub fn compile(&self, expr: &PredicateExpression) -> CompileResult<Sql> {
        match expr {
            PredicateExpression::Comparison { field, op, value } => {
                self.comparison(field, *op, value)
            }
            PredicateExpression::StringOp { field, op, pattern } => {
                self.string_op(field, *op, pattern)
            }
            PredicateExpression::NullCheck { field, op } => self.null_check(field, *op),
            PredicateExpression::Between {
                field,
                lower,
                upper,
            } => self.between(field, lower, upper),
            PredicateExpression::ArrayOp { field, op, values } => {
                self.array_op(field, *op, values)
            }
            PredicateExpression::ObjectOp {
                field,
                op,
                pointer,
                value,
            } => self.object_op(field, *op, pointer, value.as_ref()),
            PredicateExpression::AggregateComparison {
                aggregate,
                op,
                value,
            } => self.aggregate_comparison(aggregate, *op, value),
            PredicateExpression::And { operands } => self.junction(operands, " AND ", ALWAYS_TRUE),
            PredicateExpression::Or { operands } => self.junction(operands, " OR ", ALWAYS_FALSE),
            PredicateExpression::Not { operand } => {
                Ok(sql!["NOT ", self.compile(operand)?.parens()])
            }
            PredicateExpression::Exists { subquery, negated } => {
                let body = self.subqueries.compile_subquery(subquery)?;
                let keyword = if *negated { "NOT EXISTS (" } else { "EXISTS (" };
                Ok(sql![keyword, body, ")"])
            }
            PredicateExpression::InSubquery {
                field,
                subquery,
                negated,
            } => self.in_subquery(field, subquery, *negated),
            // The search itself is structural (join, ordering, limit).
            PredicateExpression::VectorSimilarity(_) => Ok(Sql::raw(ALWAYS_TRUE)),
        }
    }

    /// Expression for a field, extracting JSON properties as `extract`.
    pub fn field_expr(&self, field: &FieldRef, extract: ExtractAs) -> CompileResult<Sql> {
        match target(field)? {
            FieldTarget::System(column) => self.scope.column(&field.alias, column),
            FieldTarget::Prop(pointer) => {
                let props = self.scope.column(&field.alias, Column::Props)?;
                Ok(self.adapter.json_extract(&props, &pointer, extract))
            }
            FieldTarget::WholeAlias => Err(CompileError::unsupported(format!(
                "alias '{}' must be narrowed to a column or property here",
                field.alias
            ))),
        }
    }

    /// Expression for a field using its declared type; undeclared
    /// properties read as text so projected rows look alike on every
    /// dialect.
    pub fn typed_field_expr(&self, field: &FieldRef) -> CompileResult<Sql> {
        let value_type = field.declared_type().unwrap_or(ValueType::Unknown);
        self.field_expr(field, ExtractAs::from(value_type))
    }

    pub fn aggregate(&self, aggregate: &AggregateExpr) -> CompileResult<Sql> {
        if !self.scope.allows_aggregates() {
            return Err(CompileError::unsupported(format!(
                "aggregate {:?} over '{}' is only allowed in projection or HAVING",
                aggregate.function,
                aggregate.field.describe()
            )));
        }
        let field = &aggregate.field;
        let argument = match (aggregate.function, target(field)?) {
            (AggregateFunction::Count | AggregateFunction::CountDistinct, FieldTarget::WholeAlias) => {
                self.scope.column(&field.alias, Column::Id)?
            }
            (_, FieldTarget::WholeAlias) => {
                return Err(CompileError::unsupported(format!(
                    "{:?} requires a column or property of '{}'",
                    aggregate.function, field.alias
                )))
            }
            (AggregateFunction::Sum | AggregateFunction::Avg, _) => {
                self.field_expr(field, ExtractAs::Number)?
            }
            (AggregateFunction::Min | AggregateFunction::Max, _) => {
                let value_type = field.declared_type().unwrap_or(ValueType::Unknown);
                reject_container("min/max", value_type, field)?;
                self.field_expr(field, ExtractAs::from(value_type))?
            }
            (AggregateFunction::Count | AggregateFunction::CountDistinct, _) => {
                self.field_expr(field, ExtractAs::Raw)?
            }
        };
        let function = match aggregate.function {
            AggregateFunction::Count => "COUNT(",
            AggregateFunction::CountDistinct => "COUNT(DISTINCT ",
            AggregateFunction::Sum => "SUM(",
            AggregateFunction::Avg => "AVG(",
            AggregateFunction::Min => "MIN(",
            AggregateFunction::Max => "MAX(",
        };
        Ok(sql![function, argument, ")"])
    }

    fn junction(
        &self,
        operands: &[PredicateExpression],
        separator: &'static str,
        empty: &'static str,
    ) -> CompileResult<Sql> {
        if operands.is_empty() {
            return Ok(Sql::raw(empty));
        }
        let parts = operands
            .iter()
            .map(|operand| self.compile(operand))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Sql::join(parts, separator).parens())
    }

    fn comparison(
        &self,
        field: &FieldRef,
        op: ComparisonOp,
        value: &ValueOperand,
    ) -> CompileResult<Sql> {
        let value_type = resolve_type(op.sql(), field, &[value], op.is_set_membership())?;
        reject_container(op.sql(), value_type, field)?;
        let lhs = self.field_expr(field, ExtractAs::from(value_type))?;

        if op.is_set_membership() {
            let values = match value {
                ValueOperand::List { values, .. } => values.clone(),
                ValueOperand::Literal {
                    value: Value::Array(items),
                    ..
                } => items.clone(),
                ValueOperand::Literal { value, .. } => vec![value.clone()],
                ValueOperand::Parameter { name, .. } => {
                    return Err(CompileError::unsupported(format!(
                        "{} on '{}' needs a literal list, not parameter '{}'",
                        op.sql(),
                        field.describe(),
                        name
                    )))
                }
            };
            if values.is_empty() {
                return Ok(Sql::raw(if op == ComparisonOp::In {
                    ALWAYS_FALSE
                } else {
                    ALWAYS_TRUE
                }));
            }
            let keyword = if op == ComparisonOp::In {
                " IN ("
            } else {
                " NOT IN ("
            };
            return Ok(sql![lhs, keyword, Sql::join(values.into_iter().map(Sql::param), ", "), ")"]);
        }

        if let ValueOperand::Literal {
            value: Value::Null, ..
        } = value
        {
            return match op {
                ComparisonOp::Eq => Ok(sql![lhs, " IS NULL"]),
                ComparisonOp::Neq => Ok(sql![lhs, " IS NOT NULL"]),
                _ => Err(CompileError::unsupported(format!(
                    "cannot compare '{}' {} NULL",
                    field.describe(),
                    op.sql()
                ))),
            };
        }

        let rhs = self.operand(value, ParamTransform::Identity)?;
        let operator = match op {
            ComparisonOp::Eq => " = ",
            ComparisonOp::Neq => " <> ",
            ComparisonOp::Gt => " > ",
            ComparisonOp::Gte => " >= ",
            ComparisonOp::Lt => " < ",
            ComparisonOp::Lte => " <= ",
            ComparisonOp::In | ComparisonOp::NotIn => " IN ",
        };
        Ok(sql![lhs, operator, rhs])
    }

    fn string_op(
        &self,
        field: &FieldRef,
        op: StringOp,
        pattern: &ValueOperand,
    ) -> CompileResult<Sql> {
        if let Some(value_type) = field.value_type {
            reject_container("string operator", value_type, field)?;
        }
        let lhs = self.field_expr(field, ExtractAs::Text)?;
        match op {
            StringOp::Like => {
                let pattern = self.operand(pattern, self.adapter.like_pattern_transform())?;
                Ok(self.adapter.like(lhs, pattern))
            }
            StringOp::Contains | StringOp::StartsWith | StringOp::EndsWith | StringOp::Ilike => {
                let transform = match op {
                    StringOp::Contains => ParamTransform::Contains,
                    StringOp::StartsWith => ParamTransform::StartsWith,
                    StringOp::EndsWith => ParamTransform::EndsWith,
                    StringOp::Ilike | StringOp::Like => ParamTransform::Escaped,
                };
                let pattern = self.operand(pattern, transform)?;
                Ok(self.adapter.ilike(lhs, pattern))
            }
        }
    }

    fn null_check(&self, field: &FieldRef, op: NullCheckOp) -> CompileResult<Sql> {
        let negated = op == NullCheckOp::IsNotNull;
        let suffix = if negated { " IS NOT NULL" } else { " IS NULL" };
        match target(field)? {
            FieldTarget::WholeAlias => {
                Ok(sql![self.scope.column(&field.alias, Column::Id)?, suffix])
            }
            FieldTarget::System(column) => {
                Ok(sql![self.scope.column(&field.alias, column)?, suffix])
            }
            FieldTarget::Prop(pointer) => {
                let props = self.scope.column(&field.alias, Column::Props)?;
                Ok(self.adapter.object_path_is_null(&props, &pointer, negated))
            }
        }
    }

    fn between(
        &self,
        field: &FieldRef,
        lower: &ValueOperand,
        upper: &ValueOperand,
    ) -> CompileResult<Sql> {
        let value_type = resolve_type("between", field, &[lower, upper], false)?;
        reject_container("between", value_type, field)?;
        let lhs = self.field_expr(field, ExtractAs::from(value_type))?;
        Ok(sql![
            lhs,
            " BETWEEN ",
            self.operand(lower, ParamTransform::Identity)?,
            " AND ",
            self.operand(upper, ParamTransform::Identity)?
        ])
    }

    fn array_op(
        &self,
        field: &FieldRef,
        op: ArrayOp,
        values: &[ValueOperand],
    ) -> CompileResult<Sql> {
        let pointer = prop_pointer(field, "array operators")?;
        let props = self.scope.column(&field.alias, Column::Props)?;
        let length = || self.adapter.array_length(&props, &pointer);
        let first = || {
            values.first().ok_or_else(|| {
                CompileError::unsupported(format!(
                    "array operator {:?} on '{}' requires a value",
                    op,
                    field.describe()
                ))
            })
        };

        let length_cmp = |operator: &'static str| -> CompileResult<Sql> {
            Ok(sql![length(), operator, self.operand(first()?, ParamTransform::Identity)?])
        };

        match op {
            ArrayOp::IsEmpty => Ok(sql!["COALESCE(", length(), ", 0) = 0"]),
            ArrayOp::IsNotEmpty => Ok(sql![length(), " > 0"]),
            ArrayOp::LengthEq => length_cmp(" = "),
            ArrayOp::LengthGt => length_cmp(" > "),
            ArrayOp::LengthGte => length_cmp(" >= "),
            ArrayOp::LengthLt => length_cmp(" < "),
            ArrayOp::LengthLte => length_cmp(" <= "),
            ArrayOp::Contains => {
                let value = first()?;
                let element_type = element_type(field, std::slice::from_ref(value))?;
                Ok(self.adapter.array_contains(
                    &props,
                    &pointer,
                    self.operand(value, ParamTransform::Identity)?,
                    element_type,
                ))
            }
            ArrayOp::ContainsAll | ArrayOp::ContainsAny => {
                let element_type = element_type(field, values)?;
                let elements = self.flatten(values)?;
                match (op, elements.is_empty()) {
                    (ArrayOp::ContainsAll, true) => Ok(Sql::raw(ALWAYS_TRUE)),
                    (_, true) => Ok(Sql::raw(ALWAYS_FALSE)),
                    (ArrayOp::ContainsAll, false) => Ok(self.adapter.array_contains_all(
                        &props,
                        &pointer,
                        elements,
                        element_type,
                    )),
                    (_, false) => Ok(self.adapter.array_contains_any(
                        &props,
                        &pointer,
                        elements,
                        element_type,
                    )),
                }
            }
        }
    }

    fn object_op(
        &self,
        field: &FieldRef,
        op: ObjectOp,
        pointer: &JsonPointer,
        value: Option<&ValueOperand>,
    ) -> CompileResult<Sql> {
        let base = prop_pointer(field, "object operators")?;
        let full = base.join(pointer);
        let props = self.scope.column(&field.alias, Column::Props)?;
        let required = || {
            value.ok_or_else(|| {
                CompileError::unsupported(format!(
                    "object operator {:?} on '{}' requires a value",
                    op,
                    field.describe()
                ))
            })
        };

        match op {
            ObjectOp::HasPath => Ok(self.adapter.object_has_path(&props, &full)),
            ObjectOp::PathIsNull => Ok(self.adapter.object_path_is_null(&props, &full, false)),
            ObjectOp::PathIsNotNull => Ok(self.adapter.object_path_is_null(&props, &full, true)),
            ObjectOp::PathEquals => {
                let value = required()?;
                let value_type = operand_type(value, false)?.unwrap_or(ValueType::Unknown);
                reject_container("path_equals", value_type, field)?;
                Ok(self.adapter.object_path_equals(
                    &props,
                    &full,
                    self.operand(value, ParamTransform::Identity)?,
                    value_type,
                ))
            }
            ObjectOp::PathContains => {
                let value = required()?;
                let value_type = operand_type(value, false)?.unwrap_or(ValueType::Unknown);
                Ok(self.adapter.object_path_contains(
                    &props,
                    &full,
                    self.operand(value, ParamTransform::Identity)?,
                    value_type,
                ))
            }
        }
    }

    fn aggregate_comparison(
        &self,
        aggregate: &AggregateExpr,
        op: ComparisonOp,
        value: &ValueOperand,
    ) -> CompileResult<Sql> {
        if op.is_set_membership() {
            return Err(CompileError::unsupported(format!(
                "{} is not supported for aggregate comparisons",
                op.sql()
            )));
        }
        let lhs = self.aggregate(aggregate)?;
        let rhs = self.operand(value, ParamTransform::Identity)?;
        Ok(sql![lhs, " ", op.sql(), " ", rhs])
    }

    fn in_subquery(
        &self,
        field: &FieldRef,
        subquery: &QueryAst,
        negated: bool,
    ) -> CompileResult<Sql> {
        let projected = match subquery.projection.as_slice() {
            [single] => single,
            other => {
                return Err(CompileError::unsupported(format!(
                    "IN subquery for '{}' must project exactly one column, found {}",
                    field.describe(),
                    other.len()
                )))
            }
        };
        let subquery_type = match &projected.source {
            ProjectionSource::Field { field: inner } => {
                if matches!(target(inner)?, FieldTarget::WholeAlias) {
                    return Err(CompileError::unsupported(format!(
                        "IN subquery for '{}' must project a single column, not alias '{}'",
                        field.describe(),
                        inner.alias
                    )));
                }
                inner.declared_type()
            }
            ProjectionSource::Aggregate { aggregate } => Some(
                aggregate
                    .function
                    .result_type(aggregate.field.declared_type()),
            ),
        };
        let outer_type = field.declared_type();
        if let (Some(outer), Some(inner)) = (outer_type, subquery_type) {
            if !types_compatible(outer, inner) {
                return Err(CompileError::unsupported(format!(
                    "IN subquery type mismatch: '{}' is {} but the subquery projects {}",
                    field.describe(),
                    outer.name(),
                    inner.name()
                )));
            }
        }
        let value_type = outer_type.or(subquery_type).unwrap_or(ValueType::Unknown);
        reject_container("IN subquery", value_type, field)?;

        let lhs = self.field_expr(field, ExtractAs::from(value_type))?;
        let body = self.subqueries.compile_subquery(subquery)?;
        let keyword = if negated { " NOT IN (" } else { " IN (" };
        Ok(sql![lhs, keyword, body, ")"])
    }

    /// A single value operand as SQL.
    fn operand(&self, operand: &ValueOperand, transform: ParamTransform) -> CompileResult<Sql> {
        match operand {
            ValueOperand::Literal { value, .. } => transform
                .apply(value)
                .map(Sql::param)
                .ok_or_else(|| {
                    CompileError::unsupported(format!(
                        "pattern operand must be a string, got {}",
                        value
                    ))
                }),
            ValueOperand::Parameter { name, .. } => Ok(Sql::named_param(name.clone(), transform)),
            ValueOperand::List { .. } => Err(CompileError::unsupported(
                "list operand is only valid for IN / NOT IN and array operators",
            )),
        }
    }

    fn flatten(&self, values: &[ValueOperand]) -> CompileResult<Vec<Sql>> {
        let mut out = Vec::new();
        for operand in values {
            match operand {
                ValueOperand::List { values, .. }
                | ValueOperand::Literal {
                    value: Value::Array(values),
                    ..
                } => out.extend(values.iter().cloned().map(Sql::param)),
                other => out.push(self.operand(other, ParamTransform::Identity)?),
            }
        }
        Ok(out)
    }
}

fn target(field: &FieldRef) -> CompileResult<FieldTarget> {
    field.target().map_err(CompileError::unsupported)
}

fn prop_pointer(field: &FieldRef, what: &str) -> CompileResult<JsonPointer> {
    match target(field)? {
        FieldTarget::Prop(pointer) => Ok(pointer),
        FieldTarget::System(_) | FieldTarget::WholeAlias => Err(CompileError::unsupported(
            format!("{} require a property field, got '{}'", what, field.describe()),
        )),
    }
}

pub(crate) fn reject_container(
    operator: &str,
    value_type: ValueType,
    field: &FieldRef,
) -> CompileResult<()> {
    if value_type.is_container() {
        Err(CompileError::unsupported(format!(
            "operator '{}' does not support {} values (field '{}')",
            operator,
            value_type.name(),
            field.describe()
        )))
    } else {
        Ok(())
    }
}

fn types_compatible(a: ValueType, b: ValueType) -> bool {
    a == b
        || a == ValueType::Unknown
        || b == ValueType::Unknown
        || matches!(
            (a, b),
            (ValueType::Date, ValueType::String) | (ValueType::String, ValueType::Date)
        )
}

/// Type carried by an operand: explicit type first, then literal inference.
/// `flatten_arrays` treats an array literal as a list of candidates.
fn operand_type(operand: &ValueOperand, flatten_arrays: bool) -> CompileResult<Option<ValueType>> {
    if let Some(explicit) = operand.explicit_type() {
        return Ok(Some(explicit));
    }
    let literals: Vec<&Value> = match operand {
        ValueOperand::Literal {
            value: Value::Array(items),
            ..
        } if flatten_arrays => items.iter().collect(),
        ValueOperand::Literal { value, .. } => vec![value],
        ValueOperand::List { values, .. } => values.iter().collect(),
        ValueOperand::Parameter { .. } => Vec::new(),
    };
    infer_literal_type(&literals)
}

fn infer_literal_type(values: &[&Value]) -> CompileResult<Option<ValueType>> {
    let mut inferred: Option<ValueType> = None;
    for value in values {
        let value_type = ValueType::of_json(value);
        if value_type == ValueType::Unknown {
            continue;
        }
        match inferred {
            None => inferred = Some(value_type),
            Some(existing) if existing == value_type => {}
            Some(existing) => {
                return Err(CompileError::unsupported(format!(
                    "mixed literal types in one predicate: {} and {}",
                    existing.name(),
                    value_type.name()
                )))
            }
        }
    }
    Ok(inferred)
}

/// Comparison type: explicit operand type, then the field's declared type,
/// then the literal's own type.
///
/// Array and object literals are rejected whatever the declared type is;
/// `operator` names the operator in that error.
pub(crate) fn resolve_type(
    operator: &str,
    field: &FieldRef,
    operands: &[&ValueOperand],
    set_membership: bool,
) -> CompileResult<ValueType> {
    for operand in operands {
        if let Some(container) = container_literal(operand, set_membership) {
            reject_container(operator, container, field)?;
        }
    }
    let mut inferred = None;
    for operand in operands {
        if let Some(explicit) = operand.explicit_type() {
            return Ok(explicit);
        }
        let literal = operand_type(operand, set_membership)?;
        if let (Some(a), Some(b)) = (inferred, literal) {
            if a != b {
                return Err(CompileError::unsupported(format!(
                    "mixed literal types in one predicate on '{}': {} and {}",
                    field.describe(),
                    ValueType::name(a),
                    ValueType::name(b)
                )));
            }
        }
        inferred = inferred.or(literal);
    }
    if let Some(declared) = field.declared_type() {
        // A date field compared with a string literal stays a date comparison.
        return Ok(declared);
    }
    Ok(inferred.unwrap_or(ValueType::Unknown))
}

/// Array or object type of a literal value, ignoring any explicit type.
fn container_literal(operand: &ValueOperand, set_membership: bool) -> Option<ValueType> {
    let values: Vec<&Value> = match operand {
        ValueOperand::Literal {
            value: Value::Array(items),
            ..
        } if set_membership => items.iter().collect(),
        ValueOperand::Literal { value, .. } => vec![value],
        ValueOperand::List { values, .. } => values.iter().collect(),
        ValueOperand::Parameter { .. } => Vec::new(),
    };
    values
        .into_iter()
        .map(ValueType::of_json)
        .find(|value_type| value_type.is_container())
}

fn element_type(field: &FieldRef, values: &[ValueOperand]) -> CompileResult<ValueType> {
    let mut inferred = None;
    for operand in values {
        if let Some(explicit) = operand.explicit_type() {
            return Ok(explicit);
        }
        let literal = operand_type(operand, true)?;
        if let (Some(a), Some(b)) = (inferred, literal) {
            if a != b {
                return Err(CompileError::unsupported(format!(
                    "mixed literal types in array predicate on '{}': {} and {}",
                    field.describe(),
                    ValueType::name(a),
                    ValueType::name(b)
                )));
            }
        }
        inferred = inferred.or(literal);
    }
    Ok(inferred.unwrap_or(ValueType::String))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggregateFunction, VectorMetric, VectorSimilarity};
    use crate::compiler::context::TableScope;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use test_case::test_case;

    struct NoSubqueries;

    impl SubqueryCompiler for NoSubqueries {
        fn compile_subquery(&self, _ast: &QueryAst) -> CompileResult<Sql> {
            Ok(Sql::raw("SELECT 1"))
        }
    }

    fn compile_with(
        adapter: &dyn DialectAdapter,
        expr: &PredicateExpression,
    ) -> CompileResult<String> {
        let scope = TableScope::new().node("p", "n").edge("e", "e");
        let compiler = PredicateCompiler::new(adapter, &scope, &NoSubqueries);
        compiler.compile(expr).map(|sql| sql.render_inline(adapter))
    }

    fn sqlite(expr: &PredicateExpression) -> CompileResult<String> {
        compile_with(&SqliteDialect, expr)
    }

    #[test]
    fn test_comparison_on_property() {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "age"),
            ComparisonOp::Gt,
            ValueOperand::literal(30),
        );
        assert_eq!(sqlite(&expr).unwrap(), "json_extract(n.props, '$.age') > 30");
        assert_eq!(
            compile_with(&PostgresDialect, &expr).unwrap(),
            "(n.props #>> '{age}')::numeric > 30"
        );
    }

    #[test]
    fn test_system_column_comparison() {
        let expr = PredicateExpression::eq(FieldRef::system("p", "id"), "p1");
        assert_eq!(sqlite(&expr).unwrap(), "n.id = 'p1'");
    }

    #[test_case(ComparisonOp::In, "1 = 0" ; "in is always false")]
    #[test_case(ComparisonOp::NotIn, "1 = 1" ; "not in is always true")]
    fn test_empty_set_membership(op: ComparisonOp, expected: &str) {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "status"),
            op,
            ValueOperand::list(Vec::<Value>::new()),
        );
        assert_eq!(sqlite(&expr).unwrap(), expected);
    }

    #[test]
    fn test_in_list() {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "status"),
            ComparisonOp::In,
            ValueOperand::list(["active", "pending"]),
        );
        assert_eq!(
            sqlite(&expr).unwrap(),
            "json_extract(n.props, '$.status') IN ('active', 'pending')"
        );
    }

    #[test]
    fn test_mixed_literal_types_rejected() {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "status"),
            ComparisonOp::In,
            ValueOperand::List {
                values: vec![Value::from("a"), Value::from(1)],
                value_type: None,
            },
        );
        let err = sqlite(&expr).unwrap_err();
        assert!(err.to_string().contains("mixed literal types"));
    }

    #[test]
    fn test_array_equality_rejected() {
        let expr = PredicateExpression::eq(FieldRef::prop("p", "tags"), serde_json::json!(["a"]));
        let err = sqlite(&expr).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedPredicate { .. }));
        assert!(err.to_string().contains("array"));
    }

    #[test_case(ComparisonOp::Eq, ValueOperand::literal(serde_json::json!(["a", "b"])), "array" ; "array literal")]
    #[test_case(ComparisonOp::Neq, ValueOperand::literal(serde_json::json!({"a": 1})), "object" ; "object literal")]
    #[test_case(ComparisonOp::In, ValueOperand::list([serde_json::json!(["a"])]), "array" ; "array inside in list")]
    #[test_case(ComparisonOp::Eq, ValueOperand::typed(serde_json::json!(["a"]), ValueType::String), "array" ; "explicitly typed array")]
    fn test_container_literal_rejected_on_typed_field(
        op: ComparisonOp,
        value: ValueOperand,
        kind: &str,
    ) {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "name").typed(ValueType::String),
            op,
            value,
        );
        for adapter in [&SqliteDialect as &dyn DialectAdapter, &PostgresDialect] {
            let err = compile_with(adapter, &expr).unwrap_err();
            assert!(matches!(err, CompileError::UnsupportedPredicate { .. }));
            assert!(err.to_string().contains(kind));
        }
    }

    #[test]
    fn test_between_rejects_container_bound_on_typed_field() {
        let expr = PredicateExpression::Between {
            field: FieldRef::prop("p", "age").typed(ValueType::Number),
            lower: ValueOperand::literal(1),
            upper: ValueOperand::literal(serde_json::json!([9])),
        };
        let err = sqlite(&expr).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unsupported predicate: operator 'between' does not support array values (field 'p.props/age')");
    }

    #[test]
    fn test_date_field_with_string_literal_is_date_comparison() {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "born").typed(ValueType::Date),
            ComparisonOp::Lt,
            ValueOperand::literal("2000-01-01"),
        );
        assert_eq!(
            compile_with(&PostgresDialect, &expr).unwrap(),
            "(n.props #>> '{born}')::timestamptz < '2000-01-01'"
        );
    }

    #[test]
    fn test_explicit_operand_type_wins() {
        let expr = PredicateExpression::compare(
            FieldRef::prop("p", "score").typed(ValueType::String),
            ComparisonOp::Gte,
            ValueOperand::typed(5, ValueType::Number),
        );
        assert_eq!(
            compile_with(&PostgresDialect, &expr).unwrap(),
            "(n.props #>> '{score}')::numeric >= 5"
        );
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let expr =
            PredicateExpression::string(FieldRef::prop("p", "name"), StringOp::Contains, "50%_");
        assert_eq!(
            sqlite(&expr).unwrap(),
            "json_extract(n.props, '$.name') LIKE '%50\\%\\_%' ESCAPE '\\'"
        );
    }

    #[test]
    fn test_like_is_case_sensitive_and_unescaped() {
        let expr = PredicateExpression::string(FieldRef::prop("p", "name"), StringOp::Like, "Ad_%");
        assert_eq!(sqlite(&expr).unwrap(), "json_extract(n.props, '$.name') GLOB 'Ad?*'");
        assert_eq!(
            compile_with(&PostgresDialect, &expr).unwrap(),
            "(n.props #>> '{name}') LIKE 'Ad_%'"
        );
    }

    #[test]
    fn test_string_op_with_parameter_defers_transform() {
        let expr = PredicateExpression::StringOp {
            field: FieldRef::prop("p", "name"),
            op: StringOp::StartsWith,
            pattern: ValueOperand::param("prefix"),
        };
        assert_eq!(
            sqlite(&expr).unwrap(),
            "json_extract(n.props, '$.name') LIKE :prefix ESCAPE '\\'"
        );
    }

    #[test]
    fn test_between_mixes_literal_and_parameter() {
        let expr = PredicateExpression::Between {
            field: FieldRef::prop("p", "age"),
            lower: ValueOperand::literal(18),
            upper: ValueOperand::param("max_age"),
        };
        assert_eq!(
            sqlite(&expr).unwrap(),
            "json_extract(n.props, '$.age') BETWEEN 18 AND :max_age"
        );
    }

    #[test]
    fn test_null_checks() {
        let on_column = PredicateExpression::NullCheck {
            field: FieldRef::system("e", "valid_to"),
            op: NullCheckOp::IsNull,
        };
        assert_eq!(sqlite(&on_column).unwrap(), "e.valid_to IS NULL");

        let on_alias = PredicateExpression::NullCheck {
            field: FieldRef::alias("p"),
            op: NullCheckOp::IsNotNull,
        };
        assert_eq!(sqlite(&on_alias).unwrap(), "n.id IS NOT NULL");
    }

    #[test]
    fn test_array_ops() {
        let empty = PredicateExpression::ArrayOp {
            field: FieldRef::prop("p", "tags"),
            op: ArrayOp::IsEmpty,
            values: Vec::new(),
        };
        assert_eq!(
            sqlite(&empty).unwrap(),
            "COALESCE(json_array_length(n.props, '$.tags'), 0) = 0"
        );

        let longer = PredicateExpression::ArrayOp {
            field: FieldRef::prop("p", "tags"),
            op: ArrayOp::LengthGt,
            values: vec![ValueOperand::literal(2)],
        };
        assert_eq!(sqlite(&longer).unwrap(), "json_array_length(n.props, '$.tags') > 2");

        let none_required = PredicateExpression::ArrayOp {
            field: FieldRef::prop("p", "tags"),
            op: ArrayOp::ContainsAll,
            values: vec![ValueOperand::list(Vec::<Value>::new())],
        };
        assert_eq!(sqlite(&none_required).unwrap(), "1 = 1");
    }

    #[test]
    fn test_array_op_on_system_column_rejected() {
        let expr = PredicateExpression::ArrayOp {
            field: FieldRef::system("p", "kind"),
            op: ArrayOp::IsEmpty,
            values: Vec::new(),
        };
        assert!(sqlite(&expr).is_err());
    }

    #[test]
    fn test_object_path_equals_joins_pointers() {
        let expr = PredicateExpression::ObjectOp {
            field: FieldRef::prop("p", "address"),
            op: ObjectOp::PathEquals,
            pointer: JsonPointer::parse("/city").unwrap(),
            value: Some(ValueOperand::literal("Oslo")),
        };
        assert_eq!(
            compile_with(&PostgresDialect, &expr).unwrap(),
            "(n.props #>> '{address,city}') = 'Oslo'"
        );
    }

    #[test]
    fn test_boolean_composition() {
        let expr = PredicateExpression::or(vec![
            PredicateExpression::eq(FieldRef::prop("p", "a"), 1),
            PredicateExpression::not(PredicateExpression::eq(FieldRef::prop("p", "b"), true)),
        ]);
        assert_eq!(
            sqlite(&expr).unwrap(),
            "(json_extract(n.props, '$.a') = 1 OR NOT (json_extract(n.props, '$.b') = 1))"
        );
        assert_eq!(sqlite(&PredicateExpression::and(Vec::new())).unwrap(), "1 = 1");
        assert_eq!(sqlite(&PredicateExpression::or(Vec::new())).unwrap(), "1 = 0");
    }

    #[test]
    fn test_vector_similarity_is_structural() {
        let expr = PredicateExpression::VectorSimilarity(VectorSimilarity {
            field: FieldRef::prop("p", "embedding"),
            query_embedding: vec![1.0],
            metric: VectorMetric::Cosine,
            k: 3,
            min_score: None,
        });
        assert_eq!(sqlite(&expr).unwrap(), "1 = 1");
    }

    #[test]
    fn test_aggregate_outside_having_rejected() {
        let expr = PredicateExpression::AggregateComparison {
            aggregate: AggregateExpr {
                function: AggregateFunction::Count,
                field: FieldRef::alias("p"),
            },
            op: ComparisonOp::Gt,
            value: ValueOperand::literal(1),
        };
        assert!(sqlite(&expr).is_err());
    }

    #[test]
    fn test_in_subquery_requires_single_column() {
        let subquery = QueryAst::from_kind("c", "Company").with_graph_id("g1");
        let expr = PredicateExpression::InSubquery {
            field: FieldRef::prop("p", "employer"),
            subquery: Box::new(subquery),
            negated: false,
        };
        let err = sqlite(&expr).unwrap_err();
        assert!(err.to_string().contains("exactly one column, found 0"));
    }

    #[test]
    fn test_in_subquery_type_mismatch() {
        let subquery = QueryAst::from_kind("c", "Company").with_graph_id("g1").project(
            "founded",
            ProjectionSource::field(FieldRef::prop("c", "founded").typed(ValueType::Number)),
        );
        let expr = PredicateExpression::InSubquery {
            field: FieldRef::prop("p", "employer").typed(ValueType::String),
            subquery: Box::new(subquery),
            negated: true,
        };
        let err = sqlite(&expr).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_in_subquery_compiles() {
        let subquery = QueryAst::from_kind("c", "Company")
            .with_graph_id("g1")
            .project("id", ProjectionSource::field(FieldRef::system("c", "id")));
        let expr = PredicateExpression::InSubquery {
            field: FieldRef::prop("p", "employer"),
            subquery: Box::new(subquery),
            negated: true,
        };
        assert_eq!(
            sqlite(&expr).unwrap(),
            "json_extract(n.props, '$.employer') NOT IN (SELECT 1)"
        );
    }
}
