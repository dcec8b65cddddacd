//! Predicate expression trees.

use super::{FieldRef, QueryAst, ValueType};
use crate::json_pointer::JsonPointer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
}

impl ComparisonOp {
    pub fn sql(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "<>",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::In => "IN",
            ComparisonOp::NotIn => "NOT IN",
        }
    }

    pub fn is_set_membership(self) -> bool {
        matches!(self, ComparisonOp::In | ComparisonOp::NotIn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOp {
    Contains,
    StartsWith,
    EndsWith,
    /// Case-sensitive, caller-controlled pattern
    Like,
    /// Case-insensitive, caller-controlled pattern
    Ilike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullCheckOp {
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayOp {
    IsEmpty,
    IsNotEmpty,
    /// Length comparisons read their bound from `values[0]`
    LengthEq,
    LengthGt,
    LengthGte,
    LengthLt,
    LengthLte,
    Contains,
    ContainsAll,
    ContainsAny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOp {
    HasPath,
    PathEquals,
    PathContains,
    PathIsNull,
    PathIsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn is_count(self) -> bool {
        matches!(self, AggregateFunction::Count | AggregateFunction::CountDistinct)
    }

    pub fn result_type(self, input: Option<ValueType>) -> ValueType {
        match self {
            AggregateFunction::Count
            | AggregateFunction::CountDistinct
            | AggregateFunction::Sum
            | AggregateFunction::Avg => ValueType::Number,
            AggregateFunction::Min | AggregateFunction::Max => input.unwrap_or(ValueType::Unknown),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    pub field: FieldRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMetric {
    Cosine,
    L2,
    InnerProduct,
}

impl VectorMetric {
    pub fn name(self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::L2 => "l2",
            VectorMetric::InnerProduct => "inner_product",
        }
    }

    /// Distance threshold equivalent to a minimum similarity score.
    ///
    /// Cosine distance is `1 - similarity`; L2 takes the score as a maximum
    /// distance; inner-product distance is the negated inner product.
    pub fn distance_threshold(self, min_score: f64) -> f64 {
        match self {
            VectorMetric::Cosine => 1.0 - min_score,
            VectorMetric::L2 => min_score,
            VectorMetric::InnerProduct => -min_score,
        }
    }
}

/// Nearest-neighbour search over an embedding field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSimilarity {
    pub field: FieldRef,
    pub query_embedding: Vec<f32>,
    pub metric: VectorMetric,
    /// Number of neighbours to return
    pub k: u64,
    #[serde(default)]
    pub min_score: Option<f64>,
}

/// Right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueOperand {
    Literal {
        value: Value,
        #[serde(default)]
        value_type: Option<ValueType>,
    },
    List {
        values: Vec<Value>,
        #[serde(default)]
        value_type: Option<ValueType>,
    },
    /// Named parameter bound after compilation
    Parameter {
        name: String,
        #[serde(default)]
        value_type: Option<ValueType>,
    },
}

impl ValueOperand {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
            value_type: None,
        }
    }

    pub fn typed(value: impl Into<Value>, value_type: ValueType) -> Self {
        Self::Literal {
            value: value.into(),
            value_type: Some(value_type),
        }
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::List {
            values: values.into_iter().map(Into::into).collect(),
            value_type: None,
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Parameter {
            name: name.into(),
            value_type: None,
        }
    }

    pub fn explicit_type(&self) -> Option<ValueType> {
        match self {
            ValueOperand::Literal { value_type, .. }
            | ValueOperand::List { value_type, .. }
            | ValueOperand::Parameter { value_type, .. } => *value_type,
        }
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self, ValueOperand::Literal { value: Value::String(_), .. })
    }
}

/// Boolean expression over fields of one or more aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredicateExpression {
    Comparison {
        field: FieldRef,
        op: ComparisonOp,
        value: ValueOperand,
    },
    StringOp {
        field: FieldRef,
        op: StringOp,
        pattern: ValueOperand,
    },
    NullCheck {
        field: FieldRef,
        op: NullCheckOp,
    },
    Between {
        field: FieldRef,
        lower: ValueOperand,
        upper: ValueOperand,
    },
    ArrayOp {
        field: FieldRef,
        op: ArrayOp,
        #[serde(default)]
        values: Vec<ValueOperand>,
    },
    ObjectOp {
        field: FieldRef,
        op: ObjectOp,
        pointer: JsonPointer,
        #[serde(default)]
        value: Option<ValueOperand>,
    },
    AggregateComparison {
        aggregate: AggregateExpr,
        op: ComparisonOp,
        value: ValueOperand,
    },
    And {
        operands: Vec<PredicateExpression>,
    },
    Or {
        operands: Vec<PredicateExpression>,
    },
    Not {
        operand: Box<PredicateExpression>,
    },
    Exists {
        subquery: Box<QueryAst>,
        #[serde(default)]
        negated: bool,
    },
    InSubquery {
        field: FieldRef,
        subquery: Box<QueryAst>,
        #[serde(default)]
        negated: bool,
    },
    VectorSimilarity(VectorSimilarity),
}

impl PredicateExpression {
    pub fn compare(field: FieldRef, op: ComparisonOp, value: ValueOperand) -> Self {
        Self::Comparison { field, op, value }
    }

    pub fn eq(field: FieldRef, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOp::Eq, ValueOperand::literal(value))
    }

    pub fn string(field: FieldRef, op: StringOp, pattern: impl Into<Value>) -> Self {
        Self::StringOp {
            field,
            op,
            pattern: ValueOperand::literal(pattern),
        }
    }

    pub fn and(operands: Vec<PredicateExpression>) -> Self {
        Self::And { operands }
    }

    pub fn or(operands: Vec<PredicateExpression>) -> Self {
        Self::Or { operands }
    }

    pub fn not(operand: PredicateExpression) -> Self {
        Self::Not {
            operand: Box::new(operand),
        }
    }

    /// True if `f` holds for this node or any descendant. Does not descend
    /// into subqueries.
    pub fn any(&self, f: &impl Fn(&PredicateExpression) -> bool) -> bool {
        if f(self) {
            return true;
        }
        match self {
            PredicateExpression::And { operands } | PredicateExpression::Or { operands } => {
                operands.iter().any(|op| op.any(f))
            }
            PredicateExpression::Not { operand } => operand.any(f),
            PredicateExpression::Comparison { .. }
            | PredicateExpression::StringOp { .. }
            | PredicateExpression::NullCheck { .. }
            | PredicateExpression::Between { .. }
            | PredicateExpression::ArrayOp { .. }
            | PredicateExpression::ObjectOp { .. }
            | PredicateExpression::AggregateComparison { .. }
            | PredicateExpression::Exists { .. }
            | PredicateExpression::InSubquery { .. }
            | PredicateExpression::VectorSimilarity(_) => false,
        }
    }

    pub fn contains_vector_similarity(&self) -> bool {
        self.any(&|p| matches!(p, PredicateExpression::VectorSimilarity(_)))
    }

    pub fn contains_subquery(&self) -> bool {
        self.any(&|p| {
            matches!(
                p,
                PredicateExpression::Exists { .. } | PredicateExpression::InSubquery { .. }
            )
        })
    }

    /// Vector predicates reachable through top level / `and` only.
    pub fn top_level_vectors(&self) -> Vec<&VectorSimilarity> {
        match self {
            PredicateExpression::VectorSimilarity(v) => vec![v],
            PredicateExpression::And { operands } => {
                operands.iter().flat_map(|op| op.top_level_vectors()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// True when a vector predicate sits under `or` or `not`.
    pub fn has_nested_vector(&self) -> bool {
        match self {
            PredicateExpression::And { operands } => operands.iter().any(|op| op.has_nested_vector()),
            PredicateExpression::Or { operands } => {
                operands.iter().any(|op| op.contains_vector_similarity())
            }
            PredicateExpression::Not { operand } => operand.contains_vector_similarity(),
            _ => false,
        }
    }

    /// Field references that are read directly by this expression (not
    /// through subqueries).
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut out = Vec::new();
        self.collect_field_refs(&mut out);
        out
    }

    fn collect_field_refs<'a>(&'a self, out: &mut Vec<&'a FieldRef>) {
        match self {
            PredicateExpression::Comparison { field, .. }
            | PredicateExpression::StringOp { field, .. }
            | PredicateExpression::NullCheck { field, .. }
            | PredicateExpression::Between { field, .. }
            | PredicateExpression::ArrayOp { field, .. }
            | PredicateExpression::ObjectOp { field, .. }
            | PredicateExpression::InSubquery { field, .. } => out.push(field),
            PredicateExpression::AggregateComparison { aggregate, .. } => out.push(&aggregate.field),
            PredicateExpression::VectorSimilarity(v) => out.push(&v.field),
            PredicateExpression::And { operands } | PredicateExpression::Or { operands } => {
                for op in operands {
                    op.collect_field_refs(out);
                }
            }
            PredicateExpression::Not { operand } => operand.collect_field_refs(out),
            PredicateExpression::Exists { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(alias: &str) -> PredicateExpression {
        PredicateExpression::VectorSimilarity(VectorSimilarity {
            field: FieldRef::prop(alias, "embedding"),
            query_embedding: vec![0.1, 0.2],
            metric: VectorMetric::Cosine,
            k: 5,
            min_score: None,
        })
    }

    #[test]
    fn test_top_level_vectors_under_and() {
        let expr = PredicateExpression::and(vec![
            PredicateExpression::eq(FieldRef::prop("p", "name"), "Ada"),
            vector("p"),
        ]);

        assert_eq!(expr.top_level_vectors().len(), 1);
        assert!(!expr.has_nested_vector());
    }

    #[test]
    fn test_vector_under_or_is_nested() {
        let expr = PredicateExpression::or(vec![
            PredicateExpression::eq(FieldRef::prop("p", "name"), "Ada"),
            vector("p"),
        ]);

        assert!(expr.top_level_vectors().is_empty());
        assert!(expr.has_nested_vector());
        assert!(PredicateExpression::not(vector("p")).has_nested_vector());
    }

    #[test]
    fn test_metric_thresholds() {
        assert!((VectorMetric::Cosine.distance_threshold(0.8) - 0.2).abs() < 1e-9);
        assert_eq!(VectorMetric::L2.distance_threshold(0.5), 0.5);
        assert_eq!(VectorMetric::InnerProduct.distance_threshold(0.7), -0.7);
    }

    #[test]
    fn test_field_refs_skip_subqueries() {
        let expr = PredicateExpression::and(vec![
            PredicateExpression::eq(FieldRef::prop("p", "name"), "Ada"),
            PredicateExpression::Exists {
                subquery: Box::new(QueryAst::from_kind("x", "Company")),
                negated: false,
            },
        ]);

        let refs = expr.field_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].alias, "p");
    }
}
