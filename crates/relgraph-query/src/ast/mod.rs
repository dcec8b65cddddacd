//! Query AST consumed by the compiler.
//!
//! These are plain immutable values built by the query builder. Aliases are
//! kept as strings here and validated by the compiler's validation pass, so
//! an AST can be deserialized from JSON without failing early.

mod predicate;
mod set_op;

pub use predicate::{
    AggregateExpr, AggregateFunction, ArrayOp, ComparisonOp, NullCheckOp, ObjectOp,
    PredicateExpression, StringOp, ValueOperand, VectorMetric, VectorSimilarity,
};
pub use set_op::{SetOperand, SetOperation, SetOperator};

use crate::json_pointer::JsonPointer;
use crate::schema::Column;
use serde::{Deserialize, Serialize};

/// A single graph query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAst {
    /// Graph id; required on nested subqueries, optional at top level
    #[serde(default)]
    pub graph_id: Option<String>,
    pub start: StartSpec,
    #[serde(default)]
    pub traversals: Vec<Traversal>,
    #[serde(default)]
    pub predicates: Vec<AliasPredicate>,
    /// Empty projection selects every column of every alias
    #[serde(default)]
    pub projection: Vec<ProjectionField>,
    #[serde(default)]
    pub group_by: Vec<FieldRef>,
    #[serde(default)]
    pub having: Option<PredicateExpression>,
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub temporal_mode: TemporalMode,
    /// Exact leaf fields consumed by the caller, enabling column pruning
    #[serde(default)]
    pub selective_fields: Option<Vec<SelectiveField>>,
}

impl QueryAst {
    /// Query starting from nodes of a single kind.
    pub fn from_kind(alias: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            start: StartSpec {
                alias: alias.into(),
                kinds: vec![kind.into()],
                include_subclasses: false,
            },
            ..Default::default()
        }
    }

    pub fn with_graph_id(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = Some(graph_id.into());
        self
    }

    pub fn traverse(mut self, traversal: Traversal) -> Self {
        self.traversals.push(traversal);
        self
    }

    pub fn filter(mut self, target_alias: impl Into<String>, expression: PredicateExpression) -> Self {
        self.predicates.push(AliasPredicate {
            target_alias: target_alias.into(),
            target_type: TargetType::Node,
            expression,
        });
        self
    }

    pub fn filter_edge(
        mut self,
        target_alias: impl Into<String>,
        expression: PredicateExpression,
    ) -> Self {
        self.predicates.push(AliasPredicate {
            target_alias: target_alias.into(),
            target_type: TargetType::Edge,
            expression,
        });
        self
    }

    pub fn project(mut self, output_name: impl Into<String>, source: ProjectionSource) -> Self {
        self.projection.push(ProjectionField {
            output_name: output_name.into(),
            source,
        });
        self
    }

    pub fn order(mut self, field: FieldRef, direction: SortDirection) -> Self {
        self.order_by.push(OrderSpec {
            field,
            direction,
            nulls: None,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// True when any traversal is variable-length.
    pub fn has_variable_length(&self) -> bool {
        self.traversals.iter().any(|t| t.variable_length.is_some())
    }

    /// True when any projection is an aggregate.
    pub fn has_aggregate_projection(&self) -> bool {
        self.projection
            .iter()
            .any(|p| matches!(p.source, ProjectionSource::Aggregate { .. }))
    }

    /// All aliases bound by this query, in binding order.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases = vec![self.start.alias.as_str()];
        for traversal in &self.traversals {
            aliases.push(traversal.edge_alias.as_str());
            aliases.push(traversal.node_alias.as_str());
        }
        aliases
    }

    /// Which binding an alias refers to.
    pub fn alias_kind(&self, alias: &str) -> Option<AliasKind> {
        if self.start.alias == alias {
            return Some(AliasKind::Start);
        }
        self.traversals.iter().enumerate().find_map(|(i, t)| {
            if t.node_alias == alias {
                Some(AliasKind::TraversalNode(i))
            } else if t.edge_alias == alias {
                Some(AliasKind::TraversalEdge(i))
            } else {
                None
            }
        })
    }
}

/// Where an alias is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    Start,
    TraversalNode(usize),
    TraversalEdge(usize),
}

impl AliasKind {
    pub fn is_edge(self) -> bool {
        matches!(self, AliasKind::TraversalEdge(_))
    }
}

/// The starting node set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSpec {
    pub alias: String,
    /// Already-expanded kind list (subclasses resolved by the caller)
    pub kinds: Vec<String>,
    #[serde(default)]
    pub include_subclasses: bool,
}

/// Edge direction relative to the alias being joined from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Out,
    In,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
        }
    }
}

/// One graph hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traversal {
    pub edge_alias: String,
    pub edge_kinds: Vec<String>,
    /// Kinds traversed in the opposite direction (symmetric/inverse edges)
    #[serde(default)]
    pub inverse_edge_kinds: Vec<String>,
    #[serde(default)]
    pub direction: Direction,
    pub node_alias: String,
    pub node_kinds: Vec<String>,
    pub join_from_alias: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub variable_length: Option<VariableLengthSpec>,
}

impl Traversal {
    /// Single outbound hop over one edge kind to one node kind.
    pub fn out(
        join_from_alias: impl Into<String>,
        edge_alias: impl Into<String>,
        edge_kind: impl Into<String>,
        node_alias: impl Into<String>,
        node_kind: impl Into<String>,
    ) -> Self {
        Self {
            edge_alias: edge_alias.into(),
            edge_kinds: vec![edge_kind.into()],
            direction: Direction::Out,
            node_alias: node_alias.into(),
            node_kinds: vec![node_kind.into()],
            join_from_alias: join_from_alias.into(),
            ..Default::default()
        }
    }

    pub fn inbound(mut self) -> Self {
        self.direction = Direction::In;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_inverse_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inverse_edge_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn variable_length(mut self, spec: VariableLengthSpec) -> Self {
        self.variable_length = Some(spec);
        self
    }
}

/// Whether a recursive traversal may revisit nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    #[default]
    Prevent,
    Allow,
}

/// Hop-count range of a variable-length traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableLengthSpec {
    pub min_depth: u32,
    /// `-1` means unbounded (capped by the compiler)
    pub max_depth: i64,
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
    #[serde(default)]
    pub path_alias: Option<String>,
    #[serde(default)]
    pub depth_alias: Option<String>,
}

impl VariableLengthSpec {
    pub fn new(min_depth: u32, max_depth: i64) -> Self {
        Self {
            min_depth,
            max_depth,
            cycle_policy: CyclePolicy::Prevent,
            path_alias: None,
            depth_alias: None,
        }
    }

    pub fn cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn with_path(mut self, alias: impl Into<String>) -> Self {
        self.path_alias = Some(alias.into());
        self
    }

    pub fn with_depth(mut self, alias: impl Into<String>) -> Self {
        self.depth_alias = Some(alias.into());
        self
    }
}

/// Whether a predicate targets a node or an edge alias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    #[default]
    Node,
    Edge,
}

/// A predicate scoped to one alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasPredicate {
    pub target_alias: String,
    #[serde(default)]
    pub target_type: TargetType,
    pub expression: PredicateExpression,
}

/// Declared value type of a field or operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Embedding,
    Unknown,
}

impl ValueType {
    /// Array and object values cannot be compared or ordered with scalar ops.
    pub fn is_container(self) -> bool {
        matches!(self, ValueType::Array | ValueType::Object | ValueType::Embedding)
    }

    /// Infer the type of a JSON literal.
    pub fn of_json(value: &serde_json::Value) -> ValueType {
        match value {
            serde_json::Value::Null => ValueType::Unknown,
            serde_json::Value::Bool(_) => ValueType::Boolean,
            serde_json::Value::Number(_) => ValueType::Number,
            serde_json::Value::String(_) => ValueType::String,
            serde_json::Value::Array(_) => ValueType::Array,
            serde_json::Value::Object(_) => ValueType::Object,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Date => "date",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Embedding => "embedding",
            ValueType::Unknown => "unknown",
        }
    }
}

/// A reference to an alias, one of its system columns, or a property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub alias: String,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub json_pointer: Option<JsonPointer>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
}

/// What a [`FieldRef`] resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldTarget {
    /// The alias itself (every column)
    WholeAlias,
    System(Column),
    /// A property inside `props`
    Prop(JsonPointer),
}

impl FieldRef {
    /// The alias itself.
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Default::default()
        }
    }

    /// A system column such as `id` or `kind`.
    pub fn system(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: vec![column.into()],
            ..Default::default()
        }
    }

    /// A top-level property (`props.<name>`).
    pub fn prop(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            path: vec!["props".to_string(), name.into()],
            ..Default::default()
        }
    }

    /// A property addressed by JSON pointer.
    pub fn pointer(alias: impl Into<String>, pointer: JsonPointer) -> Self {
        Self {
            alias: alias.into(),
            path: vec!["props".to_string()],
            json_pointer: Some(pointer),
            value_type: None,
        }
    }

    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Resolve the path into a target. Unknown single-segment paths are
    /// rejected.
    pub fn target(&self) -> Result<FieldTarget, String> {
        match self.path.split_first() {
            None => match &self.json_pointer {
                None => Ok(FieldTarget::WholeAlias),
                Some(pointer) => Ok(FieldTarget::Prop(pointer.clone())),
            },
            Some((head, rest)) if head == "props" => {
                let base = JsonPointer::from_segments(rest.iter().cloned());
                Ok(FieldTarget::Prop(match &self.json_pointer {
                    Some(pointer) if base.is_root() => pointer.clone(),
                    Some(pointer) => base.join(pointer),
                    None => base,
                }))
            }
            Some((head, [])) => Column::from_name(head)
                .map(FieldTarget::System)
                .ok_or_else(|| format!("unknown system column '{}' on '{}'", head, self.alias)),
            Some(_) => Err(format!(
                "field path '{}' on '{}' must start with 'props' or name a system column",
                self.path.join("."),
                self.alias
            )),
        }
    }

    /// Declared type, falling back to the system column's own type.
    pub fn declared_type(&self) -> Option<ValueType> {
        if self.value_type.is_some() {
            return self.value_type;
        }
        match self.target() {
            Ok(FieldTarget::System(column)) => Some(column.value_type()),
            _ => None,
        }
    }

    /// Human-readable form for error messages.
    pub fn describe(&self) -> String {
        match self.target() {
            Ok(FieldTarget::WholeAlias) => self.alias.clone(),
            Ok(FieldTarget::System(column)) => format!("{}.{}", self.alias, column.name()),
            Ok(FieldTarget::Prop(pointer)) => format!("{}.props{}", self.alias, pointer),
            Err(_) => format!("{}.{}", self.alias, self.path.join(".")),
        }
    }
}

/// One output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionField {
    pub output_name: String,
    pub source: ProjectionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectionSource {
    Field { field: FieldRef },
    Aggregate { aggregate: AggregateExpr },
}

impl ProjectionSource {
    pub fn field(field: FieldRef) -> Self {
        Self::Field { field }
    }

    pub fn aggregate(function: AggregateFunction, field: FieldRef) -> Self {
        Self::Aggregate {
            aggregate: AggregateExpr { function, field },
        }
    }

    pub fn field_ref(&self) -> &FieldRef {
        match self {
            ProjectionSource::Field { field } => field,
            ProjectionSource::Aggregate { aggregate } => &aggregate.field,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub field: FieldRef,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub nulls: Option<NullsOrder>,
}

/// Row-visibility policy applied to every scanned table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TemporalMode {
    #[default]
    Current,
    AsOf {
        timestamp: String,
    },
    IncludeEnded,
    IncludeTombstones,
}

/// A leaf field the caller consumes, with its output column name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectiveField {
    pub field: FieldRef,
    pub output_name: String,
}

impl SelectiveField {
    pub fn new(field: FieldRef, output_name: impl Into<String>) -> Self {
        Self {
            field,
            output_name: output_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_targets() {
        assert_eq!(FieldRef::alias("p").target(), Ok(FieldTarget::WholeAlias));
        assert_eq!(
            FieldRef::system("p", "id").target(),
            Ok(FieldTarget::System(Column::Id))
        );
        assert_eq!(
            FieldRef::prop("p", "age").target(),
            Ok(FieldTarget::Prop(JsonPointer::from_segments(["age"])))
        );
        assert!(FieldRef::system("p", "bogus").target().is_err());
    }

    #[test]
    fn test_pointer_and_segments_resolve_identically() {
        let by_segments = FieldRef {
            alias: "p".to_string(),
            path: vec!["props".to_string(), "address".to_string(), "city".to_string()],
            ..Default::default()
        };
        let by_pointer = FieldRef::pointer("p", JsonPointer::parse("/address/city").unwrap());

        assert_eq!(by_segments.target(), by_pointer.target());
    }

    #[test]
    fn test_alias_kinds() {
        let ast = QueryAst::from_kind("p", "Person").traverse(Traversal::out(
            "p", "e", "worksAt", "c", "Company",
        ));

        assert_eq!(ast.alias_kind("p"), Some(AliasKind::Start));
        assert_eq!(ast.alias_kind("e"), Some(AliasKind::TraversalEdge(0)));
        assert_eq!(ast.alias_kind("c"), Some(AliasKind::TraversalNode(0)));
        assert_eq!(ast.alias_kind("x"), None);
        assert_eq!(ast.aliases(), vec!["p", "e", "c"]);
    }

    #[test]
    fn test_ast_deserializes_from_json() {
        let json = serde_json::json!({
            "start": { "alias": "p", "kinds": ["Person"] },
            "traversals": [{
                "edge_alias": "e",
                "edge_kinds": ["knows"],
                "node_alias": "f",
                "node_kinds": ["Person"],
                "join_from_alias": "p",
                "variable_length": { "min_depth": 1, "max_depth": 3 }
            }],
            "predicates": [{
                "target_alias": "p",
                "expression": {
                    "type": "comparison",
                    "field": { "alias": "p", "path": ["props", "age"] },
                    "op": "gt",
                    "value": { "kind": "literal", "value": 30 }
                }
            }],
            "temporal_mode": { "mode": "include_ended" }
        });

        let ast: QueryAst = serde_json::from_value(json).unwrap();

        assert!(ast.has_variable_length());
        assert_eq!(ast.temporal_mode, TemporalMode::IncludeEnded);
        assert_eq!(
            ast.traversals[0].variable_length.as_ref().map(|v| v.cycle_policy),
            Some(CyclePolicy::Prevent)
        );
    }
}
