//! Compound queries (UNION / INTERSECT / EXCEPT).

use super::{OrderSpec, QueryAst};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn sql(self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

/// Either side of a set operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetOperand {
    Query { query: Box<QueryAst> },
    SetOperation { operation: Box<SetOperation> },
}

impl SetOperand {
    pub fn query(query: QueryAst) -> Self {
        Self::Query {
            query: Box::new(query),
        }
    }

    pub fn operation(operation: SetOperation) -> Self {
        Self::SetOperation {
            operation: Box::new(operation),
        }
    }

    /// The leftmost query, which defines the output columns.
    pub fn leftmost(&self) -> &QueryAst {
        match self {
            SetOperand::Query { query } => query,
            SetOperand::SetOperation { operation } => operation.left.leftmost(),
        }
    }

    /// Leaf queries in left-to-right order.
    pub fn leaves(&self) -> Vec<&QueryAst> {
        match self {
            SetOperand::Query { query } => vec![query.as_ref()],
            SetOperand::SetOperation { operation } => operation.leaves(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetOperation {
    pub op: SetOperator,
    pub left: SetOperand,
    pub right: SetOperand,
    #[serde(default)]
    pub order_by: Vec<OrderSpec>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl SetOperation {
    pub fn new(op: SetOperator, left: SetOperand, right: SetOperand) -> Self {
        Self {
            op,
            left,
            right,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn of_queries(op: SetOperator, left: QueryAst, right: QueryAst) -> Self {
        Self::new(op, SetOperand::query(left), SetOperand::query(right))
    }

    pub fn leaves(&self) -> Vec<&QueryAst> {
        let mut leaves = self.left.leaves();
        leaves.extend(self.right.leaves());
        leaves
    }
}
