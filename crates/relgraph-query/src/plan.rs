//! Logical plan.
//!
//! A small operator tree recording which relational operations a compiled
//! query must contain. It carries no SQL text; the emitter checks the
//! optional clauses it was handed against this tree before producing output.

use crate::ast::{SetOperator, VectorMetric};
use std::fmt;

/// Logical operator tree for one compilation.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalPlan {
    pub root: PlanNode,
}

impl LogicalPlan {
    pub fn new(root: PlanNode) -> Self {
        Self { root }
    }

    /// First node (pre-order) whose operator satisfies `predicate`.
    pub fn find(&self, predicate: impl Fn(&LogicalOp) -> bool) -> Option<&PlanNode> {
        self.root.find(&predicate)
    }

    pub fn contains(&self, predicate: impl Fn(&LogicalOp) -> bool) -> bool {
        self.find(predicate).is_some()
    }

    pub fn has_sort(&self) -> bool {
        self.top_level(|op| matches!(op, LogicalOp::Sort { .. }))
    }

    pub fn has_limit_offset(&self) -> bool {
        self.top_level(|op| matches!(op, LogicalOp::LimitOffset { .. }))
    }

    pub fn has_group_by(&self) -> bool {
        self.top_level(|op| matches!(op, LogicalOp::Aggregate { group_keys, .. } if *group_keys > 0))
    }

    pub fn has_having(&self) -> bool {
        self.top_level(|op| matches!(op, LogicalOp::Aggregate { having: true, .. }))
    }

    /// Operators above the row source of the outermost statement. Nested
    /// plans (set-operation branches) keep their clauses to themselves.
    fn top_level(&self, predicate: impl Fn(&LogicalOp) -> bool) -> bool {
        let mut node = &self.root;
        loop {
            if predicate(&node.op) {
                return true;
            }
            match (&node.op, node.inputs.as_slice()) {
                (
                    LogicalOp::Project { .. }
                    | LogicalOp::LimitOffset { .. }
                    | LogicalOp::Sort { .. }
                    | LogicalOp::Aggregate { .. },
                    [input],
                ) => node = input,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_indented(f, 0)
    }
}

/// Node within the plan tree.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    pub op: LogicalOp,
    pub inputs: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(op: LogicalOp) -> Self {
        Self {
            op,
            inputs: Vec::new(),
        }
    }

    pub fn with_inputs(op: LogicalOp, inputs: Vec<PlanNode>) -> Self {
        Self { op, inputs }
    }

    /// Wrap `self` as the single input of `op`.
    pub fn then(self, op: LogicalOp) -> Self {
        Self::with_inputs(op, vec![self])
    }

    fn find(&self, predicate: &dyn Fn(&LogicalOp) -> bool) -> Option<&PlanNode> {
        if predicate(&self.op) {
            return Some(self);
        }
        self.inputs.iter().find_map(|input| input.find(predicate))
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.op, indent = depth * 2)?;
        for input in &self.inputs {
            input.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanSource {
    Nodes,
    Edges,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Logical operators.
#[derive(Clone, Debug, PartialEq)]
pub enum LogicalOp {
    /// Rows of one table bound to an alias
    Scan { alias: String, source: ScanSource },
    /// Predicates applied to the input
    Filter { alias: String, predicates: usize },
    /// Join of the traversal (right input) onto the rows it starts from
    Join { alias: String, kind: JoinKind },
    /// Grouping and aggregation
    Aggregate {
        group_keys: usize,
        aggregates: usize,
        having: bool,
    },
    Sort { keys: usize },
    LimitOffset {
        limit: Option<u64>,
        offset: Option<u64>,
    },
    /// Nearest-neighbour restriction on one alias
    VectorKnn {
        alias: String,
        metric: VectorMetric,
        k: u64,
    },
    /// Variable-length expansion from the input rows
    RecursiveExpand {
        alias: String,
        min_depth: u32,
        max_depth: u32,
        cycle_check: bool,
    },
    SetOp { op: SetOperator },
    /// Output columns; `None` projects every column of every alias
    Project { columns: Option<usize> },
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::Scan { alias, source } => write!(f, "Scan {} ({:?})", alias, source),
            LogicalOp::Filter { alias, predicates } => {
                write!(f, "Filter {} [{} predicate(s)]", alias, predicates)
            }
            LogicalOp::Join { alias, kind } => write!(f, "Join {} ({:?})", alias, kind),
            LogicalOp::Aggregate {
                group_keys,
                aggregates,
                having,
            } => write!(
                f,
                "Aggregate keys={} aggregates={} having={}",
                group_keys, aggregates, having
            ),
            LogicalOp::Sort { keys } => write!(f, "Sort keys={}", keys),
            LogicalOp::LimitOffset { limit, offset } => {
                write!(f, "LimitOffset limit={:?} offset={:?}", limit, offset)
            }
            LogicalOp::VectorKnn { alias, metric, k } => {
                write!(f, "VectorKnn {} {} k={}", alias, metric.name(), k)
            }
            LogicalOp::RecursiveExpand {
                alias,
                min_depth,
                max_depth,
                cycle_check,
            } => write!(
                f,
                "RecursiveExpand {} depth={}..={} cycle_check={}",
                alias, min_depth, max_depth, cycle_check
            ),
            LogicalOp::SetOp { op } => write!(f, "SetOp {}", op.sql()),
            LogicalOp::Project { columns: Some(n) } => write!(f, "Project {} column(s)", n),
            LogicalOp::Project { columns: None } => f.write_str("Project *"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(alias: &str) -> PlanNode {
        PlanNode::new(LogicalOp::Scan {
            alias: alias.to_string(),
            source: ScanSource::Nodes,
        })
    }

    #[test]
    fn test_top_level_clause_detection() {
        let plan = LogicalPlan::new(
            scan("p")
                .then(LogicalOp::Sort { keys: 1 })
                .then(LogicalOp::LimitOffset {
                    limit: Some(10),
                    offset: None,
                })
                .then(LogicalOp::Project { columns: None }),
        );

        assert!(plan.has_sort());
        assert!(plan.has_limit_offset());
        assert!(!plan.has_group_by());
        assert!(!plan.has_having());
    }

    #[test]
    fn test_nested_branch_clauses_are_not_top_level() {
        let branch = scan("a").then(LogicalOp::Sort { keys: 1 });
        let plan = LogicalPlan::new(PlanNode::with_inputs(
            LogicalOp::SetOp {
                op: SetOperator::Union,
            },
            vec![branch, scan("b")],
        ));

        assert!(!plan.has_sort());
        assert!(plan.contains(|op| matches!(op, LogicalOp::Sort { .. })));
    }

    #[test]
    fn test_aggregate_without_keys_has_no_group_by() {
        let plan = LogicalPlan::new(scan("p").then(LogicalOp::Aggregate {
            group_keys: 0,
            aggregates: 1,
            having: false,
        }));

        assert!(!plan.has_group_by());
    }

    #[test]
    fn test_display_is_indented_tree() {
        let plan = LogicalPlan::new(scan("p").then(LogicalOp::Project { columns: Some(2) }));
        assert_eq!(plan.to_string(), "Project 2 column(s)\n  Scan p (Nodes)\n");
    }
}
