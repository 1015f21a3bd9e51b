//! Error types for the workflow crate.
//!
//! - `GraphError`: structural problems found before any node runs
//! - `ConditionError`: an edge condition that could not be evaluated
//!
//! Node execution failures (`NodeExecutionError`) live next to the executor
//! trait in [`crate::executor`] because they are part of that contract.

use std::fmt;
use weft_core::{EdgeId, NodeId};

/// Structural errors in a workflow graph.
///
/// Any of these aborts a run before a single node is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share the same ID.
    DuplicateNode { node_id: NodeId },
    /// An edge references a node that is not declared in the workflow.
    UnknownNode { edge_id: EdgeId, node_id: NodeId },
    /// The graph contains at least one cycle.
    ///
    /// `unresolved` lists the nodes that never reached zero in-degree, in
    /// declaration order.
    CycleDetected { unresolved: Vec<NodeId> },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => {
                write!(f, "duplicate node id: {node_id}")
            }
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "edge {edge_id} references unknown node {node_id}")
            }
            Self::CycleDetected { unresolved } => {
                let names: Vec<&str> = unresolved.iter().map(NodeId::as_str).collect();
                write!(f, "workflow contains cycles (involving: {})", names.join(", "))
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors raised while parsing or evaluating an edge condition.
///
/// The engine never surfaces these as run failures: a condition that errors
/// is treated as unsatisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The expression text is not valid.
    Syntax { position: usize, message: String },
    /// The expression names something other than the available roots.
    UnknownIdentifier { name: String },
    /// An operator was applied to values it does not support.
    Type { message: String },
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax { position, message } => {
                write!(f, "syntax error at {position}: {message}")
            }
            Self::UnknownIdentifier { name } => write!(f, "unknown identifier '{name}'"),
            Self::Type { message } => write!(f, "type error: {message}"),
        }
    }
}

impl std::error::Error for ConditionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_unresolved_nodes() {
        let err = GraphError::CycleDetected {
            unresolved: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert_eq!(err.to_string(), "workflow contains cycles (involving: a, b)");
    }

    #[test]
    fn unknown_node_display() {
        let err = GraphError::UnknownNode {
            edge_id: EdgeId::from("e1"),
            node_id: NodeId::from("ghost"),
        };
        assert!(err.to_string().contains("edge e1"));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn condition_error_display() {
        let err = ConditionError::Syntax {
            position: 4,
            message: "unexpected ')'".to_string(),
        };
        assert_eq!(err.to_string(), "syntax error at 4: unexpected ')'");
    }
}
