//! Workflow definition types.
//!
//! A definition is the immutable input to a run. It is authored and stored
//! elsewhere (typically by the visual editor) and arrives as camelCase JSON:
//!
//! ```json
//! {
//!   "id": "daily-digest",
//!   "name": "Daily digest",
//!   "nodes": [{ "id": "start", "type": "trigger" }],
//!   "edges": [],
//!   "variables": { "recipient": "me@example.com" },
//!   "settings": { "errorHandling": "retry", "maxRetries": 2, "timeout": 10000 }
//! }
//! ```

use crate::edge::WorkflowEdge;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::WorkflowNode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use weft_core::{NodeId, WorkflowId};

/// What the engine does when a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    /// Record the failure and skip every node in later layers.
    #[default]
    Stop,
    /// Treat the failed node as skipped and keep going.
    Skip,
    /// Re-invoke the node up to `max_retries` more times.
    Retry,
}

impl fmt::Display for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Skip => write!(f, "skip"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Run-wide execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Failure policy.
    #[serde(default)]
    pub error_handling: ErrorHandling,
    /// Extra attempts allowed under [`ErrorHandling::Retry`].
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-node timeout in milliseconds, forwarded to the node executor.
    #[serde(rename = "timeout", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            error_handling: ErrorHandling::default(),
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl WorkflowSettings {
    /// Sets the failure policy.
    #[must_use]
    pub fn with_error_handling(mut self, error_handling: ErrorHandling) -> Self {
        self.error_handling = error_handling;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the per-node timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Returns how many times a node may be invoked in total.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self.error_handling {
            ErrorHandling::Retry => self.max_retries.saturating_add(1),
            ErrorHandling::Stop | ErrorHandling::Skip => 1,
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// The nodes, in declaration order.
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    /// The edges between nodes.
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    /// Workflow-level variables visible to conditions and handlers.
    #[serde(default)]
    pub variables: Map<String, JsonValue>,
    /// Execution settings.
    #[serde(default)]
    pub settings: WorkflowSettings,
}

impl WorkflowDefinition {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new(id: impl Into<WorkflowId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: Map::new(),
            settings: WorkflowSettings::default(),
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: WorkflowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: WorkflowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Sets a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns a node by ID.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| &n.id == node_id)
    }

    /// Returns the edges that end at the given node, in declaration order.
    pub fn incoming_edges<'a>(
        &'a self,
        node_id: &'a NodeId,
    ) -> impl Iterator<Item = &'a WorkflowEdge> + 'a {
        self.edges.iter().filter(move |e| &e.target == node_id)
    }

    /// Checks the definition is a well-formed DAG.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self) -> Result<(), GraphError> {
        WorkflowGraph::plan(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_defaults() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.error_handling, ErrorHandling::Stop);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.timeout_ms, 30_000);
    }

    #[test]
    fn max_attempts_only_grows_under_retry() {
        let settings = WorkflowSettings::default().with_max_retries(2);
        assert_eq!(settings.max_attempts(), 1);
        assert_eq!(
            settings.with_error_handling(ErrorHandling::Skip).max_attempts(),
            1
        );
        assert_eq!(
            settings.with_error_handling(ErrorHandling::Retry).max_attempts(),
            3
        );
    }

    #[test]
    fn max_attempts_saturates() {
        let settings = WorkflowSettings::default()
            .with_error_handling(ErrorHandling::Retry)
            .with_max_retries(u32::MAX);
        assert_eq!(settings.max_attempts(), u32::MAX);
    }

    #[test]
    fn deserializes_editor_json() {
        let workflow: WorkflowDefinition = serde_json::from_value(json!({
            "id": "digest",
            "name": "Daily digest",
            "nodes": [
                { "id": "start", "type": "trigger" },
                { "id": "send", "type": "email", "config": { "to": "me" } }
            ],
            "edges": [{ "id": "e1", "source": "start", "target": "send" }],
            "variables": { "limit": 5 },
            "settings": { "errorHandling": "retry", "maxRetries": 1, "timeout": 500 }
        }))
        .expect("deserialize");

        assert_eq!(workflow.nodes.len(), 2);
        assert_eq!(workflow.edges.len(), 1);
        assert_eq!(workflow.variables["limit"], json!(5));
        assert_eq!(workflow.settings.error_handling, ErrorHandling::Retry);
        assert_eq!(workflow.settings.max_retries, 1);
        assert_eq!(workflow.settings.timeout_ms, 500);
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let workflow: WorkflowDefinition = serde_json::from_value(json!({
            "id": "w",
            "name": "w",
            "settings": { "errorHandling": "skip" }
        }))
        .expect("deserialize");

        assert_eq!(workflow.settings.error_handling, ErrorHandling::Skip);
        assert_eq!(workflow.settings.max_retries, 3);
        assert!(workflow.nodes.is_empty());
    }

    #[test]
    fn incoming_edges_filters_by_target() {
        let workflow = WorkflowDefinition::new("w", "w")
            .with_node(WorkflowNode::new("a", "trigger"))
            .with_node(WorkflowNode::new("b", "noop"))
            .with_node(WorkflowNode::new("c", "noop"))
            .with_edge(WorkflowEdge::new("e1", "a", "c"))
            .with_edge(WorkflowEdge::new("e2", "a", "b"))
            .with_edge(WorkflowEdge::new("e3", "b", "c"));

        let target = NodeId::from("c");
        let ids: Vec<&str> = workflow
            .incoming_edges(&target)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["e1", "e3"]);
    }

    #[test]
    fn validate_rejects_cycles() {
        let workflow = WorkflowDefinition::new("w", "w")
            .with_node(WorkflowNode::new("a", "noop"))
            .with_node(WorkflowNode::new("b", "noop"))
            .with_edge(WorkflowEdge::new("e1", "a", "b"))
            .with_edge(WorkflowEdge::new("e2", "b", "a"));

        assert!(matches!(
            workflow.validate(),
            Err(GraphError::CycleDetected { .. })
        ));
    }
}
