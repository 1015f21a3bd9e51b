//! Edge types for workflow graphs.
//!
//! An edge is a directed dependency from a source node to a target node. It
//! carries the source's output into the target's inputs, optionally under a
//! named handle, and may guard the target with a condition expression.

use serde::{Deserialize, Serialize};
use weft_core::{EdgeId, NodeId};

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    /// Unique identifier within the workflow.
    pub id: EdgeId,
    /// The upstream node.
    pub source: NodeId,
    /// The downstream node.
    pub target: NodeId,
    /// Key under which the source's output appears in the target's inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Guard expression evaluated against the source's output and variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowEdge {
    /// Creates an unconditional edge using the source ID as input key.
    #[must_use]
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            condition: None,
        }
    }

    /// Sets the source handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Sets the guard condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Returns the key the source output is delivered under.
    #[must_use]
    pub fn input_key(&self) -> &str {
        self.source_handle
            .as_deref()
            .unwrap_or_else(|| self.source.as_str())
    }

    /// Returns the condition if it has any non-whitespace content.
    #[must_use]
    pub fn guard(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_key_defaults_to_source() {
        let edge = WorkflowEdge::new("e1", "fetch", "summarize");
        assert_eq!(edge.input_key(), "fetch");
    }

    #[test]
    fn input_key_prefers_handle() {
        let edge = WorkflowEdge::new("e1", "fetch", "summarize").with_handle("articles");
        assert_eq!(edge.input_key(), "articles");
    }

    #[test]
    fn blank_conditions_are_not_guards() {
        let edge = WorkflowEdge::new("e1", "a", "b").with_condition("   ");
        assert_eq!(edge.guard(), None);

        let edge = WorkflowEdge::new("e1", "a", "b").with_condition(" output.ok ");
        assert_eq!(edge.guard(), Some("output.ok"));
    }

    #[test]
    fn deserializes_camel_case_fields() {
        let edge: WorkflowEdge = serde_json::from_value(json!({
            "id": "e1",
            "source": "classify",
            "target": "notify",
            "sourceHandle": "label",
            "condition": "output == 'urgent'"
        }))
        .expect("deserialize");

        assert_eq!(edge.source_handle.as_deref(), Some("label"));
        assert_eq!(edge.guard(), Some("output == 'urgent'"));
    }
}
