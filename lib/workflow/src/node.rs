//! Workflow node types.
//!
//! A node is one unit of work. The engine only cares about three things:
//! - its ID, which must be unique within the workflow
//! - its type tag, which selects a handler in the node executor
//! - its configuration, which is handed to that handler untouched
//!
//! Label and canvas position are carried for the editor and ignored here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use weft_core::NodeId;

/// Canvas coordinates of a node in the visual editor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// A single node in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique identifier within the workflow.
    pub id: NodeId,
    /// Type tag that selects the handler (e.g. `trigger`, `llm`, `http`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Handler-specific configuration.
    #[serde(default)]
    pub config: Map<String, JsonValue>,
    /// Position on the editor canvas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl WorkflowNode {
    /// Creates a node with an empty configuration.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            node_type: node_type.into(),
            config: Map::new(),
            position: None,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets a single configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_defaults_to_id() {
        let node = WorkflowNode::new("summarize", "llm");
        assert_eq!(node.label, "summarize");
        assert!(node.config.is_empty());
    }

    #[test]
    fn deserializes_editor_json() {
        let node: WorkflowNode = serde_json::from_value(json!({
            "id": "fetch",
            "type": "http",
            "label": "Fetch feed",
            "config": { "url": "https://example.com/feed" },
            "position": { "x": 120.0, "y": 40.5 }
        }))
        .expect("deserialize");

        assert_eq!(node.id.as_str(), "fetch");
        assert_eq!(node.node_type, "http");
        assert_eq!(node.config["url"], json!("https://example.com/feed"));
        assert_eq!(node.position, Some(Position { x: 120.0, y: 40.5 }));
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let node: WorkflowNode =
            serde_json::from_value(json!({ "id": "t", "type": "trigger" })).expect("deserialize");
        assert!(node.label.is_empty());
        assert!(node.position.is_none());
    }
}
