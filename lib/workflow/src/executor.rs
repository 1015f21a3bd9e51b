//! Node execution contract.
//!
//! The engine never interprets a node's `type`. Every invocation goes through
//! a [`NodeExecutor`], which in production is usually a [`NodeRegistry`] that
//! dispatches on the type tag to a [`NodeHandler`].

use crate::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::NodeId;

/// Everything a node executor gets for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct NodeRequest<'a> {
    /// The node being executed.
    pub node_id: &'a NodeId,
    /// The node's type tag.
    pub node_type: &'a str,
    /// The node's configuration.
    pub config: &'a Map<String, JsonValue>,
    /// Upstream outputs keyed by edge handle, plus `_variables`.
    pub inputs: &'a Map<String, JsonValue>,
    /// Snapshot of the run state taken when the attempt started.
    pub context: &'a ExecutionContext,
    /// Per-node timeout the executor is expected to enforce.
    pub timeout_ms: u64,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Trait for node execution.
///
/// Implementations are shared across every concurrent node of a run.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes one attempt of a node and returns its output.
    async fn execute(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError>;
}

#[async_trait]
impl<T: NodeExecutor + ?Sized> NodeExecutor for Arc<T> {
    async fn execute(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        (**self).execute(request).await
    }
}

/// Errors from node execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeExecutionError {
    /// Input validation failed.
    InvalidInput { message: String },
    /// Execution failed.
    ExecutionFailed { message: String },
    /// No handler is registered for the node type.
    UnsupportedNodeType { node_type: String },
    /// External service error.
    ExternalServiceError { service: String, message: String },
    /// The node did not finish within its timeout.
    Timeout { timeout_ms: u64 },
}

impl std::fmt::Display for NodeExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid input: {message}"),
            Self::ExecutionFailed { message } => write!(f, "execution failed: {message}"),
            Self::UnsupportedNodeType { node_type } => {
                write!(f, "unsupported node type: {node_type}")
            }
            Self::ExternalServiceError { service, message } => {
                write!(f, "external service error ({service}): {message}")
            }
            Self::Timeout { timeout_ms } => write!(f, "execution timed out after {timeout_ms}ms"),
        }
    }
}

impl std::error::Error for NodeExecutionError {}

/// Implementation of a single node type.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Runs the node.
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError>;
}

/// Dispatches node execution on the node's type tag.
///
/// Built once at startup; lookups are read-only afterwards.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a node type, replacing any previous one.
    pub fn register(&mut self, node_type: impl Into<String>, handler: impl NodeHandler + 'static) {
        self.handlers.insert(node_type.into(), Arc::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_handler(
        mut self,
        node_type: impl Into<String>,
        handler: impl NodeHandler + 'static,
    ) -> Self {
        self.register(node_type, handler);
        self
    }

    /// Returns true if a handler exists for the node type.
    #[must_use]
    pub fn supports(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// Returns the registered node types in sorted order.
    #[must_use]
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

#[async_trait]
impl NodeExecutor for NodeRegistry {
    async fn execute(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        let handler = self.handlers.get(request.node_type).ok_or_else(|| {
            NodeExecutionError::UnsupportedNodeType {
                node_type: request.node_type.to_string(),
            }
        })?;
        handler.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WorkflowDefinition;
    use crate::node::WorkflowNode;
    use serde_json::json;
    use weft_core::WorkflowRunId;

    struct Constant(JsonValue);

    #[async_trait]
    impl NodeHandler for Constant {
        async fn handle(&self, _request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
            Ok(self.0.clone())
        }
    }

    struct ConfigValue;

    #[async_trait]
    impl NodeHandler for ConfigValue {
        async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
            request
                .config
                .get("value")
                .cloned()
                .ok_or_else(|| NodeExecutionError::InvalidInput {
                    message: "missing `value`".to_string(),
                })
        }
    }

    fn context() -> ExecutionContext {
        let workflow = WorkflowDefinition::new("w", "w").with_node(WorkflowNode::new("a", "x"));
        ExecutionContext::new(WorkflowRunId::new(), &workflow, JsonValue::Null)
    }

    #[tokio::test]
    async fn registry_dispatches_on_type() {
        let registry = NodeRegistry::new()
            .with_handler("constant", Constant(json!(42)))
            .with_handler("config", ConfigValue);
        let context = context();
        let node_id = NodeId::from("a");
        let mut config = Map::new();
        config.insert("value".to_string(), json!("configured"));
        let inputs = Map::new();

        let request = NodeRequest {
            node_id: &node_id,
            node_type: "constant",
            config: &config,
            inputs: &inputs,
            context: &context,
            timeout_ms: 1_000,
            attempt: 1,
        };
        assert_eq!(registry.execute(request).await.unwrap(), json!(42));

        let request = NodeRequest {
            node_type: "config",
            ..request
        };
        assert_eq!(registry.execute(request).await.unwrap(), json!("configured"));
    }

    #[tokio::test]
    async fn unknown_type_is_unsupported() {
        let registry = NodeRegistry::new().with_handler("constant", Constant(json!(1)));
        let context = context();
        let node_id = NodeId::from("a");
        let empty = Map::new();

        let err = registry
            .execute(NodeRequest {
                node_id: &node_id,
                node_type: "llm",
                config: &empty,
                inputs: &empty,
                context: &context,
                timeout_ms: 1_000,
                attempt: 1,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            NodeExecutionError::UnsupportedNodeType {
                node_type: "llm".to_string()
            }
        );
        assert_eq!(err.to_string(), "unsupported node type: llm");
    }

    #[test]
    fn registry_lists_types_sorted() {
        let registry = NodeRegistry::new()
            .with_handler("b", Constant(json!(null)))
            .with_handler("a", Constant(json!(null)));
        assert_eq!(registry.node_types(), vec!["a", "b"]);
        assert!(registry.supports("a"));
        assert!(!registry.supports("c"));
    }

    #[test]
    fn timeout_error_names_the_limit() {
        let err = NodeExecutionError::Timeout { timeout_ms: 250 };
        assert_eq!(err.to_string(), "execution timed out after 250ms");
    }
}
