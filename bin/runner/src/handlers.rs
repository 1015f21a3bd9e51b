//! Built-in node handlers.
//!
//! A small set of node types for trying workflows out locally:
//!
//! | Type | Output |
//! |---|---|
//! | `trigger` | The run's trigger payload |
//! | `constant` | `config.value` |
//! | `passthrough` | The node's inputs, without `_variables` |
//! | `delay` | Waits `config.ms`, bounded by the node timeout |
//! | `fail` | Always fails with `config.message` |

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use weft_workflow::context::{TRIGGER_VARIABLE, VARIABLES_INPUT_KEY};
use weft_workflow::{NodeExecutionError, NodeHandler, NodeRegistry, NodeRequest};

/// Returns a registry with every built-in handler.
#[must_use]
pub fn builtin_registry() -> NodeRegistry {
    NodeRegistry::new()
        .with_handler("trigger", TriggerHandler)
        .with_handler("constant", ConstantHandler)
        .with_handler("passthrough", PassthroughHandler)
        .with_handler("delay", DelayHandler)
        .with_handler("fail", FailHandler)
}

/// Emits the trigger payload.
pub struct TriggerHandler;

#[async_trait]
impl NodeHandler for TriggerHandler {
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        Ok(request
            .context
            .variables
            .get(TRIGGER_VARIABLE)
            .cloned()
            .unwrap_or(JsonValue::Null))
    }
}

/// Emits a configured value.
pub struct ConstantHandler;

#[async_trait]
impl NodeHandler for ConstantHandler {
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        request
            .config
            .get("value")
            .cloned()
            .ok_or_else(|| NodeExecutionError::InvalidInput {
                message: "constant node requires `value` in its config".to_string(),
            })
    }
}

/// Forwards upstream outputs.
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        let mut inputs = request.inputs.clone();
        inputs.remove(VARIABLES_INPUT_KEY);
        Ok(JsonValue::Object(inputs))
    }
}

/// Sleeps, failing if the node timeout elapses first.
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        let ms = request
            .config
            .get("ms")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| NodeExecutionError::InvalidInput {
                message: "delay node requires a non-negative integer `ms`".to_string(),
            })?;

        tokio::time::timeout(
            Duration::from_millis(request.timeout_ms),
            tokio::time::sleep(Duration::from_millis(ms)),
        )
        .await
        .map_err(|_| NodeExecutionError::Timeout {
            timeout_ms: request.timeout_ms,
        })?;

        Ok(json!({ "waitedMs": ms }))
    }
}

/// Always fails.
pub struct FailHandler;

#[async_trait]
impl NodeHandler for FailHandler {
    async fn handle(&self, request: NodeRequest<'_>) -> Result<JsonValue, NodeExecutionError> {
        let message = request
            .config
            .get("message")
            .and_then(JsonValue::as_str)
            .unwrap_or("node configured to fail");
        Err(NodeExecutionError::ExecutionFailed {
            message: message.to_string(),
        })
    }
}
