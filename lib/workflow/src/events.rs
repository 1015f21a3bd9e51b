//! Progress events and the observers that receive them.
//!
//! Events are the only way to watch a run while it is in flight. The engine
//! hands each one to an [`EventSink`]; a sink that fails is logged and
//! otherwise ignored, so observers can never change the outcome of a run.

use crate::envelope::Envelope;
use crate::execution::{ExecutionResult, NodeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use weft_core::NodeId;

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A node attempt is about to invoke the node executor.
    NodeStart {
        /// The node starting.
        #[serde(rename = "nodeId")]
        node_id: NodeId,
        /// Its type tag.
        #[serde(rename = "nodeType")]
        node_type: String,
    },
    /// A node attempt succeeded.
    NodeComplete {
        /// The attempt's record.
        result: NodeResult,
    },
    /// A node attempt failed.
    NodeError {
        /// The attempt's record.
        result: NodeResult,
    },
    /// The run finished.
    WorkflowComplete {
        /// The final record.
        result: Box<ExecutionResult>,
    },
}

impl ExecutionEvent {
    /// Returns the node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStart { node_id, .. } => Some(node_id),
            Self::NodeComplete { result } | Self::NodeError { result } => Some(&result.node_id),
            Self::WorkflowComplete { .. } => None,
        }
    }

    /// Returns the event's wire name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeStart { .. } => "node_start",
            Self::NodeComplete { .. } => "node_complete",
            Self::NodeError { .. } => "node_error",
            Self::WorkflowComplete { .. } => "workflow_complete",
        }
    }
}

/// Errors from delivering an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSinkError {
    /// The receiving side has gone away.
    Closed,
}

impl std::fmt::Display for EventSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "event receiver closed"),
        }
    }
}

impl std::error::Error for EventSinkError {}

/// Observer of progress events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: Envelope<ExecutionEvent>) -> Result<(), EventSinkError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn emit(&self, event: Envelope<ExecutionEvent>) -> Result<(), EventSinkError> {
        (**self).emit(event).await
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: Envelope<ExecutionEvent>) -> Result<(), EventSinkError> {
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<Envelope<ExecutionEvent>>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope<ExecutionEvent>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: Envelope<ExecutionEvent>) -> Result<(), EventSinkError> {
        self.sender.send(event).map_err(|_| EventSinkError::Closed)
    }
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Envelope<ExecutionEvent>) -> Result<(), EventSinkError> {
        let run = event.run_id;
        match &event.payload {
            ExecutionEvent::NodeStart { node_id, node_type } => {
                tracing::info!(%run, node = %node_id, node_type = node_type.as_str(), "node started");
            }
            ExecutionEvent::NodeComplete { result } => {
                tracing::info!(
                    %run,
                    node = %result.node_id,
                    duration_ms = result.duration,
                    "node completed"
                );
            }
            ExecutionEvent::NodeError { result } => {
                tracing::warn!(
                    %run,
                    node = %result.node_id,
                    error = result.error.as_deref().unwrap_or_default(),
                    "node failed"
                );
            }
            ExecutionEvent::WorkflowComplete { result } => {
                tracing::info!(
                    %run,
                    workflow = %result.workflow_id,
                    status = ?result.status,
                    duration_ms = result.duration(),
                    "workflow completed"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::WorkflowRunId;

    fn start(node: &str) -> ExecutionEvent {
        ExecutionEvent::NodeStart {
            node_id: NodeId::from(node),
            node_type: "llm".to_string(),
        }
    }

    #[test]
    fn events_serialize_with_wire_names() {
        let json = serde_json::to_value(start("summarize")).expect("serialize");
        assert_eq!(
            json,
            json!({ "type": "node_start", "nodeId": "summarize", "nodeType": "llm" })
        );
        assert_eq!(start("x").kind(), "node_start");
    }

    #[test]
    fn node_id_is_exposed_for_node_events() {
        let result = NodeResult::skipped(NodeId::from("a"));
        let event = ExecutionEvent::NodeError { result };
        assert_eq!(event.node_id().map(NodeId::as_str), Some("a"));
        assert_eq!(event.kind(), "node_error");
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (sink, mut receiver) = ChannelEventSink::new();
        let run_id = WorkflowRunId::new();

        sink.emit(Envelope::new(run_id, start("a"))).await.unwrap();

        let received = receiver.recv().await.expect("event");
        assert_eq!(received.run_id, run_id);
        assert_eq!(received.payload, start("a"));
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (sink, receiver) = ChannelEventSink::new();
        drop(receiver);

        let err = sink
            .emit(Envelope::new(WorkflowRunId::new(), start("a")))
            .await
            .unwrap_err();
        assert_eq!(err, EventSinkError::Closed);
    }

    #[tokio::test]
    async fn shared_sinks_delegate() {
        let sink: Arc<dyn EventSink> = Arc::new(NoopEventSink);
        assert!(
            sink.emit(Envelope::new(WorkflowRunId::new(), start("a")))
                .await
                .is_ok()
        );
    }
}
