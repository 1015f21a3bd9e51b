//! Workflow execution engine for weft.
//!
//! This crate runs workflow definitions made of typed nodes and directed
//! edges, including:
//!
//! - **Definition Model**: Nodes, edges, variables and error-handling settings
//! - **Planning**: Cycle detection and dependency layering using petgraph
//! - **Conditions**: A sandboxed expression language for guarded edges
//! - **Execution**: Concurrent layers, retry/skip/stop policies and per-node records
//! - **Events**: Versioned progress events delivered to pluggable sinks

pub mod condition;
pub mod context;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod execution;
pub mod executor;
pub mod graph;
pub mod node;
pub mod retry;

pub use condition::{Condition, conditions_met, evaluate_condition, is_truthy};
pub use context::ExecutionContext;
pub use definition::{ErrorHandling, WorkflowDefinition, WorkflowSettings};
pub use edge::WorkflowEdge;
pub use engine::WorkflowEngine;
pub use envelope::Envelope;
pub use error::{ConditionError, GraphError};
pub use events::{ChannelEventSink, EventSink, ExecutionEvent, NoopEventSink, TracingEventSink};
pub use execution::{ExecutionResult, ExecutionStatus, ExecutionSummary, NodeResult, NodeStatus};
pub use executor::{NodeExecutionError, NodeExecutor, NodeHandler, NodeRegistry, NodeRequest};
pub use graph::{ExecutionPlan, WorkflowGraph};
pub use node::WorkflowNode;
pub use weft_core::{EdgeId, NodeId, WorkflowId, WorkflowRunId};
