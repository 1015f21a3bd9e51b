//! Per-run mutable state.
//!
//! One `ExecutionContext` exists per call to
//! [`WorkflowEngine::execute_workflow`](crate::engine::WorkflowEngine::execute_workflow)
//! and is dropped when the call returns. Concurrent tasks in a layer only
//! write to their own node's entries.

use crate::definition::WorkflowDefinition;
use crate::execution::NodeStatus;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use weft_core::{NodeId, WorkflowId, WorkflowRunId};

/// Key under which the run's variables are added to every node's inputs.
pub const VARIABLES_INPUT_KEY: &str = "_variables";

/// Name of the variable that carries the trigger payload.
pub const TRIGGER_VARIABLE: &str = "trigger";

/// The mutable state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// The run this context belongs to.
    pub run_id: WorkflowRunId,
    /// The workflow being run.
    pub workflow_id: WorkflowId,
    /// Outputs of nodes that succeeded.
    pub node_outputs: HashMap<NodeId, JsonValue>,
    /// Workflow variables plus `trigger`; always a JSON object.
    pub variables: JsonValue,
    /// Last failure message per node.
    pub errors: HashMap<NodeId, String>,
    /// Current status per node.
    pub status: HashMap<NodeId, NodeStatus>,
}

impl ExecutionContext {
    /// Creates the context for a new run with every node pending.
    #[must_use]
    pub fn new(run_id: WorkflowRunId, workflow: &WorkflowDefinition, trigger: JsonValue) -> Self {
        let mut variables = workflow.variables.clone();
        variables.insert(TRIGGER_VARIABLE.to_string(), trigger);

        Self {
            run_id,
            workflow_id: workflow.id.clone(),
            node_outputs: HashMap::new(),
            variables: JsonValue::Object(variables),
            errors: HashMap::new(),
            status: workflow
                .nodes
                .iter()
                .map(|node| (node.id.clone(), NodeStatus::Pending))
                .collect(),
        }
    }

    /// Returns the current status of a node.
    #[must_use]
    pub fn status_of(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.status.get(node_id).copied()
    }

    /// Moves a node to a new status if the move goes forward.
    ///
    /// Returns false and leaves the status untouched otherwise.
    pub fn transition(&mut self, node_id: &NodeId, next: NodeStatus) -> bool {
        let Some(current) = self.status.get_mut(node_id) else {
            return false;
        };
        if !current.can_transition_to(next) {
            tracing::warn!(
                node = %node_id,
                from = ?current,
                to = ?next,
                "ignoring backward status transition"
            );
            return false;
        }
        *current = next;
        true
    }

    /// Stores a node's output.
    pub fn record_output(&mut self, node_id: &NodeId, output: JsonValue) {
        self.node_outputs.insert(node_id.clone(), output);
    }

    /// Stores a node's failure message.
    pub fn record_error(&mut self, node_id: &NodeId, message: impl Into<String>) {
        self.errors.insert(node_id.clone(), message.into());
    }

    /// Collects the inputs for a node from its upstream outputs.
    ///
    /// Each incoming edge contributes its source's output under the edge's
    /// input key, when the source produced one. The run's variables are
    /// always present under [`VARIABLES_INPUT_KEY`].
    #[must_use]
    pub fn gather_inputs(
        &self,
        workflow: &WorkflowDefinition,
        node_id: &NodeId,
    ) -> Map<String, JsonValue> {
        let mut inputs = Map::new();
        for edge in workflow.incoming_edges(node_id) {
            if let Some(output) = self.node_outputs.get(&edge.source) {
                inputs.insert(edge.input_key().to_string(), output.clone());
            }
        }
        inputs.insert(VARIABLES_INPUT_KEY.to_string(), self.variables.clone());
        inputs
    }
}
