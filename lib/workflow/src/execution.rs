//! Execution records produced by a workflow run.
//!
//! - `NodeStatus` tracks each node through a run
//! - `NodeResult` is the terminal record for one node
//! - `ExecutionResult` collects every node's record plus the overall outcome

use crate::definition::ErrorHandling;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use weft_core::{NodeId, WorkflowId, WorkflowRunId};

/// The state of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for its layer.
    Pending,
    /// The node executor has been invoked at least once.
    Running,
    /// Produced an output.
    Success,
    /// Failed and the failure was kept.
    Error,
    /// Never ran, or its failure was downgraded by the skip policy.
    Skipped,
}

impl NodeStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }

    /// Returns whether moving to `next` keeps the status moving forward.
    ///
    /// Allowed: `pending -> running`, `pending -> skipped`, and
    /// `running -> {running, success, error, skipped}`. Terminal states are
    /// final.
    #[must_use]
    pub fn can_transition_to(&self, next: NodeStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Skipped),
            Self::Running => next != Self::Pending,
            Self::Success | Self::Error | Self::Skipped => false,
        }
    }
}

/// The overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every node succeeded.
    Completed,
    /// The run was aborted or halted by the stop policy.
    Failed,
    /// The run finished but some nodes errored or were skipped.
    Partial,
}

/// The terminal record of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    /// The node this record describes.
    pub node_id: NodeId,
    /// Final status; never `pending` or `running`.
    pub status: NodeStatus,
    /// Output produced on success, `null` otherwise.
    pub output: JsonValue,
    /// Failure message, kept even when the skip policy applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the last attempt finished.
    pub completed_at: DateTime<Utc>,
    /// Milliseconds between `started_at` and `completed_at`.
    pub duration: u64,
    /// Number of times the node executor was invoked.
    #[serde(default)]
    pub attempts: u32,
}

impl NodeResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        node_id: NodeId,
        output: JsonValue,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id,
            status: NodeStatus::Success,
            output,
            error: None,
            started_at,
            completed_at,
            duration: millis_between(started_at, completed_at),
            attempts: 1,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn error(
        node_id: NodeId,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id,
            status: NodeStatus::Error,
            output: JsonValue::Null,
            error: Some(message.into()),
            started_at,
            completed_at,
            duration: millis_between(started_at, completed_at),
            attempts: 1,
        }
    }

    /// Creates a result for a node that never ran.
    #[must_use]
    pub fn skipped(node_id: NodeId) -> Self {
        let now = Utc::now();
        Self {
            node_id,
            status: NodeStatus::Skipped,
            output: JsonValue::Null,
            error: None,
            started_at: now,
            completed_at: now,
            duration: 0,
            attempts: 0,
        }
    }

    /// Moves the start of this record back to an earlier attempt.
    pub fn extend_from(&mut self, started_at: DateTime<Utc>) {
        self.started_at = started_at;
        self.duration = millis_between(started_at, self.completed_at);
    }
}

/// Per-status counts for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Nodes that succeeded.
    pub succeeded: usize,
    /// Nodes that errored.
    pub failed: usize,
    /// Nodes that were skipped.
    pub skipped: usize,
}

/// The complete record of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Identifier of this run, shared by all of its progress events.
    pub run_id: WorkflowRunId,
    /// The workflow that was run.
    pub workflow_id: WorkflowId,
    /// Overall outcome.
    pub status: ExecutionStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub completed_at: DateTime<Utc>,
    /// One record per declared node.
    pub node_results: BTreeMap<NodeId, NodeResult>,
    /// Run-level failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Creates the result of a run rejected before any node executed.
    #[must_use]
    pub fn aborted(
        run_id: WorkflowRunId,
        workflow_id: WorkflowId,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            workflow_id,
            status: ExecutionStatus::Failed,
            started_at,
            completed_at: Utc::now(),
            node_results: BTreeMap::new(),
            error: Some(error.into()),
        }
    }

    /// Returns the record for a node.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&NodeResult> {
        self.node_results.get(node_id)
    }

    /// Returns the status of a node.
    #[must_use]
    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node(node_id).map(|r| r.status)
    }

    /// Returns true if every node succeeded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Returns the node records ordered by start time, then node ID.
    #[must_use]
    pub fn timeline(&self) -> Vec<&NodeResult> {
        let mut records: Vec<&NodeResult> = self.node_results.values().collect();
        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        records
    }

    /// Counts node records by status.
    #[must_use]
    pub fn summary(&self) -> ExecutionSummary {
        self.node_results
            .values()
            .fold(ExecutionSummary::default(), |mut summary, record| {
                match record.status {
                    NodeStatus::Success => summary.succeeded += 1,
                    NodeStatus::Error => summary.failed += 1,
                    NodeStatus::Skipped => summary.skipped += 1,
                    NodeStatus::Pending | NodeStatus::Running => {}
                }
                summary
            })
    }

    /// Returns the wall-clock duration of the run in milliseconds.
    #[must_use]
    pub fn duration(&self) -> u64 {
        millis_between(self.started_at, self.completed_at)
    }
}

/// Derives the overall status of a finished run.
///
/// A run fails outright when orchestration broke down or when a node errored
/// under the stop policy. Otherwise any error or skip makes it partial.
#[must_use]
pub fn derive_status<'a>(
    results: impl IntoIterator<Item = &'a NodeResult>,
    error_handling: ErrorHandling,
    orchestration_failed: bool,
) -> ExecutionStatus {
    if orchestration_failed {
        return ExecutionStatus::Failed;
    }

    let mut errored = false;
    let mut skipped = false;
    for result in results {
        match result.status {
            NodeStatus::Error => errored = true,
            NodeStatus::Skipped => skipped = true,
            NodeStatus::Pending | NodeStatus::Running | NodeStatus::Success => {}
        }
    }

    if errored && error_handling == ErrorHandling::Stop {
        ExecutionStatus::Failed
    } else if errored || skipped {
        ExecutionStatus::Partial
    } else {
        ExecutionStatus::Completed
    }
}

fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
