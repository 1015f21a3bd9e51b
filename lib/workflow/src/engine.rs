//! Layer-by-layer workflow execution.
//!
//! The engine runs one workflow definition at a time:
//! 1. Plan the graph into dependency layers (structural errors abort the run)
//! 2. Run every eligible node of a layer concurrently and wait for all of them
//! 3. Apply the error policy between layers
//! 4. Collect one record per declared node into an [`ExecutionResult`]
//!
//! Progress is reported through an [`EventSink`] as it happens.

use crate::condition::conditions_met;
use crate::context::ExecutionContext;
use crate::definition::{ErrorHandling, WorkflowDefinition};
use crate::envelope::Envelope;
use crate::events::{EventSink, ExecutionEvent, NoopEventSink};
use crate::execution::{ExecutionResult, NodeResult, NodeStatus, derive_status};
use crate::executor::{NodeExecutor, NodeRequest};
use crate::graph::WorkflowGraph;
use crate::node::WorkflowNode;
use crate::retry::execute_with_retry;
use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use serde_json::{Map, Value as JsonValue};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use weft_core::{NodeId, WorkflowRunId};

/// Executes workflow definitions.
///
/// The engine holds no per-run state, so one instance can serve any number
/// of concurrent runs.
pub struct WorkflowEngine<E: NodeExecutor, S: EventSink = NoopEventSink> {
    executor: E,
    events: S,
}

impl<E: NodeExecutor> WorkflowEngine<E> {
    /// Creates an engine that discards progress events.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            events: NoopEventSink,
        }
    }
}

impl<E: NodeExecutor, S: EventSink> WorkflowEngine<E, S> {
    /// Replaces the event sink.
    pub fn with_events<T: EventSink>(self, events: T) -> WorkflowEngine<E, T> {
        WorkflowEngine {
            executor: self.executor,
            events,
        }
    }

    /// Returns the node executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs a workflow to completion.
    ///
    /// Never fails: structural problems, node failures and panicking node
    /// tasks are all reported through the returned result.
    #[tracing::instrument(skip_all, fields(workflow = %workflow.id, run = tracing::field::Empty))]
    pub async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        trigger: JsonValue,
    ) -> ExecutionResult {
        let run_id = WorkflowRunId::new();
        tracing::Span::current().record("run", tracing::field::display(run_id));
        let started_at = Utc::now();

        let plan = match WorkflowGraph::plan(workflow) {
            Ok(plan) => plan,
            Err(error) => {
                tracing::error!(%error, "workflow rejected before execution");
                let result = ExecutionResult::aborted(
                    run_id,
                    workflow.id.clone(),
                    started_at,
                    error.to_string(),
                );
                self.emit(
                    run_id,
                    ExecutionEvent::WorkflowComplete {
                        result: Box::new(result.clone()),
                    },
                )
                .await;
                return result;
            }
        };

        tracing::info!(
            nodes = workflow.nodes.len(),
            layers = plan.depth(),
            error_handling = %workflow.settings.error_handling,
            "workflow run started"
        );

        let run = Run {
            engine: self,
            workflow,
            run_id,
            context: Mutex::new(ExecutionContext::new(run_id, workflow, trigger)),
        };

        let mut results: BTreeMap<NodeId, NodeResult> = BTreeMap::new();
        let mut halted_by: Option<String> = None;
        let mut orchestration_error: Option<String> = None;

        for (depth, layer) in plan.layers.iter().enumerate() {
            if halted_by.is_some() || orchestration_error.is_some() {
                tracing::debug!(depth, nodes = layer.len(), "skipping layer after failure");
                for node_id in layer {
                    results.insert(node_id.clone(), run.skip(node_id));
                }
                continue;
            }

            tracing::debug!(depth, nodes = layer.len(), "starting layer");
            let outcomes = join_all(
                layer
                    .iter()
                    .map(|node_id| AssertUnwindSafe(run.execute_node(node_id)).catch_unwind()),
            )
            .await;

            for (node_id, outcome) in layer.iter().zip(outcomes) {
                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        tracing::error!(node = %node_id, panic = %message, "node task panicked");
                        orchestration_error
                            .get_or_insert_with(|| format!("node {node_id} panicked: {message}"));
                        let result = run.abandon(node_id, message);
                        self.emit(
                            run_id,
                            ExecutionEvent::NodeError {
                                result: result.clone(),
                            },
                        )
                        .await;
                        result
                    }
                };

                if result.status == NodeStatus::Error
                    && workflow.settings.error_handling == ErrorHandling::Stop
                    && halted_by.is_none()
                {
                    halted_by = Some(format!(
                        "node {node_id} failed: {}",
                        result.error.as_deref().unwrap_or_default()
                    ));
                }
                results.insert(node_id.clone(), result);
            }
        }

        for node in &workflow.nodes {
            if !results.contains_key(&node.id) {
                results.insert(node.id.clone(), run.skip(&node.id));
            }
        }

        let status = derive_status(
            results.values(),
            workflow.settings.error_handling,
            orchestration_error.is_some(),
        );
        let result = ExecutionResult {
            run_id,
            workflow_id: workflow.id.clone(),
            status,
            started_at,
            completed_at: Utc::now(),
            node_results: results,
            error: orchestration_error.or(halted_by),
        };

        let summary = result.summary();
        tracing::info!(
            status = ?result.status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = result.duration(),
            "workflow run finished"
        );

        self.emit(
            run_id,
            ExecutionEvent::WorkflowComplete {
                result: Box::new(result.clone()),
            },
        )
        .await;
        result
    }

    async fn emit(&self, run_id: WorkflowRunId, event: ExecutionEvent) {
        let kind = event.kind();
        if let Err(error) = self.events.emit(Envelope::new(run_id, event)).await {
            tracing::warn!(%error, event = kind, "failed to deliver progress event");
        }
    }
}

/// State shared by the node tasks of one run.
struct Run<'a, E: NodeExecutor, S: EventSink> {
    engine: &'a WorkflowEngine<E, S>,
    workflow: &'a WorkflowDefinition,
    run_id: WorkflowRunId,
    context: Mutex<ExecutionContext>,
}

impl<E: NodeExecutor, S: EventSink> Run<'_, E, S> {
    fn context(&self) -> MutexGuard<'_, ExecutionContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluates a node's conditions and runs it under the retry policy.
    async fn execute_node(&self, node_id: &NodeId) -> NodeResult {
        let Some(node) = self.workflow.node(node_id) else {
            return self.skip(node_id);
        };

        let eligible = {
            let context = self.context();
            conditions_met(
                self.workflow.incoming_edges(node_id),
                &context.node_outputs,
                &context.variables,
            )
        };
        if !eligible {
            tracing::debug!(node = %node_id, "conditions not met, skipping node");
            return self.skip(node_id);
        }

        let inputs = {
            let mut context = self.context();
            context.transition(node_id, NodeStatus::Running);
            context.gather_inputs(self.workflow, node_id)
        };

        let inputs = &inputs;
        let result = execute_with_retry(node_id, &self.workflow.settings, move |attempt| {
            self.attempt(node, inputs, attempt)
        })
        .await;

        self.context().transition(node_id, result.status);
        result
    }

    /// Invokes the node executor once and records the outcome.
    async fn attempt(
        &self,
        node: &WorkflowNode,
        inputs: &Map<String, JsonValue>,
        attempt: u32,
    ) -> NodeResult {
        let snapshot = self.context().clone();

        self.engine
            .emit(
                self.run_id,
                ExecutionEvent::NodeStart {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                },
            )
            .await;

        let started_at = Utc::now();
        let outcome = self
            .engine
            .executor
            .execute(NodeRequest {
                node_id: &node.id,
                node_type: &node.node_type,
                config: &node.config,
                inputs,
                context: &snapshot,
                timeout_ms: self.workflow.settings.timeout_ms,
                attempt,
            })
            .await;
        let completed_at = Utc::now();

        let mut result = match outcome {
            Ok(output) => {
                {
                    let mut context = self.context();
                    context.record_output(&node.id, output.clone());
                    context.transition(&node.id, NodeStatus::Success);
                }
                NodeResult::success(node.id.clone(), output, started_at, completed_at)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!(node = %node.id, attempt, error = %message, "node attempt failed");
                self.context().record_error(&node.id, message.clone());
                NodeResult::error(node.id.clone(), message, started_at, completed_at)
            }
        };
        result.attempts = attempt;

        let event = if result.status == NodeStatus::Success {
            ExecutionEvent::NodeComplete {
                result: result.clone(),
            }
        } else {
            ExecutionEvent::NodeError {
                result: result.clone(),
            }
        };
        self.engine.emit(self.run_id, event).await;
        result
    }

    /// Records a node that will not run.
    fn skip(&self, node_id: &NodeId) -> NodeResult {
        self.context().transition(node_id, NodeStatus::Skipped);
        NodeResult::skipped(node_id.clone())
    }

    /// Records a node whose task panicked.
    fn abandon(&self, node_id: &NodeId, message: String) -> NodeResult {
        let now = Utc::now();
        let mut context = self.context();
        context.record_error(node_id, message.clone());
        context.transition(node_id, NodeStatus::Error);
        NodeResult::error(node_id.clone(), message, now, now)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "node task panicked".to_string()
    }
}
