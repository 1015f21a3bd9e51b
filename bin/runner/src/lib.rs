//! Command-line host for the weft workflow engine.
//!
//! Loads a workflow definition from JSON, runs it against the built-in
//! handlers and renders the execution result.

pub mod config;
pub mod error;
pub mod handlers;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use clap::Parser;
use serde_json::{Value as JsonValue, json};
use std::path::{Path, PathBuf};
use weft_core::Result;
use weft_workflow::{
    ExecutionResult, ExecutionStatus, TracingEventSink, WorkflowDefinition, WorkflowEngine,
    WorkflowGraph, WorkflowSettings,
};

/// Run a weft workflow definition.
#[derive(Debug, Clone, Parser)]
#[command(name = "weft-runner", version, about)]
pub struct Cli {
    /// Path to the workflow definition (JSON).
    pub workflow: PathBuf,

    /// Trigger payload as inline JSON.
    #[arg(long, conflicts_with = "trigger_file")]
    pub trigger: Option<String>,

    /// Read the trigger payload from a JSON file.
    #[arg(long, value_name = "PATH")]
    pub trigger_file: Option<PathBuf>,

    /// Pretty-print the output.
    #[arg(long)]
    pub pretty: bool,

    /// Validate the definition and print its execution layers without running it.
    #[arg(long)]
    pub check: bool,
}

/// What the runner prints and how it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Rendered JSON document.
    pub output: String,
    /// True when the run failed.
    pub failed: bool,
}

/// Runs the command described by `cli`.
///
/// # Errors
///
/// Returns an error if the inputs cannot be loaded. A workflow that runs and
/// fails is reported through [`Outcome::failed`], not as an error.
pub async fn run(cli: &Cli, config: &RunnerConfig) -> Result<Outcome, RunnerError> {
    let workflow = load_workflow(&cli.workflow, config.defaults.settings())?;

    if cli.check {
        let plan = WorkflowGraph::plan(&workflow).map_err(|e| RunnerError::InvalidGraph {
            reason: e.to_string(),
        })?;
        let summary = json!({ "workflowId": workflow.id, "layers": plan.layers });
        let output = render(&summary, cli.pretty)?;
        return Ok(Outcome {
            output,
            failed: false,
        });
    }

    let trigger = load_trigger(cli.trigger.as_deref(), cli.trigger_file.as_deref())?;
    let result = execute(&workflow, trigger).await;
    let output = render(&result, cli.pretty)?;
    Ok(Outcome {
        output,
        failed: result.status == ExecutionStatus::Failed,
    })
}

/// Runs a workflow with the built-in handlers, logging progress.
pub async fn execute(workflow: &WorkflowDefinition, trigger: JsonValue) -> ExecutionResult {
    let engine = WorkflowEngine::new(handlers::builtin_registry()).with_events(TracingEventSink);
    engine.execute_workflow(workflow, trigger).await
}

/// Reads a workflow definition.
///
/// `defaults` replaces the built-in settings when the file declares none.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a workflow definition.
pub fn load_workflow(
    path: &Path,
    defaults: WorkflowSettings,
) -> Result<WorkflowDefinition, RunnerError> {
    let text = read(path)?;
    let document: JsonValue =
        serde_json::from_str(&text).map_err(|e| RunnerError::InvalidDefinition {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let declares_settings = document.get("settings").is_some();

    let mut workflow: WorkflowDefinition =
        serde_json::from_value(document).map_err(|e| RunnerError::InvalidDefinition {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if !declares_settings {
        workflow.settings = defaults;
    }

    tracing::debug!(
        workflow = %workflow.id,
        nodes = workflow.nodes.len(),
        edges = workflow.edges.len(),
        "loaded workflow definition"
    );
    Ok(workflow)
}

/// Resolves the trigger payload from the command line.
///
/// Defaults to `null` when neither source is given.
///
/// # Errors
///
/// Returns an error if the payload cannot be read or parsed.
pub fn load_trigger(
    inline: Option<&str>,
    file: Option<&Path>,
) -> Result<JsonValue, RunnerError> {
    let text = match (inline, file) {
        (Some(inline), _) => inline.to_string(),
        (None, Some(path)) => read(path)?,
        (None, None) => return Ok(JsonValue::Null),
    };
    let trigger = serde_json::from_str(&text).map_err(|e| RunnerError::InvalidTrigger {
        reason: e.to_string(),
    })?;
    Ok(trigger)
}

fn read(path: &Path) -> Result<String, RunnerError> {
    let text = std::fs::read_to_string(path).map_err(|e| RunnerError::ReadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(text)
}

fn render<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, RunnerError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    let output = rendered.map_err(|e| RunnerError::Render {
        reason: e.to_string(),
    })?;
    Ok(output)
}
