//! Core types shared across the weft workspace.
//!
//! This crate provides the strongly-typed identifiers and the `Result`
//! alias used by the workflow engine and the runner binary.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{EdgeId, EventId, NodeId, ParseIdError, WorkflowId, WorkflowRunId};
