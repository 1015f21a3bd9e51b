//! Versioned envelope for progress events.
//!
//! Every event leaving the engine is wrapped with the run it belongs to, a
//! unique event ID and the time it was emitted. The version header lets
//! consumers that persist or forward events detect format changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{EventId, WorkflowRunId};

/// The current envelope version.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned envelope that wraps an emitted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// The version of the envelope format.
    pub version: u32,
    /// Unique identifier of this emission.
    pub id: EventId,
    /// The run that produced the payload.
    pub run_id: WorkflowRunId,
    /// When the payload was emitted.
    pub emitted_at: DateTime<Utc>,
    /// The wrapped payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload emitted now by the given run.
    #[must_use]
    pub fn new(run_id: WorkflowRunId, payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            id: EventId::new(),
            run_id,
            emitted_at: Utc::now(),
            payload,
        }
    }

    /// Unwraps the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns a reference to the payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Returns true if this envelope uses the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }
}
