//! Retry and error policy.
//!
//! Wraps single node attempts with the workflow's `errorHandling` setting:
//! `retry` re-invokes immediately up to `maxRetries` more times, `skip`
//! downgrades a final failure to `skipped` and `stop` keeps it as an error.

use crate::definition::{ErrorHandling, WorkflowSettings};
use crate::execution::{NodeResult, NodeStatus};
use chrono::Utc;
use std::future::Future;
use weft_core::NodeId;

/// Message recorded when no attempt produced a terminal result.
pub const EXHAUSTED_MESSAGE: &str = "Exhausted all retry attempts";

/// Runs `attempt` until it succeeds or the policy gives up.
///
/// `attempt` receives the 1-based attempt number. The returned record spans
/// from the start of the first attempt to the end of the last one and counts
/// every invocation.
pub async fn execute_with_retry<F, Fut>(
    node_id: &NodeId,
    settings: &WorkflowSettings,
    mut attempt: F,
) -> NodeResult
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = NodeResult>,
{
    let max_attempts = settings.max_attempts();
    let mut first_started = None;

    for number in 1..=max_attempts {
        let mut result = attempt(number).await;
        let started = *first_started.get_or_insert(result.started_at);
        result.extend_from(started);
        result.attempts = number;

        if result.status == NodeStatus::Success {
            return result;
        }
        if number == max_attempts {
            return apply_policy(result, settings.error_handling);
        }

        tracing::warn!(
            node = %node_id,
            attempt = number,
            max_attempts,
            error = result.error.as_deref().unwrap_or_default(),
            "node attempt failed, retrying"
        );
    }

    let now = Utc::now();
    let mut result = NodeResult::error(
        node_id.clone(),
        EXHAUSTED_MESSAGE,
        first_started.unwrap_or(now),
        now,
    );
    result.attempts = max_attempts;
    result
}

/// Applies the error policy to the final failed attempt.
///
/// `skip` turns an error into `skipped` and keeps the message.
#[must_use]
pub fn apply_policy(mut result: NodeResult, error_handling: ErrorHandling) -> NodeResult {
    if error_handling == ErrorHandling::Skip && result.status == NodeStatus::Error {
        result.status = NodeStatus::Skipped;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn node() -> NodeId {
        NodeId::from("flaky")
    }

    fn failure(message: &str) -> NodeResult {
        let now = Utc::now();
        NodeResult::error(node(), message, now, now)
    }

    fn success() -> NodeResult {
        let now = Utc::now();
        NodeResult::success(node(), json!("ok"), now, now)
    }

    fn retry(max_retries: u32) -> WorkflowSettings {
        WorkflowSettings::default()
            .with_error_handling(ErrorHandling::Retry)
            .with_max_retries(max_retries)
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute_with_retry(&node(), &retry(2), |_| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    failure("transient")
                } else {
                    success()
                }
            }
        })
        .await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_keeps_last_error() {
        let result = execute_with_retry(&node(), &retry(1), |attempt| async move {
            failure(&format!("attempt {attempt}"))
        })
        .await;

        assert_eq!(result.status, NodeStatus::Error);
        assert_eq!(result.error.as_deref(), Some("attempt 2"));
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&node(), &retry(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { success() }
        })
        .await;

        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_downgrades_failure_and_keeps_message() {
        let calls = AtomicU32::new(0);
        let settings = WorkflowSettings::default()
            .with_error_handling(ErrorHandling::Skip)
            .with_max_retries(4);

        let result = execute_with_retry(&node(), &settings, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { failure("boom") }
        })
        .await;

        assert_eq!(result.status, NodeStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_invokes_once() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&node(), &WorkflowSettings::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { failure("boom") }
        })
        .await;

        assert_eq!(result.status, NodeStatus::Error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn record_spans_all_attempts() {
        let first = Utc::now() - Duration::milliseconds(500);
        let result = execute_with_retry(&node(), &retry(1), |attempt| async move {
            if attempt == 1 {
                NodeResult::error(node(), "slow", first, first + Duration::milliseconds(10))
            } else {
                success()
            }
        })
        .await;

        assert_eq!(result.started_at, first);
        assert!(result.duration >= 500);
    }

    #[test]
    fn policy_leaves_success_alone() {
        let result = apply_policy(success(), ErrorHandling::Skip);
        assert_eq!(result.status, NodeStatus::Success);
    }
}
