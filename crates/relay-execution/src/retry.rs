use relay_core::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Retry configuration for one task kind.
///
/// An explicit value object handed to the runner — retry behavior is never
/// discovered from the task or inherited implicitly. `backoff` holds one
/// wait per retry index; an index past the end reuses the last entry, and
/// an empty list means immediate retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, first one included
    pub max_attempts: u32,
    /// Wait between attempt N failing and attempt N+1 starting
    pub backoff: Vec<Duration>,
    /// Bound on each attempt's external call
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// The observed policy for a task kind
    pub fn for_kind(kind: TaskKind) -> Self {
        match kind {
            TaskKind::AgentExecution => Self {
                max_attempts: 3,
                backoff: vec![
                    Duration::from_secs(10),
                    Duration::from_secs(30),
                    Duration::from_secs(60),
                ],
                attempt_timeout: Duration::from_secs(300),
            },
            TaskKind::WorkflowExecution => Self {
                max_attempts: 2,
                backoff: Vec::new(),
                attempt_timeout: Duration::from_secs(600),
            },
            TaskKind::Notification => Self {
                max_attempts: 3,
                backoff: vec![
                    Duration::from_secs(10),
                    Duration::from_secs(30),
                    Duration::from_secs(60),
                ],
                attempt_timeout: Duration::from_secs(30),
            },
            TaskKind::WebhookDelivery => Self {
                max_attempts: 3,
                backoff: vec![
                    Duration::from_secs(5),
                    Duration::from_secs(15),
                    Duration::from_secs(30),
                ],
                attempt_timeout: Duration::from_secs(30),
            },
        }
    }

    /// The full observed policy table
    pub fn standard_table() -> HashMap<TaskKind, RetryPolicy> {
        [
            TaskKind::AgentExecution,
            TaskKind::WorkflowExecution,
            TaskKind::Notification,
            TaskKind::WebhookDelivery,
        ]
        .into_iter()
        .map(|kind| (kind, Self::for_kind(kind)))
        .collect()
    }

    /// Per-kind final attempt counts, for listeners that must distinguish
    /// terminal failures from mid-retry ones.
    pub fn final_attempts(table: &HashMap<TaskKind, RetryPolicy>) -> HashMap<TaskKind, u32> {
        table
            .iter()
            .map(|(kind, policy)| (*kind, policy.max_attempts))
            .collect()
    }

    /// Check whether the policy is out of retries after `attempt` failed
    /// attempts.
    pub fn gives_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Wait before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}
