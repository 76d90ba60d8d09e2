use relay_core::{TaskId, TaskStatus, WebhookId};
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the task id
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    /// No record exists for the webhook id
    #[error("Webhook not found: {webhook_id}")]
    WebhookNotFound { webhook_id: WebhookId },

    /// A status change violated the transition invariant
    #[error("Invalid transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Another claimant already owns the record
    #[error("Claim conflict for {task_id}: record is {status}")]
    ClaimConflict { task_id: TaskId, status: TaskStatus },

    /// A record with the same id already exists
    #[error("Duplicate task id: {task_id}")]
    Duplicate { task_id: TaskId },
}

impl StoreError {
    /// Create a task-not-found error
    pub fn task_not_found(task_id: TaskId) -> Self {
        Self::TaskNotFound { task_id }
    }

    /// Create a webhook-not-found error
    pub fn webhook_not_found(webhook_id: WebhookId) -> Self {
        Self::WebhookNotFound { webhook_id }
    }

    /// Create an invalid-transition error
    pub fn invalid_transition(task_id: TaskId, from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition { task_id, from, to }
    }

    /// Create a claim-conflict error
    pub fn claim_conflict(task_id: TaskId, status: TaskStatus) -> Self {
        Self::ClaimConflict { task_id, status }
    }
}

impl From<StoreError> for relay_core::Error {
    fn from(error: StoreError) -> Self {
        relay_core::Error::store(error.to_string())
    }
}
