//! Status transition validation
//!
//! The pipeline's lifecycle invariant: `pending → running → {completed,
//! failed}`. A record never returns to `pending` after leaving it, and
//! `failed → running` is reserved for the retry claim, which increments
//! the attempt counter as it re-enters `running`.

use crate::{Result, StoreError};
use relay_core::{TaskId, TaskStatus};

/// Validate a status change for a task record.
///
/// Identical-status writes are idempotent no-ops and always allowed.
pub fn validate_transition(task_id: &TaskId, from: TaskStatus, to: TaskStatus) -> Result<()> {
    use TaskStatus::*;

    let valid = match (from, to) {
        // Idempotent writes
        (a, b) if a == b => true,

        (Pending, Running) => true,

        (Running, Completed) => true,
        (Running, Failed) => true,

        // Retry claim only: a new attempt re-enters running
        (Failed, Running) => true,

        // Nothing returns to pending, completed is final
        _ => false,
    };

    if !valid {
        return Err(StoreError::invalid_transition(task_id.clone(), from, to));
    }

    Ok(())
}
