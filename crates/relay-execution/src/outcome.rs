use crate::error::ExecutionError;
use async_trait::async_trait;
use relay_core::{JsonMap, TaskKind, TaskRecord};

/// Tagged result of one execution attempt.
///
/// The runner branches on the tag — retry-vs-fatal is carried explicitly
/// here, never signalled by error type or by throwing through the call
/// stack. Whatever the tag, the executor has already written the record's
/// terminal state to the store before returning.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The attempt succeeded; the record is `Completed`
    Completed(JsonMap),
    /// A skip condition applied (inactive webhook, unsubscribed event);
    /// silent success, nothing counted, nothing retried
    Skipped,
    /// A transient fault; the retry policy decides what happens next
    Retryable(ExecutionError),
    /// A configuration fault; no retry is useful
    Fatal(ExecutionError),
}

impl TaskOutcome {
    /// Wrap an error with the tag its classification demands
    pub fn from_error(error: ExecutionError) -> Self {
        if error.is_fatal() {
            Self::Fatal(error)
        } else {
            Self::Retryable(error)
        }
    }

    /// Check whether the attempt ended without a fault
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Skipped)
    }
}

/// One task executor variant.
///
/// Receives the already-claimed `Running` record, runs it to a terminal
/// state, persists that state, publishes any events, and reports the
/// tagged outcome.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// The task kind this executor runs
    fn kind(&self) -> TaskKind;

    /// Run one claimed attempt to a terminal state
    async fn execute(&self, record: TaskRecord) -> TaskOutcome;

    /// Hook invoked by the runner once the retry policy has given up on a
    /// task. The generic exhaustion handling (error-message wrapper,
    /// critical log) lives in the runner; executors override this for
    /// kind-specific terminal side effects.
    async fn on_exhausted(&self, _record: &TaskRecord) -> crate::Result<()> {
        Ok(())
    }
}
