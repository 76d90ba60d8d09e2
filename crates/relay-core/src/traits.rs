use crate::event::PipelineEvent;
use crate::id::{TaskId, TenantId, UserId, WebhookId};
use crate::task::{ActivityEntry, TaskRecord, TaskStatus};
use crate::webhook::Webhook;
use crate::{Json, JsonMap, Result};
use async_trait::async_trait;

/// Persistence seam for task records.
///
/// The store is the single source of truth: executors write terminal
/// states here before any fault propagates, and the claim operations are
/// the only path into `Running`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a freshly created pending record
    async fn insert(&self, record: TaskRecord) -> Result<()>;

    /// Fetch a record snapshot
    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>>;

    /// Persist an updated record, returning the stored snapshot
    async fn update(&self, record: TaskRecord) -> Result<TaskRecord>;

    /// Atomically claim a pending record for its first attempt.
    ///
    /// Exactly one of any number of concurrent claimants succeeds; the
    /// winner receives the record already moved to `Running` with
    /// `attempt_count` incremented.
    async fn claim(&self, task_id: &TaskId) -> Result<TaskRecord>;

    /// Atomically re-claim a failed record for a retry attempt.
    async fn claim_retry(&self, task_id: &TaskId) -> Result<TaskRecord>;

    /// List records for a tenant filtered by status
    async fn list(&self, tenant_id: &TenantId, status: Option<TaskStatus>)
        -> Result<Vec<TaskRecord>>;

    /// Append a published event to the durable event log
    async fn record_event(&self, event: &PipelineEvent) -> Result<()>;
}

/// Persistence seam for webhook endpoint records.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Fetch an endpoint snapshot
    async fn get(&self, webhook_id: &WebhookId) -> Result<Option<Webhook>>;

    /// Persist an endpoint record
    async fn upsert(&self, webhook: Webhook) -> Result<()>;

    /// Active endpoints of a tenant subscribed to the given event name
    async fn list_active_for_event(
        &self,
        tenant_id: &TenantId,
        event: &str,
    ) -> Result<Vec<Webhook>>;

    /// Atomically record a successful delivery (`total_calls`,
    /// `last_triggered_at`)
    async fn record_success(&self, webhook_id: &WebhookId) -> Result<()>;

    /// Atomically record a failed delivery attempt, returning the new
    /// `failed_calls` value
    async fn record_failure(&self, webhook_id: &WebhookId) -> Result<u64>;

    /// Disable an endpoint permanently (manual re-enable is out of scope)
    async fn deactivate(&self, webhook_id: &WebhookId) -> Result<()>;
}

/// Result of one inference backend invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    /// Structured model output, merged into the task's output data
    pub output: JsonMap,
    /// Tokens consumed by the call
    pub tokens_used: u64,
    /// Metered cost of the call
    pub cost: f64,
}

/// The generative computation collaborator invoked by agent executions and
/// `agent` workflow nodes. Calls may take arbitrarily long; the executor
/// bounds them with the policy's per-attempt timeout.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one inference with the agent's configuration and input
    async fn infer(&self, config: &Json, input: &JsonMap) -> Result<InferenceOutput>;
}

/// Notification dispatch collaborator (`email`, `push`, `sms` are handled;
/// anything else is a configuration fault upstream of this trait).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver one notification to a user
    async fn send(&self, user_id: &UserId, notification_type: &str, data: &Json) -> Result<()>;
}

/// Audit trail collaborator. Recording is best-effort: callers log and
/// swallow its errors.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    /// Persist one activity entry
    async fn record(&self, entry: ActivityEntry) -> Result<()>;
}

/// Outbound channel collaborator for externally published event payloads
/// (e.g. a socket fan-out). Every event goes to the tenant channel and one
/// resource channel.
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    /// Publish a payload on a named channel
    async fn publish(&self, channel: &str, payload: &Json) -> Result<()>;
}
