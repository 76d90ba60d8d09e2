use crate::registry::EventListener;
use async_trait::async_trait;
use relay_core::{
    PipelineEvent, Result, TaskDetails, TaskKind, TaskRecord, TaskStore, UserId, WebhookStore,
};
use relay_queue::{Dispatch, DispatchQueue, LaneRouter};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Notifies the triggering user once a task has failed for good.
///
/// Failure events are published on every attempt; this listener only acts
/// on the final one, so users see a single notification per task, never
/// one per retry.
pub struct FailureNotifier {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DispatchQueue>,
    router: LaneRouter,
    /// Attempt count at which each kind is out of retries
    final_attempts: HashMap<TaskKind, u32>,
}

impl FailureNotifier {
    /// Create a notifier with the per-kind final attempt counts taken from
    /// the retry policy table.
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn DispatchQueue>,
        final_attempts: HashMap<TaskKind, u32>,
    ) -> Self {
        Self {
            store,
            queue,
            router: LaneRouter::new(),
            final_attempts,
        }
    }

    fn triggering_user(task: &TaskRecord) -> Option<&UserId> {
        match &task.details {
            TaskDetails::Agent {
                triggered_by_user_id,
                ..
            }
            | TaskDetails::Workflow {
                triggered_by_user_id,
                ..
            } => triggered_by_user_id.as_ref(),
            _ => None,
        }
    }

    fn is_final_attempt(&self, task: &TaskRecord) -> bool {
        let limit = self.final_attempts.get(&task.kind).copied().unwrap_or(1);
        task.attempt_count >= limit
    }
}

#[async_trait]
impl EventListener for FailureNotifier {
    async fn handle(&self, event: &PipelineEvent) -> Result<()> {
        if !event.name.is_failure() {
            return Ok(());
        }
        if !self.is_final_attempt(&event.task) {
            debug!(task_id = %event.task.id, "retries remain; deferring notification");
            return Ok(());
        }
        let Some(user_id) = Self::triggering_user(&event.task) else {
            return Ok(());
        };

        let data = json!({
            "task_id": event.task.id.as_str(),
            "kind": event.task.kind.as_str(),
            "error": event.cause,
        });
        let record = TaskRecord::new(
            event.tenant_id.clone(),
            relay_core::JsonMap::new(),
            TaskDetails::notification(user_id.clone(), "email", data),
        );
        let dispatch = Dispatch::new(
            record.id.clone(),
            record.tenant_id.clone(),
            record.kind,
            self.router.lane_for(record.kind, false),
        );

        self.store.insert(record).await?;
        self.queue.enqueue(dispatch).await?;

        info!(task_id = %event.task.id, user_id = %user_id, "failure notification enqueued");
        Ok(())
    }

    fn name(&self) -> &str {
        "failure_notifier"
    }
}

/// Fans a published event out to every active webhook endpoint of the
/// tenant subscribed to its name: one delivery task per endpoint, each
/// retried independently.
pub struct WebhookFanout {
    task_store: Arc<dyn TaskStore>,
    webhook_store: Arc<dyn WebhookStore>,
    queue: Arc<dyn DispatchQueue>,
    router: LaneRouter,
}

impl WebhookFanout {
    /// Create a fan-out listener
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        webhook_store: Arc<dyn WebhookStore>,
        queue: Arc<dyn DispatchQueue>,
    ) -> Self {
        Self {
            task_store,
            webhook_store,
            queue,
            router: LaneRouter::new(),
        }
    }
}

#[async_trait]
impl EventListener for WebhookFanout {
    async fn handle(&self, event: &PipelineEvent) -> Result<()> {
        let event_name = event.name.as_str();
        let hooks = self
            .webhook_store
            .list_active_for_event(&event.tenant_id, event_name)
            .await?;

        if hooks.is_empty() {
            return Ok(());
        }

        let payload = event.external_payload();
        for hook in hooks {
            let record = TaskRecord::new(
                event.tenant_id.clone(),
                relay_core::JsonMap::new(),
                TaskDetails::webhook_delivery(hook.id.clone(), event_name, payload.clone()),
            );
            let dispatch = Dispatch::new(
                record.id.clone(),
                record.tenant_id.clone(),
                record.kind,
                self.router.lane_for(record.kind, false),
            );

            self.task_store.insert(record).await?;
            self.queue.enqueue(dispatch).await?;

            debug!(webhook_id = %hook.id, event = event_name, "delivery task enqueued");
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook_fanout"
    }
}
