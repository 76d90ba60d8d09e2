//! In-memory reference implementation of the store traits.
//!
//! All mutations happen under a single `RwLock` write guard per store, so
//! the claim is a conditional update on status: of any number of
//! concurrent claimants for one task id, exactly one observes `Pending`
//! (or `Failed`, for retries) and wins. Counter updates on webhooks are
//! single-guard read-modify-write for the same reason.

use crate::transitions::validate_transition;
use crate::StoreError;
use async_trait::async_trait;
use relay_core::{
    PipelineEvent, Result, TaskId, TaskRecord, TaskStatus, TaskStore, TenantId, Webhook,
    WebhookId, WebhookStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory task record store
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
    events: Arc<RwLock<Vec<PipelineEvent>>>,
}

impl InMemoryTaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Check whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Snapshot of the durable event log, in publish order
    pub async fn event_log(&self) -> Vec<PipelineEvent> {
        self.events.read().await.clone()
    }

    async fn claim_from(&self, task_id: &TaskId, expected: TaskStatus) -> Result<TaskRecord> {
        let mut tasks = self.tasks.write().await;
        let record = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::task_not_found(task_id.clone()))?;

        if record.status != expected {
            return Err(StoreError::claim_conflict(task_id.clone(), record.status).into());
        }

        record.begin_attempt();
        debug!(
            task_id = %task_id,
            attempt = record.attempt_count,
            "claimed task record"
        );
        Ok(record.clone())
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, record: TaskRecord) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                task_id: record.id.clone(),
            }
            .into());
        }
        tasks.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn update(&self, record: TaskRecord) -> Result<TaskRecord> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::task_not_found(record.id.clone()))?;

        validate_transition(&record.id, stored.status, record.status)?;

        *stored = record;
        Ok(stored.clone())
    }

    async fn claim(&self, task_id: &TaskId) -> Result<TaskRecord> {
        self.claim_from(task_id, TaskStatus::Pending).await
    }

    async fn claim_retry(&self, task_id: &TaskId) -> Result<TaskRecord> {
        self.claim_from(task_id, TaskStatus::Failed).await
    }

    async fn list(
        &self,
        tenant_id: &TenantId,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|record| &record.tenant_id == tenant_id)
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect())
    }

    async fn record_event(&self, event: &PipelineEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// In-memory webhook endpoint store
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    hooks: Arc<RwLock<HashMap<WebhookId, Webhook>>>,
}

impl InMemoryWebhookStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn get(&self, webhook_id: &WebhookId) -> Result<Option<Webhook>> {
        Ok(self.hooks.read().await.get(webhook_id).cloned())
    }

    async fn upsert(&self, webhook: Webhook) -> Result<()> {
        self.hooks.write().await.insert(webhook.id.clone(), webhook);
        Ok(())
    }

    async fn list_active_for_event(
        &self,
        tenant_id: &TenantId,
        event: &str,
    ) -> Result<Vec<Webhook>> {
        let hooks = self.hooks.read().await;
        Ok(hooks
            .values()
            .filter(|hook| &hook.tenant_id == tenant_id)
            .filter(|hook| hook.is_active && hook.subscribes_to(event))
            .cloned()
            .collect())
    }

    async fn record_success(&self, webhook_id: &WebhookId) -> Result<()> {
        let mut hooks = self.hooks.write().await;
        let hook = hooks
            .get_mut(webhook_id)
            .ok_or_else(|| StoreError::webhook_not_found(webhook_id.clone()))?;
        hook.record_success();
        Ok(())
    }

    async fn record_failure(&self, webhook_id: &WebhookId) -> Result<u64> {
        let mut hooks = self.hooks.write().await;
        let hook = hooks
            .get_mut(webhook_id)
            .ok_or_else(|| StoreError::webhook_not_found(webhook_id.clone()))?;
        hook.record_failure();
        Ok(hook.failed_calls)
    }

    async fn deactivate(&self, webhook_id: &WebhookId) -> Result<()> {
        let mut hooks = self.hooks.write().await;
        let hook = hooks
            .get_mut(webhook_id)
            .ok_or_else(|| StoreError::webhook_not_found(webhook_id.clone()))?;
        hook.is_active = false;
        Ok(())
    }
}
