use crate::outcome::{TaskExecutor, TaskOutcome};
use crate::types::DefinitionSource;
use crate::ExecutionError;
use async_trait::async_trait;
use relay_core::{
    ActivityEntry, ActivityRecorder, EventName, InferenceBackend, PipelineEvent, TaskDetails,
    TaskKind, TaskRecord, TaskStore,
};
use relay_events::EventBus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs one agent execution: a single timeout-bounded inference call.
///
/// The record is moved to its terminal state in the store before any fault
/// leaves this executor, so the store stays the durable source of truth
/// even if the process dies right after.
pub struct AgentExecutor {
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    backend: Arc<dyn InferenceBackend>,
    activity: Arc<dyn ActivityRecorder>,
    definitions: Arc<dyn DefinitionSource>,
    attempt_timeout: Duration,
}

impl AgentExecutor {
    /// Create an executor; `attempt_timeout` comes from the agent retry
    /// policy.
    pub fn new(
        store: Arc<dyn TaskStore>,
        bus: Arc<EventBus>,
        backend: Arc<dyn InferenceBackend>,
        activity: Arc<dyn ActivityRecorder>,
        definitions: Arc<dyn DefinitionSource>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            backend,
            activity,
            definitions,
            attempt_timeout,
        }
    }

    async fn fail_and_publish(
        &self,
        mut record: TaskRecord,
        elapsed_ms: u64,
        error: ExecutionError,
    ) -> TaskOutcome {
        record.record_agent_usage(0, 0.0, elapsed_ms);
        record.fail(error.to_string());

        match self.store.update(record).await {
            Ok(stored) => {
                let event = PipelineEvent::failure(
                    EventName::AgentExecutionFailed,
                    stored,
                    error.to_string(),
                );
                if let Err(publish_error) = self.bus.publish(event).await {
                    warn!(error = %publish_error, "failed to publish agent failure event");
                }
            }
            Err(store_error) => {
                warn!(error = %store_error, "failed to persist agent failure");
            }
        }

        TaskOutcome::from_error(error)
    }
}

#[async_trait]
impl TaskExecutor for AgentExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::AgentExecution
    }

    async fn execute(&self, mut record: TaskRecord) -> TaskOutcome {
        let (agent_id, user_id) = match &record.details {
            TaskDetails::Agent {
                agent_id,
                triggered_by_user_id,
                ..
            } => (agent_id.clone(), triggered_by_user_id.clone()),
            _ => {
                let error =
                    ExecutionError::configuration("agent executor received a non-agent task");
                return self.fail_and_publish(record, 0, error).await;
            }
        };

        let config = match self.definitions.agent_config(&agent_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                let error = ExecutionError::configuration(format!(
                    "no configuration for agent {agent_id}"
                ));
                return self.fail_and_publish(record, 0, error).await;
            }
            Err(source_error) => {
                return self
                    .fail_and_publish(record, 0, ExecutionError::from(source_error))
                    .await;
            }
        };

        let config_json = match serde_json::to_value(&config) {
            Ok(json) => json,
            Err(serde_error) => {
                let error = ExecutionError::configuration(format!(
                    "agent configuration is not serializable: {serde_error}"
                ));
                return self.fail_and_publish(record, 0, error).await;
            }
        };

        info!(task_id = %record.id, agent_id = %agent_id, "starting agent execution");
        let started = Instant::now();

        let call = tokio::time::timeout(
            self.attempt_timeout,
            self.backend.infer(&config_json, &record.input_data),
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let output = match call {
            Ok(Ok(output)) => output,
            Ok(Err(backend_error)) => {
                return self
                    .fail_and_publish(
                        record,
                        elapsed_ms,
                        ExecutionError::backend(backend_error.to_string()),
                    )
                    .await;
            }
            Err(_elapsed) => {
                return self
                    .fail_and_publish(
                        record,
                        elapsed_ms,
                        ExecutionError::timeout(self.attempt_timeout),
                    )
                    .await;
            }
        };

        record.record_agent_usage(output.tokens_used, output.cost, elapsed_ms);
        record.complete(output.output.clone());

        let stored = match self.store.update(record).await {
            Ok(stored) => stored,
            Err(store_error) => {
                warn!(error = %store_error, "failed to persist agent completion");
                return TaskOutcome::Retryable(ExecutionError::from(store_error));
            }
        };

        if let Err(publish_error) = self
            .bus
            .publish(PipelineEvent::new(EventName::AgentExecuted, stored.clone()))
            .await
        {
            warn!(error = %publish_error, "failed to publish agent completion event");
        }

        // Best-effort audit; never fails the task
        let entry = ActivityEntry::new(
            stored.tenant_id.clone(),
            user_id,
            "agent.execution.completed",
            stored.id.clone(),
        );
        if let Err(activity_error) = self.activity.record(entry).await {
            warn!(error = %activity_error, "failed to record activity entry");
        }

        info!(
            task_id = %stored.id,
            elapsed_ms,
            tokens = output.tokens_used,
            "agent execution completed"
        );
        TaskOutcome::Completed(output.output)
    }
}
