use crate::id::Id;
use crate::task::{TaskDetails, TaskRecord};
use crate::{DateTime, Json, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

/// Names of the terminal-state facts the executors publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// An agent execution completed successfully
    AgentExecuted,
    /// An agent execution attempt failed
    AgentExecutionFailed,
    /// A workflow execution completed successfully
    WorkflowCompleted,
    /// A workflow execution failed
    WorkflowFailed,
}

impl EventName {
    /// Dotted wire name used for channels and webhook subscriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentExecuted => "agent.executed",
            Self::AgentExecutionFailed => "agent.execution.failed",
            Self::WorkflowCompleted => "workflow.completed",
            Self::WorkflowFailed => "workflow.failed",
        }
    }

    /// Check whether the event marks a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::AgentExecutionFailed | Self::WorkflowFailed)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "agent.executed" => Ok(Self::AgentExecuted),
            "agent.execution.failed" => Ok(Self::AgentExecutionFailed),
            "workflow.completed" => Ok(Self::WorkflowCompleted),
            "workflow.failed" => Ok(Self::WorkflowFailed),
            _ => Err(format!("Unknown event name: {s}")),
        }
    }
}

/// Immutable fact published after a task reaches a terminal state.
///
/// Carries a read-only snapshot of the source record; listeners must treat
/// the snapshot as frozen and tolerate re-delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event identifier
    pub id: Id,
    /// Event name
    pub name: EventName,
    /// Tenant the source task belongs to
    pub tenant_id: Id,
    /// Snapshot of the source task at publish time
    pub task: TaskRecord,
    /// Failure cause, present on failure events
    pub cause: Option<String>,
    /// Publish timestamp
    pub occurred_at: DateTime,
}

impl PipelineEvent {
    /// Create an event from a task snapshot
    pub fn new(name: EventName, task: TaskRecord) -> Self {
        Self {
            id: Id::generate("evt"),
            name,
            tenant_id: task.tenant_id.clone(),
            task,
            cause: None,
            occurred_at: chrono::Utc::now(),
        }
    }

    /// Create a failure event carrying its cause
    pub fn failure(name: EventName, task: TaskRecord, cause: impl Into<String>) -> Self {
        Self {
            cause: Some(cause.into()),
            ..Self::new(name, task)
        }
    }

    /// Channels the event is published on: always the tenant channel plus
    /// one resource-specific channel.
    pub fn channels(&self) -> Vec<String> {
        let mut channels = vec![format!("tenant.{}", self.tenant_id)];
        match &self.task.details {
            TaskDetails::Agent { agent_id, .. } => {
                channels.push(format!("agent.{agent_id}"));
            }
            TaskDetails::Workflow { workflow_id, .. } => {
                channels.push(format!("workflow.{workflow_id}"));
            }
            TaskDetails::Notification { user_id, .. } => {
                channels.push(format!("user.{user_id}"));
            }
            TaskDetails::WebhookDelivery { .. } => {}
        }
        channels
    }

    /// Externally published payload: relevant ids, status, timing fields,
    /// ISO-8601 timestamps.
    pub fn external_payload(&self) -> Json {
        let task = &self.task;
        let mut fields = serde_json::Map::new();
        fields.insert("event".to_string(), json!(self.name.as_str()));
        fields.insert("tenant_id".to_string(), json!(task.tenant_id.as_str()));
        fields.insert("status".to_string(), json!(task.status.as_str()));
        fields.insert(
            "timestamp".to_string(),
            json!(self.occurred_at.to_rfc3339()),
        );
        fields.insert(
            "started_at".to_string(),
            json!(task.started_at.map(|t| t.to_rfc3339())),
        );
        fields.insert(
            "completed_at".to_string(),
            json!(task.completed_at.map(|t| t.to_rfc3339())),
        );
        match &task.details {
            TaskDetails::Agent {
                agent_id,
                tokens_used,
                cost,
                execution_time_ms,
                ..
            } => {
                fields.insert("execution_id".to_string(), json!(task.id.as_str()));
                fields.insert("agent_id".to_string(), json!(agent_id.as_str()));
                fields.insert("tokens_used".to_string(), json!(tokens_used));
                fields.insert("cost".to_string(), json!(cost));
                fields.insert("execution_time_ms".to_string(), json!(execution_time_ms));
            }
            TaskDetails::Workflow {
                workflow_id,
                current_step,
                ..
            } => {
                fields.insert("execution_id".to_string(), json!(task.id.as_str()));
                fields.insert("workflow_id".to_string(), json!(workflow_id.as_str()));
                fields.insert("current_step".to_string(), json!(current_step));
            }
            _ => {
                fields.insert("task_id".to_string(), json!(task.id.as_str()));
            }
        }
        if let Some(cause) = &self.cause {
            fields.insert("error".to_string(), json!(cause));
        }
        Json::Object(fields)
    }

    /// Validate the event before publishing
    pub fn validate(&self) -> Result<()> {
        if self.name.is_failure() && self.cause.is_none() {
            return Err(crate::Error::event("Failure event requires a cause"));
        }
        if !self.task.is_terminal() {
            return Err(crate::Error::event(
                "Events may only be published for terminal tasks",
            ));
        }
        Ok(())
    }
}
