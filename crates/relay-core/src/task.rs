use crate::id::{AgentId, Id, TaskId, TenantId, UserId, WebhookId, WorkflowId};
use crate::{DateTime, Json, JsonMap};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a worker to claim it
    Pending,
    /// Claimed by exactly one executor
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error (terminal for the attempt; the retry layer
    /// may re-claim the record as a new attempt)
    Failed,
}

impl TaskStatus {
    /// String representation used in payloads and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check whether the status is terminal for the current attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// The four kinds of asynchronous work the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    AgentExecution,
    WorkflowExecution,
    WebhookDelivery,
    Notification,
}

impl TaskKind {
    /// String representation used in payloads and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentExecution => "agent_execution",
            Self::WorkflowExecution => "workflow_execution",
            Self::WebhookDelivery => "webhook_delivery",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one workflow step log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLogStatus {
    /// Node handler is running
    Processing,
    /// Node handler finished and its output was merged
    Completed,
    /// Node handler faulted; the workflow aborted here
    Failed,
}

/// Append-only record of one attempted workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    /// 1-based step index at the time the node ran
    pub step: u32,
    /// Node identifier from the workflow definition
    pub node_id: String,
    /// Node type string from the workflow definition
    pub node_type: String,
    /// When the node was started
    pub timestamp: DateTime,
    /// Outcome of the node
    pub status: StepLogStatus,
    /// Node output, present once completed
    pub output: Option<Json>,
    /// Node error, present once failed
    pub error: Option<String>,
}

impl StepLogEntry {
    /// Create a `processing` entry for a node about to run
    pub fn processing(step: u32, node_id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            step,
            node_id: node_id.into(),
            node_type: node_type.into(),
            timestamp: chrono::Utc::now(),
            status: StepLogStatus::Processing,
            output: None,
            error: None,
        }
    }

    /// Finalize the entry as completed with the node's output
    pub fn complete(&mut self, output: Json) {
        self.status = StepLogStatus::Completed;
        self.output = Some(output);
    }

    /// Finalize the entry as failed with the node's error
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepLogStatus::Failed;
        self.error = Some(error.into());
    }
}

/// Kind-specific fields of a task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskDetails {
    Agent {
        agent_id: AgentId,
        job_flow_id: Option<Id>,
        workflow_execution_id: Option<TaskId>,
        triggered_by_user_id: Option<UserId>,
        tokens_used: u64,
        cost: f64,
        execution_time_ms: u64,
    },
    Workflow {
        workflow_id: WorkflowId,
        triggered_by_user_id: Option<UserId>,
        current_step: u32,
        execution_log: Vec<StepLogEntry>,
    },
    WebhookDelivery {
        webhook_id: WebhookId,
        event: String,
        payload: Json,
    },
    Notification {
        user_id: UserId,
        notification_type: String,
        data: Json,
    },
}

impl TaskDetails {
    /// The task kind this detail variant belongs to
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Agent { .. } => TaskKind::AgentExecution,
            Self::Workflow { .. } => TaskKind::WorkflowExecution,
            Self::WebhookDelivery { .. } => TaskKind::WebhookDelivery,
            Self::Notification { .. } => TaskKind::Notification,
        }
    }

    /// Fresh agent-execution details
    pub fn agent(agent_id: AgentId) -> Self {
        Self::Agent {
            agent_id,
            job_flow_id: None,
            workflow_execution_id: None,
            triggered_by_user_id: None,
            tokens_used: 0,
            cost: 0.0,
            execution_time_ms: 0,
        }
    }

    /// Fresh workflow-execution details
    pub fn workflow(workflow_id: WorkflowId) -> Self {
        Self::Workflow {
            workflow_id,
            triggered_by_user_id: None,
            current_step: 0,
            execution_log: Vec::new(),
        }
    }

    /// Fresh webhook-delivery details
    pub fn webhook_delivery(webhook_id: WebhookId, event: impl Into<String>, payload: Json) -> Self {
        Self::WebhookDelivery {
            webhook_id,
            event: event.into(),
            payload,
        }
    }

    /// Fresh notification details
    pub fn notification(user_id: UserId, notification_type: impl Into<String>, data: Json) -> Self {
        Self::Notification {
            user_id,
            notification_type: notification_type.into(),
            data,
        }
    }
}

/// Persisted state of one execution unit.
///
/// Records are created `Pending` by the enqueuing caller, mutated only by
/// the owning executor via the store, and never deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct TaskRecord {
    /// Unique task identifier, immutable after creation
    #[setters(skip)]
    pub id: TaskId,
    /// Owning tenant; scopes event channels and webhook discovery
    #[setters(skip)]
    pub tenant_id: TenantId,
    /// Task kind, fixed at creation
    #[setters(skip)]
    pub kind: TaskKind,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Number of attempts that have claimed this record
    pub attempt_count: u32,
    /// Opaque input payload, owned by the task while running
    pub input_data: JsonMap,
    /// Opaque output payload, read-only to listeners after completion
    pub output_data: Option<JsonMap>,
    /// Set only when an attempt fails
    pub error_message: Option<String>,
    /// Kind-specific fields
    pub details: TaskDetails,
    /// Record creation timestamp
    pub created_at: DateTime,
    /// Last mutation timestamp
    pub updated_at: DateTime,
    /// Set when an attempt claims the record
    pub started_at: Option<DateTime>,
    /// Set when an attempt reaches a terminal status
    pub completed_at: Option<DateTime>,
}

impl TaskRecord {
    /// Create a new pending record
    pub fn new(tenant_id: TenantId, input_data: JsonMap, details: TaskDetails) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Id::generate("task"),
            tenant_id,
            kind: details.kind(),
            status: TaskStatus::Pending,
            attempt_count: 0,
            input_data,
            output_data: None,
            error_message: None,
            details,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Begin an attempt: move to `Running` and count it.
    ///
    /// Called by the store under its claim lock; the first call observes
    /// `attempt_count == 1`.
    pub fn begin_attempt(&mut self) {
        self.status = TaskStatus::Running;
        self.attempt_count += 1;
        self.started_at = Some(chrono::Utc::now());
        self.completed_at = None;
        self.touch();
    }

    /// Finish the attempt successfully
    pub fn complete(&mut self, output: JsonMap) {
        self.status = TaskStatus::Completed;
        self.output_data = Some(output);
        self.error_message = None;
        self.completed_at = Some(chrono::Utc::now());
        self.touch();
    }

    /// Finish the attempt with an error
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error_message = Some(error.into());
        self.completed_at = Some(chrono::Utc::now());
        self.touch();
    }

    /// Check whether the current attempt reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the current attempt, if finished
    pub fn attempt_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }

    /// Record the measured backend usage on an agent execution
    pub fn record_agent_usage(&mut self, tokens: u64, total_cost: f64, elapsed_ms: u64) {
        if let TaskDetails::Agent {
            tokens_used,
            cost,
            execution_time_ms,
            ..
        } = &mut self.details
        {
            *tokens_used = tokens;
            *cost = total_cost;
            *execution_time_ms = elapsed_ms;
            self.touch();
        }
    }

    /// Advance the workflow step counter and return the new value
    pub fn advance_step(&mut self) -> u32 {
        if let TaskDetails::Workflow { current_step, .. } = &mut self.details {
            *current_step += 1;
            let step = *current_step;
            self.touch();
            step
        } else {
            0
        }
    }

    /// Append a workflow log entry
    pub fn append_log(&mut self, entry: StepLogEntry) {
        if let TaskDetails::Workflow { execution_log, .. } = &mut self.details {
            execution_log.push(entry);
            self.touch();
        }
    }

    /// Replace the last workflow log entry (used to finalize `processing`)
    pub fn finalize_last_log(&mut self, entry: StepLogEntry) {
        if let TaskDetails::Workflow { execution_log, .. } = &mut self.details {
            if let Some(last) = execution_log.last_mut() {
                *last = entry;
            }
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Audit entry attributing a finished execution to the user that triggered
/// it. Recording is best-effort and never fails the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Id,
    pub tenant_id: TenantId,
    pub user_id: Option<UserId>,
    /// Short verb phrase, e.g. `agent.execution.completed`
    pub action: String,
    /// Task the entry refers to
    pub subject_id: TaskId,
    pub created_at: DateTime,
}

impl ActivityEntry {
    /// Create a new activity entry for a task
    pub fn new(
        tenant_id: TenantId,
        user_id: Option<UserId>,
        action: impl Into<String>,
        subject_id: TaskId,
    ) -> Self {
        Self {
            id: Id::generate("act"),
            tenant_id,
            user_id,
            action: action.into(),
            subject_id,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixture_record() -> TaskRecord {
        let mut input = JsonMap::new();
        input.insert("message".to_string(), json!("hi"));
        TaskRecord::new(
            Id::generate("tenant"),
            input,
            TaskDetails::agent(Id::generate("agent")),
        )
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(TaskStatus::Pending.as_str(), "pending");
        assert_eq!(TaskStatus::Running.as_str(), "running");
        assert_eq!(TaskStatus::Completed.as_str(), "completed");
        assert_eq!(TaskStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_round_trip() {
        for fixture in ["pending", "running", "completed", "failed"] {
            let actual: TaskStatus = fixture.parse().unwrap();
            assert_eq!(actual.as_str(), fixture);
        }
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_record_creation() {
        let actual = fixture_record();

        assert_eq!(actual.status, TaskStatus::Pending);
        assert_eq!(actual.kind, TaskKind::AgentExecution);
        assert_eq!(actual.attempt_count, 0);
        assert!(actual.id.as_str().starts_with("task_"));
        assert!(actual.started_at.is_none());
        assert!(actual.completed_at.is_none());
    }

    #[test]
    fn test_record_begin_attempt() {
        let mut fixture = fixture_record();

        fixture.begin_attempt();

        assert_eq!(fixture.status, TaskStatus::Running);
        assert_eq!(fixture.attempt_count, 1);
        assert!(fixture.started_at.is_some());
    }

    #[test]
    fn test_record_complete() {
        let mut fixture = fixture_record();
        fixture.begin_attempt();

        let mut output = JsonMap::new();
        output.insert("response".to_string(), json!("hello"));
        fixture.complete(output.clone());

        assert_eq!(fixture.status, TaskStatus::Completed);
        assert_eq!(fixture.output_data, Some(output));
        assert!(fixture.completed_at.is_some());
        assert!(fixture.error_message.is_none());
    }

    #[test]
    fn test_record_fail() {
        let mut fixture = fixture_record();
        fixture.begin_attempt();

        fixture.fail("backend timed out");

        assert_eq!(fixture.status, TaskStatus::Failed);
        assert_eq!(fixture.error_message, Some("backend timed out".to_string()));
        assert!(fixture.completed_at.is_some());
    }

    #[test]
    fn test_record_retry_attempt_counts() {
        let mut fixture = fixture_record();

        fixture.begin_attempt();
        fixture.fail("first fault");
        fixture.begin_attempt();

        assert_eq!(fixture.status, TaskStatus::Running);
        assert_eq!(fixture.attempt_count, 2);
        assert!(fixture.completed_at.is_none());
    }

    #[test]
    fn test_record_agent_usage() {
        let mut fixture = fixture_record();

        fixture.record_agent_usage(1200, 0.03, 845);

        match fixture.details {
            TaskDetails::Agent {
                tokens_used,
                cost,
                execution_time_ms,
                ..
            } => {
                assert_eq!(tokens_used, 1200);
                assert_eq!(cost, 0.03);
                assert_eq!(execution_time_ms, 845);
            }
            _ => panic!("Expected agent details"),
        }
    }

    #[test]
    fn test_workflow_step_advance_and_log() {
        let mut fixture = TaskRecord::new(
            Id::generate("tenant"),
            JsonMap::new(),
            TaskDetails::workflow(Id::generate("wf")),
        );

        let step = fixture.advance_step();
        assert_eq!(step, 1);

        fixture.append_log(StepLogEntry::processing(step, "node-1", "agent"));
        let mut entry = StepLogEntry::processing(step, "node-1", "agent");
        entry.complete(json!({"text": "done"}));
        fixture.finalize_last_log(entry);

        match &fixture.details {
            TaskDetails::Workflow {
                current_step,
                execution_log,
                ..
            } => {
                assert_eq!(*current_step, 1);
                assert_eq!(execution_log.len(), 1);
                assert_eq!(execution_log[0].status, StepLogStatus::Completed);
            }
            _ => panic!("Expected workflow details"),
        }
    }

    #[test]
    fn test_step_log_entry_fail() {
        let mut fixture = StepLogEntry::processing(2, "node-2", "condition");
        fixture.fail("missing field");

        assert_eq!(fixture.status, StepLogStatus::Failed);
        assert_eq!(fixture.error, Some("missing field".to_string()));
        assert!(fixture.output.is_none());
    }

    #[test]
    fn test_details_kind() {
        assert_eq!(
            TaskDetails::agent(Id::generate("agent")).kind(),
            TaskKind::AgentExecution
        );
        assert_eq!(
            TaskDetails::webhook_delivery(Id::generate("hook"), "agent.executed", json!({})).kind(),
            TaskKind::WebhookDelivery
        );
        assert_eq!(
            TaskDetails::notification(Id::generate("user"), "email", json!({})).kind(),
            TaskKind::Notification
        );
    }

    #[test]
    fn test_activity_entry_creation() {
        let fixture_tenant = Id::generate("tenant");
        let fixture_task = Id::generate("task");

        let actual = ActivityEntry::new(
            fixture_tenant.clone(),
            Some(Id::new("user_7")),
            "agent.execution.completed",
            fixture_task.clone(),
        );

        assert_eq!(actual.tenant_id, fixture_tenant);
        assert_eq!(actual.subject_id, fixture_task);
        assert!(actual.id.as_str().starts_with("act_"));
    }

    #[test]
    fn test_record_serialization_round_trip() {
        let fixture = fixture_record();
        let serialized = serde_json::to_string(&fixture).unwrap();
        let actual: TaskRecord = serde_json::from_str(&serialized).unwrap();
        assert_eq!(actual, fixture);
    }
}
