//! # Relay Core
//!
//! Foundational types for the relay task pipeline: task records, webhook
//! endpoint records, terminal-state events, shared errors, and the traits
//! the executors use to reach their collaborators (record store, inference
//! backend, notification sender, activity recorder, channel publisher).
//!
//! Everything here is pure data plus seams; behavior lives in the store,
//! queue, event, and execution crates.

pub mod error;
pub mod event;
pub mod id;
pub mod task;
pub mod traits;
pub mod webhook;

pub use error::{Error, Result};
pub use event::{EventName, PipelineEvent};
pub use id::{AgentId, Id, TaskId, TenantId, UserId, WebhookId, WorkflowId};
pub use task::{
    ActivityEntry, StepLogEntry, StepLogStatus, TaskDetails, TaskKind, TaskRecord, TaskStatus,
};
pub use traits::{
    ActivityRecorder, ChannelPublisher, InferenceBackend, InferenceOutput, NotificationSender,
    TaskStore, WebhookStore,
};
pub use webhook::Webhook;

/// Common type aliases used across the workspace
pub type DateTime = chrono::DateTime<chrono::Utc>;
pub type Json = serde_json::Value;
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
