use crate::outcome::{TaskExecutor, TaskOutcome};
use crate::ExecutionError;
use async_trait::async_trait;
use relay_core::{
    Json, JsonMap, NotificationSender, TaskDetails, TaskKind, TaskRecord, TaskStore,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Supported notification channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Email,
    Push,
    Sms,
}

impl NotificationType {
    /// Wire name passed to the sender
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Push => "push",
            Self::Sms => "sms",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "push" => Ok(Self::Push),
            "sms" => Ok(Self::Sms),
            _ => Err(format!("Unknown notification type: {s}")),
        }
    }
}

/// Runs one notification send through the dispatch collaborator.
///
/// An unknown notification type is a configuration fault and fails the
/// task immediately; everything else feeds the retry policy.
pub struct NotificationExecutor {
    store: Arc<dyn TaskStore>,
    sender: Arc<dyn NotificationSender>,
    attempt_timeout: Duration,
}

impl NotificationExecutor {
    /// Create an executor; `attempt_timeout` comes from the notification
    /// retry policy.
    pub fn new(
        store: Arc<dyn TaskStore>,
        sender: Arc<dyn NotificationSender>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            attempt_timeout,
        }
    }

    async fn persist_failure(&self, mut record: TaskRecord, error: &ExecutionError) {
        record.fail(error.to_string());
        if let Err(store_error) = self.store.update(record).await {
            warn!(error = %store_error, "failed to persist notification failure");
        }
    }
}

#[async_trait]
impl TaskExecutor for NotificationExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Notification
    }

    async fn execute(&self, mut record: TaskRecord) -> TaskOutcome {
        let (user_id, raw_type, data) = match &record.details {
            TaskDetails::Notification {
                user_id,
                notification_type,
                data,
            } => (user_id.clone(), notification_type.clone(), data.clone()),
            _ => {
                let error = ExecutionError::configuration(
                    "notification executor received a non-notification task",
                );
                self.persist_failure(record, &error).await;
                return TaskOutcome::Fatal(error);
            }
        };

        let notification_type = match NotificationType::from_str(&raw_type) {
            Ok(parsed) => parsed,
            Err(_) => {
                let error = ExecutionError::unknown_notification_type(raw_type);
                self.persist_failure(record, &error).await;
                return TaskOutcome::Fatal(error);
            }
        };

        let send = tokio::time::timeout(
            self.attempt_timeout,
            self.sender
                .send(&user_id, notification_type.as_str(), &data),
        )
        .await;

        match send {
            Ok(Ok(())) => {
                let mut output = JsonMap::new();
                output.insert("sent".to_string(), Json::Bool(true));
                record.complete(output.clone());
                if let Err(store_error) = self.store.update(record).await {
                    warn!(error = %store_error, "failed to persist notification completion");
                }
                info!(user_id = %user_id, channel = notification_type.as_str(), "notification sent");
                TaskOutcome::Completed(output)
            }
            Ok(Err(send_error)) => {
                let error = ExecutionError::transport(send_error.to_string());
                self.persist_failure(record, &error).await;
                TaskOutcome::Retryable(error)
            }
            Err(_elapsed) => {
                let error = ExecutionError::timeout(self.attempt_timeout);
                self.persist_failure(record, &error).await;
                TaskOutcome::Retryable(error)
            }
        }
    }
}
