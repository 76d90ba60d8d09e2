use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque unique identifier, assigned at creation and immutable after.
///
/// Ids are uuid-v4 strings carrying a short kind prefix (`task_…`,
/// `hook_…`, `evt_…`) so log lines and payloads stay self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

/// Identifies a task record
pub type TaskId = Id;
/// Identifies the owning tenant
pub type TenantId = Id;
/// Identifies an agent configuration
pub type AgentId = Id;
/// Identifies a workflow definition
pub type WorkflowId = Id;
/// Identifies a webhook endpoint
pub type WebhookId = Id;
/// Identifies an end user
pub type UserId = Id;

impl Id {
    /// Wrap an existing identifier string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id with the given kind prefix
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}_{}", prefix, uuid::Uuid::new_v4()))
    }

    /// Borrow the string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the owned string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
