use thiserror::Error;

/// Result type for execution operations
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Executor error types.
///
/// The fatal/transient split mirrors the pipeline's taxonomy: transient
/// faults feed the retry policy, fatal ones fail the task immediately
/// because no retry can fix a bad configuration.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The inference backend returned an error
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// A bounded call did not finish in time
    #[error("Timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A webhook endpoint answered with a non-success status
    #[error("Webhook delivery failed with status {status}")]
    Http { status: u16 },

    /// The HTTP request could not be completed
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A workflow node handler faulted
    #[error("Node {node_id} failed: {message}")]
    Node { node_id: String, message: String },

    /// A workflow definition names a node type no handler exists for
    #[error("Unknown node type: {node_type}")]
    UnknownNodeType { node_type: String },

    /// A notification task names a channel the sender does not support
    #[error("Unknown notification type: {notification_type}")]
    UnknownNotificationType { notification_type: String },

    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Error from the core/store layer
    #[error("{0}")]
    Core(#[from] relay_core::Error),
}

impl ExecutionError {
    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create an HTTP status error
    pub fn http(status: u16) -> Self {
        Self::Http { status }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a node failure error
    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Node {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-node-type error
    pub fn unknown_node_type(node_type: impl Into<String>) -> Self {
        Self::UnknownNodeType {
            node_type: node_type.into(),
        }
    }

    /// Create an unknown-notification-type error
    pub fn unknown_notification_type(notification_type: impl Into<String>) -> Self {
        Self::UnknownNotificationType {
            notification_type: notification_type.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check whether the fault is a configuration problem no retry fixes
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownNodeType { .. }
                | Self::UnknownNotificationType { .. }
                | Self::Configuration { .. }
        )
    }

    /// Error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Backend { .. } => "backend",
            Self::Timeout { .. } => "timeout",
            Self::Http { .. } => "http",
            Self::Transport { .. } => "transport",
            Self::Node { .. } => "node",
            Self::UnknownNodeType { .. } => "unknown_node_type",
            Self::UnknownNotificationType { .. } => "unknown_notification_type",
            Self::Configuration { .. } => "configuration",
            Self::Core(_) => "core",
        }
    }
}
