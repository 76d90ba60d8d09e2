use thiserror::Error;

/// Shared error type for the relay pipeline crates
#[derive(Error, Debug)]
pub enum Error {
    #[error("Task error: {message}")]
    Task { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Event error: {message}")]
    Event { message: String },

    #[error("Webhook error: {message}")]
    Webhook { message: String },

    #[error("Notification error: {message}")]
    Notification { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a new task error
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a new event error
    pub fn event(message: impl Into<String>) -> Self {
        Self::Event {
            message: message.into(),
        }
    }

    /// Create a new webhook error
    pub fn webhook(message: impl Into<String>) -> Self {
        Self::Webhook {
            message: message.into(),
        }
    }

    /// Create a new notification error
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
