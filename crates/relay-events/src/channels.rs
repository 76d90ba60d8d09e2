use async_trait::async_trait;
use relay_core::{ChannelPublisher, Json, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Reference channel publisher: logs every payload.
///
/// Production deployments replace this with the socket fan-out
/// collaborator; executors and the bus only see the trait.
#[derive(Debug, Default)]
pub struct LoggingPublisher;

impl LoggingPublisher {
    /// Create a publisher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelPublisher for LoggingPublisher {
    async fn publish(&self, channel: &str, payload: &Json) -> Result<()> {
        info!(channel, %payload, "channel publish");
        Ok(())
    }
}

/// In-memory channel publisher, kept for embedding and assertions.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: Arc<RwLock<Vec<(String, Json)>>>,
}

impl InMemoryPublisher {
    /// Create a publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order
    pub async fn published(&self) -> Vec<(String, Json)> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl ChannelPublisher for InMemoryPublisher {
    async fn publish(&self, channel: &str, payload: &Json) -> Result<()> {
        self.published
            .write()
            .await
            .push((channel.to_string(), payload.clone()));
        Ok(())
    }
}
