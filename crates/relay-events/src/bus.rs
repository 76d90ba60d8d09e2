use crate::registry::ListenerRegistry;
use relay_core::{ChannelPublisher, PipelineEvent, Result, TaskStore};
use std::sync::Arc;
use tracing::{debug, error, info};

/// In-process event bus.
///
/// Publishing records the event durably first, then publishes the external
/// payload on its channels, then fans out to subscribed listeners. Channel
/// and listener faults are logged and swallowed — by then the fact has
/// already been recorded and the publisher's state must stand.
pub struct EventBus {
    registry: ListenerRegistry,
    store: Arc<dyn TaskStore>,
    channels: Arc<dyn ChannelPublisher>,
}

impl EventBus {
    /// Create a bus with a fixed listener table
    pub fn new(
        registry: ListenerRegistry,
        store: Arc<dyn TaskStore>,
        channels: Arc<dyn ChannelPublisher>,
    ) -> Self {
        Self {
            registry,
            store,
            channels,
        }
    }

    /// Publish one event to the log, the external channels, and every
    /// subscribed listener.
    pub async fn publish(&self, event: PipelineEvent) -> Result<()> {
        event.validate()?;

        self.store.record_event(&event).await?;

        let payload = event.external_payload();
        for channel in event.channels() {
            if let Err(publish_error) = self.channels.publish(&channel, &payload).await {
                error!(
                    channel = %channel,
                    event = %event.name,
                    error = %publish_error,
                    "channel publication failed"
                );
            }
        }

        let listeners = self.registry.listeners_for(event.name);
        debug!(
            event = %event.name,
            listeners = listeners.len(),
            "fanning out event"
        );

        for listener in listeners {
            if let Err(listener_error) = listener.handle(&event).await {
                error!(
                    listener = listener.name(),
                    event = %event.name,
                    error = %listener_error,
                    "listener failed; event stands"
                );
            }
        }

        info!(event = %event.name, task_id = %event.task.id, "event published");
        Ok(())
    }
}
