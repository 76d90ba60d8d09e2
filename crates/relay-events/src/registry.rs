use async_trait::async_trait;
use relay_core::{EventName, PipelineEvent, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A subscriber to published pipeline events.
///
/// Listeners must not fail for control flow: a returned error is logged by
/// the bus and never rolls back the publisher's completed state.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Process one event
    async fn handle(&self, event: &PipelineEvent) -> Result<()>;

    /// Listener name for logs
    fn name(&self) -> &str;
}

/// Static event → listener table.
///
/// Built once at process start with explicit `register` calls, then handed
/// to the bus; nothing mutates it afterwards.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<EventName, Vec<Arc<dyn EventListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to an event name
    pub fn register(&mut self, event: EventName, listener: Arc<dyn EventListener>) {
        self.listeners.entry(event).or_default().push(listener);
    }

    /// Subscribe a listener to several event names at once
    pub fn register_all(&mut self, events: &[EventName], listener: Arc<dyn EventListener>) {
        for event in events {
            self.register(*event, listener.clone());
        }
    }

    /// Listeners subscribed to an event name, in registration order
    pub fn listeners_for(&self, event: EventName) -> &[Arc<dyn EventListener>] {
        self.listeners.get(&event).map_or(&[], Vec::as_slice)
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Check whether the registry has no subscriptions
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
