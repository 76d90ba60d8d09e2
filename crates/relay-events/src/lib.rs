//! # Relay Events
//!
//! In-process publish/subscribe for terminal-state facts. Delivery is
//! at-least-once with no ordering guarantee across listeners, so listeners
//! must be independent and tolerate re-delivery. The subscription table is
//! built once at startup and injected into the bus — there is no runtime
//! registration.

pub mod bus;
pub mod channels;
pub mod listeners;
pub mod registry;

pub use bus::EventBus;
pub use channels::{InMemoryPublisher, LoggingPublisher};
pub use listeners::{FailureNotifier, WebhookFanout};
pub use registry::{EventListener, ListenerRegistry};
