use crate::id::{Id, TenantId, WebhookId};
use crate::DateTime;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Consecutive terminal delivery failures after which an endpoint is
/// disabled and requires manual re-enable.
pub const AUTO_DISABLE_THRESHOLD: u64 = 10;

/// A tenant-owned webhook endpoint subscribed to a set of event names.
///
/// The record is read by the delivery executor; its counters are mutated
/// only through the store's atomic operations so concurrent deliveries for
/// the same endpoint never lose an increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Webhook {
    /// Unique endpoint identifier
    #[setters(skip)]
    pub id: WebhookId,
    /// Owning tenant
    #[setters(skip)]
    pub tenant_id: TenantId,
    /// Target URL, POSTed to on delivery
    pub url: String,
    /// Event names this endpoint subscribes to
    pub events: Vec<String>,
    /// Shared secret for HMAC-SHA256 signatures
    pub secret: Option<String>,
    /// Custom headers attached to every delivery (fixed headers win)
    pub headers: HashMap<String, String>,
    /// Disabled endpoints are skipped silently
    pub is_active: bool,
    /// Successful deliveries over the endpoint's lifetime
    pub total_calls: u64,
    /// Failed delivery attempts over the endpoint's lifetime
    pub failed_calls: u64,
    /// Last successful delivery
    pub last_triggered_at: Option<DateTime>,
}

impl Webhook {
    /// Create a new active endpoint
    pub fn new(tenant_id: TenantId, url: impl Into<String>, events: Vec<String>) -> Self {
        Self {
            id: Id::generate("hook"),
            tenant_id,
            url: url.into(),
            events,
            secret: None,
            headers: HashMap::new(),
            is_active: true,
            total_calls: 0,
            failed_calls: 0,
            last_triggered_at: None,
        }
    }

    /// Check whether the endpoint subscribes to an event name
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    /// Record one successful delivery
    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.last_triggered_at = Some(chrono::Utc::now());
    }

    /// Record one failed delivery attempt
    pub fn record_failure(&mut self) {
        self.failed_calls += 1;
    }

    /// Check whether the failure counter has crossed the disable threshold
    pub fn should_disable(&self) -> bool {
        self.failed_calls >= AUTO_DISABLE_THRESHOLD
    }
}
