use crate::types::Lane;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue and worker-pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct QueueConfig {
    /// Workers consuming the high-priority lane
    pub high_workers: usize,
    /// Workers consuming the default lane
    pub default_workers: usize,
    /// Workers consuming the notifications lane
    pub notification_workers: usize,
    /// Workers consuming the webhooks lane
    pub webhook_workers: usize,
    /// How often an idle worker rechecks its lane for held dispatches
    /// whose hold has expired
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_workers: 2,
            default_workers: 4,
            notification_workers: 2,
            webhook_workers: 2,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    /// Worker count for a lane
    pub fn workers_for(&self, lane: Lane) -> usize {
        match lane {
            Lane::High => self.high_workers,
            Lane::Default => self.default_workers,
            Lane::Notifications => self.notification_workers,
            Lane::Webhooks => self.webhook_workers,
        }
    }
}
