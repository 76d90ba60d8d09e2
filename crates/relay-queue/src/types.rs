use relay_core::{DateTime, Id, TaskId, TaskKind, TenantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named queue partitions consumed by independent worker pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// High-priority agent and workflow executions
    High,
    /// Everything without an explicit priority
    Default,
    /// Notification sends
    Notifications,
    /// Webhook deliveries
    Webhooks,
}

impl Lane {
    /// All lanes, in the order worker pools are brought up
    pub const ALL: [Lane; 4] = [Lane::High, Lane::Default, Lane::Notifications, Lane::Webhooks];

    /// Lane name used in logs and stats
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Default => "default",
            Self::Notifications => "notifications",
            Self::Webhooks => "webhooks",
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One routed unit of work sitting in a lane.
///
/// A dispatch references its task record by id; the record itself lives in
/// the store. `not_before` holds the item in the lane until the backoff
/// window has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Unique dispatch identifier
    pub id: Id,
    /// Task record this dispatch executes
    pub task_id: TaskId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Task kind, used by the worker to pick an executor
    pub kind: TaskKind,
    /// Lane the router assigned (fixed; not re-evaluated on retry)
    pub lane: Lane,
    /// When the dispatch entered the queue
    pub enqueued_at: DateTime,
    /// Earliest time a worker may pick the dispatch up
    pub not_before: DateTime,
}

impl Dispatch {
    /// Create a dispatch eligible immediately
    pub fn new(task_id: TaskId, tenant_id: TenantId, kind: TaskKind, lane: Lane) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Id::generate("disp"),
            task_id,
            tenant_id,
            kind,
            lane,
            enqueued_at: now,
            not_before: now,
        }
    }

    /// Hold the dispatch until `delay` from now has passed
    pub fn held_for(mut self, delay: Duration) -> Self {
        self.not_before = chrono::Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        self
    }

    /// Check whether a worker may pick the dispatch up
    pub fn is_ready(&self, now: DateTime) -> bool {
        now >= self.not_before
    }
}

/// Per-lane queue statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneStats {
    /// Lane these numbers describe
    pub lane: Lane,
    /// Items currently eligible for pickup
    pub ready: usize,
    /// Items held by a `not_before` in the future
    pub held: usize,
    /// Total dispatches ever enqueued on the lane
    pub enqueued_total: u64,
    /// Total dispatches handed to workers
    pub dequeued_total: u64,
}

impl LaneStats {
    /// Empty stats for a lane
    pub fn new(lane: Lane) -> Self {
        Self {
            lane,
            ready: 0,
            held: 0,
            enqueued_total: 0,
            dequeued_total: 0,
        }
    }

    /// Items currently in the lane, ready or held
    pub fn depth(&self) -> usize {
        self.ready + self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture_dispatch(lane: Lane) -> Dispatch {
        Dispatch::new(
            Id::generate("task"),
            Id::generate("tenant"),
            TaskKind::AgentExecution,
            lane,
        )
    }

    #[test]
    fn test_lane_as_str() {
        assert_eq!(Lane::High.as_str(), "high");
        assert_eq!(Lane::Default.as_str(), "default");
        assert_eq!(Lane::Notifications.as_str(), "notifications");
        assert_eq!(Lane::Webhooks.as_str(), "webhooks");
    }

    #[test]
    fn test_lane_all_covers_every_lane() {
        assert_eq!(Lane::ALL.len(), 4);
    }

    #[test]
    fn test_dispatch_creation_is_ready() {
        let actual = fixture_dispatch(Lane::Default);

        assert!(actual.is_ready(chrono::Utc::now()));
        assert_eq!(actual.lane, Lane::Default);
        assert!(actual.id.as_str().starts_with("disp_"));
    }

    #[test]
    fn test_dispatch_held_for() {
        let fixture = fixture_dispatch(Lane::Webhooks).held_for(Duration::from_secs(30));

        assert!(!fixture.is_ready(chrono::Utc::now()));
        assert!(fixture.is_ready(chrono::Utc::now() + chrono::Duration::seconds(31)));
    }

    #[test]
    fn test_lane_stats_depth() {
        let mut fixture = LaneStats::new(Lane::High);
        fixture.ready = 3;
        fixture.held = 2;

        let actual = fixture.depth();
        let expected = 5;
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_dispatch_serialization_round_trip() {
        let fixture = fixture_dispatch(Lane::Notifications);
        let serialized = serde_json::to_string(&fixture).unwrap();
        let actual: Dispatch = serde_json::from_str(&serialized).unwrap();
        assert_eq!(actual, fixture);
    }
}
