use crate::types::Lane;
use relay_core::TaskKind;

/// Static, pre-dispatch lane selection.
///
/// The decision is made once at enqueue time and stamped onto the
/// dispatch; retries keep their original lane.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneRouter;

impl LaneRouter {
    /// Create a router
    pub fn new() -> Self {
        Self
    }

    /// Pick the lane for a task.
    ///
    /// `high_priority` reflects the agent configuration's priority flag;
    /// it only matters for executions, never for notification or webhook
    /// work, which always get their dedicated lanes.
    pub fn lane_for(&self, kind: TaskKind, high_priority: bool) -> Lane {
        match kind {
            TaskKind::AgentExecution | TaskKind::WorkflowExecution => {
                if high_priority {
                    Lane::High
                } else {
                    Lane::Default
                }
            }
            TaskKind::Notification => Lane::Notifications,
            TaskKind::WebhookDelivery => Lane::Webhooks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_agent_routing_by_priority() {
        let fixture = LaneRouter::new();

        let actual = fixture.lane_for(TaskKind::AgentExecution, true);
        assert_eq!(actual, Lane::High);

        let actual = fixture.lane_for(TaskKind::AgentExecution, false);
        assert_eq!(actual, Lane::Default);
    }

    #[test]
    fn test_dedicated_lanes_ignore_priority() {
        let fixture = LaneRouter::new();

        assert_eq!(
            fixture.lane_for(TaskKind::Notification, true),
            Lane::Notifications
        );
        assert_eq!(
            fixture.lane_for(TaskKind::WebhookDelivery, true),
            Lane::Webhooks
        );
    }

    #[test]
    fn test_workflow_routing() {
        let fixture = LaneRouter::new();

        assert_eq!(
            fixture.lane_for(TaskKind::WorkflowExecution, false),
            Lane::Default
        );
        assert_eq!(
            fixture.lane_for(TaskKind::WorkflowExecution, true),
            Lane::High
        );
    }
}
