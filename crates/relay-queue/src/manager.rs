use crate::types::{Dispatch, Lane, LaneStats};
use async_trait::async_trait;
use relay_core::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Queue seam consumed by enqueuing callers (the pipeline facade and the
/// event listeners) and by the worker pools.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Place a dispatch on its lane, eligible immediately
    async fn enqueue(&self, dispatch: Dispatch) -> Result<()>;

    /// Place a dispatch on its lane held for `delay` (retry backoff)
    async fn enqueue_after(&self, dispatch: Dispatch, delay: Duration) -> Result<()>;

    /// Take the oldest ready dispatch off a lane, if any
    async fn dequeue(&self, lane: Lane) -> Result<Option<Dispatch>>;

    /// Wait until new work may have arrived on the lane.
    ///
    /// Wakes on enqueue; held dispatches becoming ready are discovered by
    /// the caller's periodic recheck, so this future alone must not be
    /// relied on for them.
    async fn wait_for_work(&self, lane: Lane);

    /// Current statistics for a lane
    async fn stats(&self, lane: Lane) -> Result<LaneStats>;
}

struct LaneState {
    items: VecDeque<Dispatch>,
    enqueued_total: u64,
    dequeued_total: u64,
}

impl LaneState {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            enqueued_total: 0,
            dequeued_total: 0,
        }
    }
}

/// In-memory lane queues.
///
/// Each lane is an independent FIFO; held items stay in place and become
/// eligible once their `not_before` passes, preserving arrival order among
/// ready items.
pub struct LaneQueues {
    lanes: HashMap<Lane, Mutex<LaneState>>,
    notifiers: HashMap<Lane, Arc<Notify>>,
}

impl LaneQueues {
    /// Create empty queues for every lane
    pub fn new() -> Self {
        let mut lanes = HashMap::new();
        let mut notifiers = HashMap::new();
        for lane in Lane::ALL {
            lanes.insert(lane, Mutex::new(LaneState::new()));
            notifiers.insert(lane, Arc::new(Notify::new()));
        }
        Self { lanes, notifiers }
    }

    fn lane(&self, lane: Lane) -> &Mutex<LaneState> {
        &self.lanes[&lane]
    }

    fn notifier(&self, lane: Lane) -> &Notify {
        &self.notifiers[&lane]
    }
}

impl Default for LaneQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchQueue for LaneQueues {
    async fn enqueue(&self, dispatch: Dispatch) -> Result<()> {
        let lane = dispatch.lane;
        {
            let mut state = self.lane(lane).lock().await;
            state.items.push_back(dispatch);
            state.enqueued_total += 1;
        }
        debug!(lane = %lane, "dispatch enqueued");
        self.notifier(lane).notify_one();
        Ok(())
    }

    async fn enqueue_after(&self, dispatch: Dispatch, delay: Duration) -> Result<()> {
        let held = dispatch.held_for(delay);
        debug!(
            lane = %held.lane,
            task_id = %held.task_id,
            delay_ms = delay.as_millis() as u64,
            "dispatch held for retry"
        );
        self.enqueue(held).await
    }

    async fn dequeue(&self, lane: Lane) -> Result<Option<Dispatch>> {
        let now = chrono::Utc::now();
        let mut state = self.lane(lane).lock().await;

        let position = state.items.iter().position(|item| item.is_ready(now));
        if let Some(position) = position {
            state.dequeued_total += 1;
            return Ok(state.items.remove(position));
        }

        Ok(None)
    }

    async fn wait_for_work(&self, lane: Lane) {
        self.notifier(lane).notified().await;
    }

    async fn stats(&self, lane: Lane) -> Result<LaneStats> {
        let now = chrono::Utc::now();
        let state = self.lane(lane).lock().await;

        let mut stats = LaneStats::new(lane);
        stats.ready = state.items.iter().filter(|i| i.is_ready(now)).count();
        stats.held = state.items.len() - stats.ready;
        stats.enqueued_total = state.enqueued_total;
        stats.dequeued_total = state.dequeued_total;
        Ok(stats)
    }
}
