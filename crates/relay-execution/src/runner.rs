use crate::outcome::{TaskExecutor, TaskOutcome};
use crate::retry::RetryPolicy;
use crate::types::AgentConfig;
use relay_core::{
    JsonMap, TaskDetails, TaskId, TaskKind, TaskRecord, TaskStatus, TaskStore, TenantId, UserId,
    WorkflowId,
};
use relay_queue::{Dispatch, DispatchQueue, Lane, LaneRouter, QueueConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The pipeline facade: the enqueue API on one side, the per-lane worker
/// pools on the other.
///
/// Workers claim records through the store (at most one concurrent claim
/// per task id), hand them to the kind's executor, and drive the retry
/// policy on the tagged outcome. Backoff between attempts is expressed by
/// re-enqueueing the dispatch with a hold, never by sleeping a worker.
pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DispatchQueue>,
    router: LaneRouter,
    executors: HashMap<TaskKind, Arc<dyn TaskExecutor>>,
    policies: HashMap<TaskKind, RetryPolicy>,
    config: QueueConfig,
    shutdown: watch::Sender<bool>,
}

impl Pipeline {
    /// Wire a pipeline from its parts
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn DispatchQueue>,
        executors: Vec<Arc<dyn TaskExecutor>>,
        policies: HashMap<TaskKind, RetryPolicy>,
        config: QueueConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            queue,
            router: LaneRouter::new(),
            executors: executors
                .into_iter()
                .map(|executor| (executor.kind(), executor))
                .collect(),
            policies,
            config,
            shutdown,
        }
    }

    /// Enqueue an agent execution: persist the pending record, route it,
    /// return its id. Priority routing happens here, once — retries keep
    /// the lane.
    pub async fn enqueue_agent_execution(
        &self,
        tenant_id: TenantId,
        agent: &AgentConfig,
        input: JsonMap,
        triggered_by: Option<UserId>,
    ) -> relay_core::Result<TaskId> {
        let mut details = TaskDetails::agent(agent.agent_id.clone());
        if let TaskDetails::Agent {
            triggered_by_user_id,
            ..
        } = &mut details
        {
            *triggered_by_user_id = triggered_by;
        }

        let record = TaskRecord::new(tenant_id, input, details);
        let lane = self
            .router
            .lane_for(record.kind, agent.priority.is_high());
        self.submit(record, lane).await
    }

    /// Enqueue a workflow execution
    pub async fn enqueue_workflow_execution(
        &self,
        tenant_id: TenantId,
        workflow_id: WorkflowId,
        input: JsonMap,
        triggered_by: Option<UserId>,
    ) -> relay_core::Result<TaskId> {
        let mut details = TaskDetails::workflow(workflow_id);
        if let TaskDetails::Workflow {
            triggered_by_user_id,
            ..
        } = &mut details
        {
            *triggered_by_user_id = triggered_by;
        }

        let record = TaskRecord::new(tenant_id, input, details);
        let lane = self.router.lane_for(record.kind, false);
        self.submit(record, lane).await
    }

    async fn submit(&self, record: TaskRecord, lane: Lane) -> relay_core::Result<TaskId> {
        let dispatch = Dispatch::new(
            record.id.clone(),
            record.tenant_id.clone(),
            record.kind,
            lane,
        );
        let task_id = record.id.clone();

        self.store.insert(record).await?;
        self.queue.enqueue(dispatch).await?;

        info!(task_id = %task_id, lane = %lane, "task enqueued");
        Ok(task_id)
    }

    /// Spawn the per-lane worker pools
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for lane in Lane::ALL {
            for worker in 0..self.config.workers_for(lane) {
                let pipeline = self.clone();
                handles.push(tokio::spawn(async move {
                    pipeline.worker_loop(lane, worker).await;
                }));
            }
        }
        handles
    }

    /// Signal every worker to stop after its current task
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn worker_loop(&self, lane: Lane, worker: usize) {
        debug!(lane = %lane, worker, "worker started");
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.queue.dequeue(lane).await {
                Ok(Some(dispatch)) => {
                    self.process(dispatch).await;
                }
                Ok(None) => {
                    // Park until an enqueue wakes us; the periodic tick
                    // re-checks held dispatches whose hold has expired.
                    tokio::select! {
                        _ = self.queue.wait_for_work(lane) => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(dequeue_error) => {
                    error!(lane = %lane, error = %dequeue_error, "dequeue failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        debug!(lane = %lane, worker, "worker stopped");
    }

    /// Run one dispatch through claim, execution, and the retry decision.
    /// Workers call this in a loop; callers embedding the pipeline without
    /// spawned workers may drive it directly.
    pub async fn process(&self, dispatch: Dispatch) {
        let record = match self.store.get(&dispatch.task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(task_id = %dispatch.task_id, "dispatch references a missing record");
                return;
            }
            Err(store_error) => {
                error!(task_id = %dispatch.task_id, error = %store_error, "record lookup failed");
                return;
            }
        };

        // The conditional claim resolves races: of any number of workers
        // holding the same dispatch state, one wins the record.
        let claim = match record.status {
            TaskStatus::Pending => self.store.claim(&dispatch.task_id).await,
            TaskStatus::Failed => self.store.claim_retry(&dispatch.task_id).await,
            TaskStatus::Running | TaskStatus::Completed => {
                debug!(task_id = %dispatch.task_id, status = %record.status, "record not claimable");
                return;
            }
        };
        let claimed = match claim {
            Ok(claimed) => claimed,
            Err(claim_error) => {
                debug!(task_id = %dispatch.task_id, error = %claim_error, "claim lost");
                return;
            }
        };

        let Some(executor) = self.executors.get(&dispatch.kind) else {
            error!(kind = %dispatch.kind, "no executor registered for kind");
            let mut failed = claimed;
            failed.fail(format!("no executor registered for {}", dispatch.kind));
            if let Err(store_error) = self.store.update(failed).await {
                error!(error = %store_error, "failed to persist unroutable task");
            }
            return;
        };

        let attempt = claimed.attempt_count;
        let outcome = executor.execute(claimed).await;

        match outcome {
            TaskOutcome::Completed(_) | TaskOutcome::Skipped => {
                debug!(task_id = %dispatch.task_id, attempt, "attempt finished");
            }
            TaskOutcome::Fatal(fatal_error) => {
                error!(
                    task_id = %dispatch.task_id,
                    attempt,
                    error = %fatal_error,
                    "configuration fault; task failed permanently"
                );
            }
            TaskOutcome::Retryable(attempt_error) => {
                self.handle_retryable(dispatch, attempt, attempt_error, executor.as_ref())
                    .await;
            }
        }
    }

    async fn handle_retryable(
        &self,
        dispatch: Dispatch,
        attempt: u32,
        attempt_error: crate::ExecutionError,
        executor: &dyn TaskExecutor,
    ) {
        let policy = self
            .policies
            .get(&dispatch.kind)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::for_kind(dispatch.kind));

        if !policy.gives_up(attempt) {
            let backoff = policy.backoff_after(attempt);
            warn!(
                task_id = %dispatch.task_id,
                attempt,
                backoff_secs = backoff.as_secs(),
                error = %attempt_error,
                "attempt failed; retrying"
            );
            if let Err(queue_error) = self.queue.enqueue_after(dispatch, backoff).await {
                error!(error = %queue_error, "failed to schedule retry");
            }
            return;
        }

        // Out of retries: overwrite the error with the exhaustion wrapper.
        // The last attempt's failure event already stands; nothing further
        // is published.
        error!(
            task_id = %dispatch.task_id,
            attempts = attempt,
            error = %attempt_error,
            "maximum retry attempts exceeded; task failed permanently"
        );

        match self.store.get(&dispatch.task_id).await {
            Ok(Some(mut record)) => {
                record.fail(format!("Maximum retry attempts exceeded: {attempt_error}"));
                match self.store.update(record).await {
                    Ok(stored) => {
                        if let Err(hook_error) = executor.on_exhausted(&stored).await {
                            warn!(error = %hook_error, "exhaustion hook failed");
                        }
                    }
                    Err(store_error) => {
                        error!(error = %store_error, "failed to persist exhaustion");
                    }
                }
            }
            Ok(None) => warn!(task_id = %dispatch.task_id, "exhausted task record missing"),
            Err(store_error) => error!(error = %store_error, "failed to load exhausted task"),
        }
    }
}
