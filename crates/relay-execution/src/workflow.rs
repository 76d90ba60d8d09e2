use crate::outcome::{TaskExecutor, TaskOutcome};
use crate::types::{DefinitionSource, NodeType, WorkflowNode};
use crate::{ExecutionError, Result};
use async_trait::async_trait;
use relay_core::{
    EventName, InferenceBackend, Json, JsonMap, PipelineEvent, StepLogEntry, TaskDetails,
    TaskKind, TaskRecord, TaskStore,
};
use relay_events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Handler for one workflow node type: `(node, accumulated data) ->
/// partial output`, merged into the accumulation by the step machine.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The node type this handler runs
    fn node_type(&self) -> NodeType;

    /// Run one node against the accumulated data
    async fn handle(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap>;
}

/// Fixed node type → handler table, built at construction.
#[derive(Default)]
pub struct NodeHandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl NodeHandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its node type
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(handler.node_type(), handler);
    }

    /// Handler for a node type
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registry with the four standard handlers
    pub fn standard(backend: Arc<dyn InferenceBackend>, http_timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AgentNodeHandler { backend }));
        registry.register(Arc::new(ConditionNodeHandler));
        registry.register(Arc::new(TransformNodeHandler));
        registry.register(Arc::new(ApiCallNodeHandler::new(http_timeout)));
        registry
    }
}

/// Runs the node's configuration through the inference backend and merges
/// the model output.
pub struct AgentNodeHandler {
    backend: Arc<dyn InferenceBackend>,
}

#[async_trait]
impl NodeHandler for AgentNodeHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Agent
    }

    async fn handle(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap> {
        let output = self
            .backend
            .infer(&node.config, data)
            .await
            .map_err(|e| ExecutionError::backend(e.to_string()))?;
        Ok(output.output)
    }
}

/// Evaluates a predicate over the accumulated data and records the verdict
/// under `<node_id>_result`.
pub struct ConditionNodeHandler;

#[async_trait]
impl NodeHandler for ConditionNodeHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    async fn handle(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap> {
        let field = node
            .config
            .get("field")
            .and_then(Json::as_str)
            .ok_or_else(|| {
                ExecutionError::configuration(format!("condition node {} has no field", node.id))
            })?;
        let operator = node
            .config
            .get("operator")
            .and_then(Json::as_str)
            .ok_or_else(|| {
                ExecutionError::configuration(format!(
                    "condition node {} has no operator",
                    node.id
                ))
            })?;

        let current = data.get(field);
        let expected = node.config.get("value");

        let verdict = match operator {
            "equals" => current == expected,
            "not_equals" => current != expected,
            "contains" => match (current, expected) {
                (Some(Json::String(haystack)), Some(Json::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Json::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
            "exists" => current.is_some(),
            other => {
                return Err(ExecutionError::configuration(format!(
                    "condition node {} has unknown operator {other}",
                    node.id
                )));
            }
        };

        let mut output = JsonMap::new();
        output.insert(format!("{}_result", node.id), Json::Bool(verdict));
        Ok(output)
    }
}

/// Pure remapping of the accumulated data: `mapping` copies existing
/// values under new keys, `set` writes literals.
pub struct TransformNodeHandler;

#[async_trait]
impl NodeHandler for TransformNodeHandler {
    fn node_type(&self) -> NodeType {
        NodeType::Transform
    }

    async fn handle(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap> {
        let mut output = JsonMap::new();

        if let Some(mapping) = node.config.get("mapping").and_then(Json::as_object) {
            for (target, source) in mapping {
                let source_key = source.as_str().ok_or_else(|| {
                    ExecutionError::configuration(format!(
                        "transform node {} maps {target} from a non-string key",
                        node.id
                    ))
                })?;
                if let Some(value) = data.get(source_key) {
                    output.insert(target.clone(), value.clone());
                }
            }
        }

        if let Some(literals) = node.config.get("set").and_then(Json::as_object) {
            for (key, value) in literals {
                output.insert(key.clone(), value.clone());
            }
        }

        Ok(output)
    }
}

/// POSTs the accumulated data to the node's URL and records the response.
pub struct ApiCallNodeHandler {
    client: reqwest::Client,
}

impl ApiCallNodeHandler {
    /// Create a handler with a bounded request timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl NodeHandler for ApiCallNodeHandler {
    fn node_type(&self) -> NodeType {
        NodeType::ApiCall
    }

    async fn handle(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap> {
        let url = node
            .config
            .get("url")
            .and_then(Json::as_str)
            .ok_or_else(|| {
                ExecutionError::configuration(format!("api_call node {} has no url", node.id))
            })?;

        let method = node
            .config
            .get("method")
            .and_then(Json::as_str)
            .unwrap_or("POST");
        let request = match method {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url).json(&Json::Object(data.clone())),
            other => {
                return Err(ExecutionError::configuration(format!(
                    "api_call node {} has unsupported method {other}",
                    node.id
                )));
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body: Json = response.json().await.unwrap_or(Json::Null);

        let mut output = JsonMap::new();
        output.insert(format!("{}_status", node.id), Json::from(status));
        output.insert(format!("{}_response", node.id), body);
        Ok(output)
    }
}

/// Runs one workflow execution: a sequential interpreter over the
/// definition's node list. Edges in the definition never change traversal
/// order. There is no per-node retry — the first node fault aborts the
/// whole workflow, and the outer retry layer reruns the task from node
/// one.
pub struct WorkflowExecutor {
    store: Arc<dyn TaskStore>,
    bus: Arc<EventBus>,
    definitions: Arc<dyn DefinitionSource>,
    handlers: NodeHandlerRegistry,
    node_timeout: Duration,
}

impl WorkflowExecutor {
    /// Create an executor; `node_timeout` bounds each node's external call
    /// and comes from the workflow retry policy.
    pub fn new(
        store: Arc<dyn TaskStore>,
        bus: Arc<EventBus>,
        definitions: Arc<dyn DefinitionSource>,
        handlers: NodeHandlerRegistry,
        node_timeout: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            definitions,
            handlers,
            node_timeout,
        }
    }

    async fn fail_and_publish(&self, mut record: TaskRecord, error: ExecutionError) -> TaskOutcome {
        record.fail(error.to_string());

        match self.store.update(record).await {
            Ok(stored) => {
                let event =
                    PipelineEvent::failure(EventName::WorkflowFailed, stored, error.to_string());
                if let Err(publish_error) = self.bus.publish(event).await {
                    warn!(error = %publish_error, "failed to publish workflow failure event");
                }
            }
            Err(store_error) => {
                warn!(error = %store_error, "failed to persist workflow failure");
            }
        }

        TaskOutcome::from_error(error)
    }

    async fn run_node(&self, node: &WorkflowNode, data: &JsonMap) -> Result<JsonMap> {
        let node_type: NodeType = node
            .node_type
            .parse()
            .map_err(|_| ExecutionError::unknown_node_type(&node.node_type))?;
        let handler = self
            .handlers
            .get(node_type)
            .ok_or_else(|| ExecutionError::unknown_node_type(&node.node_type))?;

        match tokio::time::timeout(self.node_timeout, handler.handle(node, data)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ExecutionError::timeout(self.node_timeout)),
        }
    }
}

#[async_trait]
impl TaskExecutor for WorkflowExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::WorkflowExecution
    }

    async fn execute(&self, mut record: TaskRecord) -> TaskOutcome {
        let workflow_id = match &record.details {
            TaskDetails::Workflow { workflow_id, .. } => workflow_id.clone(),
            _ => {
                let error =
                    ExecutionError::configuration("workflow executor received a non-workflow task");
                return self.fail_and_publish(record, error).await;
            }
        };

        let definition = match self.definitions.workflow_definition(&workflow_id).await {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                let error = ExecutionError::configuration(format!(
                    "no definition for workflow {workflow_id}"
                ));
                return self.fail_and_publish(record, error).await;
            }
            Err(source_error) => {
                return self
                    .fail_and_publish(record, ExecutionError::from(source_error))
                    .await;
            }
        };

        info!(
            task_id = %record.id,
            workflow_id = %workflow_id,
            nodes = definition.nodes.len(),
            "starting workflow execution"
        );

        let mut data = record.input_data.clone();

        for node in &definition.nodes {
            // Progress is observable mid-run: the step counter and the
            // processing entry hit the store before the node executes.
            let step = record.advance_step();
            record.append_log(StepLogEntry::processing(step, &node.id, &node.node_type));
            record = match self.store.update(record).await {
                Ok(stored) => stored,
                Err(store_error) => {
                    warn!(error = %store_error, "failed to persist workflow progress");
                    return TaskOutcome::Retryable(ExecutionError::from(store_error));
                }
            };

            match self.run_node(node, &data).await {
                Ok(partial) => {
                    // Later keys overwrite earlier ones of the same name
                    for (key, value) in &partial {
                        data.insert(key.clone(), value.clone());
                    }

                    let mut entry = StepLogEntry::processing(step, &node.id, &node.node_type);
                    entry.complete(Json::Object(partial));
                    record.finalize_last_log(entry);
                    record = match self.store.update(record).await {
                        Ok(stored) => stored,
                        Err(store_error) => {
                            warn!(error = %store_error, "failed to persist workflow progress");
                            return TaskOutcome::Retryable(ExecutionError::from(store_error));
                        }
                    };
                }
                Err(node_error) => {
                    let wrapped = if node_error.is_fatal() {
                        node_error
                    } else {
                        ExecutionError::node(&node.id, node_error.to_string())
                    };

                    let mut entry = StepLogEntry::processing(step, &node.id, &node.node_type);
                    entry.fail(wrapped.to_string());
                    record.finalize_last_log(entry);

                    // The whole workflow aborts; no further nodes run
                    return self.fail_and_publish(record, wrapped).await;
                }
            }
        }

        record.complete(data.clone());
        let stored = match self.store.update(record).await {
            Ok(stored) => stored,
            Err(store_error) => {
                warn!(error = %store_error, "failed to persist workflow completion");
                return TaskOutcome::Retryable(ExecutionError::from(store_error));
            }
        };

        if let Err(publish_error) = self
            .bus
            .publish(PipelineEvent::new(EventName::WorkflowCompleted, stored))
            .await
        {
            warn!(error = %publish_error, "failed to publish workflow completion event");
        }

        TaskOutcome::Completed(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InMemoryDefinitions, WorkflowDefinition};
    use pretty_assertions::assert_eq;
    use relay_core::{
        ChannelPublisher, Id, InferenceBackend, InferenceOutput, StepLogStatus, TaskStatus,
    };
    use relay_events::ListenerRegistry;
    use relay_store::InMemoryTaskStore;
    use serde_json::json;

    struct NullPublisher;

    #[async_trait]
    impl ChannelPublisher for NullPublisher {
        async fn publish(&self, _channel: &str, _payload: &Json) -> relay_core::Result<()> {
            Ok(())
        }
    }

    struct EchoBackend;

    #[async_trait]
    impl InferenceBackend for EchoBackend {
        async fn infer(
            &self,
            _config: &Json,
            _input: &JsonMap,
        ) -> relay_core::Result<InferenceOutput> {
            let mut output = JsonMap::new();
            output.insert("agent_reply".to_string(), json!("done"));
            Ok(InferenceOutput {
                output,
                tokens_used: 5,
                cost: 0.0001,
            })
        }
    }

    async fn harness(definition: WorkflowDefinition) -> (Arc<InMemoryTaskStore>, WorkflowExecutor) {
        let store = Arc::new(InMemoryTaskStore::new());
        let definitions = Arc::new(InMemoryDefinitions::new());
        definitions.put_workflow(definition).await;

        let bus = Arc::new(EventBus::new(
            ListenerRegistry::new(),
            store.clone(),
            Arc::new(NullPublisher),
        ));
        let handlers =
            NodeHandlerRegistry::standard(Arc::new(EchoBackend), Duration::from_secs(30));
        let executor = WorkflowExecutor::new(
            store.clone(),
            bus,
            definitions,
            handlers,
            Duration::from_secs(600),
        );
        (store, executor)
    }

    async fn claimed_workflow_task(
        store: &InMemoryTaskStore,
        workflow: &str,
        input: JsonMap,
    ) -> TaskRecord {
        let record = TaskRecord::new(
            Id::new("tenant_1"),
            input,
            TaskDetails::workflow(Id::new(workflow)),
        );
        store.insert(record.clone()).await.unwrap();
        store.claim(&record.id).await.unwrap()
    }

    fn triage_definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            Id::new("wf_1"),
            "triage",
            vec![
                WorkflowNode::new("summarize", "agent", json!({})),
                WorkflowNode::new(
                    "check",
                    "condition",
                    json!({"field": "agent_reply", "operator": "equals", "value": "done"}),
                ),
                WorkflowNode::new(
                    "shape",
                    "transform",
                    json!({"mapping": {"summary": "agent_reply"}, "set": {"source": "relay"}}),
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_workflow_runs_nodes_in_order() {
        let (store, executor) = harness(triage_definition()).await;
        let mut input = JsonMap::new();
        input.insert("message".to_string(), json!("hi"));
        let claimed = claimed_workflow_task(&store, "wf_1", input).await;

        let actual = executor.execute(claimed.clone()).await;

        let TaskOutcome::Completed(data) = actual else {
            panic!("Expected completion");
        };
        assert_eq!(data["agent_reply"], json!("done"));
        assert_eq!(data["check_result"], json!(true));
        assert_eq!(data["summary"], json!("done"));
        assert_eq!(data["source"], json!("relay"));

        let stored = store.get(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        match &stored.details {
            TaskDetails::Workflow {
                current_step,
                execution_log,
                ..
            } => {
                assert_eq!(*current_step, 3);
                assert_eq!(execution_log.len(), 3);
                assert!(execution_log
                    .iter()
                    .all(|entry| entry.status == StepLogStatus::Completed));
            }
            _ => panic!("Expected workflow details"),
        }

        let events = store.event_log().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::WorkflowCompleted);
    }

    #[tokio::test]
    async fn test_node_fault_aborts_remaining_nodes() {
        // Node 2 faults: its operator is unknown
        let definition = WorkflowDefinition::new(
            Id::new("wf_1"),
            "broken",
            vec![
                WorkflowNode::new("summarize", "agent", json!({})),
                WorkflowNode::new(
                    "check",
                    "condition",
                    json!({"field": "agent_reply", "operator": "matches", "value": "x"}),
                ),
                WorkflowNode::new("shape", "transform", json!({})),
            ],
        );
        let (store, executor) = harness(definition).await;
        let claimed = claimed_workflow_task(&store, "wf_1", JsonMap::new()).await;

        let actual = executor.execute(claimed.clone()).await;
        assert!(matches!(actual, TaskOutcome::Fatal(_)));

        let stored = store.get(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        match &stored.details {
            TaskDetails::Workflow {
                current_step,
                execution_log,
                ..
            } => {
                // Exactly two entries: completed, then failed; node 3 never logged
                assert_eq!(*current_step, 2);
                assert_eq!(execution_log.len(), 2);
                assert_eq!(execution_log[0].status, StepLogStatus::Completed);
                assert_eq!(execution_log[1].status, StepLogStatus::Failed);
            }
            _ => panic!("Expected workflow details"),
        }

        let events = store.event_log().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, EventName::WorkflowFailed);
    }

    #[tokio::test]
    async fn test_unknown_node_type_is_fatal() {
        let definition = WorkflowDefinition::new(
            Id::new("wf_1"),
            "bad",
            vec![WorkflowNode::new("review", "human_review", json!({}))],
        );
        let (store, executor) = harness(definition).await;
        let claimed = claimed_workflow_task(&store, "wf_1", JsonMap::new()).await;

        let actual = executor.execute(claimed.clone()).await;

        assert!(matches!(
            actual,
            TaskOutcome::Fatal(ExecutionError::UnknownNodeType { .. })
        ));

        let stored = store.get(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.error_message.unwrap().contains("human_review"));
    }

    #[tokio::test]
    async fn test_missing_definition_is_fatal() {
        let (store, executor) = harness(triage_definition()).await;
        let claimed = claimed_workflow_task(&store, "wf_unknown", JsonMap::new()).await;

        let actual = executor.execute(claimed).await;

        assert!(matches!(actual, TaskOutcome::Fatal(_)));
    }

    #[tokio::test]
    async fn test_later_output_overwrites_earlier() {
        let definition = WorkflowDefinition::new(
            Id::new("wf_1"),
            "overwrite",
            vec![
                WorkflowNode::new("first", "transform", json!({"set": {"value": 1}})),
                WorkflowNode::new("second", "transform", json!({"set": {"value": 2}})),
            ],
        );
        let (store, executor) = harness(definition).await;
        let claimed = claimed_workflow_task(&store, "wf_1", JsonMap::new()).await;

        let actual = executor.execute(claimed).await;

        let TaskOutcome::Completed(data) = actual else {
            panic!("Expected completion");
        };
        assert_eq!(data["value"], json!(2));
    }

    #[tokio::test]
    async fn test_condition_operators() {
        let handler = ConditionNodeHandler;
        let mut data = JsonMap::new();
        data.insert("status".to_string(), json!("open"));
        data.insert("tags".to_string(), json!(["red", "blue"]));

        let node = WorkflowNode::new(
            "c",
            "condition",
            json!({"field": "status", "operator": "equals", "value": "open"}),
        );
        let actual = handler.handle(&node, &data).await.unwrap();
        assert_eq!(actual["c_result"], json!(true));

        let node = WorkflowNode::new(
            "c",
            "condition",
            json!({"field": "status", "operator": "not_equals", "value": "closed"}),
        );
        let actual = handler.handle(&node, &data).await.unwrap();
        assert_eq!(actual["c_result"], json!(true));

        let node = WorkflowNode::new(
            "c",
            "condition",
            json!({"field": "tags", "operator": "contains", "value": "red"}),
        );
        let actual = handler.handle(&node, &data).await.unwrap();
        assert_eq!(actual["c_result"], json!(true));

        let node = WorkflowNode::new(
            "c",
            "condition",
            json!({"field": "missing", "operator": "exists"}),
        );
        let actual = handler.handle(&node, &data).await.unwrap();
        assert_eq!(actual["c_result"], json!(false));
    }

    #[tokio::test]
    async fn test_transform_ignores_missing_sources() {
        let handler = TransformNodeHandler;
        let data = JsonMap::new();

        let node = WorkflowNode::new(
            "t",
            "transform",
            json!({"mapping": {"copied": "not_there"}}),
        );
        let actual = handler.handle(&node, &data).await.unwrap();
        assert!(actual.is_empty());
    }

    #[tokio::test]
    async fn test_api_call_requires_url() {
        let handler = ApiCallNodeHandler::new(Duration::from_secs(5));
        let node = WorkflowNode::new("call", "api_call", json!({}));

        let actual = handler.handle(&node, &JsonMap::new()).await;

        assert!(matches!(
            actual,
            Err(ExecutionError::Configuration { .. })
        ));
    }

    #[test]
    fn test_standard_registry_has_all_handlers() {
        let registry =
            NodeHandlerRegistry::standard(Arc::new(EchoBackend), Duration::from_secs(5));

        assert_eq!(registry.len(), 4);
        for node_type in [
            NodeType::Agent,
            NodeType::Condition,
            NodeType::Transform,
            NodeType::ApiCall,
        ] {
            assert!(registry.get(node_type).is_some());
        }
    }
}
