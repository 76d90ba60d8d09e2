use async_trait::async_trait;
use derive_setters::Setters;
use relay_core::{AgentId, Json, Result, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Dispatch priority of an agent configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentPriority {
    High,
    #[default]
    Normal,
}

impl AgentPriority {
    /// Check whether this priority routes to the high lane
    pub fn is_high(&self) -> bool {
        matches!(self, Self::High)
    }
}

/// Configuration of an agent, owned by an external collaborator and
/// consumed read-only by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct AgentConfig {
    /// Agent identifier
    #[setters(skip)]
    pub agent_id: AgentId,
    /// Display name
    pub name: String,
    /// Routing priority, applied once at enqueue time
    pub priority: AgentPriority,
    /// Backend model identifier
    pub model: Option<String>,
    /// Backend-specific parameters, passed through opaquely
    pub params: Json,
}

impl AgentConfig {
    /// Create a normal-priority agent configuration
    pub fn new(agent_id: AgentId, name: impl Into<String>) -> Self {
        Self {
            agent_id,
            name: name.into(),
            priority: AgentPriority::Normal,
            model: None,
            params: Json::Null,
        }
    }
}

/// The four node types the step machine dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Agent,
    Condition,
    Transform,
    ApiCall,
}

impl NodeType {
    /// Wire name as written in workflow definitions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Condition => "condition",
            Self::Transform => "transform",
            Self::ApiCall => "api_call",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "condition" => Ok(Self::Condition),
            "transform" => Ok(Self::Transform),
            "api_call" => Ok(Self::ApiCall),
            _ => Err(format!("Unknown node type: {s}")),
        }
    }
}

/// One node of a workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Node identifier, unique within the definition
    pub id: String,
    /// Raw node type string; parsed when the node runs
    pub node_type: String,
    /// Handler-specific configuration
    pub config: Json,
}

impl WorkflowNode {
    /// Create a node
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, config: Json) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }
}

/// A directed edge between two nodes.
///
/// Edges are stored with the definition but do not alter traversal:
/// execution walks `nodes` in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

/// A workflow definition, owned by an external collaborator and consumed
/// read-only by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct WorkflowDefinition {
    /// Workflow identifier
    #[setters(skip)]
    pub id: WorkflowId,
    /// Display name
    pub name: String,
    /// Nodes in execution order
    pub nodes: Vec<WorkflowNode>,
    /// Edges, kept for the designer but ignored by the step machine
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowDefinition {
    /// Create a definition with the given nodes
    pub fn new(id: WorkflowId, name: impl Into<String>, nodes: Vec<WorkflowNode>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            edges: Vec::new(),
        }
    }
}

/// Read-only source of agent configurations and workflow definitions.
///
/// The owning CRUD surface is an external collaborator; executors only
/// ever look definitions up by id.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Agent configuration by id
    async fn agent_config(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>>;

    /// Workflow definition by id
    async fn workflow_definition(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>>;
}

/// In-memory definition source
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    agents: Arc<RwLock<HashMap<AgentId, AgentConfig>>>,
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowDefinition>>>,
}

impl InMemoryDefinitions {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent configuration
    pub async fn put_agent(&self, config: AgentConfig) {
        self.agents
            .write()
            .await
            .insert(config.agent_id.clone(), config);
    }

    /// Add a workflow definition
    pub async fn put_workflow(&self, definition: WorkflowDefinition) {
        self.workflows
            .write()
            .await
            .insert(definition.id.clone(), definition);
    }
}

#[async_trait]
impl DefinitionSource for InMemoryDefinitions {
    async fn agent_config(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>> {
        Ok(self.agents.read().await.get(agent_id).cloned())
    }

    async fn workflow_definition(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowDefinition>> {
        Ok(self.workflows.read().await.get(workflow_id).cloned())
    }
}
