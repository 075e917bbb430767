//! Canonical entity and payload types shared across the control plane.
//!
//! The enums here are the single source of truth for catalog, membership
//! and job lifecycle states; every crate (coordinator, CLI, wire payloads)
//! uses these definitions.

use chrono::{DateTime, Utc};
use corral_ids::{AgentId, JobId, NodeId, ProofId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::version::Version;

/// Capability key prefix: a node advertising `"agent:" + agent_id` claims it
/// can host that agent.
pub const AGENT_CAPABILITY_PREFIX: &str = "agent:";

/// Build the capability key a node must advertise to host `agent_id`.
pub fn agent_capability_key(agent_id: &AgentId) -> String {
    format!("{AGENT_CAPABILITY_PREFIX}{agent_id}")
}

// ============================================================================
// Canonical Enums
// ============================================================================

/// Agent classification in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Analyzer,
    Transformer,
    Validator,
    Coordinator,
    #[default]
    Custom,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Analyzer => "analyzer",
            AgentKind::Transformer => "transformer",
            AgentKind::Validator => "validator",
            AgentKind::Coordinator => "coordinator",
            AgentKind::Custom => "custom",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analyzer" => Ok(AgentKind::Analyzer),
            "transformer" => Ok(AgentKind::Transformer),
            "validator" => Ok(AgentKind::Validator),
            "coordinator" => Ok(AgentKind::Coordinator),
            "custom" => Ok(AgentKind::Custom),
            _ => Err(format!(
                "Invalid agent kind: '{}'. Expected: analyzer, transformer, validator, coordinator, or custom",
                s
            )),
        }
    }
}

/// Agent catalog status. New registrations start Inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Active,
    #[default]
    Inactive,
    Executing,
    Error,
    Updating,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "ACTIVE",
            AgentStatus::Inactive => "INACTIVE",
            AgentStatus::Executing => "EXECUTING",
            AgentStatus::Error => "ERROR",
            AgentStatus::Updating => "UPDATING",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node membership status. Registration sets Online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    Online,
    Busy,
    Unresponsive,
    Offline,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "ONLINE",
            NodeStatus::Busy => "BUSY",
            NodeStatus::Unresponsive => "UNRESPONSIVE",
            NodeStatus::Offline => "OFFLINE",
            NodeStatus::Error => "ERROR",
        }
    }

    /// Only Online nodes accept new job placements; Busy and Error block
    /// assignments, Unresponsive/Offline nodes are on their way out.
    pub fn accepts_assignments(&self) -> bool {
        matches!(self, NodeStatus::Online)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" | "CANCELED" => Ok(JobStatus::Cancelled),
            "TIMEOUT" => Ok(JobStatus::Timeout),
            _ => Err(format!("Invalid job status: '{}'", s)),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A declared compute unit in the catalog. Executes on nodes, never in the
/// coordinator. Identity and version are immutable for the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub kind: AgentKind,
    pub version: Version,
    pub description: String,
    /// Opaque locator of the external execution artifact.
    pub module: String,
    pub metadata: HashMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        kind: AgentKind,
        version: Version,
        module: impl Into<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            version,
            description: String::new(),
            module: module.into(),
            metadata: HashMap::new(),
            registered_at,
            status: AgentStatus::Inactive,
        }
    }
}

/// A compute node in the fleet. Equality and hashing are on id alone.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    /// Capability keys are the effective predicates; values are informational.
    pub capabilities: HashMap<String, String>,
    pub joined_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(
        id: NodeId,
        hostname: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        capabilities: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            address: address.into(),
            port,
            capabilities,
            joined_at: now,
            last_heartbeat: now,
            status: NodeStatus::Online,
        }
    }

    /// Whether this node advertises the capability to host `agent_id`.
    pub fn can_host(&self, agent_id: &AgentId) -> bool {
        self.capabilities.contains_key(&agent_capability_key(agent_id))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A single execution request bound to an agent.
///
/// The input buffer is moved in at construction and never shared back out
/// mutably; readers get borrows or clones. State transitions go through the
/// `mark_*` methods so the lifecycle edges stay in one place.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub agent_id: AgentId,
    input: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    output: Option<Vec<u8>>,
    pub executed_by: Option<NodeId>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(agent_id: AgentId, input: Vec<u8>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::generate(),
            agent_id,
            input,
            metadata: HashMap::new(),
            created_at,
            started_at: None,
            completed_at: None,
            status: JobStatus::Pending,
            output: None,
            executed_by: None,
            error_message: None,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Present iff the job completed.
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    /// Pending -> Running: records the executing node and the start time.
    pub fn mark_running(&mut self, node_id: NodeId, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.executed_by = Some(node_id);
        self.started_at = Some(now);
    }

    /// Running -> Completed: stores a private copy of the output.
    pub fn mark_completed(&mut self, output: &[u8], now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.output = Some(output.to_vec());
        self.completed_at = Some(now);
    }

    /// Running -> Failed. Failed jobs never carry an output.
    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
    }

    /// Running -> Timeout, signalled by the executing node.
    pub fn mark_timeout(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Timeout;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
    }

    /// Pending/Running -> Cancelled.
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
    }
}

/// Content-addressed attestation binding (agent, timestamp, input, output).
///
/// `proof_hash = base64(SHA256(agent_id || decimal(ts) || input_hash ||
/// output_hash))`; the component hashes are base64(SHA256(bytes)), standard
/// alphabet with padding. Both encodings are compatibility-bearing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub proof_id: ProofId,
    pub agent_id: AgentId,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub input_hash: String,
    pub output_hash: String,
    pub proof_hash: String,
}

// ============================================================================
// Wire payloads (JSON bodies of framed messages)
// ============================================================================

/// Node -> Coordinator keep-alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub node_id: NodeId,
}

/// Node self-description; sent on connect to register or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoPayload {
    pub node_id: NodeId,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
}

/// Job submission over the wire. Input bytes travel base64-encoded.
///
/// Inbound frames carry no job id (the router mints one); the coordinator
/// fills it in when forwarding the frame to the executing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmitPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub agent_id: AgentId,
    pub input: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Completion report status from the executing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobOutcome {
    Success,
    Failed,
    Timeout,
}

/// Node -> Coordinator execution report, optionally carrying an attestation
/// that binds the execution to its inputs and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultPayload {
    pub job_id: JobId,
    pub node_id: NodeId,
    pub outcome: JobOutcome,
    /// Base64-encoded output bytes, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Proof>,
}

/// Membership event kinds broadcast to connected nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateSyncEvent {
    NodeJoined,
    NodeLeft,
}

/// Coordinator -> Node membership broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncPayload {
    pub event: StateSyncEvent,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
}

/// Bidirectional failure report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
