//! Admin HTTP API types.
//!
//! JSON shapes served by the coordinator's admin surface and consumed by the
//! CLI. Field names are camelCase on the wire; optional job fields are
//! omitted when absent.

use chrono::{DateTime, Utc};
use corral_ids::{AgentId, JobId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AgentKind, AgentStatus, JobStatus, NodeStatus, Proof};
use crate::version::Version;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub version: Version,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub node_id: NodeId,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    pub status: NodeStatus,
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub agent_id: AgentId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_by_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofsResponse {
    pub proofs: Vec<Proof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Agent declaration: POST /api/agents body and the `agent:deploy` manifest
/// file format. The id is minted by the registry when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: AgentKind,
    pub version: Version,
    #[serde(default)]
    pub description: String,
    pub module: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// POST /api/jobs body. Input bytes travel base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub agent_id: AgentId,
    pub input: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_summary_omits_absent_fields() {
        let summary = JobSummary {
            job_id: JobId::from("j1"),
            agent_id: AgentId::from("a1"),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            executed_by_node_id: None,
            error_message: None,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"jobId\":\"j1\""));
        assert!(!json.contains("startedAt"));
        assert!(!json.contains("errorMessage"));
    }

    #[test]
    fn test_agent_summary_uses_type_key() {
        let summary = AgentSummary {
            agent_id: AgentId::from("a1"),
            name: "parser".to_string(),
            kind: AgentKind::Analyzer,
            version: "1.0.0".parse().unwrap(),
            status: AgentStatus::Inactive,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"type\":\"analyzer\""));
        assert!(json.contains("\"version\":\"1.0.0\""));
    }

    #[test]
    fn test_agent_spec_defaults() {
        let spec: AgentSpec = serde_json::from_str(
            r#"{"name":"parser","version":"1.0.0","module":"registry://parser"}"#,
        )
        .unwrap();
        assert!(spec.agent_id.is_none());
        assert_eq!(spec.kind, AgentKind::Custom);
        assert!(spec.metadata.is_empty());
    }
}
