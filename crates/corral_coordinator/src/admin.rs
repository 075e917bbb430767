//! Admin HTTP API.
//!
//! Read endpoints mirror the in-memory tables; the two POST endpoints feed
//! the registry and the router. Placement failures surface as 400 with the
//! reason; anything unexpected is a plain 500 envelope.
//!
//! Endpoints:
//!   GET  /api/agents
//!   POST /api/agents
//!   GET  /api/nodes
//!   GET  /api/jobs
//!   POST /api/jobs
//!   GET  /api/proofs

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use corral_protocol::http_types::{
    AgentSpec, AgentSummary, AgentsResponse, ErrorResponse, JobSpec, JobSummary, JobsResponse,
    NodeSummary, NodesResponse, ProofsResponse, RegisterResponse, SubmitJobResponse,
};
use corral_protocol::{Agent, Job, Node};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use crate::coordinator::Coordinator;
use crate::router::PlacementError;

pub async fn serve(coordinator: Arc<Coordinator>, addr: SocketAddr) -> Result<()> {
    let router = build_router(coordinator);
    info!("Admin API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/api/agents", get(list_agents).post(register_agent))
        .route("/api/nodes", get(list_nodes))
        .route("/api/jobs", get(list_jobs).post(submit_job))
        .route("/api/proofs", get(list_proofs))
        .fallback(method_not_allowed)
        .with_state(coordinator)
}

/// Admin handler failure. Everything unexpected collapses to the fixed 500
/// envelope; placement problems keep their reason at 400.
enum AdminError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::BadRequest(reason) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: reason }),
            )
                .into_response(),
            AdminError::Internal(e) => {
                error!(error = %e, "Admin API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn list_agents(State(coordinator): State<Arc<Coordinator>>) -> Json<AgentsResponse> {
    let mut agents: Vec<AgentSummary> = coordinator
        .registry()
        .all()
        .into_values()
        .map(agent_summary)
        .collect();
    agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    Json(AgentsResponse { agents })
}

async fn register_agent(
    State(coordinator): State<Arc<Coordinator>>,
    Json(spec): Json<AgentSpec>,
) -> Json<RegisterResponse> {
    coordinator.register_agent_spec(&spec);
    Json(RegisterResponse { success: true })
}

async fn list_nodes(State(coordinator): State<Arc<Coordinator>>) -> Json<NodesResponse> {
    let nodes = coordinator
        .membership()
        .all()
        .into_iter()
        .map(node_summary)
        .collect();
    Json(NodesResponse { nodes })
}

async fn list_jobs(State(coordinator): State<Arc<Coordinator>>) -> Json<JobsResponse> {
    let jobs = coordinator
        .router()
        .jobs()
        .into_iter()
        .map(job_summary)
        .collect();
    Json(JobsResponse { jobs })
}

async fn submit_job(
    State(coordinator): State<Arc<Coordinator>>,
    Json(spec): Json<JobSpec>,
) -> Result<Json<SubmitJobResponse>, AdminError> {
    let input = BASE64
        .decode(spec.input.as_bytes())
        .map_err(|e| AdminError::BadRequest(format!("invalid input encoding: {e}")))?;

    let job_id = coordinator
        .submit(spec.agent_id, input, spec.metadata)
        .map_err(|e| match e {
            // The admin server only runs on a started coordinator; an
            // uninitialized router here is an internal invariant violation.
            PlacementError::NotReady => AdminError::Internal(anyhow::anyhow!(e)),
            other => AdminError::BadRequest(other.to_string()),
        })?;
    Ok(Json(SubmitJobResponse { job_id }))
}

async fn list_proofs(State(coordinator): State<Arc<Coordinator>>) -> Json<ProofsResponse> {
    let mut proofs = coordinator.proofs().all();
    proofs.sort_by(|a, b| a.proof_id.cmp(&b.proof_id));
    Json(ProofsResponse { proofs })
}

fn agent_summary(agent: Agent) -> AgentSummary {
    AgentSummary {
        agent_id: agent.id,
        name: agent.name,
        kind: agent.kind,
        version: agent.version,
        status: agent.status,
    }
}

fn node_summary(node: Node) -> NodeSummary {
    NodeSummary {
        node_id: node.id,
        hostname: node.hostname,
        address: node.address,
        port: node.port,
        status: node.status,
        capabilities: node.capabilities,
        last_heartbeat: node.last_heartbeat,
    }
}

fn job_summary(job: Job) -> JobSummary {
    JobSummary {
        job_id: job.id.clone(),
        agent_id: job.agent_id.clone(),
        status: job.status,
        created_at: job.created_at,
        started_at: job.started_at,
        completed_at: job.completed_at,
        executed_by_node_id: job.executed_by.clone(),
        error_message: job.error_message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use axum::body::Body;
    use axum::http::Request;
    use corral_ids::NodeId;
    use corral_protocol::NodeInfoPayload;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn app(dir: &TempDir) -> (Arc<Coordinator>, Router) {
        let config = CoordinatorConfig {
            snapshot_dir: dir.path().join("snapshots"),
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(Coordinator::new(config).unwrap());
        coordinator.start();
        let router = build_router(coordinator.clone());
        (coordinator, router)
    }

    #[tokio::test]
    async fn register_then_list_agents() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app(&dir);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/agents")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"agentId":"a1","name":"parser","type":"analyzer","version":"1.0.0","module":"registry://parser"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);

        let response = app
            .oneshot(Request::get("/api/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["agents"][0]["agentId"], "a1");
        assert_eq!(body["agents"][0]["type"], "analyzer");
        assert_eq!(body["agents"][0]["status"], "INACTIVE");
    }

    #[tokio::test]
    async fn submit_without_capable_node_is_400() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app(&dir);

        let response = app
            .oneshot(
                Request::post("/api/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"agentId":"ghost","input":"aGk="}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("unknown agent"));
    }

    #[tokio::test]
    async fn submit_happy_path_returns_job_id() {
        let dir = TempDir::new().unwrap();
        let (coordinator, app) = app(&dir);
        coordinator.register_agent_spec(&AgentSpec {
            agent_id: Some("a1".into()),
            name: "parser".into(),
            kind: corral_protocol::AgentKind::Analyzer,
            version: "1.0.0".parse().unwrap(),
            description: String::new(),
            module: "registry://parser".into(),
            metadata: HashMap::new(),
        });
        let mut capabilities = HashMap::new();
        capabilities.insert("agent:a1".to_string(), String::new());
        coordinator.register_node(&NodeInfoPayload {
            node_id: NodeId::from("n1"),
            hostname: "host".into(),
            address: "127.0.0.1".into(),
            port: 9000,
            capabilities,
        });

        let response = app
            .oneshot(
                Request::post("/api/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"agentId":"a1","input":"aGVsbG8="}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["jobId"].is_string());
    }

    #[tokio::test]
    async fn unlisted_route_is_405() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app(&dir);

        let response = app
            .oneshot(
                Request::delete("/api/agents/a1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
