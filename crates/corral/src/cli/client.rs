//! Blocking HTTP client for the coordinator's admin API.

use anyhow::{bail, Context, Result};
use corral_protocol::http_types::{
    AgentSpec, AgentsResponse, ErrorResponse, JobSpec, JobsResponse, NodesResponse,
    RegisterResponse, SubmitJobResponse,
};
use reqwest::blocking::Response;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AdminClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl AdminClient {
    pub fn new(host: &str, port: u16) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base: format!("http://{host}:{port}"),
            http,
        }
    }

    pub fn list_agents(&self) -> Result<AgentsResponse> {
        self.get_json("/api/agents")
    }

    pub fn register_agent(&self, spec: &AgentSpec) -> Result<RegisterResponse> {
        self.post_json("/api/agents", spec)
    }

    pub fn list_nodes(&self) -> Result<NodesResponse> {
        self.get_json("/api/nodes")
    }

    pub fn list_jobs(&self) -> Result<JobsResponse> {
        self.get_json("/api/jobs")
    }

    pub fn submit_job(&self, spec: &JobSpec) -> Result<SubmitJobResponse> {
        self.post_json("/api/jobs", spec)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Failed to reach coordinator at {url}"))?;
        Self::parse(response)
    }

    fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("Failed to reach coordinator at {url}"))?;
        Self::parse(response)
    }

    fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().context("Malformed coordinator response");
        }

        let message = response
            .json::<ErrorResponse>()
            .map(|e| e.error)
            .unwrap_or_else(|_| status_label(status));
        bail!("Coordinator rejected the request: {message}")
    }
}

fn status_label(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}
