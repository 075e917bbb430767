//! Job lifecycle and placement.
//!
//! The router owns every routed job plus a per-node index of running work.
//! Placement is deliberately first-match over the node directory in join
//! order; the capability predicate is the string key `"agent:" + agent_id`.
//!
//! Lifecycle:
//!
//! ```text
//!       route           notify_completed(output)
//! Pending ----> Running ------------------------> Completed
//!                  |
//!                  | notify_failed / notify_timeout / eviction
//!                  v
//!               Failed / Timeout            (terminal)
//! ```
//!
//! Cancelled is reachable from Pending or Running. Terminal jobs stay
//! readable in the jobs table until `purge_terminal` runs; the per-node
//! index only ever holds Running jobs.

use chrono::{DateTime, Utc};
use corral_ids::{AgentId, JobId, NodeId};
use corral_protocol::defaults::NODE_EVICTED_MESSAGE;
use corral_protocol::{Job, JobStatus, Node};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Read-only view of the agent catalog, handed to the router at bind time.
pub trait AgentDirectory: Send + Sync {
    fn is_registered(&self, agent_id: &AgentId) -> bool;
}

/// Read-only view of node membership in join order.
pub trait NodeDirectory: Send + Sync {
    fn nodes_in_join_order(&self) -> Vec<Node>;
}

/// Why a job could not be placed. The job is not recorded in any of these
/// cases; the caller decides whether to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("router is not initialized")]
    NotReady,
    #[error("unknown agent: {0}")]
    AgentUnknown(AgentId),
    #[error("no online node advertises capability for agent {0}")]
    NoCapableNode(AgentId),
}

struct RouterDeps {
    agents: Arc<dyn AgentDirectory>,
    nodes: Arc<dyn NodeDirectory>,
}

#[derive(Default)]
struct RouterState {
    jobs: HashMap<JobId, Job>,
    node_jobs: HashMap<NodeId, Vec<JobId>>,
}

pub struct JobRouter {
    deps: RwLock<Option<RouterDeps>>,
    state: RwLock<RouterState>,
    clock: Arc<dyn Clock>,
}

impl JobRouter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            deps: RwLock::new(None),
            state: RwLock::new(RouterState::default()),
            clock,
        }
    }

    /// Install the directory views. The router rejects placements until this
    /// has been called by the composition root.
    pub fn bind(&self, agents: Arc<dyn AgentDirectory>, nodes: Arc<dyn NodeDirectory>) {
        *self.deps.write().unwrap_or_else(PoisonError::into_inner) =
            Some(RouterDeps { agents, nodes });
    }

    pub fn is_ready(&self) -> bool {
        self.deps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Place a pending job on the first capable online node.
    ///
    /// On success the job transitions Pending -> Running and is recorded in
    /// both tables under one critical section. On any error the job is
    /// dropped unrecorded.
    pub fn route(&self, mut job: Job) -> Result<JobId, PlacementError> {
        let candidate = {
            let deps = self.deps.read().unwrap_or_else(PoisonError::into_inner);
            let deps = deps.as_ref().ok_or(PlacementError::NotReady)?;

            if !deps.agents.is_registered(&job.agent_id) {
                return Err(PlacementError::AgentUnknown(job.agent_id.clone()));
            }

            deps.nodes
                .nodes_in_join_order()
                .into_iter()
                .find(|node| node.status.accepts_assignments() && node.can_host(&job.agent_id))
                .ok_or_else(|| PlacementError::NoCapableNode(job.agent_id.clone()))?
        };

        let job_id = job.id.clone();
        let now = self.clock.now();
        {
            let mut state = self.write();
            job.mark_running(candidate.id.clone(), now);
            state
                .node_jobs
                .entry(candidate.id.clone())
                .or_default()
                .push(job_id.clone());
            state.jobs.insert(job_id.clone(), job);
        }

        info!(job = %job_id, node = %candidate.id, "Job placed");
        Ok(job_id)
    }

    /// Running -> Completed. The output is copied into the job record.
    /// False when the job is unknown or not Running (first signal wins).
    pub fn notify_completed(&self, job_id: &JobId, output: &[u8]) -> bool {
        self.finish(job_id, |job, now| job.mark_completed(output, now))
    }

    /// Running -> Failed with the supplied reason.
    pub fn notify_failed(&self, job_id: &JobId, message: &str) -> bool {
        self.finish(job_id, |job, now| job.mark_failed(message, now))
    }

    /// Running -> Timeout; execution deadlines are signalled by the node.
    pub fn notify_timeout(&self, job_id: &JobId, message: &str) -> bool {
        self.finish(job_id, |job, now| job.mark_timeout(message, now))
    }

    fn finish(&self, job_id: &JobId, apply: impl FnOnce(&mut Job, DateTime<Utc>)) -> bool {
        let now = self.clock.now();
        let mut state = self.write();

        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            return false;
        }

        apply(job, now);
        let executed_by = job.executed_by.clone();
        let status = job.status;
        if let Some(node_id) = executed_by {
            remove_node_job(&mut state, &node_id, job_id);
        }
        debug!(job = %job_id, status = %status, "Job finished");
        true
    }

    /// Cancel a job that has not reached a terminal state.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let now = self.clock.now();
        let mut state = self.write();

        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };
        if !matches!(job.status, JobStatus::Pending | JobStatus::Running) {
            return false;
        }

        job.mark_cancelled(now);
        let executed_by = job.executed_by.clone();
        if let Some(node_id) = executed_by {
            remove_node_job(&mut state, &node_id, job_id);
        }
        info!(job = %job_id, "Job cancelled");
        true
    }

    /// Fail every job running on an evicted node and drop its index entry.
    /// The failed jobs remain readable until the next purge pass.
    pub fn on_node_evicted(&self, node_id: &NodeId) {
        let now = self.clock.now();
        let mut state = self.write();

        let Some(job_ids) = state.node_jobs.remove(node_id) else {
            return;
        };

        for job_id in &job_ids {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status == JobStatus::Running {
                    job.mark_failed(NODE_EVICTED_MESSAGE, now);
                }
            }
        }
        warn!(node = %node_id, failed = job_ids.len(), "Failed jobs of evicted node");
    }

    /// Drop terminal jobs from the table. Returns how many were removed.
    pub fn purge_terminal(&self) -> usize {
        let mut state = self.write();
        let before = state.jobs.len();
        state.jobs.retain(|_, job| !job.status.is_terminal());
        before - state.jobs.len()
    }

    pub fn get(&self, job_id: &JobId) -> Option<Job> {
        self.read().jobs.get(job_id).cloned()
    }

    /// Point-in-time snapshot of all tracked jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Job ids currently running on a node, in placement order.
    pub fn jobs_on_node(&self, node_id: &NodeId) -> Vec<JobId> {
        self.read()
            .node_jobs
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_node_job(state: &mut RouterState, node_id: &NodeId, job_id: &JobId) {
    if let Some(ids) = state.node_jobs.get_mut(node_id) {
        ids.retain(|id| id != job_id);
        if ids.is_empty() {
            state.node_jobs.remove(node_id);
        }
    }
}
