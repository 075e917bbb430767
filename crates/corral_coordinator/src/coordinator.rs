//! Composition root.
//!
//! Owns one instance of every control-plane component plus the bounded
//! executor. Components never hold pointers to each other; the router gets
//! read-only directory views and membership gets a narrow event sink, both
//! installed here at start.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use corral_ids::{JobId, NodeId};
use corral_protocol::defaults::{
    DEFAULT_SNAPSHOT_DIR, DEFAULT_WORKER_COUNT, HEARTBEAT_INTERVAL, NODE_TIMEOUT,
};
use corral_protocol::http_types::AgentSpec;
use corral_protocol::{
    Job, JobOutcome, JobResultPayload, Node, NodeInfoPayload, StateSyncEvent, StateSyncPayload,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::executor::Executor;
use crate::membership::{MembershipEvents, NodeMembership};
use crate::proof::{ProofError, ProofValidator, ValidationOutcome};
use crate::registry::AgentRegistry;
use crate::router::{JobRouter, PlacementError};
use crate::snapshot::SnapshotStore;

/// Capacity of the membership broadcast channel; slow subscribers lag and
/// miss events rather than block the control plane.
const SYNC_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// The coordinator's own node identity (liveness sweep guard).
    pub node_id: NodeId,
    pub worker_count: usize,
    pub heartbeat_interval: Duration,
    pub node_timeout: Duration,
    pub snapshot_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::generate(),
            worker_count: DEFAULT_WORKER_COUNT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            node_timeout: NODE_TIMEOUT,
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
        }
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    registry: Arc<AgentRegistry>,
    membership: Arc<NodeMembership>,
    router: Arc<JobRouter>,
    proofs: Arc<ProofValidator>,
    snapshots: Arc<SnapshotStore>,
    executor: Arc<Executor>,
    sync_tx: broadcast::Sender<StateSyncPayload>,
    started: AtomicBool,
    stopped: AtomicBool,
    sweep_stop: Mutex<Option<Sender<()>>>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let snapshots = SnapshotStore::open(&config.snapshot_dir)
            .context("Failed to open snapshot store")?;
        let membership = Arc::new(NodeMembership::new(
            config.node_id.clone(),
            clock.clone(),
            config.node_timeout,
        ));
        let (sync_tx, _) = broadcast::channel(SYNC_CHANNEL_CAPACITY);

        Ok(Self {
            registry: Arc::new(AgentRegistry::new()),
            membership,
            router: Arc::new(JobRouter::new(clock.clone())),
            proofs: Arc::new(ProofValidator::new()),
            snapshots: Arc::new(snapshots),
            executor: Arc::new(Executor::new(config.worker_count)),
            sync_tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            sweep_stop: Mutex::new(None),
            config,
            clock,
        })
    }

    /// Bring the control plane up: bind the router's directory views, hand
    /// membership its event sink, and schedule the liveness sweeper on the
    /// executor. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(node = %self.config.node_id, "Coordinator starting");

        self.router.bind(self.registry.clone(), self.membership.clone());
        self.membership.bind_events(Arc::new(SyncBridge {
            router: self.router.clone(),
            sync_tx: self.sync_tx.clone(),
            clock: self.clock.clone(),
        }));

        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        *self
            .sweep_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);

        let membership = self.membership.clone();
        let interval = self.config.heartbeat_interval;
        self.executor.spawn(move || {
            membership.run_sweeper(interval, stop_rx);
        });

        info!("Coordinator started");
    }

    /// Tear down: cancel the sweeper, then drain the executor (no new
    /// tasks accepted, in-flight work completes). Idempotent.
    pub fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) || self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Coordinator stopping");

        if let Some(stop_tx) = self
            .sweep_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            // A failed send means the sweeper already exited.
            let _ = stop_tx.send(());
        }
        self.executor.shutdown();
        info!("Coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Build and place a job. The input buffer is moved into the job record;
    /// the caller keeps no alias to it.
    pub fn submit(
        &self,
        agent_id: corral_ids::AgentId,
        input: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> std::result::Result<JobId, PlacementError> {
        if !self.is_running() {
            return Err(PlacementError::NotReady);
        }
        let job = Job::new(agent_id, input, self.clock.now()).with_metadata(metadata);
        self.router.route(job)
    }

    /// Materialize an agent record from its declaration and register it.
    /// The id is minted when the declaration does not carry one.
    pub fn register_agent_spec(&self, spec: &AgentSpec) -> corral_ids::AgentId {
        let agent = self.agent_from_spec(spec);
        let id = agent.id.clone();
        self.registry.register(agent);
        id
    }

    /// Overwrite an existing agent record from its declaration. False iff
    /// the declaration carries no id or the id is unknown.
    pub fn update_agent_spec(&self, spec: &AgentSpec) -> bool {
        if spec.agent_id.is_none() {
            return false;
        }
        self.registry.update(self.agent_from_spec(spec))
    }

    fn agent_from_spec(&self, spec: &AgentSpec) -> corral_protocol::Agent {
        let id = spec
            .agent_id
            .clone()
            .unwrap_or_else(corral_ids::AgentId::generate);
        let mut agent = corral_protocol::Agent::new(
            id,
            spec.name.clone(),
            spec.kind,
            spec.version,
            spec.module.clone(),
            self.clock.now(),
        );
        agent.description = spec.description.clone();
        agent.metadata = spec.metadata.clone();
        agent
    }

    /// Register a node from its wire self-description.
    pub fn register_node(&self, info: &NodeInfoPayload) {
        let node = Node::new(
            info.node_id.clone(),
            info.hostname.clone(),
            info.address.clone(),
            info.port,
            info.capabilities.clone(),
            self.clock.now(),
        );
        self.membership.register(node);
    }

    pub fn unregister_node(&self, node_id: &NodeId) -> bool {
        self.membership.unregister(node_id)
    }

    pub fn heartbeat(&self, node_id: &NodeId) -> bool {
        self.membership.heartbeat(node_id)
    }

    /// Apply an execution report. Completion carrying an attestation is
    /// gated on proof verification; a rejected attestation fails the job.
    /// Returns false when the job is unknown or already settled.
    pub fn handle_job_result(&self, payload: &JobResultPayload) -> bool {
        let job_id = &payload.job_id;
        match payload.outcome {
            JobOutcome::Failed => {
                let message = payload
                    .error_message
                    .as_deref()
                    .unwrap_or("execution failed");
                self.router.notify_failed(job_id, message)
            }
            JobOutcome::Timeout => {
                let message = payload
                    .error_message
                    .as_deref()
                    .unwrap_or("execution timed out");
                self.router.notify_timeout(job_id, message)
            }
            JobOutcome::Success => {
                let output = match payload.output.as_deref() {
                    Some(encoded) => match BASE64.decode(encoded) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(job = %job_id, error = %e, "Undecodable job output");
                            return self
                                .router
                                .notify_failed(job_id, "invalid output encoding");
                        }
                    },
                    None => Vec::new(),
                };

                if let Some(proof) = &payload.attestation {
                    let Some(job) = self.router.get(job_id) else {
                        return false;
                    };
                    let proof_id = proof.proof_id.clone();
                    if let Err(ProofError::Duplicate(id)) = self.proofs.register(proof.clone()) {
                        warn!(job = %job_id, proof = %id, "Duplicate attestation id");
                        return self.router.notify_failed(job_id, "duplicate proof id");
                    }
                    let outcome = self.proofs.validate(&proof_id, job.input(), &output);
                    if outcome != ValidationOutcome::Valid {
                        warn!(job = %job_id, proof = %proof_id, ?outcome, "Attestation rejected");
                        return self
                            .router
                            .notify_failed(job_id, &format!("attestation rejected: {outcome:?}"));
                    }
                }

                self.router.notify_completed(job_id, &output)
            }
        }
    }

    /// Queue deferred work on the shared executor. False after stop.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.spawn(task)
    }

    /// Subscribe to membership broadcasts (node-joined/node-left).
    pub fn subscribe_sync(&self) -> broadcast::Receiver<StateSyncPayload> {
        self.sync_tx.subscribe()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn membership(&self) -> &Arc<NodeMembership> {
        &self.membership
    }

    pub fn router(&self) -> &Arc<JobRouter> {
        &self.router
    }

    pub fn proofs(&self) -> &Arc<ProofValidator> {
        &self.proofs
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Event sink handed to membership: cascades removals into the router's job
/// bookkeeping (removal strictly precedes the cascade, because membership
/// fires this after the node left the directory) and mirrors events onto
/// the sync broadcast for connected nodes.
struct SyncBridge {
    router: Arc<JobRouter>,
    sync_tx: broadcast::Sender<StateSyncPayload>,
    clock: Arc<dyn Clock>,
}

impl MembershipEvents for SyncBridge {
    fn node_joined(&self, node: &Node) {
        let _ = self.sync_tx.send(StateSyncPayload {
            event: StateSyncEvent::NodeJoined,
            node_id: node.id.clone(),
            timestamp: self.clock.now(),
        });
    }

    fn node_removed(&self, node_id: &NodeId) {
        self.router.on_node_evicted(node_id);
        let _ = self.sync_tx.send(StateSyncPayload {
            event: StateSyncEvent::NodeLeft,
            node_id: node_id.clone(),
            timestamp: self.clock.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::proof::build_proof;
    use chrono::Utc;
    use corral_ids::{AgentId, ProofId};
    use corral_protocol::{Agent, AgentKind, JobStatus};
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir) -> (Arc<ManualClock>, Coordinator) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CoordinatorConfig {
            snapshot_dir: dir.path().join("snapshots"),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::with_clock(config, clock.clone()).unwrap();
        coordinator.start();
        (clock, coordinator)
    }

    fn seed_agent(coordinator: &Coordinator, id: &str) {
        coordinator.registry().register(Agent::new(
            AgentId::from(id),
            format!("agent-{id}"),
            AgentKind::Analyzer,
            "1.0.0".parse().unwrap(),
            "registry://module",
            Utc::now(),
        ));
    }

    fn seed_node(coordinator: &Coordinator, id: &str, agent: &str) {
        let mut capabilities = HashMap::new();
        capabilities.insert(format!("agent:{agent}"), String::new());
        coordinator.register_node(&NodeInfoPayload {
            node_id: NodeId::from(id),
            hostname: format!("host-{id}"),
            address: "127.0.0.1".to_string(),
            port: 9000,
            capabilities,
        });
    }

    #[test]
    fn start_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        coordinator.start();
        coordinator.start();
        assert!(coordinator.is_running());
        coordinator.stop();
        coordinator.stop();
        assert!(!coordinator.is_running());
    }

    #[test]
    fn submit_routes_to_capable_node() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        seed_agent(&coordinator, "a1");
        seed_node(&coordinator, "n1", "a1");

        let job_id = coordinator
            .submit(AgentId::from("a1"), b"hello".to_vec(), HashMap::new())
            .unwrap();
        let job = coordinator.router().get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.executed_by, Some(NodeId::from("n1")));
    }

    #[test]
    fn submit_before_start_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CoordinatorConfig {
            snapshot_dir: dir.path().join("snapshots"),
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::with_clock(config, clock).unwrap();

        assert_eq!(
            coordinator.submit(AgentId::from("a1"), Vec::new(), HashMap::new()),
            Err(PlacementError::NotReady)
        );
    }

    #[test]
    fn node_removal_cascades_into_router() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        seed_agent(&coordinator, "a1");
        seed_node(&coordinator, "n1", "a1");

        let job_id = coordinator
            .submit(AgentId::from("a1"), b"x".to_vec(), HashMap::new())
            .unwrap();
        assert!(coordinator.unregister_node(&NodeId::from("n1")));

        let job = coordinator.router().get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("node-evicted"));
    }

    #[test]
    fn valid_attestation_completes_job() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        seed_agent(&coordinator, "a1");
        seed_node(&coordinator, "n1", "a1");

        let job_id = coordinator
            .submit(AgentId::from("a1"), b"in".to_vec(), HashMap::new())
            .unwrap();
        let proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"in",
            b"out",
        );

        let accepted = coordinator.handle_job_result(&JobResultPayload {
            job_id: job_id.clone(),
            node_id: NodeId::from("n1"),
            outcome: JobOutcome::Success,
            output: Some(BASE64.encode(b"out")),
            error_message: None,
            attestation: Some(proof),
        });
        assert!(accepted);

        let job = coordinator.router().get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.output(), Some(&b"out"[..]));
        assert_eq!(coordinator.proofs().len(), 1);
    }

    #[test]
    fn rejected_attestation_fails_job() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        seed_agent(&coordinator, "a1");
        seed_node(&coordinator, "n1", "a1");

        let job_id = coordinator
            .submit(AgentId::from("a1"), b"in".to_vec(), HashMap::new())
            .unwrap();
        // Proof binds different input bytes than the job carries.
        let proof = build_proof(
            ProofId::from("p1"),
            AgentId::from("a1"),
            1_700_000_000,
            b"tampered",
            b"out",
        );

        coordinator.handle_job_result(&JobResultPayload {
            job_id: job_id.clone(),
            node_id: NodeId::from("n1"),
            outcome: JobOutcome::Success,
            output: Some(BASE64.encode(b"out")),
            error_message: None,
            attestation: Some(proof),
        });

        let job = coordinator.router().get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("attestation rejected"));
        assert!(job.output().is_none());
    }

    #[test]
    fn timeout_report_maps_to_timeout_state() {
        let dir = TempDir::new().unwrap();
        let (_, coordinator) = coordinator(&dir);
        seed_agent(&coordinator, "a1");
        seed_node(&coordinator, "n1", "a1");

        let job_id = coordinator
            .submit(AgentId::from("a1"), b"x".to_vec(), HashMap::new())
            .unwrap();
        coordinator.handle_job_result(&JobResultPayload {
            job_id: job_id.clone(),
            node_id: NodeId::from("n1"),
            outcome: JobOutcome::Timeout,
            output: None,
            error_message: None,
            attestation: None,
        });

        assert_eq!(
            coordinator.router().get(&job_id).unwrap().status,
            JobStatus::Timeout
        );
    }
}
