//! Node membership and liveness.
//!
//! The node directory preserves insertion order (the router's placement scan
//! is first-match in join order). A periodic sweep evicts nodes whose last
//! heartbeat is older than the timeout; membership removals are reported to
//! the composition root through the narrow [`MembershipEvents`] interface so
//! job bookkeeping can cascade without a mutual pointer.

use chrono::Duration as ChronoDuration;
use corral_ids::NodeId;
use corral_protocol::{Node, NodeStatus};
use indexmap::IndexMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::router::NodeDirectory;

/// Membership event sink handed over by the composition root.
///
/// `node_removed` fires for every removal, voluntary or evicted, strictly
/// after the node has left the directory.
pub trait MembershipEvents: Send + Sync {
    fn node_joined(&self, node: &Node);
    fn node_removed(&self, node_id: &NodeId);
}

pub struct NodeMembership {
    nodes: RwLock<IndexMap<NodeId, Node>>,
    clock: Arc<dyn Clock>,
    events: RwLock<Option<Arc<dyn MembershipEvents>>>,
    /// The coordinator's own identity; the sweep never evicts it.
    self_id: NodeId,
    node_timeout: Duration,
}

impl NodeMembership {
    pub fn new(self_id: NodeId, clock: Arc<dyn Clock>, node_timeout: Duration) -> Self {
        Self {
            nodes: RwLock::new(IndexMap::new()),
            clock,
            events: RwLock::new(None),
            self_id,
            node_timeout,
        }
    }

    /// Install the event sink. Called once by the composition root before the
    /// sweeper starts.
    pub fn bind_events(&self, events: Arc<dyn MembershipEvents>) {
        *self
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(events);
    }

    /// Insert a node: status Online, heartbeat stamped now, node-joined
    /// emitted. Re-registration of a known id refreshes the record in place.
    pub fn register(&self, mut node: Node) {
        let now = self.clock.now();
        node.status = NodeStatus::Online;
        node.last_heartbeat = now;

        let joined = node.clone();
        {
            let mut nodes = self.write();
            nodes.insert(node.id.clone(), node);
        }

        info!(node = %joined.id, host = %joined.hostname, "Node joined");
        if let Some(events) = self.events_sink() {
            events.node_joined(&joined);
        }
    }

    /// Remove a node and emit node-left. False iff the id was absent.
    pub fn unregister(&self, node_id: &NodeId) -> bool {
        let removed = {
            let mut nodes = self.write();
            nodes.shift_remove(node_id).is_some()
        };

        if removed {
            info!(node = %node_id, "Node left");
            if let Some(events) = self.events_sink() {
                events.node_removed(node_id);
            }
        }
        removed
    }

    /// Refresh a node's heartbeat. False iff the id is unknown.
    pub fn heartbeat(&self, node_id: &NodeId) -> bool {
        let now = self.clock.now();
        let mut nodes = self.write();
        match nodes.get_mut(node_id) {
            Some(node) => {
                node.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Node> {
        self.read().get(node_id).cloned()
    }

    /// Point-in-time view of the directory, in insertion order.
    pub fn all(&self) -> Vec<Node> {
        self.read().values().cloned().collect()
    }

    /// Update a node's status (Busy/Error block placement; Offline marks a
    /// voluntary departure). False iff the id is unknown.
    pub fn set_status(&self, node_id: &NodeId, status: NodeStatus) -> bool {
        let mut nodes = self.write();
        match nodes.get_mut(node_id) {
            Some(node) => {
                debug!(node = %node_id, status = %status, "Node status changed");
                node.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// One liveness pass: nodes silent for longer than the timeout go
    /// Unresponsive and are evicted. Returns the evicted ids.
    pub fn sweep(&self) -> Vec<NodeId> {
        let now = self.clock.now();
        let timeout = ChronoDuration::from_std(self.node_timeout)
            .unwrap_or_else(|_| ChronoDuration::seconds(30));

        let stale: Vec<NodeId> = {
            let nodes = self.read();
            nodes
                .values()
                .filter(|node| node.id != self.self_id)
                .filter(|node| now - node.last_heartbeat > timeout)
                .map(|node| node.id.clone())
                .collect()
        };

        for node_id in &stale {
            warn!(node = %node_id, "Node heartbeat timed out, evicting");
            self.set_status(node_id, NodeStatus::Unresponsive);
            self.unregister(node_id);
        }

        if !stale.is_empty() {
            info!(evicted = stale.len(), remaining = self.len(), "Liveness sweep done");
        }
        stale
    }

    /// Sweep loop body, run on a coordinator worker. Ticks every `interval`
    /// (first tick after one full interval); any message or disconnect on
    /// `stop_rx` ends the loop after the in-progress pass completes.
    pub fn run_sweeper(&self, interval: Duration, stop_rx: Receiver<()>) {
        info!(interval_secs = interval.as_secs(), "Liveness sweeper started");
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.sweep();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Liveness sweeper stopped");
                    return;
                }
            }
        }
    }

    fn events_sink(&self) -> Option<Arc<dyn MembershipEvents>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<NodeId, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<NodeId, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NodeDirectory for NodeMembership {
    fn nodes_in_join_order(&self) -> Vec<Node> {
        self.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn node(id: &str) -> Node {
        Node::new(
            NodeId::from(id),
            format!("host-{id}"),
            "127.0.0.1",
            9000,
            HashMap::new(),
            Utc::now(),
        )
    }

    fn membership(clock: Arc<ManualClock>) -> NodeMembership {
        NodeMembership::new(
            NodeId::from("coordinator"),
            clock,
            Duration::from_secs(30),
        )
    }

    #[derive(Default)]
    struct RecordingEvents {
        joined: Mutex<Vec<NodeId>>,
        removed: Mutex<Vec<NodeId>>,
    }

    impl MembershipEvents for RecordingEvents {
        fn node_joined(&self, node: &Node) {
            self.joined.lock().unwrap().push(node.id.clone());
        }
        fn node_removed(&self, node_id: &NodeId) {
            self.removed.lock().unwrap().push(node_id.clone());
        }
    }

    #[test]
    fn register_sets_online_and_heartbeat() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock.clone());

        let mut stale = node("n1");
        stale.status = NodeStatus::Error;
        membership.register(stale);

        let stored = membership.get(&NodeId::from("n1")).unwrap();
        assert_eq!(stored.status, NodeStatus::Online);
        assert_eq!(stored.last_heartbeat, clock.now());
    }

    #[test]
    fn all_preserves_insertion_order() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock);

        for id in ["n3", "n1", "n2"] {
            membership.register(node(id));
        }
        let order: Vec<String> = membership
            .all()
            .into_iter()
            .map(|n| n.id.to_string())
            .collect();
        assert_eq!(order, vec!["n3", "n1", "n2"]);
    }

    #[test]
    fn heartbeat_unknown_node_is_false() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock);
        assert!(!membership.heartbeat(&NodeId::from("ghost")));
    }

    #[test]
    fn sweep_evicts_silent_nodes() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock.clone());
        let events = Arc::new(RecordingEvents::default());
        membership.bind_events(events.clone());

        membership.register(node("n1"));
        membership.register(node("n2"));

        clock.advance_secs(31);
        membership.heartbeat(&NodeId::from("n2"));

        let evicted = membership.sweep();
        assert_eq!(evicted, vec![NodeId::from("n1")]);
        assert!(membership.get(&NodeId::from("n1")).is_none());
        assert!(membership.get(&NodeId::from("n2")).is_some());
        assert_eq!(events.removed.lock().unwrap().as_slice(), &[NodeId::from("n1")]);
    }

    #[test]
    fn sweep_respects_timeout_boundary() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock.clone());
        membership.register(node("n1"));

        // Exactly at the boundary is not yet stale; strictly greater is.
        clock.advance_secs(30);
        assert!(membership.sweep().is_empty());
        clock.advance_secs(1);
        assert_eq!(membership.sweep().len(), 1);
    }

    #[test]
    fn heartbeat_resets_eviction() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = membership(clock.clone());
        membership.register(node("n1"));

        clock.advance_secs(29);
        membership.heartbeat(&NodeId::from("n1"));
        clock.advance_secs(29);
        assert!(membership.sweep().is_empty());
    }

    #[test]
    fn sweeper_stops_on_cancel() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let membership = Arc::new(membership(clock));
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();

        let handle = {
            let membership = membership.clone();
            std::thread::spawn(move || {
                membership.run_sweeper(Duration::from_millis(10), stop_rx)
            })
        };

        stop_tx.send(()).unwrap();
        handle.join().unwrap();
    }
}
