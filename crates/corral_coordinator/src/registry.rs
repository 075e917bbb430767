//! Agent catalog.
//!
//! Tracks every declared agent plus the greatest version seen per agent id.
//! The registry is in-memory by design; a restart starts empty.

use corral_ids::AgentId;
use corral_protocol::{Agent, Version};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::router::AgentDirectory;

#[derive(Default)]
struct RegistryInner {
    agents: HashMap<AgentId, Agent>,
    latest: HashMap<AgentId, Version>,
}

/// Concurrent agent catalog. Single-key operations are atomic; `all()` is a
/// point-in-time snapshot.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an agent record under its id. Overwrites any existing record;
    /// the latest-version map moves only forward. Never fails.
    pub fn register(&self, agent: Agent) {
        let mut inner = self.write();
        let id = agent.id.clone();

        let bump = match inner.latest.get(&id) {
            Some(existing) => agent.version > *existing,
            None => true,
        };
        if bump {
            inner.latest.insert(id.clone(), agent.version);
        }

        debug!(agent = %id, version = %agent.version, "Registered agent");
        inner.agents.insert(id, agent);
    }

    /// Remove an agent and its version history. False iff the id was absent.
    pub fn unregister(&self, agent_id: &AgentId) -> bool {
        let mut inner = self.write();
        let removed = inner.agents.remove(agent_id).is_some();
        inner.latest.remove(agent_id);
        if removed {
            debug!(agent = %agent_id, "Unregistered agent");
        }
        removed
    }

    /// Overwrite an existing record. False iff the id was never registered;
    /// the record is not stored in that case.
    pub fn update(&self, agent: Agent) -> bool {
        {
            let inner = self.read();
            if !inner.agents.contains_key(&agent.id) {
                return false;
            }
        }
        self.register(agent);
        true
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Agent> {
        self.read().agents.get(agent_id).cloned()
    }

    /// Point-in-time snapshot of the whole catalog.
    pub fn all(&self) -> HashMap<AgentId, Agent> {
        self.read().agents.clone()
    }

    pub fn latest_version(&self, agent_id: &AgentId) -> Option<Version> {
        self.read().latest.get(agent_id).copied()
    }

    pub fn is_registered(&self, agent_id: &AgentId) -> bool {
        self.read().agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.read().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().agents.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AgentDirectory for AgentRegistry {
    fn is_registered(&self, agent_id: &AgentId) -> bool {
        AgentRegistry::is_registered(self, agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use corral_protocol::AgentKind;

    fn agent(id: &str, version: &str) -> Agent {
        Agent::new(
            AgentId::from(id),
            format!("agent-{id}"),
            AgentKind::Analyzer,
            version.parse().unwrap(),
            "registry://module",
            Utc::now(),
        )
    }

    #[test]
    fn register_and_lookup() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1", "1.0.0"));

        assert!(registry.is_registered(&AgentId::from("a1")));
        assert_eq!(registry.get(&AgentId::from("a1")).unwrap().name, "agent-a1");
        assert_eq!(
            registry.latest_version(&AgentId::from("a1")),
            Some("1.0.0".parse().unwrap())
        );
    }

    #[test]
    fn unregister_clears_both_maps() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1", "1.0.0"));

        assert!(registry.unregister(&AgentId::from("a1")));
        assert!(!registry.is_registered(&AgentId::from("a1")));
        assert_eq!(registry.latest_version(&AgentId::from("a1")), None);
        assert!(!registry.unregister(&AgentId::from("a1")));
    }

    #[test]
    fn latest_version_is_monotonic() {
        let registry = AgentRegistry::new();
        let id = AgentId::from("x");

        registry.register(agent("x", "1.2.0"));
        registry.register(agent("x", "1.3.0"));
        registry.register(agent("x", "1.2.5"));

        assert_eq!(registry.latest_version(&id), Some("1.3.0".parse().unwrap()));
        // The record itself still reflects the last write.
        assert_eq!(
            registry.get(&id).unwrap().version,
            "1.2.5".parse().unwrap()
        );
    }

    #[test]
    fn update_requires_presence() {
        let registry = AgentRegistry::new();
        assert!(!registry.update(agent("a1", "1.0.0")));
        assert!(!registry.is_registered(&AgentId::from("a1")));

        registry.register(agent("a1", "1.0.0"));
        assert!(registry.update(agent("a1", "1.1.0")));
        assert_eq!(
            registry.latest_version(&AgentId::from("a1")),
            Some("1.1.0".parse().unwrap())
        );
    }

    #[test]
    fn all_is_a_snapshot() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1", "1.0.0"));
        let snapshot = registry.all();

        registry.register(agent("a2", "1.0.0"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
