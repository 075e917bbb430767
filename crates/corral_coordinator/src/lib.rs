//! Corral coordinator — control plane for a fleet of compute nodes.
//!
//! The coordinator keeps an agent catalog, tracks node membership with
//! heartbeat liveness, routes jobs onto capable online nodes, verifies
//! execution attestations, and persists opaque component snapshots. Agent
//! execution itself happens on external nodes speaking the wire protocol.

pub mod admin;
pub mod clock;
pub mod coordinator;
pub mod executor;
pub mod membership;
pub mod proof;
pub mod registry;
pub mod router;
pub mod snapshot;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use executor::Executor;
pub use membership::{MembershipEvents, NodeMembership};
pub use proof::{build_proof, ProofError, ProofValidator, ValidationOutcome};
pub use registry::AgentRegistry;
pub use router::{AgentDirectory, JobRouter, NodeDirectory, PlacementError};
pub use snapshot::{SnapshotMeta, SnapshotStore};
