//! Canonical default values shared across the control plane.

use std::time::Duration;

/// Admin HTTP API defaults.
pub const DEFAULT_ADMIN_HOST: &str = "localhost";
pub const DEFAULT_ADMIN_PORT: u16 = 8080;

/// Wire transport bind for node connections.
pub const DEFAULT_TRANSPORT_ADDR: &str = "127.0.0.1:7400";

/// Interval between membership liveness sweeps.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// A node silent for longer than this is evicted on the next sweep.
pub const NODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded worker pool size in the coordinator.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Snapshot store base directory.
pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

/// Failure reason recorded on jobs orphaned by an evicted node.
pub const NODE_EVICTED_MESSAGE: &str = "node-evicted";
