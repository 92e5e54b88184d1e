use std::net::SocketAddr;
use std::time::Duration;

use raftlet_raft::NodeId;

pub const HEARTBEAT_TIMER: Duration = Duration::from_secs(1);
pub const ELECTION_TIMER_BASE: Duration = Duration::from_secs(5);
pub const ELECTION_TIMER_JITTER: Duration = Duration::from_secs(3);

const BASE_PORT: u16 = 15000;
pub const DEFAULT_CLUSTER_SIZE: usize = 5;

/// The static cluster table: node id -> listen address. Read-only after
/// start-up.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    addresses: Vec<SocketAddr>,
}

impl ClusterConfig {
    pub fn localhost(size: usize) -> Self {
        let addresses = (0..size)
            .map(|id| SocketAddr::from(([127, 0, 0, 1], BASE_PORT + id as u16)))
            .collect();
        Self { addresses }
    }

    pub fn from_addresses(addresses: Vec<SocketAddr>) -> Self {
        Self { addresses }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addr_of(&self, id: NodeId) -> Option<SocketAddr> {
        self.addresses.get(id).copied()
    }

    pub fn peers_of(&self, id: NodeId) -> Vec<NodeId> {
        (0..self.addresses.len()).filter(|&p| p != id).collect()
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::localhost(DEFAULT_CLUSTER_SIZE)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Tunables {
    pub heartbeat: Duration,
    pub election_base: Duration,
    pub election_jitter: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            heartbeat: HEARTBEAT_TIMER,
            election_base: ELECTION_TIMER_BASE,
            election_jitter: ELECTION_TIMER_JITTER,
        }
    }
}
