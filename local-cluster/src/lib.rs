//! Deterministic in-memory cluster: the nodes are plain `RaftServer`s, the
//! network is a message queue, and time is whatever ticks the caller
//! injects. Every step also checks the per-node safety invariants.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use raftlet_raft::{Control, Event, LogEntry, Message, NodeId, RaftServer, RaftSummary, StateMachine};

pub mod cluster_tester;

pub use cluster_tester::ClusterTester;

// Nodes outside every named partition group get a private group derived
// from their id.
const ISOLATED_BASE: usize = 1 << 16;

/// Records every applied batch so tests can assert on apply behavior.
#[derive(Clone, Default)]
pub struct RecordingStateMachine {
    batches: Arc<Mutex<Vec<Vec<LogEntry>>>>,
}

impl RecordingStateMachine {
    pub fn batches(&self) -> Vec<Vec<LogEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<LogEntry> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

impl StateMachine for RecordingStateMachine {
    fn apply(&mut self, _address: NodeId, entries: &[LogEntry]) {
        self.batches.lock().unwrap().push(entries.to_vec());
    }
}

struct SimNode {
    server: RaftServer,
    control: Control,
    state_machine: RecordingStateMachine,
    group: usize,
    is_dead: bool,
}

impl SimNode {
    fn new(id: NodeId, node_count: usize) -> Self {
        let peers = (0..node_count).filter(|&p| p != id).collect();
        let state_machine = RecordingStateMachine::default();
        Self {
            server: RaftServer::new(),
            control: Control::new(id, peers, Box::new(state_machine.clone())),
            state_machine,
            group: 0,
            is_dead: false,
        }
    }
}

pub struct LocalCluster {
    nodes: Vec<SimNode>,
    in_flight: VecDeque<Message>,
}

impl LocalCluster {
    pub fn new(node_count: usize) -> Self {
        let nodes = (0..node_count)
            .map(|id| SimNode::new(id, node_count))
            .collect();
        Self {
            nodes,
            in_flight: VecDeque::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn election_tick(&mut self, id: NodeId) {
        self.dispatch(id, Event::ElectionTick);
    }

    pub fn heartbeat_tick(&mut self, id: NodeId) {
        self.dispatch(id, Event::HeartbeatTick);
    }

    pub fn heartbeat_tick_all(&mut self) {
        for id in 0..self.nodes.len() {
            self.dispatch(id, Event::HeartbeatTick);
        }
    }

    pub fn client_append(&mut self, id: NodeId, item: &str) {
        self.dispatch(
            id,
            Event::ClientAppend {
                item: item.to_string(),
            },
        );
    }

    /// Deliver queued messages, and any they trigger, until quiescence.
    /// Messages to or from unreachable nodes are dropped, as a real network
    /// would drop them.
    pub fn deliver_all(&mut self) {
        while let Some(msg) = self.in_flight.pop_front() {
            if !self.deliverable(msg.source(), msg.dest()) {
                continue;
            }
            self.dispatch(msg.dest(), Event::Network(msg));
        }
    }

    /// Drop everything currently queued.
    pub fn drop_in_flight(&mut self) {
        self.in_flight.clear();
    }

    /// Split the cluster into the given groups; messages cross only within
    /// a group. Nodes not named in any group end up isolated.
    pub fn partition(&mut self, groups: &[&[NodeId]]) {
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.group = ISOLATED_BASE + id;
        }
        for (group, members) in groups.iter().enumerate() {
            for &id in *members {
                self.nodes[id].group = group;
            }
        }
    }

    /// Undo all partitioning.
    pub fn heal(&mut self) {
        for node in &mut self.nodes {
            node.group = 0;
        }
    }

    pub fn disconnect(&mut self, id: NodeId) {
        self.nodes[id].group = ISOLATED_BASE + id;
    }

    pub fn reconnect(&mut self, id: NodeId) {
        self.nodes[id].group = 0;
    }

    pub fn crash(&mut self, id: NodeId) {
        self.nodes[id].is_dead = true;
    }

    /// Bring a crashed node back with empty volatile state, as a process
    /// restart without persistence would.
    pub fn restart(&mut self, id: NodeId) {
        let node_count = self.nodes.len();
        let group = self.nodes[id].group;
        self.nodes[id] = SimNode::new(id, node_count);
        self.nodes[id].group = group;
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        !self.nodes[id].is_dead
    }

    pub fn summary(&self, id: NodeId) -> RaftSummary {
        self.nodes[id].server.summary(id)
    }

    pub fn applied_batches(&self, id: NodeId) -> Vec<Vec<LogEntry>> {
        self.nodes[id].state_machine.batches()
    }

    /// Alive leaders at the highest term held by any alive leader.
    pub fn leaders(&self) -> Vec<NodeId> {
        let mut highest_term = -1;
        let mut highest_leaders = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if node.is_dead || !node.server.is_leader() {
                continue;
            }
            let term = node.server.current_term();
            if term > highest_term {
                highest_term = term;
                highest_leaders.clear();
            }
            if term == highest_term {
                highest_leaders.push(id);
            }
        }
        highest_leaders
    }

    fn deliverable(&self, source: NodeId, dest: NodeId) -> bool {
        let src = &self.nodes[source];
        let dst = &self.nodes[dest];
        !src.is_dead && !dst.is_dead && src.group == dst.group
    }

    fn dispatch(&mut self, id: NodeId, event: Event) {
        let node = &mut self.nodes[id];
        if node.is_dead {
            return;
        }
        let commit_before = node.server.commit_index();
        let leader_log_before = node
            .server
            .is_leader()
            .then(|| node.server.log().entries().to_vec());

        node.server.handle_event(&mut node.control, event);

        assert!(
            node.server.commit_index() >= commit_before,
            "commit index moved backwards on node {id}"
        );
        assert!(
            node.server.last_applied() <= node.server.commit_index(),
            "node {id} applied past its commit index"
        );
        if let Some(before) = leader_log_before {
            if node.server.is_leader() {
                assert!(
                    node.server.log().entries().starts_with(&before),
                    "leader {id} rewrote its own log"
                );
            }
        }

        for msg in node.control.drain_outgoing() {
            self.in_flight.push_back(msg);
        }
    }
}
