use color_eyre::eyre::{bail, Result};

use raftlet_raft::{LogEntry, LogIndex, NodeId};

use crate::LocalCluster;

/// Assertion-oriented wrapper around [`LocalCluster`] for protocol tests.
pub struct ClusterTester {
    pub cluster: LocalCluster,
}

impl ClusterTester {
    pub fn new(node_count: usize) -> Self {
        Self {
            cluster: LocalCluster::new(node_count),
        }
    }

    /// Drive one full election from `id` and verify it wins. A first tick
    /// may only consume a pending leader signal, so tick again when the
    /// term did not move.
    pub fn elect(&mut self, id: NodeId) -> Result<()> {
        self.cluster.deliver_all();
        let term_before = self.cluster.summary(id).term;
        self.cluster.election_tick(id);
        if self.cluster.summary(id).term == term_before {
            self.cluster.election_tick(id);
        }
        self.cluster.deliver_all();
        if !self.cluster.summary(id).is_leader {
            bail!("node {id} failed to win its election");
        }
        Ok(())
    }

    /// One replication round: the leader heartbeats, responses flow back,
    /// commit advances on the leader. A second round tells the followers.
    pub fn replicate(&mut self, leader: NodeId) {
        self.cluster.heartbeat_tick(leader);
        self.cluster.deliver_all();
        self.cluster.heartbeat_tick(leader);
        self.cluster.deliver_all();
    }

    /// Exactly one alive leader at the highest live term.
    pub fn check_one_leader(&self) -> Result<NodeId> {
        let leaders = self.cluster.leaders();
        match leaders.len() {
            1 => Ok(leaders[0]),
            0 => bail!("no leader"),
            _ => bail!("more than one leader on the same term: {leaders:?}"),
        }
    }

    /// Count of alive nodes whose commit index covers `index`.
    pub fn n_committed(&self, index: LogIndex) -> usize {
        (0..self.cluster.node_count())
            .filter(|&id| self.cluster.is_alive(id))
            .filter(|&id| self.cluster.summary(id).commit_index >= index)
            .count()
    }

    pub fn log_of(&self, id: NodeId) -> Vec<LogEntry> {
        self.cluster.summary(id).log
    }

    /// Every alive node holds the same term.
    pub fn term_agreement(&self) -> bool {
        let mut terms = (0..self.cluster.node_count())
            .filter(|&id| self.cluster.is_alive(id))
            .map(|id| self.cluster.summary(id).term);
        let Some(first) = terms.next() else {
            return true;
        };
        terms.all(|term| term == first)
    }

    /// Log-matching property across every pair of alive nodes: where two
    /// logs hold the same term at an index, they agree on that entry and on
    /// every earlier one.
    pub fn check_log_matching(&self) -> Result<()> {
        let logs: Vec<(NodeId, Vec<LogEntry>)> = (0..self.cluster.node_count())
            .filter(|&id| self.cluster.is_alive(id))
            .map(|id| (id, self.log_of(id)))
            .collect();
        for (a_id, a) in &logs {
            for (b_id, b) in &logs {
                if a_id >= b_id {
                    continue;
                }
                for i in (0..a.len().min(b.len())).rev() {
                    if a[i].term == b[i].term {
                        if a[..=i] != b[..=i] {
                            bail!("logs of {a_id} and {b_id} disagree below matching index {i}");
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
