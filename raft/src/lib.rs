use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use tracing::{debug, warn};

pub mod control;
pub mod log;
pub mod msg;

pub use control::{Control, PrintingStateMachine, StateMachine};
pub use log::{Log, LogEntry};
pub use msg::{Event, LogIndex, Message, NodeId, RaftSummary, Term};

/// Leader and candidate bookkeeping lives inside the role so it cannot
/// exist outside it.
#[derive(Clone, Debug)]
pub enum Role {
    Follower,
    Candidate {
        votes_granted: HashSet<NodeId>,
    },
    Leader {
        // For each peer, index of the next log entry to send;
        // initialized to the leader's log length.
        next_index: HashMap<NodeId, LogIndex>,
        // For each peer, highest log index known to be replicated there;
        // initialized to -1, increases monotonically.
        match_index: HashMap<NodeId, LogIndex>,
    },
}

/// One node's Raft state machine. Entirely synchronous: the owning event
/// loop feeds it events one at a time and all side effects go through the
/// `Control` it is handed.
#[derive(Debug)]
pub struct RaftServer {
    role: Role,
    current_term: Term,
    voted_for: Option<NodeId>,
    log: Log,
    commit_index: LogIndex,
    last_applied: LogIndex,
    // Cleared on each election tick, set by any in-term AppendEntries.
    heard_from_leader: bool,
}

impl Default for RaftServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RaftServer {
    pub fn new() -> Self {
        Self {
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            commit_index: -1,
            last_applied: -1,
            heard_from_leader: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader { .. })
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn summary(&self, id: NodeId) -> RaftSummary {
        RaftSummary {
            id,
            term: self.current_term,
            is_leader: self.is_leader(),
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            log: self.log.entries().to_vec(),
        }
    }

    /// Single entry point for the event loop.
    pub fn handle_event(&mut self, ctl: &mut Control, event: Event) {
        match event {
            Event::HeartbeatTick => self.handle_heartbeat_tick(ctl),
            Event::ElectionTick => self.handle_election_tick(ctl),
            Event::ClientAppend { item } => self.handle_client_append(ctl, item),
            Event::DumpState => println!("{} {:#?}", ctl.address, self),
            Event::Network(msg) => self.handle_message(ctl, msg),
        }
    }

    /// Term check, then dispatch. A higher term always demotes us before the
    /// message is handled; a stale term drops the message entirely.
    fn handle_message(&mut self, ctl: &mut Control, msg: Message) {
        if msg.term() > self.current_term {
            self.current_term = msg.term();
            self.become_follower(ctl);
        }
        if msg.term() < self.current_term {
            debug!(address = ctl.address, ?msg, "dropping stale message");
            return;
        }
        match msg {
            Message::AppendEntries {
                source,
                prev_index,
                prev_term,
                entries,
                commit_index,
                ..
            } => self.handle_append_entries(ctl, source, prev_index, prev_term, entries, commit_index),
            Message::AppendEntriesResponse {
                source,
                success,
                match_index,
                ..
            } => self.handle_append_entries_response(ctl, source, success, match_index),
            Message::RequestVote {
                source,
                last_log_index,
                last_log_term,
                ..
            } => self.handle_request_vote(ctl, source, last_log_index, last_log_term),
            Message::RequestVoteResponse {
                source,
                vote_granted,
                ..
            } => self.handle_request_vote_response(ctl, source, vote_granted),
        }
    }

    fn handle_heartbeat_tick(&mut self, ctl: &mut Control) {
        if self.is_leader() {
            self.send_all_append_entries(ctl);
        }
    }

    /// Two-tick election timer: a tick that finds the leader flag set
    /// consumes it; a tick that finds it clear starts an election. The
    /// effective timeout is between one and two tick periods.
    fn handle_election_tick(&mut self, ctl: &mut Control) {
        if self.is_leader() {
            return;
        }
        if self.heard_from_leader {
            self.heard_from_leader = false;
            return;
        }
        self.become_candidate(ctl);
    }

    /// Leader-only entry to the replicated log. The entry travels on the
    /// next heartbeat or response-driven resend.
    fn handle_client_append(&mut self, ctl: &mut Control, item: String) {
        if !self.is_leader() {
            warn!(address = ctl.address, %item, "client append rejected: not the leader");
            return;
        }
        let entry = LogEntry::new(self.current_term, item);
        let appended = self
            .log
            .append(self.log.last_index(), self.log.last_term(), vec![entry]);
        assert!(appended, "append at own tail");
    }

    fn handle_append_entries(
        &mut self,
        ctl: &mut Control,
        source: NodeId,
        prev_index: LogIndex,
        prev_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: LogIndex,
    ) {
        // An in-term AppendEntries means a leader for this term exists.
        if matches!(self.role, Role::Candidate { .. }) {
            self.become_follower(ctl);
        }
        if !matches!(self.role, Role::Follower) {
            return;
        }
        let count = entries.len() as LogIndex;
        let success = self.log.append(prev_index, prev_term, entries);
        let match_index = if success { prev_index + count } else { -1 };
        if success && leader_commit > self.commit_index {
            self.commit_index = leader_commit.min(self.log.last_index());
            self.apply_committed(ctl);
        }
        self.heard_from_leader = true;
        ctl.send(Message::AppendEntriesResponse {
            source: ctl.address,
            dest: source,
            term: self.current_term,
            success,
            match_index,
        });
    }

    fn handle_append_entries_response(
        &mut self,
        ctl: &mut Control,
        source: NodeId,
        success: bool,
        match_index: LogIndex,
    ) {
        if success {
            let Role::Leader {
                next_index,
                match_index: replicated,
            } = &mut self.role
            else {
                return;
            };
            next_index.insert(source, match_index + 1);
            replicated.insert(source, match_index);
            self.advance_commit_index(ctl);
        } else {
            let Role::Leader { next_index, .. } = &mut self.role else {
                return;
            };
            if let Some(next) = next_index.get_mut(&source) {
                *next = (*next - 1).max(0);
            }
            self.send_one_append_entries(ctl, source);
        }
    }

    fn handle_request_vote(
        &mut self,
        ctl: &mut Control,
        source: NodeId,
        last_log_index: LogIndex,
        last_log_term: Term,
    ) {
        let free_to_vote = self.voted_for.is_none() || self.voted_for == Some(source);
        let up_to_date = last_log_term > self.log.last_term()
            || (last_log_term == self.log.last_term() && last_log_index >= self.log.last_index());
        let vote_granted = free_to_vote && up_to_date;
        if vote_granted {
            self.voted_for = Some(source);
        }
        ctl.send(Message::RequestVoteResponse {
            source: ctl.address,
            dest: source,
            term: self.current_term,
            vote_granted,
        });
    }

    fn handle_request_vote_response(
        &mut self,
        ctl: &mut Control,
        source: NodeId,
        vote_granted: bool,
    ) {
        let majority_threshold = ctl.cluster_size() / 2;
        let Role::Candidate { votes_granted } = &mut self.role else {
            return;
        };
        if !vote_granted {
            return;
        }
        votes_granted.insert(source);
        if votes_granted.len() > majority_threshold {
            self.become_leader(ctl);
        }
    }

    fn become_follower(&mut self, ctl: &mut Control) {
        self.role = Role::Follower;
        self.voted_for = None;
        println!("{} BECAME FOLLOWER", ctl.address);
    }

    fn become_candidate(&mut self, ctl: &mut Control) {
        self.current_term += 1;
        self.voted_for = Some(ctl.address);
        let mut votes_granted = HashSet::new();
        votes_granted.insert(ctl.address);
        self.role = Role::Candidate { votes_granted };
        println!("{} BECAME CANDIDATE", ctl.address);
        let last_log_index = self.log.last_index();
        let last_log_term = self.log.last_term();
        for peer in ctl.peers.clone() {
            ctl.send(Message::RequestVote {
                source: ctl.address,
                dest: peer,
                term: self.current_term,
                last_log_index,
                last_log_term,
            });
        }
    }

    fn become_leader(&mut self, ctl: &mut Control) {
        let mut next_index = HashMap::new();
        let mut match_index = HashMap::new();
        for &peer in &ctl.peers {
            next_index.insert(peer, self.log.len() as LogIndex);
            match_index.insert(peer, -1);
        }
        self.role = Role::Leader {
            next_index,
            match_index,
        };
        println!("{} BECAME LEADER", ctl.address);
        self.send_all_append_entries(ctl);
    }

    fn send_one_append_entries(&mut self, ctl: &mut Control, peer: NodeId) {
        let Role::Leader { next_index, .. } = &self.role else {
            return;
        };
        let next = next_index.get(&peer).copied().unwrap_or_default();
        let prev_index = next - 1;
        ctl.send(Message::AppendEntries {
            source: ctl.address,
            dest: peer,
            term: self.current_term,
            prev_index,
            prev_term: self.log.term_at(prev_index),
            entries: self.log.tail_from(next),
            commit_index: self.commit_index,
        });
    }

    fn send_all_append_entries(&mut self, ctl: &mut Control) {
        for peer in ctl.peers.clone() {
            self.send_one_append_entries(ctl, peer);
        }
    }

    /// Leader commit rule: the median of the peers' match indices is the
    /// highest index replicated on a majority once this node is counted.
    /// Only entries from the current term commit by counting replicas.
    fn advance_commit_index(&mut self, ctl: &mut Control) {
        let Role::Leader { match_index, .. } = &self.role else {
            return;
        };
        let mut replicated: Vec<LogIndex> = ctl
            .peers
            .iter()
            .map(|peer| match_index.get(peer).copied().unwrap_or(-1))
            .collect();
        if replicated.is_empty() {
            return;
        }
        replicated.sort_unstable();
        let median = replicated[replicated.len() / 2];
        if median > self.commit_index && self.log.term_at(median) == self.current_term {
            self.commit_index = median;
            self.apply_committed(ctl);
        }
    }

    fn apply_committed(&mut self, ctl: &mut Control) {
        if self.commit_index <= self.last_applied {
            return;
        }
        ctl.apply(self.log.range(self.last_applied + 1, self.commit_index));
        self.last_applied = self.commit_index;
    }
}
