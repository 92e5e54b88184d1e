use serde::{Deserialize, Serialize};

use crate::log::LogEntry;

pub type Term = i64;
pub type NodeId = usize;
pub type LogIndex = i64;

// -1 stands in for "no entry" wherever an index or term may be absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    AppendEntries {
        source: NodeId,
        dest: NodeId,
        term: Term,
        prev_index: LogIndex,
        prev_term: Term,
        entries: Vec<LogEntry>,
        commit_index: LogIndex,
    },
    AppendEntriesResponse {
        source: NodeId,
        dest: NodeId,
        term: Term,
        success: bool,
        match_index: LogIndex,
    },
    RequestVote {
        source: NodeId,
        dest: NodeId,
        term: Term,
        last_log_index: LogIndex,
        last_log_term: Term,
    },
    RequestVoteResponse {
        source: NodeId,
        dest: NodeId,
        term: Term,
        vote_granted: bool,
    },
}

impl Message {
    pub fn source(&self) -> NodeId {
        use Message::*;
        match self {
            AppendEntries { source, .. }
            | AppendEntriesResponse { source, .. }
            | RequestVote { source, .. }
            | RequestVoteResponse { source, .. } => *source,
        }
    }

    pub fn dest(&self) -> NodeId {
        use Message::*;
        match self {
            AppendEntries { dest, .. }
            | AppendEntriesResponse { dest, .. }
            | RequestVote { dest, .. }
            | RequestVoteResponse { dest, .. } => *dest,
        }
    }

    pub fn term(&self) -> Term {
        use Message::*;
        match self {
            AppendEntries { term, .. }
            | AppendEntriesResponse { term, .. }
            | RequestVote { term, .. }
            | RequestVoteResponse { term, .. } => *term,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Event {
    HeartbeatTick,
    ElectionTick,
    ClientAppend { item: String },
    DumpState,
    Network(Message),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RaftSummary {
    pub id: NodeId,
    pub term: Term,
    pub is_leader: bool,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub log: Vec<LogEntry>,
}
