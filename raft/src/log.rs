use serde::{Deserialize, Serialize};

use crate::msg::{LogIndex, Term};

/// A single replicated command: the term it was created in plus an opaque
/// payload the core never interprets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub item: String,
}

impl LogEntry {
    pub fn new(term: Term, item: impl Into<String>) -> Self {
        Self {
            term,
            item: item.into(),
        }
    }
}

/// The replicated log. Indices are 0-based and contiguous; `-1` is the
/// sentinel for "no entry".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex - 1
    }

    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(-1)
    }

    /// Term of the entry at `index`, or `-1` when out of range.
    pub fn term_at(&self, index: LogIndex) -> Term {
        if index < 0 || index > self.last_index() {
            return -1;
        }
        self.entries[index as usize].term
    }

    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index < 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries from `index` (inclusive) through the end.
    pub fn tail_from(&self, index: LogIndex) -> Vec<LogEntry> {
        if index < 0 || index as usize >= self.entries.len() {
            return Vec::new();
        }
        self.entries[index as usize..].to_vec()
    }

    /// Entries in the inclusive range `[from, to]`. `from` must be
    /// non-negative and `to` within bounds.
    pub fn range(&self, from: LogIndex, to: LogIndex) -> &[LogEntry] {
        &self.entries[from as usize..=to as usize]
    }

    /// The append primitive. Maintains the log-matching property
    /// inductively: entries are accepted only immediately after an entry
    /// whose (index, term) both sides agree on.
    ///
    /// Returns false when `prev_index` is past the end (a hole) or names an
    /// entry with a different term. A negative `prev_index` replaces the
    /// whole log. On success any suffix after `prev_index` is discarded
    /// before `entries` is appended, so retransmissions are idempotent.
    pub fn append(&mut self, prev_index: LogIndex, prev_term: Term, entries: Vec<LogEntry>) -> bool {
        if prev_index >= self.entries.len() as LogIndex {
            return false;
        }
        if prev_index < 0 {
            self.entries = entries;
            return true;
        }
        if self.entries[prev_index as usize].term != prev_term {
            return false;
        }
        self.entries.truncate(prev_index as usize + 1);
        self.entries.extend(entries);
        true
    }
}
