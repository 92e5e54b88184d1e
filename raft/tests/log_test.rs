use raftlet_raft::{Log, LogEntry};

fn entry(term: i64, item: &str) -> LogEntry {
    LogEntry::new(term, item)
}

fn log_of(entries: &[(i64, &str)]) -> Log {
    let mut log = Log::new();
    let ok = log.append(
        -1,
        -1,
        entries.iter().map(|(t, i)| entry(*t, i)).collect(),
    );
    assert!(ok);
    log
}

#[test]
fn empty_log_sentinels() {
    let log = Log::new();
    assert_eq!(log.last_index(), -1);
    assert_eq!(log.last_term(), -1);
    assert_eq!(log.term_at(0), -1);
    assert_eq!(log.term_at(-1), -1);
    assert!(log.get(0).is_none());
    assert!(log.get(-1).is_none());
}

#[test]
fn bootstrap_from_empty() {
    let mut log = Log::new();
    assert!(log.append(-1, -1, vec![entry(1, "a"), entry(1, "b")]));
    assert_eq!(log.len(), 2);
    assert_eq!(log.last_index(), 1);
    assert_eq!(log.last_term(), 1);
}

#[test]
fn negative_prev_index_replaces_whole_log() {
    let mut log = log_of(&[(1, "a"), (2, "b"), (2, "c")]);
    assert!(log.append(-1, -1, vec![entry(3, "x")]));
    assert_eq!(log.entries(), &[entry(3, "x")]);
}

#[test]
fn append_past_end_fails_and_leaves_log_unchanged() {
    let mut log = log_of(&[(1, "a")]);
    let before = log.clone();
    assert!(!log.append(1, 1, vec![entry(1, "b")]));
    assert!(!log.append(5, 1, vec![entry(1, "b")]));
    assert_eq!(log, before);
}

#[test]
fn append_past_end_fails_even_with_no_entries() {
    let mut log = log_of(&[(1, "a")]);
    assert!(!log.append(1, 1, Vec::new()));

    let mut empty = Log::new();
    assert!(!empty.append(0, 1, Vec::new()));
}

#[test]
fn mismatched_prev_term_fails_and_leaves_log_unchanged() {
    let mut log = log_of(&[(1, "a"), (2, "b")]);
    let before = log.clone();
    assert!(!log.append(1, 1, vec![entry(3, "c")]));
    assert_eq!(log, before);
}

#[test]
fn empty_entries_at_existing_index_succeed() {
    let mut log = log_of(&[(1, "a"), (2, "b")]);
    assert!(log.append(1, 2, Vec::new()));
    assert_eq!(log.entries(), &[entry(1, "a"), entry(2, "b")]);
}

#[test]
fn matching_prev_truncates_conflicting_suffix() {
    let mut log = log_of(&[(1, "a"), (1, "b"), (2, "c")]);
    assert!(log.append(0, 1, vec![entry(3, "x")]));
    assert_eq!(log.entries(), &[entry(1, "a"), entry(3, "x")]);
}

#[test]
fn entries_at_or_before_prev_index_are_never_touched() {
    let mut log = log_of(&[(1, "a"), (1, "b"), (1, "c")]);
    assert!(log.append(1, 1, vec![entry(2, "z")]));
    assert_eq!(log.entries()[..2], [entry(1, "a"), entry(1, "b")]);
}

#[test]
fn duplicate_append_is_idempotent() {
    let mut log = log_of(&[(1, "a"), (1, "b")]);
    let entries = vec![entry(2, "c"), entry(2, "d")];

    assert!(log.append(1, 1, entries.clone()));
    let after_first = log.clone();
    assert!(log.append(1, 1, entries));
    assert_eq!(log, after_first);
}

#[test]
fn tail_from_slices_to_the_end() {
    let log = log_of(&[(1, "a"), (1, "b"), (2, "c")]);
    assert_eq!(log.tail_from(1), vec![entry(1, "b"), entry(2, "c")]);
    assert_eq!(log.tail_from(3), Vec::new());
    assert_eq!(log.tail_from(0).len(), 3);
}
