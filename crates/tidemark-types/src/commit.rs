use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InvalidCommit;
use crate::event::EventMessage;
use crate::ids::{CommitId, Partition, StreamId};
use crate::timestamp::Timestamp;

/// An atomically persisted batch of one or more events appended to a stream.
///
/// Commits are owned by the persistence layer once accepted and must be
/// treated as immutable by callers; the only field a backend ever changes
/// after the fact is the dispatch flag, which flips `false → true` exactly
/// once.
///
/// Two commits compare equal when they carry the same [`CommitId`] — the
/// globally unique idempotence key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    /// The partition this commit was persisted into.
    pub partition: Partition,
    /// The stream this commit extends.
    pub stream_id: StreamId,
    /// Globally unique idempotence key.
    pub commit_id: CommitId,
    /// Ordinal of this commit within its stream (1-based, dense).
    pub commit_sequence: u64,
    /// Revision of the last event in this commit.
    pub stream_revision: u64,
    /// Wall-clock instant the commit was built.
    pub commit_stamp: Timestamp,
    /// Commit-level headers, merged from the stream's uncommitted headers.
    pub headers: BTreeMap<String, Value>,
    /// The events in this batch, in append order. Never empty.
    pub events: Vec<EventMessage>,
    /// Whether downstream subscribers have been notified of this commit.
    pub dispatched: bool,
}

impl Commit {
    /// Revision of the first event in this commit.
    pub fn starting_stream_revision(&self) -> u64 {
        (self.stream_revision + 1).saturating_sub(self.events.len() as u64)
    }

    /// Number of events in this batch.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.commit_id == other.commit_id
    }
}

impl Eq for Commit {}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.commit_id.hash(state);
    }
}

/// A proposed commit, built by a stream session and handed to persistence.
///
/// The partition is not part of the attempt: it is stamped by the backend,
/// which is scoped to exactly one partition at construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitAttempt {
    /// The stream this attempt extends.
    pub stream_id: StreamId,
    /// Caller-supplied idempotence key for this attempt.
    pub commit_id: CommitId,
    /// Proposed commit sequence (current sequence + 1).
    pub commit_sequence: u64,
    /// Proposed stream revision (current revision + event count).
    pub stream_revision: u64,
    /// Wall-clock instant the attempt was built.
    pub commit_stamp: Timestamp,
    /// Commit-level headers.
    pub headers: BTreeMap<String, Value>,
    /// The events to persist, in append order.
    pub events: Vec<EventMessage>,
}

impl CommitAttempt {
    /// Build an attempt stamped with the current wall-clock time and no
    /// headers.
    pub fn new(
        stream_id: impl Into<StreamId>,
        commit_id: CommitId,
        commit_sequence: u64,
        stream_revision: u64,
        events: Vec<EventMessage>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            commit_id,
            commit_sequence,
            stream_revision,
            commit_stamp: Timestamp::now(),
            headers: BTreeMap::new(),
            events,
        }
    }

    /// Revision of the first event in this attempt.
    pub fn starting_stream_revision(&self) -> u64 {
        (self.stream_revision + 1).saturating_sub(self.events.len() as u64)
    }

    /// Structural validity: ids present, sequence positive, revision not
    /// below sequence. Emptiness is checked separately by [`Self::is_empty`].
    pub fn is_valid(&self) -> bool {
        !self.stream_id.is_empty()
            && !self.commit_id.is_nil()
            && self.commit_sequence >= 1
            && self.stream_revision >= self.commit_sequence
    }

    /// Returns `true` if the attempt carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Full validation, as enforced by backends for direct callers.
    pub fn validate(&self) -> Result<(), InvalidCommit> {
        if self.stream_id.is_empty() {
            return Err(InvalidCommit::EmptyStreamId);
        }
        if self.commit_id.is_nil() {
            return Err(InvalidCommit::NilCommitId);
        }
        if self.commit_sequence < 1 {
            return Err(InvalidCommit::NonPositiveSequence);
        }
        if self.stream_revision < self.commit_sequence {
            return Err(InvalidCommit::RevisionBelowSequence {
                revision: self.stream_revision,
                sequence: self.commit_sequence,
            });
        }
        if self.events.is_empty() {
            return Err(InvalidCommit::NoEvents);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(n: usize) -> Vec<EventMessage> {
        (0..n).map(|i| EventMessage::new(json!(i))).collect()
    }

    fn attempt(sequence: u64, revision: u64, event_count: usize) -> CommitAttempt {
        CommitAttempt::new("s-1", CommitId::new(), sequence, revision, events(event_count))
    }

    #[test]
    fn valid_attempt() {
        let a = attempt(1, 3, 3);
        assert!(a.is_valid());
        assert!(!a.is_empty());
        assert!(a.validate().is_ok());
        assert_eq!(a.starting_stream_revision(), 1);
    }

    #[test]
    fn empty_stream_id_rejected() {
        let mut a = attempt(1, 1, 1);
        a.stream_id = StreamId::new("");
        assert!(!a.is_valid());
        assert_eq!(a.validate(), Err(InvalidCommit::EmptyStreamId));
    }

    #[test]
    fn nil_commit_id_rejected() {
        let mut a = attempt(1, 1, 1);
        a.commit_id = CommitId::from_uuid(uuid::Uuid::nil());
        assert_eq!(a.validate(), Err(InvalidCommit::NilCommitId));
    }

    #[test]
    fn zero_sequence_rejected() {
        let a = attempt(0, 1, 1);
        assert!(!a.is_valid());
        assert_eq!(a.validate(), Err(InvalidCommit::NonPositiveSequence));
    }

    #[test]
    fn revision_below_sequence_rejected() {
        let a = attempt(3, 2, 1);
        assert!(!a.is_valid());
        assert_eq!(
            a.validate(),
            Err(InvalidCommit::RevisionBelowSequence {
                revision: 2,
                sequence: 3
            })
        );
    }

    #[test]
    fn event_empty_attempt_is_structurally_valid() {
        let a = attempt(1, 1, 0);
        assert!(a.is_valid());
        assert!(a.is_empty());
        assert_eq!(a.validate(), Err(InvalidCommit::NoEvents));
    }

    #[test]
    fn starting_revision_spans_batch() {
        // Second commit of two events on a stream already at revision 2.
        let a = attempt(2, 4, 2);
        assert_eq!(a.starting_stream_revision(), 3);
    }

    #[test]
    fn commit_equality_is_by_commit_id() {
        let id = CommitId::new();
        let make = |revision| Commit {
            partition: Partition::default(),
            stream_id: StreamId::new("s-1"),
            commit_id: id,
            commit_sequence: 1,
            stream_revision: revision,
            commit_stamp: Timestamp::from_millis(1),
            headers: BTreeMap::new(),
            events: events(1),
            dispatched: false,
        };
        assert_eq!(make(1), make(9));

        let mut other = make(1);
        other.commit_id = CommitId::new();
        assert_ne!(make(1), other);
    }

    #[test]
    fn serde_roundtrip() {
        let a = attempt(1, 2, 2);
        let json = serde_json::to_string(&a).unwrap();
        let parsed: CommitAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.commit_id, a.commit_id);
        assert_eq!(parsed.events, a.events);
    }
}
