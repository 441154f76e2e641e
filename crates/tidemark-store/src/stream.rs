use std::collections::BTreeMap;

use serde_json::Value;

use tidemark_persistence::{PersistenceError, PersistenceResult};
use tidemark_types::{Commit, CommitAttempt, CommitId, EventMessage, Snapshot, StreamId, Timestamp};

use crate::store::EventStore;

/// A per-stream session: committed history plus a buffer of uncommitted
/// events, with optimistic concurrency against the persistent log.
///
/// A stream is not thread-safe and must not be shared between threads; the
/// owning [`EventStore`] is the shared, thread-safe object.
///
/// # Commit protocol
///
/// [`commit_changes`](Self::commit_changes) builds an attempt at the next
/// commit sequence and submits it through the facade. On success the
/// pending buffer merges into committed state. On
/// [`Concurrency`](PersistenceError::Concurrency) the stream *rebases*: it
/// re-reads the commits competitors persisted, folds them into committed
/// state, and surfaces the failure with the pending buffer intact — the
/// caller inspects the fresh view, decides whether its intent still
/// applies, and retries. On
/// [`DuplicateCommit`](PersistenceError::DuplicateCommit) nothing changes
/// locally; the commit is already recorded under that id.
pub struct EventStream<'a> {
    store: &'a EventStore,
    stream_id: StreamId,
    stream_revision: u64,
    commit_sequence: u64,
    committed: Vec<EventMessage>,
    committed_headers: BTreeMap<String, Value>,
    uncommitted: Vec<EventMessage>,
    uncommitted_headers: BTreeMap<String, Value>,
}

impl<'a> EventStream<'a> {
    pub(crate) fn empty(store: &'a EventStore, stream_id: StreamId) -> Self {
        Self {
            store,
            stream_id,
            stream_revision: 0,
            commit_sequence: 0,
            committed: Vec::new(),
            committed_headers: BTreeMap::new(),
            uncommitted: Vec::new(),
            uncommitted_headers: BTreeMap::new(),
        }
    }

    pub(crate) fn hydrated(
        store: &'a EventStore,
        stream_id: StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<Self> {
        let mut stream = Self::empty(store, stream_id);
        let id = stream.stream_id.clone();
        let commits = store.commits_in_range(&id, min_revision, max_revision)?;
        stream.populate(commits, min_revision, max_revision)?;
        Ok(stream)
    }

    pub(crate) fn from_snapshot(
        store: &'a EventStore,
        snapshot: Snapshot,
        max_revision: u64,
    ) -> PersistenceResult<Self> {
        let mut stream = Self::empty(store, snapshot.stream_id.clone());
        stream.stream_revision = snapshot.stream_revision;
        // Read from the snapshot revision itself so the commit containing
        // it is seen and the sequence cursor lands correctly, but only fold
        // in events strictly after the snapshot.
        let id = stream.stream_id.clone();
        let commits = store.commits_in_range(&id, snapshot.stream_revision, max_revision)?;
        stream.populate(commits, snapshot.stream_revision + 1, max_revision)?;
        Ok(stream)
    }

    /// The stream this session is bound to.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Highest committed revision observed by this session.
    pub fn stream_revision(&self) -> u64 {
        self.stream_revision
    }

    /// Highest commit sequence observed by this session.
    pub fn commit_sequence(&self) -> u64 {
        self.commit_sequence
    }

    /// Committed events visible to this session, in revision order.
    pub fn committed_events(&self) -> &[EventMessage] {
        &self.committed
    }

    /// Union of the headers of every commit folded into this session.
    pub fn committed_headers(&self) -> &BTreeMap<String, Value> {
        &self.committed_headers
    }

    /// Events appended but not yet committed.
    pub fn uncommitted_events(&self) -> &[EventMessage] {
        &self.uncommitted
    }

    /// Headers staged for the next commit.
    pub fn uncommitted_headers(&self) -> &BTreeMap<String, Value> {
        &self.uncommitted_headers
    }

    /// Returns `true` if there are pending events to commit.
    pub fn has_changes(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Buffer an event for the next commit.
    pub fn append(&mut self, event: EventMessage) {
        self.uncommitted.push(event);
    }

    /// Stage a header for the next commit.
    pub fn set_header(&mut self, name: impl Into<String>, value: Value) {
        self.uncommitted_headers.insert(name.into(), value);
    }

    /// Discard pending events and headers; committed state is untouched.
    pub fn clear_changes(&mut self) {
        self.uncommitted.clear();
        self.uncommitted_headers.clear();
    }

    /// Commit the pending buffer under the caller-chosen `commit_id`.
    ///
    /// Returns without effect when there is nothing to commit. See the
    /// type-level docs for the conflict protocol.
    pub fn commit_changes(&mut self, commit_id: CommitId) -> PersistenceResult<()> {
        if !self.has_changes() {
            return Ok(());
        }
        match self.persist_changes(commit_id) {
            Err(PersistenceError::Concurrency) => {
                let min = self.stream_revision + 1;
                let store = self.store;
                let id = self.stream_id.clone();
                let commits = store.commits_in_range(&id, min, u64::MAX)?;
                self.populate(commits, min, u64::MAX)?;
                Err(PersistenceError::Concurrency)
            }
            other => other,
        }
    }

    fn persist_changes(&mut self, commit_id: CommitId) -> PersistenceResult<()> {
        let attempt = self.build_attempt(commit_id);
        let persisted = self.store.commit(attempt)?;
        if let Some(commit) = persisted {
            let min = self.stream_revision + 1;
            let max = commit.stream_revision;
            self.populate(std::iter::once(Ok(commit)), min, max)?;
        }
        // Dropped attempts (hook veto) discard the buffer too: the drop is
        // silent by design and retrying the identical attempt would only be
        // vetoed again.
        self.clear_changes();
        Ok(())
    }

    fn build_attempt(&self, commit_id: CommitId) -> CommitAttempt {
        CommitAttempt {
            stream_id: self.stream_id.clone(),
            commit_id,
            commit_sequence: self.commit_sequence + 1,
            stream_revision: self.stream_revision + self.uncommitted.len() as u64,
            commit_stamp: Timestamp::now(),
            headers: self.uncommitted_headers.clone(),
            events: self.uncommitted.clone(),
        }
    }

    /// Fold commits into committed state, keeping only events whose
    /// revision lies in `[min_revision, max_revision]`.
    fn populate<I>(
        &mut self,
        commits: I,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<()>
    where
        I: Iterator<Item = PersistenceResult<Commit>>,
    {
        for commit in commits {
            let commit = commit?;
            let mut revision = commit.starting_stream_revision();
            if revision > max_revision {
                break;
            }
            self.commit_sequence = commit.commit_sequence;
            for (name, value) in commit.headers {
                self.committed_headers.insert(name, value);
            }
            for event in commit.events {
                if revision > max_revision {
                    break;
                }
                if revision >= min_revision {
                    self.committed.push(event);
                    self.stream_revision = revision;
                }
                revision += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use tidemark_pipeline::PipelineHook;
    use tidemark_types::Partition;

    fn event(tag: &str) -> EventMessage {
        EventMessage::new(json!({ "tag": tag }))
    }

    fn store() -> EventStore {
        EventStore::builder().build().expect("in-memory build")
    }

    #[test]
    fn new_stream_starts_at_zero() {
        let store = store();
        let stream = store.create_stream("s-1");
        assert_eq!(stream.stream_revision(), 0);
        assert_eq!(stream.commit_sequence(), 0);
        assert!(stream.committed_events().is_empty());
        assert!(!stream.has_changes());
    }

    #[test]
    fn commit_merges_pending_into_committed() {
        let store = store();
        let mut stream = store.create_stream("s-1");
        stream.append(event("a"));
        stream.append(event("b"));
        stream.set_header("actor", json!("svc-billing"));
        stream.commit_changes(CommitId::new()).unwrap();

        assert_eq!(stream.stream_revision(), 2);
        assert_eq!(stream.commit_sequence(), 1);
        assert_eq!(stream.committed_events().len(), 2);
        assert_eq!(stream.committed_headers()["actor"], json!("svc-billing"));
        assert!(!stream.has_changes());
        assert!(stream.uncommitted_headers().is_empty());
    }

    #[test]
    fn commit_without_changes_is_a_noop() {
        let store = store();
        let mut stream = store.create_stream("s-1");
        stream.commit_changes(CommitId::new()).unwrap();
        assert_eq!(stream.commit_sequence(), 0);
        let persisted: Vec<_> = store
            .advanced()
            .commits_in_range(&"s-1".into(), 0, u64::MAX)
            .unwrap()
            .collect();
        assert!(persisted.is_empty());
    }

    #[test]
    fn clear_changes_discards_pending_only() {
        let store = store();
        let mut stream = store.create_stream("s-1");
        stream.append(event("kept"));
        stream.commit_changes(CommitId::new()).unwrap();

        stream.append(event("dropped"));
        stream.set_header("k", json!(1));
        stream.clear_changes();
        assert!(!stream.has_changes());
        assert!(stream.uncommitted_headers().is_empty());
        assert_eq!(stream.committed_events().len(), 1);
    }

    #[test]
    fn round_trip_preserves_payloads() {
        let store = store();
        let mut writer = store.create_stream("s-1");
        let payload = json!({ "kind": "OrderPlaced", "total": 125, "lines": [1, 2, 3] });
        writer.append(EventMessage::new(payload.clone()));
        writer.commit_changes(CommitId::new()).unwrap();

        let reader = store.open_stream("s-1", 0, 0).unwrap();
        assert_eq!(reader.committed_events().len(), 1);
        assert_eq!(reader.committed_events()[0].body, payload);
    }

    #[test]
    fn open_stream_positions_at_head() {
        let store = store();
        let mut writer = store.create_stream("s-1");
        writer.append(event("a"));
        writer.append(event("b"));
        writer.commit_changes(CommitId::new()).unwrap();
        writer.append(event("c"));
        writer.commit_changes(CommitId::new()).unwrap();

        let reader = store.open_stream("s-1", 0, 0).unwrap();
        assert_eq!(reader.stream_revision(), 3);
        assert_eq!(reader.commit_sequence(), 2);
        assert_eq!(reader.committed_events().len(), 3);
    }

    #[test]
    fn ranged_open_keeps_only_window_events() {
        let store = store();
        let mut writer = store.create_stream("s-1");
        writer.append(event("r1"));
        writer.append(event("r2"));
        writer.commit_changes(CommitId::new()).unwrap(); // revisions 1..=2
        writer.append(event("r3"));
        writer.append(event("r4"));
        writer.commit_changes(CommitId::new()).unwrap(); // revisions 3..=4

        let reader = store.open_stream("s-1", 2, 3).unwrap();
        assert_eq!(reader.committed_events().len(), 2);
        assert_eq!(reader.committed_events()[0].body["tag"], "r2");
        assert_eq!(reader.committed_events()[1].body["tag"], "r3");
        assert_eq!(reader.stream_revision(), 3);
        assert_eq!(reader.commit_sequence(), 2);
    }

    #[test]
    fn snapshot_open_reads_forward_from_snapshot() {
        let store = store();
        let mut writer = store.create_stream("s-1");
        writer.append(event("r1"));
        writer.append(event("r2"));
        writer.commit_changes(CommitId::new()).unwrap();
        writer.append(event("r3"));
        writer.append(event("r4"));
        writer.commit_changes(CommitId::new()).unwrap();

        let snapshot = Snapshot::new(Partition::default(), "s-1", 2, json!({ "upto": "r2" }));
        assert!(store.advanced().add_snapshot(snapshot.clone()));

        let reader = store.open_stream_from_snapshot(snapshot, 0).unwrap();
        assert_eq!(reader.stream_revision(), 4);
        assert_eq!(reader.commit_sequence(), 2);
        assert_eq!(reader.committed_events().len(), 2);
        assert_eq!(reader.committed_events()[0].body["tag"], "r3");
    }

    #[test]
    fn snapshot_at_head_still_commits_at_the_right_sequence() {
        let store = store();
        let mut writer = store.create_stream("s-1");
        writer.append(event("r1"));
        writer.append(event("r2"));
        writer.commit_changes(CommitId::new()).unwrap();

        let snapshot = Snapshot::new(Partition::default(), "s-1", 2, json!("head"));
        let mut reader = store.open_stream_from_snapshot(snapshot, 0).unwrap();
        assert_eq!(reader.stream_revision(), 2);
        assert_eq!(reader.commit_sequence(), 1);
        assert!(reader.committed_events().is_empty());

        reader.append(event("r3"));
        reader.commit_changes(CommitId::new()).unwrap();
        assert_eq!(reader.stream_revision(), 3);
        assert_eq!(reader.commit_sequence(), 2);
    }

    #[test]
    fn losing_writer_rebases_and_keeps_pending_events() {
        let store = store();
        let mut winner = store.create_stream("s-1");
        let mut loser = store.create_stream("s-1");

        winner.append(event("winner"));
        winner.commit_changes(CommitId::new()).unwrap();

        loser.append(event("loser"));
        let err = loser.commit_changes(CommitId::new()).unwrap_err();
        assert_eq!(err, PersistenceError::Concurrency);

        // Rebase folded in the winner's commit.
        assert_eq!(loser.commit_sequence(), 1);
        assert_eq!(loser.stream_revision(), 1);
        assert_eq!(loser.committed_events().len(), 1);
        assert_eq!(loser.committed_events()[0].body["tag"], "winner");
        // Pending changes survived.
        assert_eq!(loser.uncommitted_events().len(), 1);

        // Retry now lands at sequence 2, revision 2.
        loser.commit_changes(CommitId::new()).unwrap();
        assert_eq!(loser.commit_sequence(), 2);
        assert_eq!(loser.stream_revision(), 2);
        assert_eq!(loser.committed_events().len(), 2);
    }

    #[test]
    fn concurrent_writers_produce_exactly_one_winner() {
        let store = store();
        let outcomes: Vec<PersistenceResult<()>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|n| {
                    let store = &store;
                    scope.spawn(move || {
                        let mut stream = store.create_stream("s-1");
                        stream.append(event(&format!("writer-{n}")));
                        let outcome = stream.commit_changes(CommitId::new());
                        if outcome.is_err() {
                            // The loser must already see the winner's commit.
                            assert_eq!(stream.commit_sequence(), 1);
                            assert_eq!(stream.stream_revision(), 1);
                            assert_eq!(stream.committed_events().len(), 1);
                            assert_eq!(stream.uncommitted_events().len(), 1);
                        }
                        outcome
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let wins = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| *e == PersistenceError::Concurrency));
    }

    #[test]
    fn duplicate_commit_surfaces_unchanged() {
        let store = store();
        let commit_id = CommitId::new();
        let mut first = store.create_stream("s-1");
        first.append(event("once"));
        first.commit_changes(commit_id).unwrap();

        let mut second = store.open_stream("s-1", 0, 0).unwrap();
        second.append(event("again"));
        let err = second.commit_changes(commit_id).unwrap_err();
        assert_eq!(err, PersistenceError::DuplicateCommit(commit_id));

        // Local state untouched: pending buffer intact, cursors unchanged.
        assert_eq!(second.uncommitted_events().len(), 1);
        assert_eq!(second.commit_sequence(), 1);
        assert_eq!(second.stream_revision(), 1);

        // Exactly one commit with one event reached the log.
        let reader = store.open_stream("s-1", 0, 0).unwrap();
        assert_eq!(reader.committed_events().len(), 1);
    }

    #[test]
    fn vetoed_commit_clears_pending_silently() {
        struct VetoAll;
        impl PipelineHook for VetoAll {
            fn pre_commit(&self, _attempt: &CommitAttempt) -> bool {
                false
            }
        }

        let store = EventStore::builder().hook(Box::new(VetoAll)).build().unwrap();
        let mut stream = store.create_stream("s-1");
        stream.append(event("a"));
        stream.commit_changes(CommitId::new()).unwrap();

        assert!(!stream.has_changes());
        assert_eq!(stream.commit_sequence(), 0);
        let persisted: Vec<_> = store
            .advanced()
            .commits_in_range(&"s-1".into(), 0, u64::MAX)
            .unwrap()
            .collect();
        assert!(persisted.is_empty());
    }

    #[test]
    fn committed_commit_is_immediately_undispatched() {
        let store = store();
        let mut stream = store.create_stream("s-1");
        stream.append(event("a"));
        stream.commit_changes(CommitId::new()).unwrap();

        let pending: Vec<_> = store
            .advanced()
            .undispatched_commits()
            .unwrap()
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(pending.len(), 1);

        store.advanced().mark_dispatched(&pending[0]).unwrap();
        let pending: Vec<_> = store
            .advanced()
            .undispatched_commits()
            .unwrap()
            .collect();
        assert!(pending.is_empty());
    }
}
