use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use tidemark_types::{Commit, CommitAttempt, Partition, Snapshot, StreamHead, StreamId, Timestamp};

use crate::adapter::classify_collision;
use crate::error::{PersistenceError, PersistenceResult};
use crate::traits::{CommitStore, Commits, SnapshotStore, StreamPersistence};

type StreamKey = (Partition, StreamId);

/// Physical state shared by every handle over the same store.
#[derive(Default)]
struct StoreState {
    initialized: bool,
    /// The commit log in insertion order, which doubles as the tie-break
    /// order for equal commit stamps.
    commits: Vec<Commit>,
    snapshots: HashMap<StreamKey, BTreeMap<u64, Snapshot>>,
    heads: HashMap<StreamKey, StreamHead>,
}

/// In-memory persistence for tests and embedding.
///
/// Each handle is scoped to one partition; [`Self::for_partition`] derives
/// sibling handles over the same physical store, the way two backend
/// instances would share one database. Stream-heads are maintained
/// transactionally under the store lock (the asynchronous
/// [`StreamHeadUpdater`](crate::StreamHeadUpdater) exists for substrates
/// that cannot do this).
pub struct InMemoryPersistence {
    shared: Arc<RwLock<StoreState>>,
    partition: Partition,
    disposed: AtomicBool,
}

impl InMemoryPersistence {
    /// Create a fresh store scoped to the default partition.
    pub fn new() -> Self {
        Self::with_partition(Partition::default())
    }

    /// Create a fresh store scoped to the given partition.
    pub fn with_partition(partition: Partition) -> Self {
        Self {
            shared: Arc::new(RwLock::new(StoreState::default())),
            partition,
            disposed: AtomicBool::new(false),
        }
    }

    /// Derive a handle over the same physical store scoped to another
    /// partition. The new handle has its own disposal state.
    pub fn for_partition(&self, partition: impl Into<Partition>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            partition: partition.into(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of commits in this handle's partition.
    pub fn commit_count(&self) -> usize {
        self.read()
            .commits
            .iter()
            .filter(|c| c.partition == self.partition)
            .count()
    }

    /// The stream-head record for `stream_id`, if the stream has one.
    pub fn stream_head(&self, stream_id: &StreamId) -> Option<StreamHead> {
        self.read()
            .heads
            .get(&(self.partition.clone(), stream_id.clone()))
            .cloned()
    }

    fn guard(&self) -> PersistenceResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(PersistenceError::Disposed)
        } else {
            Ok(())
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.shared.read().expect("store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.shared.write().expect("store lock poisoned")
    }

    fn stamped(&self, mut commits: Vec<Commit>) -> Commits {
        // Stable sort: ties keep insertion order.
        commits.sort_by_key(|c| c.commit_stamp);
        Box::new(commits.into_iter().map(Ok))
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitStore for InMemoryPersistence {
    fn commits_in_range(
        &self,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<Commits> {
        self.guard()?;
        let state = self.read();
        // The log is appended in sequence order under the store lock, so the
        // filtered subsequence is already ascending by stream revision.
        let matches: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| {
                c.partition == self.partition
                    && &c.stream_id == stream_id
                    && c.stream_revision >= min_revision
                    && c.starting_stream_revision() <= max_revision
            })
            .cloned()
            .collect();
        Ok(Box::new(matches.into_iter().map(Ok)))
    }

    fn commit(&self, attempt: CommitAttempt) -> PersistenceResult<Commit> {
        self.guard()?;
        attempt.validate()?;

        let mut state = self.write();
        let mut head_revision = 0;
        for existing in state
            .commits
            .iter()
            .filter(|c| c.partition == self.partition && c.stream_id == attempt.stream_id)
        {
            if existing.commit_id == attempt.commit_id
                || existing.commit_sequence == attempt.commit_sequence
            {
                return Err(classify_collision(existing, &attempt));
            }
            head_revision = head_revision.max(existing.stream_revision);
        }
        // A distinct sequence can still be stale when a competitor with a
        // different batch size already claimed the revision window.
        if attempt.starting_stream_revision() <= head_revision {
            return Err(PersistenceError::Concurrency);
        }

        let commit = Commit {
            partition: self.partition.clone(),
            stream_id: attempt.stream_id,
            commit_id: attempt.commit_id,
            commit_sequence: attempt.commit_sequence,
            stream_revision: attempt.stream_revision,
            commit_stamp: attempt.commit_stamp,
            headers: attempt.headers,
            events: attempt.events,
            dispatched: false,
        };

        let key = (self.partition.clone(), commit.stream_id.clone());
        let head = state.heads.entry(key).or_insert_with(|| StreamHead {
            partition: commit.partition.clone(),
            stream_id: commit.stream_id.clone(),
            head_revision: 0,
            snapshot_revision: 0,
        });
        head.head_revision = head.head_revision.max(commit.stream_revision);

        state.commits.push(commit.clone());
        debug!(
            partition = %commit.partition,
            stream = %commit.stream_id,
            sequence = commit.commit_sequence,
            revision = commit.stream_revision,
            "commit persisted"
        );
        Ok(commit)
    }
}

impl SnapshotStore for InMemoryPersistence {
    fn load_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: u64,
    ) -> PersistenceResult<Option<Snapshot>> {
        self.guard()?;
        let state = self.read();
        let key = (self.partition.clone(), stream_id.clone());
        Ok(state
            .snapshots
            .get(&key)
            .and_then(|by_revision| by_revision.range(..=max_revision).next_back())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    fn add_snapshot(&self, snapshot: Snapshot) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            warn!(stream = %snapshot.stream_id, "snapshot dropped: persistence handle disposed");
            return false;
        }
        if snapshot.stream_id.is_empty() || snapshot.stream_revision == 0 {
            warn!(stream = %snapshot.stream_id, "snapshot dropped: missing stream id or revision");
            return false;
        }
        if snapshot.partition != self.partition {
            warn!(
                stream = %snapshot.stream_id,
                snapshot_partition = %snapshot.partition,
                handle_partition = %self.partition,
                "snapshot dropped: partition mismatch"
            );
            return false;
        }

        let mut state = self.write();
        let key = (snapshot.partition.clone(), snapshot.stream_id.clone());
        let head = state.heads.entry(key.clone()).or_insert_with(|| StreamHead {
            partition: snapshot.partition.clone(),
            stream_id: snapshot.stream_id.clone(),
            head_revision: snapshot.stream_revision,
            snapshot_revision: 0,
        });
        head.head_revision = head.head_revision.max(snapshot.stream_revision);
        head.snapshot_revision = snapshot.stream_revision;
        state
            .snapshots
            .entry(key)
            .or_default()
            .insert(snapshot.stream_revision, snapshot);
        true
    }

    fn streams_to_snapshot(&self, threshold: u64) -> PersistenceResult<Vec<StreamHead>> {
        self.guard()?;
        let state = self.read();
        let mut heads: Vec<StreamHead> = state
            .heads
            .values()
            .filter(|h| h.partition == self.partition && h.unsnapshotted() >= threshold)
            .cloned()
            .collect();
        heads.sort_by(|a, b| b.unsnapshotted().cmp(&a.unsnapshotted()));
        Ok(heads)
    }
}

impl StreamPersistence for InMemoryPersistence {
    fn initialize(&self) -> PersistenceResult<()> {
        self.guard()?;
        let mut state = self.write();
        if !state.initialized {
            state.initialized = true;
            debug!(partition = %self.partition, "in-memory persistence initialized");
        }
        Ok(())
    }

    fn partition(&self) -> &Partition {
        &self.partition
    }

    fn commits_since(&self, stamp: Timestamp) -> PersistenceResult<Commits> {
        self.guard()?;
        let state = self.read();
        let matches: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| c.partition == self.partition && c.commit_stamp >= stamp)
            .cloned()
            .collect();
        Ok(self.stamped(matches))
    }

    fn commits_between(&self, start: Timestamp, end: Timestamp) -> PersistenceResult<Commits> {
        self.guard()?;
        let state = self.read();
        let matches: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| {
                c.partition == self.partition && c.commit_stamp >= start && c.commit_stamp < end
            })
            .cloned()
            .collect();
        Ok(self.stamped(matches))
    }

    fn undispatched_commits(&self) -> PersistenceResult<Commits> {
        self.guard()?;
        let state = self.read();
        let matches: Vec<Commit> = state
            .commits
            .iter()
            .filter(|c| c.partition == self.partition && !c.dispatched)
            .cloned()
            .collect();
        Ok(self.stamped(matches))
    }

    fn mark_dispatched(&self, commit: &Commit) -> PersistenceResult<()> {
        self.guard()?;
        let mut state = self.write();
        if let Some(stored) = state.commits.iter_mut().find(|c| {
            c.partition == self.partition
                && c.stream_id == commit.stream_id
                && c.commit_id == commit.commit_id
        }) {
            stored.dispatched = true;
        }
        Ok(())
    }

    fn purge(&self) -> PersistenceResult<()> {
        self.guard()?;
        let mut state = self.write();
        state.commits.retain(|c| c.partition != self.partition);
        state.snapshots.retain(|(partition, _), _| partition != &self.partition);
        state.heads.retain(|(partition, _), _| partition != &self.partition);
        debug!(partition = %self.partition, "partition purged");
        Ok(())
    }

    fn close(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(partition = %self.partition, "persistence handle closed");
        }
    }
}
