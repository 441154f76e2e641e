use tidemark_types::{Commit, CommitAttempt, Partition, Snapshot, StreamHead, StreamId, Timestamp};

use crate::error::PersistenceResult;

/// Lazy, pull-based sequence of commits.
///
/// Backends drive I/O as the iterator is consumed and stream cursors where
/// the substrate supports it; dropping the iterator cancels any remaining
/// work. Backends unable to page return the full sequence behind the same
/// type.
pub type Commits = Box<dyn Iterator<Item = PersistenceResult<Commit>> + Send>;

/// Commit-log access, scoped to the handle's partition.
///
/// This is the narrow surface the stream engine needs: range reads for
/// hydration and rebase, plus the atomic commit itself.
pub trait CommitStore: Send + Sync {
    /// Every commit of `stream_id` containing at least one event whose
    /// revision lies in `[min_revision, max_revision]`, ascending by stream
    /// revision. Empty if the stream is absent.
    fn commits_in_range(
        &self,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<Commits>;

    /// Persist an attempt atomically.
    ///
    /// Collision classification:
    /// - an existing commit with the same `(stream, commit_id)` fails with
    ///   [`DuplicateCommit`](crate::PersistenceError::DuplicateCommit);
    /// - an existing commit with the same `(stream, commit_sequence)` but a
    ///   different id fails with [`Concurrency`](crate::PersistenceError::Concurrency).
    ///
    /// On success the commit is persisted undispatched and the stream-head
    /// is advanced (transactionally or via the backend's updater).
    fn commit(&self, attempt: CommitAttempt) -> PersistenceResult<Commit>;
}

/// Snapshot access, scoped to the handle's partition.
pub trait SnapshotStore: Send + Sync {
    /// The highest-revision snapshot of `stream_id` with
    /// `stream_revision <= max_revision`, if any.
    fn load_snapshot(
        &self,
        stream_id: &StreamId,
        max_revision: u64,
    ) -> PersistenceResult<Option<Snapshot>>;

    /// Upsert a snapshot. Never fails: returns `false` when the snapshot
    /// could not be stored (the cause is logged), so snapshot tasks cannot
    /// corrupt the commit path. On success the stream-head's snapshot
    /// revision is updated.
    fn add_snapshot(&self, snapshot: Snapshot) -> bool;

    /// Stream-heads whose unsnapshotted event count has reached
    /// `threshold`, most-lagging first.
    fn streams_to_snapshot(&self, threshold: u64) -> PersistenceResult<Vec<StreamHead>>;
}

/// The full backend contract: commit log, snapshots, dispatch bookkeeping,
/// and administrative operations.
///
/// Implementations are safe for concurrent use by independent threads.
/// Every operation is implicitly scoped to the partition configured at
/// construction: two handles with different partitions over the same
/// physical store are mutually invisible across all reads, and
/// [`purge`](StreamPersistence::purge) never touches other partitions.
pub trait StreamPersistence: CommitStore + SnapshotStore {
    /// Prepare the physical store (schema, indexes). Idempotent, safe to
    /// call concurrently, and guaranteed to do the work at most once per
    /// process lifetime.
    fn initialize(&self) -> PersistenceResult<()>;

    /// The partition this handle is scoped to.
    fn partition(&self) -> &Partition;

    /// All commits with `commit_stamp >= stamp`, ascending by stamp; ties
    /// broken by insertion order.
    fn commits_since(&self, stamp: Timestamp) -> PersistenceResult<Commits>;

    /// All commits with `start <= commit_stamp < end`, ascending by stamp;
    /// ties broken by insertion order.
    fn commits_between(&self, start: Timestamp, end: Timestamp) -> PersistenceResult<Commits>;

    /// All commits not yet marked dispatched, ascending by stamp. Commits
    /// stay discoverable here until explicitly marked, surviving crashes of
    /// the dispatch scheduler.
    fn undispatched_commits(&self) -> PersistenceResult<Commits>;

    /// Flip the commit's dispatch flag to `true`. Idempotent; marking a
    /// commit the store does not know is a no-op.
    fn mark_dispatched(&self, commit: &Commit) -> PersistenceResult<()>;

    /// Drop all commits, snapshots, and stream-heads in this partition.
    fn purge(&self) -> PersistenceResult<()>;

    /// Release this handle. Idempotent; subsequent operations fail with
    /// [`Disposed`](crate::PersistenceError::Disposed).
    fn close(&self);
}
