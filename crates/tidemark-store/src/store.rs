use std::sync::Arc;

use tracing::debug;

use tidemark_persistence::{PersistenceResult, StreamPersistence};
use tidemark_pipeline::HookChain;
use tidemark_types::{Commit, CommitAttempt, Snapshot, StreamId};

use crate::builder::EventStoreBuilder;
use crate::stream::EventStream;

/// Map the "`max_revision <= 0` means unbounded" convention onto `u64`.
pub(crate) fn unbounded(max_revision: u64) -> u64 {
    if max_revision == 0 {
        u64::MAX
    } else {
        max_revision
    }
}

/// Factory for event streams, wrapping a persistence backend and the
/// pipeline hook chain.
///
/// The facade is safe for concurrent use by independent threads; the
/// streams it opens are not and must stay on one thread each. Dropping the
/// facade notifies every hook once and closes the persistence handle.
pub struct EventStore {
    persistence: Arc<dyn StreamPersistence>,
    hooks: HookChain,
}

impl EventStore {
    /// Wrap a backend and a hook chain.
    pub fn new(persistence: Arc<dyn StreamPersistence>, hooks: HookChain) -> Self {
        Self { persistence, hooks }
    }

    /// Start building a store.
    pub fn builder() -> EventStoreBuilder {
        EventStoreBuilder::new()
    }

    /// An empty stream positioned at revision 0, sequence 0.
    pub fn create_stream(&self, stream_id: impl Into<StreamId>) -> EventStream<'_> {
        EventStream::empty(self, stream_id.into())
    }

    /// Open a stream by reading committed events in
    /// `[min_revision, max_revision]`; `max_revision` of 0 means unbounded.
    /// The stream is positioned at the highest revision observed.
    pub fn open_stream(
        &self,
        stream_id: impl Into<StreamId>,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<EventStream<'_>> {
        EventStream::hydrated(self, stream_id.into(), min_revision, unbounded(max_revision))
    }

    /// Open a stream from a snapshot, reading forward from the snapshot's
    /// revision to `max_revision` (0 means unbounded).
    pub fn open_stream_from_snapshot(
        &self,
        snapshot: Snapshot,
        max_revision: u64,
    ) -> PersistenceResult<EventStream<'_>> {
        EventStream::from_snapshot(self, snapshot, unbounded(max_revision))
    }

    /// The central write path.
    ///
    /// Invalid or event-empty attempts are dropped silently (logged at
    /// debug) — they are programmer errors, not runtime conditions. A
    /// pre-commit hook veto also drops the attempt silently. Otherwise the
    /// attempt is persisted and post-hooks run; failures are exactly what
    /// persistence raises.
    ///
    /// Returns the persisted commit, or `None` when the attempt was
    /// dropped.
    pub fn commit(&self, attempt: CommitAttempt) -> PersistenceResult<Option<Commit>> {
        if !attempt.is_valid() || attempt.is_empty() {
            debug!(stream = %attempt.stream_id, "dropping invalid or event-empty commit attempt");
            return Ok(None);
        }
        if !self.hooks.pre_commit(&attempt) {
            debug!(
                stream = %attempt.stream_id,
                commit = %attempt.commit_id,
                "commit attempt vetoed by pipeline hook"
            );
            return Ok(None);
        }
        let commit = self.persistence.commit(attempt)?;
        self.hooks.post_commit(&commit);
        Ok(Some(commit))
    }

    /// Hook-filtered read of a stream's commits: every commit in the range
    /// is run through the chain's `select`, lazily as the caller iterates.
    pub fn commits_in_range<'s>(
        &'s self,
        stream_id: &StreamId,
        min_revision: u64,
        max_revision: u64,
    ) -> PersistenceResult<impl Iterator<Item = PersistenceResult<Commit>> + 's> {
        let commits = self
            .persistence
            .commits_in_range(stream_id, min_revision, max_revision)?;
        Ok(commits.filter_map(move |result| match result {
            Ok(commit) => self.hooks.select(commit).map(Ok),
            Err(err) => Some(Err(err)),
        }))
    }

    /// Raw access to the underlying persistence for administrative tasks:
    /// dispatch sweeps, snapshot upkeep, purge. Reads through this surface
    /// bypass the hook chain.
    pub fn advanced(&self) -> &dyn StreamPersistence {
        self.persistence.as_ref()
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        self.hooks.dispose();
        self.persistence.close();
    }
}
