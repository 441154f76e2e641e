//! Shared scaffolding for persistence backends.
//!
//! Concrete backends differ in dialect and constraint translation; the
//! pieces here are common to all of them: turning a unique-key collision
//! into the right taxonomy error, and maintaining stream-heads off the
//! commit path when the substrate cannot do it transactionally.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use tidemark_types::{Commit, CommitAttempt, Partition, StreamId};

use crate::error::{PersistenceError, PersistenceResult};

/// Classify a unique-key collision observed while persisting `attempt`.
///
/// Backends whose constraints cannot distinguish the two collisions re-read
/// the offending row and compare commit ids: the same id means the attempt
/// is a resubmission (duplicate), a different id means a competitor won the
/// sequence (concurrency).
pub fn classify_collision(existing: &Commit, attempt: &CommitAttempt) -> PersistenceError {
    if existing.commit_id == attempt.commit_id {
        PersistenceError::DuplicateCommit(attempt.commit_id)
    } else {
        PersistenceError::Concurrency
    }
}

/// A stream-head advance queued by a backend after persisting a commit or
/// snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadUpdate {
    pub partition: Partition,
    pub stream_id: StreamId,
    /// New head revision. Appliers must treat this as a floor
    /// (`max(current, head_revision)`) so reordered updates converge.
    pub head_revision: u64,
    /// New snapshot revision, when the update came from a snapshot upsert.
    pub snapshot_revision: Option<u64>,
}

/// Applies queued head updates against the physical store.
pub trait ApplyHeadUpdate: Send + 'static {
    fn apply(&self, update: &HeadUpdate) -> PersistenceResult<()>;
}

impl<F> ApplyHeadUpdate for F
where
    F: Fn(&HeadUpdate) -> PersistenceResult<()> + Send + 'static,
{
    fn apply(&self, update: &HeadUpdate) -> PersistenceResult<()> {
        self(update)
    }
}

/// Background stream-head maintenance for backends that cannot update the
/// head transactionally with the commit insert.
///
/// A single worker thread per persistence instance consumes an unbounded
/// in-memory queue. Transient failures are retried in place; other
/// failures are logged and the update dropped (the head is derived state,
/// reconstructible from the commit log by sweep). Dropping the updater
/// closes the queue and joins the worker, draining everything that was
/// enqueued.
pub struct StreamHeadUpdater {
    sender: Option<Sender<HeadUpdate>>,
    worker: Option<JoinHandle<()>>,
}

impl StreamHeadUpdater {
    const TRANSIENT_RETRIES: usize = 3;

    /// Spawn the worker with the given applier.
    pub fn spawn<A: ApplyHeadUpdate>(apply: A) -> Self {
        let (sender, receiver) = mpsc::channel::<HeadUpdate>();
        let worker = thread::Builder::new()
            .name("tidemark-head-updater".into())
            .spawn(move || {
                for update in receiver {
                    Self::apply_with_retry(&apply, &update);
                }
            })
            .expect("failed to spawn stream-head updater");
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Queue a head update.
    ///
    /// Updates may be observed out of order relative to commit persistence;
    /// convergence is guaranteed by the floor semantics of
    /// [`HeadUpdate::head_revision`].
    pub fn enqueue(&self, update: HeadUpdate) {
        if let Some(sender) = &self.sender {
            // The receiver only disappears once drop has begun; anything
            // lost here is reconstructed by the next sweep.
            if sender.send(update).is_err() {
                warn!("stream-head update dropped: updater is shutting down");
            }
        }
    }

    fn apply_with_retry<A: ApplyHeadUpdate>(apply: &A, update: &HeadUpdate) {
        let mut attempts = 0;
        loop {
            match apply.apply(update) {
                Ok(()) => return,
                Err(err) if err.is_transient() && attempts < Self::TRANSIENT_RETRIES => {
                    attempts += 1;
                    debug!(
                        stream = %update.stream_id,
                        attempt = attempts,
                        "retrying stream-head update: {err}"
                    );
                }
                Err(err) => {
                    warn!(stream = %update.stream_id, "stream-head update failed: {err}");
                    return;
                }
            }
        }
    }
}

impl Drop for StreamHeadUpdater {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what remains and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("stream-head updater worker panicked");
            }
        }
    }
}
