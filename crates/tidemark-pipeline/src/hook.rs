use tracing::debug;

use tidemark_types::{Commit, CommitAttempt};

/// A filter/interceptor around the commit flow.
///
/// All methods default to pass-through so hooks only implement the phases
/// they care about. The trait is object-safe and `Send + Sync` so chains
/// can be stored as `Vec<Box<dyn PipelineHook>>`.
pub trait PipelineHook: Send + Sync {
    /// Applied to each commit during reads. Returning `None` filters the
    /// commit out of the result sequence; returning a different commit
    /// rewrites it in flight.
    fn select(&self, commit: Commit) -> Option<Commit> {
        Some(commit)
    }

    /// Applied in declared order before persistence. Returning `false`
    /// aborts the commit silently: nothing is persisted, no later pre-hook
    /// runs, and no post-hook runs.
    fn pre_commit(&self, _attempt: &CommitAttempt) -> bool {
        true
    }

    /// Invoked in declared order after successful persistence. Side
    /// effects only; a failure here never retracts the commit.
    fn post_commit(&self, _commit: &Commit) {}

    /// Invoked exactly once when the owning facade is disposed.
    fn on_dispose(&self) {}
}

/// A hook that observes reads and writes at `debug` level.
///
/// Useful as the first hook in any chain; it never filters or vetoes.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingHook;

impl PipelineHook for TracingHook {
    fn select(&self, commit: Commit) -> Option<Commit> {
        debug!(
            stream = %commit.stream_id,
            sequence = commit.commit_sequence,
            "commit selected"
        );
        Some(commit)
    }

    fn pre_commit(&self, attempt: &CommitAttempt) -> bool {
        debug!(
            stream = %attempt.stream_id,
            commit = %attempt.commit_id,
            events = attempt.events.len(),
            "commit attempted"
        );
        true
    }

    fn post_commit(&self, commit: &Commit) {
        debug!(
            stream = %commit.stream_id,
            revision = commit.stream_revision,
            "commit persisted"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use tidemark_types::{CommitId, EventMessage, Partition, Timestamp};

    fn commit() -> Commit {
        Commit {
            partition: Partition::default(),
            stream_id: "s-1".into(),
            commit_id: CommitId::new(),
            commit_sequence: 1,
            stream_revision: 1,
            commit_stamp: Timestamp::from_millis(1),
            headers: Default::default(),
            events: vec![EventMessage::new(json!(1))],
            dispatched: false,
        }
    }

    #[test]
    fn tracing_hook_passes_everything_through() {
        let hook = TracingHook;
        let original = commit();
        let selected = hook.select(original.clone()).unwrap();
        assert_eq!(selected, original);

        let attempt = CommitAttempt::new(
            "s-1",
            CommitId::new(),
            1,
            1,
            vec![EventMessage::new(json!(1))],
        );
        assert!(hook.pre_commit(&attempt));
        hook.post_commit(&original);
        hook.on_dispose();
    }
}
