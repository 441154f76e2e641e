use tidemark_types::{CommitId, InvalidCommit};

/// Errors produced by persistence operations.
///
/// Backends translate their native faults into this taxonomy so callers
/// can react uniformly: [`Concurrency`](PersistenceError::Concurrency) and
/// [`DuplicateCommit`](PersistenceError::DuplicateCommit) drive the
/// optimistic-commit protocol, [`StorageUnavailable`](PersistenceError::StorageUnavailable)
/// is the caller's retry signal, and everything else is fatal for the
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// A commit already exists at the attempted stream sequence with a
    /// different commit id. The stream has moved on; rebase and retry.
    #[error("commit attempt conflicts with a newer commit on this stream")]
    Concurrency,

    /// A commit with this id was already persisted for this stream; the
    /// attempt is a resubmission, not new work.
    #[error("commit {0} has already been persisted for this stream")]
    DuplicateCommit(CommitId),

    /// Transient backend connectivity failure; callers may retry.
    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other backend fault; fatal for the operation.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The attempt failed structural validation.
    #[error("invalid commit attempt: {0}")]
    InvalidCommit(#[from] InvalidCommit),

    /// The persistence handle was closed and can no longer serve requests.
    #[error("persistence handle has been disposed")]
    Disposed,
}

impl PersistenceError {
    /// Returns `true` if the operation may reasonably be retried as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailability_is_transient() {
        assert!(PersistenceError::StorageUnavailable("timeout".into()).is_transient());
        assert!(!PersistenceError::Concurrency.is_transient());
        assert!(!PersistenceError::Storage("corrupt page".into()).is_transient());
        assert!(!PersistenceError::Disposed.is_transient());
    }

    #[test]
    fn invalid_commit_converts() {
        let err: PersistenceError = InvalidCommit::NoEvents.into();
        assert_eq!(err, PersistenceError::InvalidCommit(InvalidCommit::NoEvents));
    }
}
