/// Structural defects in a commit attempt.
///
/// These are programmer errors, not runtime conditions: the facade drops
/// offending attempts silently (logged at debug), while backends reject
/// them outright when called directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCommit {
    #[error("stream id is empty")]
    EmptyStreamId,

    #[error("commit id is nil")]
    NilCommitId,

    #[error("commit sequence must be at least 1")]
    NonPositiveSequence,

    #[error("stream revision {revision} is below commit sequence {sequence}")]
    RevisionBelowSequence { revision: u64, sequence: u64 },

    #[error("commit attempt carries no events")]
    NoEvents,
}
