//! Event store facade and optimistic stream engine for Tidemark.
//!
//! This crate is the main entry point for applications embedding Tidemark:
//! - [`EventStore`] — factory for streams, wrapping a persistence backend
//!   and the pipeline hook chain
//! - [`EventStoreBuilder`] — wires persistence and hooks together
//! - [`EventStream`] — a per-stream session buffering uncommitted events,
//!   detecting concurrency conflicts, and rebasing against competitors
//!
//! The write path runs caller → stream → facade → pre-hooks → persistence
//! → post-hooks; the read path runs persistence → hook `select` filter →
//! stream reconstitution.

pub mod builder;
pub mod store;
pub mod stream;

pub use builder::EventStoreBuilder;
pub use store::EventStore;
pub use stream::EventStream;

// Re-export the types callers need to drive the store.
pub use tidemark_persistence::{
    CommitStore, InMemoryPersistence, PersistenceError, PersistenceResult, SnapshotStore,
    StreamPersistence,
};
pub use tidemark_pipeline::{HookChain, PipelineHook, TracingHook};
pub use tidemark_types::{
    Commit, CommitAttempt, CommitId, EventMessage, Partition, Snapshot, StreamHead, StreamId,
    Timestamp,
};
