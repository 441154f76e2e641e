//! Foundation types for the Tidemark event store.
//!
//! This crate provides the record and identifier types used throughout the
//! Tidemark system. Every other Tidemark crate depends on `tidemark-types`.
//!
//! # Key Types
//!
//! - [`StreamId`] — Caller-chosen identifier for an event stream
//! - [`Partition`] — Tenancy tag isolating streams within one physical store
//! - [`CommitId`] — UUID v7 commit identifier, the idempotence key
//! - [`Timestamp`] — Millisecond-precision UTC wall-clock instant
//! - [`EventMessage`] — A single opaque event payload with headers
//! - [`Commit`] / [`CommitAttempt`] — A persisted / proposed batch of events
//! - [`Snapshot`] — Materialized stream state at a chosen revision
//! - [`StreamHead`] — Per-stream head/snapshot bookkeeping record

pub mod commit;
pub mod error;
pub mod event;
pub mod ids;
pub mod snapshot;
pub mod timestamp;

pub use commit::{Commit, CommitAttempt};
pub use error::InvalidCommit;
pub use event::EventMessage;
pub use ids::{CommitId, Partition, StreamId};
pub use snapshot::{Snapshot, StreamHead};
pub use timestamp::Timestamp;
