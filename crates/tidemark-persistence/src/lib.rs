//! Persistence contract and reference backend for the Tidemark event store.
//!
//! This crate defines the uniform API any storage backend must implement:
//! - [`CommitStore`] / [`SnapshotStore`] / [`StreamPersistence`] trait
//!   boundaries, all implicitly scoped to one [`Partition`](tidemark_types::Partition)
//! - [`PersistenceError`], the backend-neutral failure taxonomy
//! - [`InMemoryPersistence`], the reference implementation used by tests
//!   and embedders
//! - [`adapter`], shared scaffolding for real backends (collision
//!   classification, asynchronous stream-head maintenance)
//!
//! Backends classify their native faults into the taxonomy; callers never
//! see a driver-specific error type.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod traits;

pub use adapter::{classify_collision, ApplyHeadUpdate, HeadUpdate, StreamHeadUpdater};
pub use error::{PersistenceError, PersistenceResult};
pub use memory::InMemoryPersistence;
pub use traits::{CommitStore, Commits, SnapshotStore, StreamPersistence};
