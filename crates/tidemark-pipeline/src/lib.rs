//! Pipeline hook chain for the Tidemark event store.
//!
//! Hooks sit between the stream engine and persistence. They may observe,
//! rewrite, or reject commits on the write path (`pre_commit` /
//! `post_commit`) and filter or rewrite commits on the read path
//! (`select`). The chain is an ordered list fixed at construction; it adds
//! no retry, no transactionality, and no parallelism of its own.

pub mod chain;
pub mod hook;

pub use chain::HookChain;
pub use hook::{PipelineHook, TracingHook};
