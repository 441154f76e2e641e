use std::sync::Arc;

use tidemark_persistence::{InMemoryPersistence, PersistenceResult, StreamPersistence};
use tidemark_pipeline::{HookChain, PipelineHook};

use crate::store::EventStore;

/// Wires a persistence backend and the pipeline hook chain into an
/// [`EventStore`].
///
/// Hooks run in the order they are added. When no backend is supplied the
/// store falls back to [`InMemoryPersistence`] over the default partition.
pub struct EventStoreBuilder {
    persistence: Option<Arc<dyn StreamPersistence>>,
    hooks: Vec<Box<dyn PipelineHook>>,
}

impl EventStoreBuilder {
    pub fn new() -> Self {
        Self {
            persistence: None,
            hooks: Vec::new(),
        }
    }

    /// Use the given backend.
    pub fn persistence(mut self, persistence: Arc<dyn StreamPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Use a fresh in-memory backend over the default partition.
    pub fn in_memory(self) -> Self {
        self.persistence(Arc::new(InMemoryPersistence::new()))
    }

    /// Append a hook to the chain.
    pub fn hook(mut self, hook: Box<dyn PipelineHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Initialize the backend and build the store.
    pub fn build(self) -> PersistenceResult<EventStore> {
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
        persistence.initialize()?;
        Ok(EventStore::new(persistence, HookChain::new(self.hooks)))
    }
}

impl Default for EventStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
