use tidemark_types::{Commit, CommitAttempt};

use crate::hook::PipelineHook;

/// An ordered chain of pipeline hooks, fixed at construction.
///
/// Hooks see reads and writes in the order they were given. `select` is
/// short-circuited per commit: the first hook returning `None` wins and the
/// remaining hooks are skipped for that commit. `pre_commit` stops at the
/// first veto.
pub struct HookChain {
    hooks: Vec<Box<dyn PipelineHook>>,
}

impl HookChain {
    /// Build a chain from hooks in evaluation order.
    pub fn new(hooks: Vec<Box<dyn PipelineHook>>) -> Self {
        Self { hooks }
    }

    /// A chain with no hooks; every operation passes through.
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Number of hooks in the chain.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if the chain has no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run a commit through every hook's `select`, threading rewrites.
    /// Returns `None` as soon as any hook filters the commit out.
    pub fn select(&self, commit: Commit) -> Option<Commit> {
        let mut current = commit;
        for hook in &self.hooks {
            current = hook.select(current)?;
        }
        Some(current)
    }

    /// Run every hook's `pre_commit` in order, stopping at the first veto.
    pub fn pre_commit(&self, attempt: &CommitAttempt) -> bool {
        self.hooks.iter().all(|hook| hook.pre_commit(attempt))
    }

    /// Run every hook's `post_commit` in order.
    pub fn post_commit(&self, commit: &Commit) {
        for hook in &self.hooks {
            hook.post_commit(commit);
        }
    }

    /// Notify every hook that the owning facade is being disposed.
    pub fn dispose(&self) {
        for hook in &self.hooks {
            hook.on_dispose();
        }
    }
}

impl Default for HookChain {
    fn default() -> Self {
        Self::empty()
    }
}
