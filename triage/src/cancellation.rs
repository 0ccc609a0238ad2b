//! Cooperative cancellation.
//!
//! Cancellation is checked between stages, never preemptively within a
//! running stage. Tokens are idempotent: the first reason wins.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::TaskId;

/// A cooperative cancellation token.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

/// Per-task cancellation tokens, shared between the scheduler and workers.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: DashMap<TaskId, Arc<CancelToken>>,
}

impl CancelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for a task, creating it if absent.
    #[must_use]
    pub fn token_for(&self, id: TaskId) -> Arc<CancelToken> {
        self.tokens
            .entry(id)
            .or_insert_with(|| Arc::new(CancelToken::new()))
            .clone()
    }

    /// Cancels a task's token, creating it if the task has not started yet.
    ///
    /// Callers validate the id first (the scheduler only flags unresolved
    /// tasks), so the map stays bounded to live work.
    pub fn cancel(&self, id: TaskId, reason: impl Into<String>) {
        self.token_for(id).cancel(reason);
    }

    /// Drops the token once a task reaches a terminal state.
    pub fn remove(&self, id: TaskId) {
        self.tokens.remove(&id);
    }

    /// Number of live tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_first_reason_wins() {
        let token = CancelToken::new();
        token.cancel("first");
        token.cancel("second");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[test]
    fn test_registry_cancel_before_start() {
        let registry = CancelRegistry::new();
        let id = TaskId::new();

        // Cancelling a task that has no token yet still sticks.
        registry.cancel(id, "operator request");
        assert!(registry.token_for(id).is_cancelled());
    }

    #[test]
    fn test_registry_shared_token() {
        let registry = CancelRegistry::new();
        let id = TaskId::new();

        let a = registry.token_for(id);
        let b = registry.token_for(id);
        a.cancel("stop");
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_registry_remove() {
        let registry = CancelRegistry::new();
        let id = TaskId::new();
        let _ = registry.token_for(id);
        assert_eq!(registry.len(), 1);

        registry.remove(id);
        assert!(registry.is_empty());
    }
}
