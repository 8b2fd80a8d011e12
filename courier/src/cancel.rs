//! Named cancellation handles.
//!
//! Every dispatched request gets a [`CancellationToken`]; callers that
//! supply a cancel id can abort the request (and any pending retry
//! delay) by id while it is in flight. Registration is replace-on-write:
//! reusing an id forgets the previous handle without cancelling it.

use std::sync::Arc;

use dashmap::DashMap;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry of in-flight cancellation handles, keyed by caller id.
///
/// Cheap to clone; all clones share the same entries.
#[derive(Debug, Default, Clone)]
pub struct CancelRegistry {
    handles: Arc<DashMap<SmolStr, CancellationToken>>,
}

impl CancelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle under `id`, replacing any previous handle.
    pub fn set(&self, id: impl Into<SmolStr>, token: CancellationToken) {
        self.handles.insert(id.into(), token);
    }

    /// Looks up the handle registered under `id`.
    pub fn get(&self, id: &str) -> Option<CancellationToken> {
        self.handles.get(id).map(|entry| entry.clone())
    }

    /// Removes the handle under `id` without cancelling it.
    pub fn delete(&self, id: &str) {
        self.handles.remove(id);
    }

    /// Cancels the request registered under `id` and removes the entry.
    ///
    /// Returns whether an entry existed.
    pub fn cancel_by_id(&self, id: &str) -> bool {
        match self.handles.remove(id) {
            Some((_, token)) => {
                debug!(id, "cancelling request by id");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every registered request and empties the registry.
    pub fn cancel_all(&self) {
        let keys: Vec<SmolStr> = self.handles.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, token)) = self.handles.remove(&key) {
                token.cancel();
            }
        }
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reregistering_replaces_prior_handle() {
        let registry = CancelRegistry::new();
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        registry.set("job", first.clone());
        registry.set("job", second.clone());
        assert!(registry.cancel_by_id("job"));
        assert!(!first.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[test]
    fn cancel_all_drains_the_registry() {
        let registry = CancelRegistry::new();
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        registry.set("a", a.clone());
        registry.set("b", b.clone());
        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(registry.is_empty());
    }

    #[test]
    fn cancel_by_unknown_id_is_a_noop() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel_by_id("missing"));
    }
}
